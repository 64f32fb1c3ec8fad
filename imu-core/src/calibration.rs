//! Per-sensor calibration coefficients and the closed-form
//! scale-factor/misalignment matrix inverse.

/// Eleven vector coefficients plus the two derived inverse matrices,
/// precomputed once at construction (or coefficient reload).
#[derive(Debug, Clone, Copy)]
pub struct CalibrationBlock {
    /// Bias: `[Ax, Ay, Az, Gx, Gy, Gz]`.
    pub bias: [f32; 6],
    /// Temperature slope: `[Ax, Ay, Az, Gx, Gy, Gz]`.
    pub temp_slope: [f32; 6],
    /// Scale factor: `[Ax, Ay, Az, Gx, Gy, Gz]`.
    pub scale: [f32; 6],
    /// Misalignment: `[Ax, Ay, Az, Gx, Gy, Gz]`.
    pub misalignment: [f32; 6],
    /// Gyro g-sensitivity, row-major 3x3.
    pub g_sensitivity: [f32; 9],
    /// Inverse of `I + diag(S_accel) + Mskew(M_accel)`, row-major 3x3.
    accel_ism: [f32; 9],
    /// Inverse of `I + diag(S_gyro) + Mskew(M_gyro)`, row-major 3x3.
    gyro_ism: [f32; 9],
    /// Set when either closed-form inverse's denominator is too close to
    /// zero to trust. A sensor whose calibration block is invalid is
    /// treated as absent.
    pub invalid: bool,
}

/// Below this magnitude the closed-form denominator is considered
/// degenerate; rather than dividing by it and propagating NaN/Inf, the
/// calibration block is marked invalid.
const DENOMINATOR_EPS: f32 = 1e-6;

fn closed_form_inverse(s: [f32; 3], m: [f32; 3]) -> ([f32; 9], bool) {
    let (sx, sy, sz) = (s[0], s[1], s[2]);
    let (mx, my, mz) = (m[0], m[1], m[2]);

    let den = sx + sy + sz
        + sx * sy
        + sx * sz
        + sy * sz
        + my * my * sy
        + mz * mz * sx
        + mx * mx * sz
        + mx * mx
        + my * my
        + mz * mz
        + sx * sy * sz
        + 1.0;

    if libm::fabsf(den) < DENOMINATOR_EPS {
        return ([0.0; 9], true);
    }

    let ism = [
        (mz * mz + sy + sz + sy * sz + 1.0) / den,
        -(mx + mx * sz + my * mz) / den,
        -(my + my * sy - mx * mz) / den,
        (mx + mx * sz - my * mz) / den,
        (my * my + sx + sz + sx * sz + 1.0) / den,
        -(mz + mz * sx + mx * my) / den,
        (my + my * sy + mx * mz) / den,
        (mz + mz * sx - mx * my) / den,
        (mx * mx + sx + sy + sx * sy + 1.0) / den,
    ];
    (ism, false)
}

fn matvec3(m: &[f32; 9], v: [f32; 3]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

impl CalibrationBlock {
    /// Builds a calibration block from the eleven raw coefficient
    /// vectors, precomputing `A_ISM`/`G_ISM`. If either closed-form
    /// inverse is degenerate, `invalid` is set and the matrices are left
    /// zeroed; the sensor array manager treats such a block as absent.
    pub fn new(
        bias: [f32; 6],
        temp_slope: [f32; 6],
        scale: [f32; 6],
        misalignment: [f32; 6],
        g_sensitivity: [f32; 9],
    ) -> Self {
        let (accel_ism, accel_invalid) = closed_form_inverse(
            [scale[0], scale[1], scale[2]],
            [misalignment[0], misalignment[1], misalignment[2]],
        );
        let (gyro_ism, gyro_invalid) = closed_form_inverse(
            [scale[3], scale[4], scale[5]],
            [misalignment[3], misalignment[4], misalignment[5]],
        );
        CalibrationBlock {
            bias,
            temp_slope,
            scale,
            misalignment,
            g_sensitivity,
            accel_ism,
            gyro_ism,
            invalid: accel_invalid || gyro_invalid,
        }
    }

    /// Identity calibration: zero bias/temp/misalignment/g-sensitivity,
    /// unit scale. Useful for tests and as a safe default before real
    /// coefficients are loaded.
    pub fn identity() -> Self {
        CalibrationBlock::new([0.0; 6], [0.0; 6], [0.0; 6], [0.0; 6], [0.0; 9])
    }

    /// Calibrates one sensor's raw readout into SI-adjacent units
    /// (g / dps, pre-gravity/deg-to-rad conversion).
    ///
    /// Returns `(accel[3], gyro[3], temp_c)`.
    pub fn calibrate(
        &self,
        raw_accel: [i16; 3],
        raw_gyro: [i16; 3],
        raw_temp: i16,
    ) -> ([f32; 3], [f32; 3], f32) {
        use crate::config::{K_ACCEL, K_GYRO};

        let temp_c = (raw_temp as f32) / 326.8 + 25.0;
        let d_t = temp_c - 25.0;

        let a_pre = [
            K_ACCEL * raw_accel[0] as f32 - self.bias[0] - self.temp_slope[0] * d_t,
            K_ACCEL * raw_accel[1] as f32 - self.bias[1] - self.temp_slope[1] * d_t,
            K_ACCEL * raw_accel[2] as f32 - self.bias[2] - self.temp_slope[2] * d_t,
        ];
        let a_cal = matvec3(&self.accel_ism, a_pre);

        let g_cross = matvec3(&self.g_sensitivity, a_cal);
        let g_pre = [
            K_GYRO * raw_gyro[0] as f32 - self.bias[3] - self.temp_slope[3] * d_t - g_cross[0],
            K_GYRO * raw_gyro[1] as f32 - self.bias[4] - self.temp_slope[4] * d_t - g_cross[1],
            K_GYRO * raw_gyro[2] as f32 - self.bias[5] - self.temp_slope[5] * d_t - g_cross[2],
        ];
        let g_cal = matvec3(&self.gyro_ism, g_pre);

        (a_cal, g_cal, temp_c)
    }
}
