//! Scalar-first unit quaternion, Hamilton product, and the small-angle
//! rotation-increment construction used by the integrator.

use libm::sqrtf;

/// A quaternion stored scalar-first (`w, x, y, z`) to match the original
/// firmware's internal layout; the register plane exposes it in `x, y, z,
/// w` order instead, so conversion happens at the register plane boundary,
/// not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// The identity rotation.
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Hamilton product `self * rhs`.
    pub fn mul(self, rhs: Quaternion) -> Quaternion {
        Quaternion {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }

    pub fn norm(self) -> f32 {
        sqrtf(self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z)
    }

    /// Normalizes in place; divides by the quaternion's own norm.
    pub fn normalize(self) -> Quaternion {
        let n = self.norm();
        Quaternion {
            w: self.w / n,
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
        }
    }

    /// Builds the small-angle rotation-increment quaternion for a Simpson
    /// integrated rotation vector `sigma`, a Taylor-series approximation of
    /// `(cos(phi/2), sin(phi/2) * axis)`.
    ///
    /// Below `phi^2 <= 1e-12` the increment is the identity rotation: this
    /// dead band is numerically fine but silently drops sub-degree-per-
    /// second rotations at high sample rates. Preserved as in the original
    /// firmware.
    pub fn small_angle_increment(sigma: [f32; 3]) -> Quaternion {
        let phi_sq = sigma[0] * sigma[0] + sigma[1] * sigma[1] + sigma[2] * sigma[2];
        if phi_sq > 1e-12 {
            let w = 1.0 - phi_sq / 8.0;
            let a = 0.5 - phi_sq / 48.0;
            Quaternion {
                w,
                x: sigma[0] * a,
                y: sigma[1] * a,
                z: sigma[2] * a,
            }
        } else {
            Quaternion::IDENTITY
        }
    }

    /// Propagates `self` by rotation increment `sigma` (a Simpson
    /// integrated body rate, in rad) and re-normalizes.
    pub fn propagate(self, sigma: [f32; 3]) -> Quaternion {
        let q1 = Quaternion::small_angle_increment(sigma);
        self.mul(q1).normalize()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_product_is_identity() {
        let q = Quaternion::IDENTITY;
        let r = q.mul(q);
        assert_eq!(r, Quaternion::IDENTITY);
    }

    #[test]
    fn zero_rotation_leaves_quaternion_unchanged() {
        let q = Quaternion::IDENTITY;
        let q2 = q.propagate([0.0, 0.0, 0.0]);
        assert!((q2.norm() - 1.0).abs() < 1e-6);
        assert_eq!(q2, Quaternion::IDENTITY);
    }

    #[test]
    fn small_angle_dead_band() {
        // Below the threshold, sigma is small enough that phi^2 <= 1e-12.
        let tiny = [1e-7, 0.0, 0.0];
        let q1 = Quaternion::small_angle_increment(tiny);
        assert_eq!(q1, Quaternion::IDENTITY);
    }

    #[test]
    fn propagate_stays_unit_norm() {
        let mut q = Quaternion::IDENTITY;
        for _ in 0..600 {
            q = q.propagate([0.001, 0.0005, -0.0002]);
        }
        assert!((q.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pure_z_rotation_quarter_turn() {
        // sigma_z small-angle sum approximating a 90 degree rotation about Z,
        // applied incrementally so each step stays in the Taylor-series regime.
        let steps = 900;
        let total = core::f32::consts::FRAC_PI_2;
        let per_step = total / steps as f32;
        let mut q = Quaternion::IDENTITY;
        for _ in 0..steps {
            q = q.propagate([0.0, 0.0, per_step]);
        }
        // Expect approximately (cos(pi/4), 0, 0, sin(pi/4))
        let expected_w = (total / 2.0).cos();
        let expected_z = (total / 2.0).sin();
        assert!((q.w - expected_w).abs() < 1e-3);
        assert!((q.z - expected_z).abs() < 1e-3);
        assert!(q.x.abs() < 1e-3);
        assert!(q.y.abs() < 1e-3);
    }
}
