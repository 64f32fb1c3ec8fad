//! Calibration, cross-sensor averaging, and Simpson integration: the
//! consumer half of the acquisition pipeline.

use crate::calibration::CalibrationBlock;
use crate::config::{self, NUM_SENSORS};
use crate::frame::{channel, RawFrame};
use crate::quaternion::Quaternion;
use crate::sensors::PresenceBitmap;

/// One tick's calibrated-and-averaged channel values, already converted
/// to SI units (rad/s, m/s^2).
#[derive(Debug, Clone, Copy, Default)]
pub struct AveragedSample {
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
}

/// Three-slot sliding window feeding Simpson's rule. Mirrors the
/// original firmware's `dataAvgd[3][...]`/`sampleCount` bookkeeping:
/// samples fill slots 0, 1, 2 in order; once the third lands, the caller
/// integrates and the window slides (slot 2 becomes slot 0, the count
/// resets to 1) so the next two samples refill slots 1 and 2.
#[derive(Default)]
pub struct SampleWindow {
    slots: [AveragedSample; 3],
    filled: u32,
}

impl SampleWindow {
    pub const fn new() -> Self {
        SampleWindow {
            slots: [AveragedSample {
                accel: [0.0; 3],
                gyro: [0.0; 3],
            }; 3],
            filled: 0,
        }
    }

    /// Stores `sample` in the next slot. Returns `true` once three
    /// samples have accumulated and an integration step is due.
    pub fn push(&mut self, sample: AveragedSample) -> bool {
        self.slots[self.filled as usize] = sample;
        self.filled += 1;
        if self.filled == 3 {
            true
        } else {
            false
        }
    }

    /// Consumes the full window for an integration step and slides it:
    /// the most recent sample becomes the new slot 0.
    pub fn take_and_slide(&mut self) -> [AveragedSample; 3] {
        debug_assert_eq!(self.filled, 3);
        let window = self.slots;
        self.slots[0] = self.slots[2];
        self.filled = 1;
        window
    }
}

/// Non-destructive accumulators and the latest published values, mirroring
/// `ProcDataRecord`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessedRecord {
    /// Non-destructively accumulated angle, rad.
    pub delta_theta: [f32; 3],
    /// Non-destructively accumulated delta-velocity, m/s.
    pub delta_v: [f32; 3],
    /// The latest integration step's delta-velocity. Distinct from
    /// `delta_v`: the former accumulates since boot, this is the most
    /// recent increment only (the original firmware calls this
    /// "accumulated velocity", which is a misnomer inherited verbatim;
    /// it is the per-step increment, not a running total).
    pub accum_v: [f32; 3],
    pub attitude: Quaternion,
    pub avg_temp_c: f32,
    pub tick_stamp: u32,
    pub angular_rate: [f32; 3],
    pub specific_force: [f32; 3],
}

impl ProcessedRecord {
    pub const fn zeroed() -> Self {
        ProcessedRecord {
            delta_theta: [0.0; 3],
            delta_v: [0.0; 3],
            accum_v: [0.0; 3],
            attitude: Quaternion::IDENTITY,
            avg_temp_c: 0.0,
            tick_stamp: 0,
            angular_rate: [0.0; 3],
            specific_force: [0.0; 3],
        }
    }

    /// Serializes the fields the calibrated log chunk carries: dTheta,
    /// dV, accumV, Q, avgTemp, in that order, as little-endian `f32`s —
    /// [`crate::config::CAL_CHUNK_LEN`] bytes. The tick stamp, angular
    /// rate, and specific force are register-plane-only fields, not
    /// logged, matching the original firmware's `WriteCalibratedDataToSDCard`.
    pub fn write_cal_chunk(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), crate::config::CAL_CHUNK_LEN);
        let values = [
            self.delta_theta[0],
            self.delta_theta[1],
            self.delta_theta[2],
            self.delta_v[0],
            self.delta_v[1],
            self.delta_v[2],
            self.accum_v[0],
            self.accum_v[1],
            self.accum_v[2],
            self.attitude.x,
            self.attitude.y,
            self.attitude.z,
            self.attitude.w,
            self.avg_temp_c,
        ];
        for (i, v) in values.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
}

impl Default for ProcessedRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Drives calibration, averaging, integration, and output gating for one
/// raw frame at a time.
pub struct SignalPipeline {
    window: SampleWindow,
    record: ProcessedRecord,
    output_count: u8,
}

impl SignalPipeline {
    pub const fn new() -> Self {
        SignalPipeline {
            window: SampleWindow::new(),
            record: ProcessedRecord::zeroed(),
            output_count: 0,
        }
    }

    pub fn record(&self) -> &ProcessedRecord {
        &self.record
    }

    /// Processes one raw frame: calibrates every present sensor,
    /// averages across them, and (every third averaged sample) runs a
    /// Simpson integration step. Returns `true` when `output_count` has
    /// reached the divider and a publish is due (register write in
    /// Streaming, calibrated-chunk log write in BulkLogWrite); the
    /// caller is responsible for resetting state it owns after
    /// publishing.
    pub fn process(
        &mut self,
        frame: &RawFrame,
        presence: &PresenceBitmap,
        calibration: &[CalibrationBlock; NUM_SENSORS],
        output_divider: u8,
    ) -> bool {
        let mut accel_sum = [0.0f32; 3];
        let mut gyro_sum = [0.0f32; 3];
        let mut temp_sum = 0.0f32;
        let mut count = 0u32;

        for i in 0..NUM_SENSORS {
            if !presence.is_present(i) {
                continue;
            }
            let readout = &frame.sensors[i];
            let raw_accel = [
                readout.data[channel::AX],
                readout.data[channel::AY],
                readout.data[channel::AZ],
            ];
            let raw_gyro = [
                readout.data[channel::GX],
                readout.data[channel::GY],
                readout.data[channel::GZ],
            ];
            let (a_cal, g_cal, temp_c) =
                calibration[i].calibrate(raw_accel, raw_gyro, readout.data[channel::TEMP]);

            for axis in 0..3 {
                accel_sum[axis] += a_cal[axis];
                gyro_sum[axis] += g_cal[axis];
            }
            temp_sum += temp_c;
            count += 1;
        }

        let divisor = if count == 0 { 1.0 } else { count as f32 };
        let mut sample = AveragedSample {
            accel: [
                accel_sum[0] / divisor,
                accel_sum[1] / divisor,
                accel_sum[2] / divisor,
            ],
            gyro: [
                gyro_sum[0] / divisor,
                gyro_sum[1] / divisor,
                gyro_sum[2] / divisor,
            ],
        };
        let avg_temp_c = temp_sum / divisor;

        for axis in 0..3 {
            sample.gyro[axis] *= config::DEG_TO_RAD;
            sample.accel[axis] *= config::GRAVITY;
        }

        self.record.tick_stamp = frame.time_stamp;

        if self.window.push(sample) {
            let [s0, s1, s2] = self.window.take_and_slide();
            self.integrate(s0, s1, s2, avg_temp_c);
        }

        self.output_count += 1;
        if self.output_count >= output_divider {
            self.output_count = 0;
            true
        } else {
            false
        }
    }

    fn integrate(
        &mut self,
        s0: AveragedSample,
        s1: AveragedSample,
        s2: AveragedSample,
        avg_temp_c: f32,
    ) {
        let ts = config::sample_period();
        let simpson = |a: f32, b: f32, c: f32| (ts / 3.0) * (c + 4.0 * b + a);

        let sigma = [
            simpson(s0.gyro[0], s1.gyro[0], s2.gyro[0]),
            simpson(s0.gyro[1], s1.gyro[1], s2.gyro[1]),
            simpson(s0.gyro[2], s1.gyro[2], s2.gyro[2]),
        ];
        for axis in 0..3 {
            self.record.delta_theta[axis] += sigma[axis];
        }
        self.record.attitude = self.record.attitude.propagate(sigma);
        self.record.angular_rate = s2.gyro;
        self.record.avg_temp_c = avg_temp_c;

        let dv = [
            simpson(s0.accel[0], s1.accel[0], s2.accel[0]),
            simpson(s0.accel[1], s1.accel[1], s2.accel[1]),
            simpson(s0.accel[2], s1.accel[2], s2.accel[2]),
        ];
        for axis in 0..3 {
            self.record.delta_v[axis] += dv[axis];
        }
        self.record.accum_v = dv;
        self.record.specific_force = s2.accel;
    }
}

impl Default for SignalPipeline {
    fn default() -> Self {
        Self::new()
    }
}
