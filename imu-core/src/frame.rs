//! Raw frame data model.

use crate::config::NUM_SENSORS;

/// Index of each channel within a sensor's seven-word readout, in the
/// fixed order the bus delivers them.
pub mod channel {
    pub const AX: usize = 0;
    pub const AY: usize = 1;
    pub const AZ: usize = 2;
    pub const TEMP: usize = 3;
    pub const GX: usize = 4;
    pub const GY: usize = 5;
    pub const GZ: usize = 6;
}

/// Seven signed 16-bit words for one sensor, already re-oriented into
/// board axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorReadout {
    pub data: [i16; 7],
}

impl SensorReadout {
    pub const fn zeroed() -> Self {
        SensorReadout { data: [0; 7] }
    }
}

/// One tick's worth of raw data: a monotonic timestamp plus a readout
/// slot for every sensor index (whether or not that sensor is present —
/// absent sensors leave stale bytes the calibrator must ignore via the
/// presence bitmap).
#[derive(Debug, Clone, Copy)]
pub struct RawFrame {
    pub time_stamp: u32,
    pub sensors: [SensorReadout; NUM_SENSORS],
}

impl RawFrame {
    pub const fn zeroed() -> Self {
        RawFrame {
            time_stamp: 0,
            sensors: [SensorReadout::zeroed(); NUM_SENSORS],
        }
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl RawFrame {
    /// Serializes the timestamp plus sensors `[0, split)` into `out`, 4
    /// bytes of little-endian timestamp followed by 14 bytes
    /// (7 little-endian `i16`s) per sensor, matching the original
    /// firmware's raw memcpy of `queue[k]` onto the wire.
    fn write_prefix_and_sensors(&self, split_start: usize, split_end: usize, out: &mut [u8]) {
        let mut idx = 0;
        if split_start == 0 {
            out[0..4].copy_from_slice(&self.time_stamp.to_le_bytes());
            idx = 4;
        }
        for sensor in &self.sensors[split_start..split_end] {
            for word in sensor.data.iter() {
                out[idx..idx + 2].copy_from_slice(&word.to_le_bytes());
                idx += 2;
            }
        }
    }

    /// First log chunk: timestamp (4 bytes) + sensors
    /// `[0, RAW_CHUNK_1_SENSORS)` (14 bytes each) =
    /// [`crate::config::RAW_CHUNK_1_LEN`] bytes.
    pub fn write_chunk1(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), crate::config::RAW_CHUNK_1_LEN);
        self.write_prefix_and_sensors(0, crate::config::RAW_CHUNK_1_SENSORS, out);
    }

    /// Second log chunk: the remaining sensors
    /// `[RAW_CHUNK_1_SENSORS, NUM_SENSORS)`, [`crate::config::RAW_CHUNK_2_LEN`]
    /// bytes, with no timestamp prefix.
    pub fn write_chunk2(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), crate::config::RAW_CHUNK_2_LEN);
        self.write_prefix_and_sensors(
            crate::config::RAW_CHUNK_1_SENSORS,
            crate::config::NUM_SENSORS,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RAW_CHUNK_1_LEN, RAW_CHUNK_2_LEN};

    #[test]
    fn chunk1_starts_with_little_endian_timestamp() {
        let mut frame = RawFrame::zeroed();
        frame.time_stamp = 0x0102_0304;
        let mut out = [0u8; RAW_CHUNK_1_LEN];
        frame.write_chunk1(&mut out);
        assert_eq!(&out[0..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn chunk2_has_no_timestamp_prefix() {
        let mut frame = RawFrame::zeroed();
        frame.sensors[17].data[channel::AX] = -1;
        let mut out = [0u8; RAW_CHUNK_2_LEN];
        frame.write_chunk2(&mut out);
        assert_eq!(&out[0..2], &(-1i16).to_le_bytes());
    }
}
