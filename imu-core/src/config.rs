//! Compile-time constants for the sensor array.
//!
//! These mirror the `#define`s in the original firmware's `main.h` /
//! `imu.h` / `registers.h`: fixed sizes that a real deployment would tune
//! per-board, kept here as `pub const` rather than scattered through the
//! modules that use them.

/// Number of MEMS sensors sharing the bus.
pub const NUM_SENSORS: usize = 32;

/// Capacity of the acquisition ring (in raw frames).
pub const RING_CAPACITY: usize = 100;

/// Number of bytes in the register plane.
pub const REGISTER_COUNT: usize = 220;

/// Number of bytes in the SD data window.
pub const SD_DATA_COUNT: usize = 128;

/// Default tick sampling rate, in Hz. Must evenly divide the output divider.
pub const SAMPLE_RATE_HZ: u32 = 200;

/// 7-bit slave address the register plane answers to.
pub const SLAVE_ADDRESS: u8 = 0x30;

/// Attempts made identifying a sensor at boot before giving up on it.
pub const WHO_AM_I_ATTEMPTS: u8 = 10;

/// Accepted `WHO_AM_I` replies. Real silicon answers `0xAF` or `0xAE`
/// depending on die revision.
pub const VALID_WHO_AM_I: [u8; 2] = [0xAF, 0xAE];

/// Minimum legal value for the output divider; the register plane
/// substitutes [`OUTPUT_DIVIDER_DEFAULT`] for anything smaller.
pub const OUTPUT_DIVIDER_MIN: u8 = 2;

/// Default output divider (streaming / bulk-log-write publication rate).
pub const OUTPUT_DIVIDER_DEFAULT: u8 = 10;

/// Accelerometer conversion factor, g per LSB at +/-2g full scale.
pub const K_ACCEL: f32 = 6.1035e-5;

/// Gyroscope conversion factor, dps per LSB at +/-250dps full scale.
pub const K_GYRO: f32 = 7.633587e-3;

/// Degrees to radians.
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// Standard gravity, m/s^2.
pub const GRAVITY: f32 = 9.81;

/// Sample period, seconds.
pub fn sample_period() -> f32 {
    1.0 / (SAMPLE_RATE_HZ as f32)
}

/// Size, in bytes, of the staging buffer the log sink flushes to storage.
pub const LOG_BUFFER_SIZE: usize = 4096;

/// Raw-frame log chunk payload sizes, in bytes (COBS's 2-byte
/// code/terminator overhead is *not* included here; see
/// [`crate::cobs::ENCODED_OVERHEAD`]).
///
/// `RAW_CHUNK_1_LEN` = 4 (timestamp) + 17 sensors * 14 bytes/sensor = 242,
/// matching the original firmware's `RAW_PKT_SIZE_1` (244) minus its 2-byte
/// COBS overhead.
pub const RAW_CHUNK_1_LEN: usize = 242;
/// `RAW_CHUNK_2_LEN` = 15 sensors * 14 bytes/sensor = 210, matching
/// `RAW_PKT_SIZE_2` (212) minus COBS overhead.
pub const RAW_CHUNK_2_LEN: usize = 210;
/// Calibrated-record log chunk payload size. The original firmware's
/// `CAL_PKT_SIZE` (58) - 2 bytes of COBS overhead = 56, which is exactly
/// `dTheta(3) + dV(3) + accumV(3) + Q(4) + avgTemp(1)` as `f32`s — the
/// processed record's tick stamp, angular rate, and specific force are
/// *not* included in the logged chunk. Preserved verbatim.
pub const CAL_CHUNK_LEN: usize = 56;

/// Number of sensors carried in the first raw-frame log chunk.
pub const RAW_CHUNK_1_SENSORS: usize = 17;
/// Number of sensors carried in the second raw-frame log chunk.
pub const RAW_CHUNK_2_SENSORS: usize = NUM_SENSORS - RAW_CHUNK_1_SENSORS;

/// File name the log sink writes to / reads from on the storage root.
pub const LOG_FILE_NAME: &str = "data.txt";
