//! Crate-level error type.
//!
//! Mirrors the shape of `invensense_mpu::Error<P>`: generic over the bus
//! peripheral's own error type so callers don't have to unify unrelated
//! HAL errors into one enum variant.

use core::fmt::Debug;

/// Errors that can surface from the acquisition, calibration, and register
/// planes.
#[derive(Debug)]
pub enum Error<B> {
    /// The addressed sensor index is outside `[0, NUM_SENSORS)`, or is
    /// absent from the presence bitmap.
    SensorAbsent(usize),
    /// The underlying bus peripheral returned an error.
    BusFault(B),
    /// A register write addressed a byte outside `[0, REGISTER_COUNT)`.
    RegisterOutOfRange,
    /// The storage sink reported a failure.
    StorageFault,
}

impl<B> From<B> for Error<B> {
    fn from(err: B) -> Self {
        Error::BusFault(err)
    }
}
