//! Sensor bus adapter contract.
//!
//! `SensorBus` generalizes the per-board SPI wiring the same way
//! `invensense_mpu::Transport` generalizes the MPU9250's register access
//! across I2C and SPI: the concrete peripheral (clock, pin mux, chip-select
//! GPIOs) is an external collaborator injected by the firmware binary, not
//! something this crate knows how to configure.
//!
//! The adapter is not reentrant: every implementation is used either from
//! init (foreground, before interrupts are enabled) or from the acquisition
//! ISR, never both concurrently, by construction.

/// Burst/register access to one of `N` sensors sharing a bus, selected by
/// index.
pub trait SensorBus {
    /// The peripheral's own error type.
    type Error;

    /// Reads a single register from `sensor`: asserts chip select, shifts
    /// out `reg | 0x80` followed by a dummy byte, returns the second
    /// received byte, deasserts chip select.
    fn read_byte(&mut self, sensor: usize, reg: u8) -> Result<u8, Self::Error>;

    /// Begins a burst read at `reg` on `sensor`. Asserts chip select,
    /// shifts out `reg | 0x80`, discards the received byte. Leaves chip
    /// select asserted until [`SensorBus::burst_end`] is called.
    fn burst_begin(&mut self, sensor: usize, reg: u8) -> Result<(), Self::Error>;

    /// Shifts two dummy bytes and returns `(hi << 8) | lo`. Must only be
    /// called while a burst is active (between `burst_begin` and
    /// `burst_end`).
    fn burst_read_u16(&mut self) -> Result<u16, Self::Error>;

    /// Ends the active burst on `sensor`, deasserting chip select.
    fn burst_end(&mut self, sensor: usize) -> Result<(), Self::Error>;

    /// Writes a single register: asserts chip select, shifts out `reg`
    /// then `data`, deasserts chip select.
    fn write_byte(&mut self, sensor: usize, reg: u8, data: u8) -> Result<(), Self::Error>;

    /// Reads `count` consecutive 16-bit words starting at `reg` on
    /// `sensor`, writing them into `out`. Default implementation composes
    /// the four primitives above; a peripheral capable of a single DMA
    /// burst may override it.
    fn burst_read(&mut self, sensor: usize, reg: u8, out: &mut [u16]) -> Result<(), Self::Error> {
        self.burst_begin(sensor, reg)?;
        for slot in out.iter_mut() {
            *slot = self.burst_read_u16()?;
        }
        self.burst_end(sensor)
    }
}
