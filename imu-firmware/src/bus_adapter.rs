//! Wires a single SPI peripheral, shared by all 32 sensors, to
//! [`imu_core::bus::SensorBus`].
//!
//! Thirty-two individual chip-select GPIOs don't fit on a Teensy 4's
//! header, so the board selects one of the 32 sensors at a time through
//! a pair of cascaded 3-to-8 decoders (74HC238) driven by five GPIO
//! address lines, mirroring how `esc-imxrt1062` multiplexes PWM outputs
//! across a small, fixed GPIO budget.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

use imu_core::bus::SensorBus;

/// Five GPIO lines driving the cascaded 3-to-8 decoders that select one
/// of 32 sensors' chip-select line. Bit 4 enables the second decoder
/// bank (sensors 16-31); bits 0-3 select within whichever bank is
/// enabled (unused bit ignored by the unselected bank).
pub trait AddressLines {
    type Error;
    fn set_address(&mut self, sensor: usize) -> Result<(), Self::Error>;
    fn disable(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub enum Error<S, A> {
    Spi(S),
    Address(A),
}

/// `SensorBus` over one shared SPI peripheral and a decoder-driven
/// chip-select address bus.
pub struct SpiSensorBus<SPI, ADDR> {
    spi: SPI,
    addr: ADDR,
}

impl<SPI, ADDR> SpiSensorBus<SPI, ADDR> {
    pub fn new(spi: SPI, addr: ADDR) -> Self {
        SpiSensorBus { spi, addr }
    }
}

impl<SPI, ADDR> SensorBus for SpiSensorBus<SPI, ADDR>
where
    SPI: Transfer<u8>,
    ADDR: AddressLines,
{
    type Error = Error<SPI::Error, ADDR::Error>;

    fn read_byte(&mut self, sensor: usize, reg: u8) -> Result<u8, Self::Error> {
        self.addr.set_address(sensor).map_err(Error::Address)?;
        let mut buf = [reg | 0x80, 0];
        self.spi.transfer(&mut buf).map_err(Error::Spi)?;
        self.addr.disable().map_err(Error::Address)?;
        Ok(buf[1])
    }

    fn burst_begin(&mut self, sensor: usize, reg: u8) -> Result<(), Self::Error> {
        self.addr.set_address(sensor).map_err(Error::Address)?;
        let mut buf = [reg | 0x80];
        self.spi.transfer(&mut buf).map_err(Error::Spi)?;
        Ok(())
    }

    fn burst_read_u16(&mut self) -> Result<u16, Self::Error> {
        let mut buf = [0u8, 0u8];
        self.spi.transfer(&mut buf).map_err(Error::Spi)?;
        Ok(((buf[0] as u16) << 8) | buf[1] as u16)
    }

    fn burst_end(&mut self, _sensor: usize) -> Result<(), Self::Error> {
        self.addr.disable().map_err(Error::Address)
    }

    fn write_byte(&mut self, sensor: usize, reg: u8, data: u8) -> Result<(), Self::Error> {
        self.addr.set_address(sensor).map_err(Error::Address)?;
        let mut buf = [reg, data];
        self.spi.transfer(&mut buf).map_err(Error::Spi)?;
        self.addr.disable().map_err(Error::Address)
    }
}

/// Five discrete GPIOs driving the decoder banks directly, for boards
/// without a dedicated address latch.
pub struct GpioAddressLines<P0, P1, P2, P3, EN> {
    pub a0: P0,
    pub a1: P1,
    pub a2: P2,
    pub bank_select: P3,
    pub enable: EN,
}

impl<P0, P1, P2, P3, EN, E> AddressLines for GpioAddressLines<P0, P1, P2, P3, EN>
where
    P0: OutputPin<Error = E>,
    P1: OutputPin<Error = E>,
    P2: OutputPin<Error = E>,
    P3: OutputPin<Error = E>,
    EN: OutputPin<Error = E>,
{
    type Error = E;

    fn set_address(&mut self, sensor: usize) -> Result<(), E> {
        let within_bank = sensor & 0x7;
        set_bit(&mut self.a0, within_bank & 0b001 != 0)?;
        set_bit(&mut self.a1, within_bank & 0b010 != 0)?;
        set_bit(&mut self.a2, within_bank & 0b100 != 0)?;
        set_bit(&mut self.bank_select, sensor & 0x10 != 0)?;
        self.enable.set_low()
    }

    fn disable(&mut self) -> Result<(), E> {
        self.enable.set_high()
    }
}

fn set_bit<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), P::Error> {
    if high {
        pin.set_high()
    } else {
        pin.set_low()
    }
}
