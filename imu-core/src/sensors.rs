//! Presence detection, boot sequencing, and power control for the sensor
//! array.

use crate::bus::SensorBus;
use crate::config::{NUM_SENSORS, VALID_WHO_AM_I, WHO_AM_I_ATTEMPTS};
use crate::hal::DelaySource;
use crate::orientation::Orientation;

/// Register addresses touched during boot and acquisition. These match
/// the original firmware's fixed configuration sequence; board-specific
/// registers beyond identity/power/range live behind [`SensorBus`], not
/// here.
pub mod reg {
    pub const WHO_AM_I: u8 = 0x75;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const USER_CTRL: u8 = 0x6A;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const LP_ACCEL_ODR: u8 = 0x1E;
    pub const ACCEL_CONFIG2: u8 = 0x1D;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
}

/// Sleep bit within `PWR_MGMT_1`.
const PWR_MGMT_1_SLEEP: u8 = 1 << 6;
/// Select the internal PLL as clock source.
const PWR_MGMT_1_CLKSEL_PLL: u8 = 0x01;
/// Disables the alternate (I2C) bus slave interface.
const USER_CTRL_I2C_IF_DIS: u8 = 1 << 4;
/// +/-2g full scale select for ACCEL_CONFIG.
const ACCEL_FS_2G: u8 = 0x00;
/// +/-250 dps full scale select, with the DLPF bypass bit cleared.
const GYRO_FS_250_DPS: u8 = 0x00;
/// Enables gyro low-power mode with 2x averaging.
const GYRO_LP_2X_AVG: u8 = 0x01;
/// Enables accelerometer low-power mode with DLPF bypassed.
const ACCEL_LP_DLPF_BYPASS: u8 = 1 << 3;

/// N-bit presence vector: bit i set means sensor i answered its identity
/// handshake and was configured successfully. Monotone non-increasing
/// after init: nothing ever sets a bit once cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceBitmap {
    bits: u32,
}

impl PresenceBitmap {
    pub const fn new() -> Self {
        PresenceBitmap { bits: 0 }
    }

    pub fn is_present(&self, i: usize) -> bool {
        debug_assert!(i < NUM_SENSORS);
        (self.bits & (1 << i)) != 0
    }

    pub(crate) fn set(&mut self, i: usize) {
        self.bits |= 1 << i;
    }

    pub fn clear(&mut self, i: usize) {
        self.bits &= !(1 << i);
    }

    pub fn as_u32(&self) -> u32 {
        self.bits
    }

    pub fn count(&self) -> u32 {
        self.bits.count_ones()
    }
}

/// Owns the presence bitmap and drives boot/power sequencing for every
/// sensor on the shared bus.
pub struct SensorArrayManager {
    presence: PresenceBitmap,
}

impl SensorArrayManager {
    pub const fn new() -> Self {
        SensorArrayManager {
            presence: PresenceBitmap::new(),
        }
    }

    pub fn presence(&self) -> PresenceBitmap {
        self.presence
    }

    /// Excludes sensor `i` from the pipeline outside the normal boot
    /// handshake, e.g. because its calibration block's closed-form
    /// inverse was degenerate. Equivalent to a failed `WHO_AM_I`.
    pub fn clear_presence(&mut self, i: usize) {
        self.presence.clear(i);
    }

    /// Runs the boot procedure for every sensor index: identity
    /// handshake with up to [`WHO_AM_I_ATTEMPTS`] retries, then (if
    /// present) the fixed configuration sequence. `delay` is used
    /// between handshake attempts.
    pub fn boot<B: SensorBus, D: DelaySource>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
    ) -> Result<(), B::Error> {
        for i in 0..NUM_SENSORS {
            let present = self.identify(bus, i, delay)?;
            if present {
                self.presence.set(i);
                self.configure(bus, i)?;
                log::info!("sensor {} identified and configured", i);
            } else {
                log::warn!("sensor {} failed identity handshake, marking absent", i);
            }
        }
        Ok(())
    }

    fn identify<B: SensorBus, D: DelaySource>(
        &mut self,
        bus: &mut B,
        i: usize,
        delay: &mut D,
    ) -> Result<bool, B::Error> {
        for _attempt in 0..WHO_AM_I_ATTEMPTS {
            let who = bus.read_byte(i, reg::WHO_AM_I)?;
            if VALID_WHO_AM_I.contains(&who) {
                return Ok(true);
            }
            delay.delay_ms(10);
        }
        Ok(false)
    }

    fn configure<B: SensorBus>(&mut self, bus: &mut B, i: usize) -> Result<(), B::Error> {
        bus.write_byte(i, reg::PWR_MGMT_1, PWR_MGMT_1_CLKSEL_PLL)?;
        bus.write_byte(i, reg::USER_CTRL, USER_CTRL_I2C_IF_DIS)?;
        bus.write_byte(i, reg::ACCEL_CONFIG, ACCEL_FS_2G)?;
        bus.write_byte(i, reg::GYRO_CONFIG, GYRO_FS_250_DPS)?;
        bus.write_byte(i, reg::LP_ACCEL_ODR, GYRO_LP_2X_AVG)?;
        bus.write_byte(i, reg::ACCEL_CONFIG2, ACCEL_LP_DLPF_BYPASS)?;
        Ok(())
    }

    /// Sets the sleep bit, leaving clock selection untouched.
    pub fn power_down<B: SensorBus>(&mut self, bus: &mut B, i: usize) -> Result<(), B::Error> {
        bus.write_byte(i, reg::PWR_MGMT_1, PWR_MGMT_1_CLKSEL_PLL | PWR_MGMT_1_SLEEP)
    }

    /// Clears the sleep bit, keeping the PLL clock selection.
    pub fn power_up<B: SensorBus>(&mut self, bus: &mut B, i: usize) -> Result<(), B::Error> {
        bus.write_byte(i, reg::PWR_MGMT_1, PWR_MGMT_1_CLKSEL_PLL)
    }

    /// Powers every present sensor down or up in index order.
    pub fn power_down_all<B: SensorBus>(&mut self, bus: &mut B) -> Result<(), B::Error> {
        for i in 0..NUM_SENSORS {
            if self.presence.is_present(i) {
                self.power_down(bus, i)?;
            }
        }
        Ok(())
    }

    pub fn power_up_all<B: SensorBus>(&mut self, bus: &mut B) -> Result<(), B::Error> {
        for i in 0..NUM_SENSORS {
            if self.presence.is_present(i) {
                self.power_up(bus, i)?;
            }
        }
        Ok(())
    }

    /// Orientation group for sensor `i`, exposed for the acquisition
    /// path.
    pub fn orientation(&self, i: usize) -> Orientation {
        Orientation::for_index(i)
    }
}

impl Default for SensorArrayManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::vec::Vec;

    struct FakeBus {
        who_am_i_sequence: Vec<Vec<u8>>,
        writes: RefCell<Vec<(usize, u8, u8)>>,
    }

    impl FakeBus {
        fn all_present() -> Self {
            FakeBus {
                who_am_i_sequence: (0..NUM_SENSORS).map(|_| vec![0xAF]).collect(),
                writes: RefCell::new(Vec::new()),
            }
        }

        fn with_absent(mut absent: Vec<usize>) -> Self {
            let mut seq: Vec<Vec<u8>> = (0..NUM_SENSORS)
                .map(|_| vec![0xAF])
                .collect();
            absent.sort_unstable();
            for i in absent {
                seq[i] = core::iter::repeat(0x00)
                    .take(WHO_AM_I_ATTEMPTS as usize)
                    .collect();
            }
            FakeBus {
                who_am_i_sequence: seq,
                writes: RefCell::new(Vec::new()),
            }
        }
    }

    impl SensorBus for FakeBus {
        type Error = ();

        fn read_byte(&mut self, sensor: usize, reg: u8) -> Result<u8, Self::Error> {
            assert_eq!(reg, reg::WHO_AM_I);
            let seq = &mut self.who_am_i_sequence[sensor];
            if seq.len() > 1 {
                Ok(seq.remove(0))
            } else {
                Ok(seq[0])
            }
        }

        fn burst_begin(&mut self, _sensor: usize, _reg: u8) -> Result<(), Self::Error> {
            Ok(())
        }

        fn burst_read_u16(&mut self) -> Result<u16, Self::Error> {
            Ok(0)
        }

        fn burst_end(&mut self, _sensor: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        fn write_byte(&mut self, sensor: usize, reg: u8, data: u8) -> Result<(), Self::Error> {
            self.writes.borrow_mut().push((sensor, reg, data));
            Ok(())
        }
    }

    pub(crate) struct NoDelay;

    impl DelaySource for NoDelay {
        fn delay_ms(&mut self, _ms: u8) {}
    }

    #[test]
    fn all_sensors_present_sets_every_bit() {
        let mut bus = FakeBus::all_present();
        let mut mgr = SensorArrayManager::new();
        mgr.boot(&mut bus, &mut NoDelay).unwrap();
        assert_eq!(mgr.presence().count(), NUM_SENSORS as u32);
    }

    #[test]
    fn absent_sensor_clears_only_its_bit() {
        let mut bus = FakeBus::with_absent(vec![5, 9]);
        let mut mgr = SensorArrayManager::new();
        mgr.boot(&mut bus, &mut NoDelay).unwrap();
        assert!(!mgr.presence().is_present(5));
        assert!(!mgr.presence().is_present(9));
        assert!(mgr.presence().is_present(0));
        assert_eq!(mgr.presence().count(), NUM_SENSORS as u32 - 2);
    }

    #[test]
    fn only_sensor_zero_present_matches_bitmap_0x1() {
        let mut bus = FakeBus::with_absent((1..NUM_SENSORS).collect());
        let mut mgr = SensorArrayManager::new();
        mgr.boot(&mut bus, &mut NoDelay).unwrap();
        assert_eq!(mgr.presence().as_u32(), 0x1);
    }
}
