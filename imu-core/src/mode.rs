//! Mode controller: coordinates acquisition start/stop with the
//! streaming / bulk-log-write / bulk-log-read modes.
//!
//! Observed from the foreground main loop at a quiescent point (mirrors
//! `IMU_G3/main.c`'s `UpdateIMUSettings`, called once at boot and again
//! whenever the bus ISR raises the register-update flag while the bus is
//! idle).

use crate::bus::SensorBus;
use crate::hal::TickSource;
use crate::registers::RegisterPlane;
use crate::sensors::SensorArrayManager;

/// One of the three operating modes the DAQ-control mode field selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Streaming,
    BulkLogWrite,
    BulkLogRead,
}

impl Mode {
    /// Decodes the two-bit mode field. `0` (and any other value outside
    /// `1..=3`) has no defined mode; the caller leaves acquisition off
    /// and no file open rather than picking a default.
    pub fn decode(bits: u8) -> Option<Mode> {
        match bits {
            1 => Some(Mode::Streaming),
            2 => Some(Mode::BulkLogWrite),
            3 => Some(Mode::BulkLogRead),
            _ => None,
        }
    }
}

/// What the foreground should do to the log file as a result of a mode
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    None,
    Close,
    OpenWrite { truncate: bool },
    OpenRead,
}

/// Tracks which mode is currently active (if any) so the foreground can
/// tell what it's transitioning *from*, e.g. to close a log file that
/// was open under the previous mode.
pub struct ModeController {
    active: Option<Mode>,
}

impl ModeController {
    pub const fn new() -> Self {
        ModeController { active: None }
    }

    pub fn active_mode(&self) -> Option<Mode> {
        self.active
    }

    /// Applies one mode transition: disables the tick timer and powers
    /// down every present sensor, then switches on the decoded mode
    /// field. Returns what the caller must do to the log file; the
    /// caller performs the actual [`crate::framer::StorageSink`] call
    /// and is responsible for reporting failures; this function only
    /// decides intent.
    pub fn transition<T: TickSource, B: SensorBus>(
        &mut self,
        regs: &mut RegisterPlane,
        tick: &mut T,
        sensors: &mut SensorArrayManager,
        bus: &mut B,
    ) -> Result<FileAction, B::Error> {
        tick.stop();
        sensors.power_down_all(bus)?;

        let mode = Mode::decode(regs.daq_mode_bits());
        let enable_requested = regs.daq_acquisition_enabled();

        let action = match mode {
            Some(Mode::Streaming) => {
                let action = if self.active.is_some() && self.active != Some(Mode::Streaming) {
                    FileAction::Close
                } else {
                    FileAction::None
                };
                if enable_requested {
                    sensors.power_up_all(bus)?;
                    tick.start();
                }
                action
            }
            Some(Mode::BulkLogWrite) => {
                let action = FileAction::OpenWrite {
                    truncate: regs.daq_overwrite(),
                };
                if enable_requested {
                    sensors.power_up_all(bus)?;
                    tick.start();
                }
                action
            }
            Some(Mode::BulkLogRead) => {
                regs.set_daq_acquisition_enabled(false);
                regs.clear_sd_ready();
                regs.clear_sd_eof();
                FileAction::OpenRead
            }
            None => FileAction::None,
        };

        self.active = mode;
        regs.clear_register_updated();
        Ok(action)
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NUM_SENSORS;

    struct FakeTick {
        started: bool,
    }

    impl FakeTick {
        fn new() -> Self {
            FakeTick { started: false }
        }
    }

    impl TickSource for FakeTick {
        fn start(&mut self) {
            self.started = true;
        }
        fn stop(&mut self) {
            self.started = false;
        }
    }

    struct FakeBus;

    impl SensorBus for FakeBus {
        type Error = ();
        fn read_byte(&mut self, _sensor: usize, _reg: u8) -> Result<u8, ()> {
            Ok(0)
        }
        fn burst_begin(&mut self, _sensor: usize, _reg: u8) -> Result<(), ()> {
            Ok(())
        }
        fn burst_read_u16(&mut self) -> Result<u16, ()> {
            Ok(0)
        }
        fn burst_end(&mut self, _sensor: usize) -> Result<(), ()> {
            Ok(())
        }
        fn write_byte(&mut self, _sensor: usize, _reg: u8, _data: u8) -> Result<(), ()> {
            Ok(())
        }
    }

    fn regs_with_control(bits: u8) -> RegisterPlane {
        let mut regs = RegisterPlane::new();
        regs.init_writability();
        regs.bus_write(crate::registers::addr::DAQ_CONTROL, bits);
        regs
    }

    struct NoDelay;
    impl crate::hal::DelaySource for NoDelay {
        fn delay_ms(&mut self, _ms: u8) {}
    }

    fn booted_manager() -> SensorArrayManager {
        let mut mgr = SensorArrayManager::new();
        let mut bus = FakeBus;
        // No sensor replies with a valid WHO_AM_I against this fake, so
        // presence stays empty; that's fine, these tests only observe
        // the tick/file-action outcomes, not per-sensor power calls.
        let _ = mgr.boot(&mut bus, &mut NoDelay);
        let _ = NUM_SENSORS;
        mgr
    }

    #[test]
    fn streaming_with_enable_bit_starts_acquisition() {
        let mut regs = regs_with_control(0b0000_0011); // Streaming, enabled
        let mut tick = FakeTick::new();
        let mut mgr = booted_manager();
        let mut bus = FakeBus;
        let mut controller = ModeController::new();
        let action = controller
            .transition(&mut regs, &mut tick, &mut mgr, &mut bus)
            .unwrap();
        assert_eq!(action, FileAction::None);
        assert!(tick.started);
        assert_eq!(controller.active_mode(), Some(Mode::Streaming));
    }

    #[test]
    fn bulk_log_write_opens_file_and_resumes_acquisition() {
        let mut regs = regs_with_control(0b0000_0101); // BulkLogWrite, enabled
        let mut tick = FakeTick::new();
        let mut mgr = booted_manager();
        let mut bus = FakeBus;
        let mut controller = ModeController::new();
        let action = controller
            .transition(&mut regs, &mut tick, &mut mgr, &mut bus)
            .unwrap();
        assert_eq!(action, FileAction::OpenWrite { truncate: false });
        assert!(tick.started);
    }

    #[test]
    fn bulk_log_read_forces_acquisition_off_and_clears_status() {
        let mut regs = regs_with_control(0b0000_0111); // BulkLogRead, enabled requested
        regs.set_sd_ready();
        regs.raise_sd_eof();
        let mut tick = FakeTick::new();
        let mut mgr = booted_manager();
        let mut bus = FakeBus;
        let mut controller = ModeController::new();
        let action = controller
            .transition(&mut regs, &mut tick, &mut mgr, &mut bus)
            .unwrap();
        assert_eq!(action, FileAction::OpenRead);
        assert!(!tick.started);
        assert!(!regs.daq_acquisition_enabled());
        assert!(!regs.sd_status_ready());
    }

    #[test]
    fn returning_to_streaming_closes_the_log_file() {
        let mut regs = regs_with_control(0b0000_0101); // start in BulkLogWrite
        let mut tick = FakeTick::new();
        let mut mgr = booted_manager();
        let mut bus = FakeBus;
        let mut controller = ModeController::new();
        controller
            .transition(&mut regs, &mut tick, &mut mgr, &mut bus)
            .unwrap();

        regs.bus_write(crate::registers::addr::DAQ_CONTROL, 0b0000_0011); // Streaming
        let action = controller
            .transition(&mut regs, &mut tick, &mut mgr, &mut bus)
            .unwrap();
        assert_eq!(action, FileAction::Close);
    }

    #[test]
    fn invalid_mode_is_a_no_op() {
        let mut regs = regs_with_control(0b0000_0001); // mode bits = 0, no defined mode
        let mut tick = FakeTick::new();
        let mut mgr = booted_manager();
        let mut bus = FakeBus;
        let mut controller = ModeController::new();
        let action = controller
            .transition(&mut regs, &mut tick, &mut mgr, &mut bus)
            .unwrap();
        assert_eq!(action, FileAction::None);
        assert!(!tick.started);
        assert_eq!(controller.active_mode(), None);
    }
}
