//! Drives [`imu_core::statemachine::BusEvent`] from a UART link instead of
//! a dedicated two-wire slave peripheral.
//!
//! This board's HAL doesn't expose I2C slave mode, so the host-facing
//! register bus is carried over UART2 using a small framing protocol
//! inspired by `pwm-control`'s line parser: a handful of control bytes
//! stand in for the start condition, stop condition, and the
//! direction-tagged data bytes a real two-wire slave peripheral would
//! report from its interrupt handler.
//!
//! ```text
//! 0x02        -> BusEvent::Start
//! 0x03        -> BusEvent::Stop
//! 0x10 <byte> -> BusEvent::DataWrite(byte)
//! 0x11        -> BusEvent::DataRead (reply byte written back immediately)
//! ```

use imu_core::statemachine::{BusEvent, BusOutcome};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const WRITE_TAG: u8 = 0x10;
const READ_TAG: u8 = 0x11;

enum State {
    Idle,
    AwaitingWriteByte,
}

/// Byte-at-a-time framer. Feed it bytes as they arrive off the UART; it
/// calls back into the core context with decoded events and, for read
/// requests, the byte to shift back out.
pub struct HostLink {
    state: State,
}

impl HostLink {
    pub const fn new() -> Self {
        HostLink {
            state: State::Idle,
        }
    }

    /// Consumes one received byte, dispatching at most one [`BusEvent`]
    /// to `on_event`. Returns the reply byte for a `DataRead` request.
    pub fn feed(&mut self, byte: u8, mut on_event: impl FnMut(BusEvent) -> BusOutcome) -> Option<u8> {
        match self.state {
            State::AwaitingWriteByte => {
                self.state = State::Idle;
                on_event(BusEvent::DataWrite(byte));
                None
            }
            State::Idle => match byte {
                STX => {
                    on_event(BusEvent::Start);
                    None
                }
                ETX => {
                    on_event(BusEvent::Stop);
                    None
                }
                WRITE_TAG => {
                    self.state = State::AwaitingWriteByte;
                    None
                }
                READ_TAG => match on_event(BusEvent::DataRead) {
                    BusOutcome::Byte(b) => Some(b),
                    BusOutcome::None => Some(0xFF),
                },
                _ => None,
            },
        }
    }
}
