//! External collaborator traits that don't have a natural home in
//! [`crate::bus`] or [`crate::framer`]: the tick source driving
//! acquisition, the boot-time delay, and the optional debug text sink.
//! Concrete implementations live in the firmware binary, wrapping
//! whatever peripheral timer/UART the board exposes.

/// Starts and stops the periodic acquisition timer. The timer's period
/// is a board/clock-configuration concern outside this crate; once
/// started it is expected to fire [`crate::context::CoreContext::on_tick`]
/// from an interrupt context at `SAMPLE_RATE_HZ`.
pub trait TickSource {
    fn start(&mut self);
    fn stop(&mut self);
}

/// A free-running millisecond delay, used only by
/// [`crate::sensors::SensorArrayManager::boot`] between identity-handshake
/// attempts.
pub trait DelaySource {
    fn delay_ms(&mut self, ms: u8);
}

/// Optional diagnostic text sink used only during init; its content is
/// not part of any external contract.
pub trait DebugSink {
    fn write_str(&mut self, s: &str);
}

/// A [`DebugSink`] that discards everything, for boards (or tests) with
/// no debug console wired up.
pub struct NullDebugSink;

impl DebugSink for NullDebugSink {
    fn write_str(&mut self, _s: &str) {}
}
