use std::future::Future;

use crate::loop_mode::LoopMode;

/// The environment a scheduler runs in. A host supplies the two scheduling primitives (a timed
/// wait and, optionally, a display refresh) and a way to feed control requests into the loop.
///
/// Only one scheduler loop drives a host at a time, and the loop awaits the host's futures one at
/// a time, so implementations do not need to be re-entrant.
pub trait Host {
    /// Whether [`Host::next_refresh`] is backed by a real refresh source.
    fn has_display_refresh(&self) -> bool;

    /// Waits (at least) the given number of milliseconds. Waking up late is fine.
    fn sleep(&mut self, ms: f64) -> impl Future<Output = ()>;

    /// Waits for the next display refresh and returns its timestamp, in the scheduler clock's
    /// units. Only called when [`Host::has_display_refresh`] is true.
    fn next_refresh(&mut self) -> impl Future<Output = f64>;

    /// Returns the next pending control request, if any. Called at every loop-iteration boundary
    /// until it returns `None`.
    fn poll_control(&mut self) -> Option<Control>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::IsVariant)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Requests from outside of the loop. They take effect at the next loop-iteration boundary, never
/// in the middle of a tick cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Pause,
    Resume,
    ToggleRunning,
    Reset,
    HardReset,
    SetLoopMode(LoopMode),
    SetLogicFrequency(f64),
    SetVisualFrequency(f64),
    Visibility(Visibility),
    /// Ends the session. The loop returns once it reaches the next boundary.
    Stop,
}
