//! Wisp is the core crate of the wraith project. It contains the game-loop scheduler that drives an
//! emulated machine: it decides when the machine ticks, keeps the tick cadence on schedule, measures
//! how fast the emulation actually runs, and recovers the machine when it fails. The machine itself
//! is not part of this crate. It is consumed through the [`Machine`] trait, and the environment the
//! loop runs in (timers, display refresh) is consumed through the [`Host`] trait.
//!
//! The crate is executor agnostic. The loops are `async` but never reach for a runtime; whatever
//! implements [`Host`] decides how waiting is done.
//!
//! # Notes
//! All timestamps are milliseconds from an arbitrary monotonic origin, expressed as `f64`.

mod clock;
mod error;
mod events;
mod host;
mod loop_mode;
mod machine;
mod rates;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SchedulerError;
pub use events::{Event, EventBus, Listener, Notice, Topic, listener};
pub use host::{Control, Host, Visibility};
pub use loop_mode::LoopMode;
pub use machine::{
    Benchmark, BenchmarkResult, BootOptions, FailureKind, Feature, Machine, MachineError,
    SaveStates, TickInfo, has_feature,
};
pub use rates::{RateCounter, RateMeter, Rates};
pub use scheduler::{
    IDLE_HZ, LOGIC_HZ, MAX_TICKS_PER_REFRESH, MESSAGE_TIMEOUT, SAMPLE_WINDOW_SECONDS, Scheduler,
    STATE_LOADED_TEXT, SchedulerBuilder, StartOptions, State, UNRECOVERABLE_TEXT, VISUAL_HZ,
};
