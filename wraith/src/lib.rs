//! Wraith is a headless runner for the wisp scheduler. It drives a synthetic machine on the tokio
//! runtime, which makes it handy for watching the scheduler's pacing and recovery from a terminal.

pub mod config;
pub mod emu_core;
pub mod host;
pub mod machine;
pub mod report;

pub use config::{Config, ConfigError};
pub use emu_core::{CoreError, EmuHandle, Summary};
pub use host::TokioHost;
pub use machine::SyntheticMachine;
