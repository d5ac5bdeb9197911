use crate::loop_mode::LoopMode;
use crate::machine::Feature;
use crate::machine::MachineError;

/// Failures that escape the scheduler. Tick failures never show up here; they are handled inside
/// the loop. What does escape is either fatal to the session or a rejected request.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SchedulerError {
    #[display("unable to boot the machine: {_0}")]
    Boot(MachineError),
    #[display("unable to rebuild the machine after an unrecoverable failure: {_0}")]
    HardReset(MachineError),
    #[display("unsupported loop mode: {_0}")]
    UnsupportedLoopMode(#[error(not(source))] LoopMode),
    #[display("invalid {name} frequency: {value} Hz")]
    InvalidFrequency { name: &'static str, value: f64 },
    #[display("the machine does not support {_0}")]
    Unsupported(#[error(not(source))] Feature),
    #[display("unable to transfer the machine state: {_0}")]
    State(MachineError),
    #[display("the scheduler has not been started")]
    NotStarted,
}
