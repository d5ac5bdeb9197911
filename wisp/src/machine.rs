//! The capability interface of the emulated machine. The scheduler only ever ticks and boots the
//! machine; everything else a machine can do is optional and discovered at runtime through the
//! extension probes on [`Machine`].

use serde::Deserialize;
use serde::Serialize;

/// Failure messages that signal the machine's runtime is corrupted beyond in-place recovery. Only
/// used for collaborators that can not report a [`FailureKind`] themselves.
const FATAL_PREFIXES: &[&str] = &["unreachable", "recursive use of"];

/// Options passed to [`Machine::boot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootOptions {
    /// Whether or not a (new) ROM should be loaded as part of the boot.
    pub load_rom: bool,
    /// Where the ROM lives. `None` with `load_rom` set means the machine's default ROM.
    pub rom_path: Option<String>,
}

impl BootOptions {
    pub fn with_rom(rom_path: Option<String>) -> Self {
        Self {
            load_rom: true,
            rom_path,
        }
    }

    /// Reboots the machine with whatever ROM it already has.
    pub fn soft_reset() -> Self {
        Self::default()
    }
}

/// What a single tick of the machine did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickInfo {
    /// The number of emulated clock cycles the tick consumed.
    pub cycles: u64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::IsVariant,
)]
pub enum FailureKind {
    /// The machine's internal state is corrupted and it must be rebuilt.
    Fatal,
    /// The machine can keep going once the user decides to resume it.
    Transient,
}

/// A failure reported by the machine.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("{message}")]
pub struct MachineError {
    kind: FailureKind,
    message: String,
}

impl MachineError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Classifies a bare failure message. A message is fatal if it starts (ignoring case) with one
    /// of the markers a wasm-style runtime uses for traps and dangling borrows.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let normalized = message.to_lowercase();
        let kind = if FATAL_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
            FailureKind::Fatal
        } else {
            FailureKind::Transient
        };
        Self { kind, message }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

/// The optional features a machine may advertise. These condition what the presentation layer
/// offers, they never change how the scheduler drives the machine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, Serialize, Deserialize,
)]
pub enum Feature {
    Benchmark,
    LoopMode,
    DisplayFrequency,
    Framerate,
    Cyclerate,
    Animationrate,
    EmulationSpeed,
    SaveState,
}

/// The result of [`Benchmark::benchmark`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Wall time taken, in seconds.
    pub delta: f64,
    /// The number of ticks that were run.
    pub count: usize,
    /// The number of emulated cycles those ticks consumed.
    pub cycles: u64,
    pub frequency_mhz: f64,
}

/// Serialization of the complete machine state.
pub trait SaveStates {
    fn serialize_state(&mut self) -> Result<Vec<u8>, MachineError>;

    fn unserialize_state(&mut self, data: &[u8]) -> Result<(), MachineError>;
}

/// Runs the machine flat out, outside of the scheduler's pacing.
pub trait Benchmark {
    fn benchmark(&mut self, count: usize) -> BenchmarkResult;
}

/// The emulated machine, as seen by the scheduler.
///
/// Only the scheduler may call [`Machine::tick`]. Everything else (the presentation layer, a
/// debugger, etc) reads from the machine through [`crate::Scheduler::machine`].
pub trait Machine {
    /// Boots (or re-boots) the machine.
    fn boot(&mut self, options: &BootOptions) -> Result<(), MachineError>;

    /// Runs one discrete unit of emulation.
    fn tick(&mut self) -> Result<TickInfo, MachineError>;

    /// Rebuilds the machine after a fatal failure. Machines that keep runtime state outside of what
    /// a boot resets should override this.
    fn hard_reset(&mut self) -> Result<(), MachineError> {
        self.boot(&BootOptions::soft_reset())
    }

    fn features(&self) -> &[Feature] {
        &[]
    }

    fn save_states(&mut self) -> Option<&mut dyn SaveStates> {
        None
    }

    fn benchmark(&mut self) -> Option<&mut dyn Benchmark> {
        None
    }
}

pub fn has_feature<M: Machine + ?Sized>(machine: &M, feature: Feature) -> bool {
    machine.features().contains(&feature)
}
