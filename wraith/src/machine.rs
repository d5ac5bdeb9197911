use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;
use wisp::Benchmark;
use wisp::BenchmarkResult;
use wisp::BootOptions;
use wisp::Feature;
use wisp::Machine;
use wisp::MachineError;
use wisp::SaveStates;
use wisp::TickInfo;

use crate::config::Config;
use crate::config::Fault;

/// A stand-in for a Game Boy core. It does no emulation, but it consumes cycles like one, can be
/// told to fail, and supports every optional feature.
#[derive(Debug, Clone)]
pub struct SyntheticMachine {
    cycles_per_tick: u64,
    fault: Option<Fault>,
    booted: bool,
    state: MachineState,
}

/// Everything a save state captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub ticks: u64,
    pub cycles: u64,
    pub rom_size: usize,
}

impl SyntheticMachine {
    pub fn new(cycles_per_tick: u64) -> Self {
        Self {
            cycles_per_tick,
            fault: None,
            booted: false,
            state: MachineState::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            fault: config.fault.clone(),
            ..Self::new(config.cycles_per_tick)
        }
    }

    /// Fails the tick after `after` successful ones. The fault only fires once.
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    fn step(&mut self) -> u64 {
        self.state.ticks += 1;
        self.state.cycles = self.state.cycles.wrapping_add(self.cycles_per_tick);
        self.cycles_per_tick
    }
}

impl Machine for SyntheticMachine {
    fn boot(&mut self, options: &BootOptions) -> Result<(), MachineError> {
        let rom_size = match (&options.rom_path, options.load_rom) {
            (Some(path), true) => std::fs::read(path)
                .map_err(|err| MachineError::transient(format!("unable to load {path}: {err}")))?
                .len(),
            _ => self.state.rom_size,
        };
        self.state = MachineState {
            rom_size,
            ..MachineState::default()
        };
        self.booted = true;
        debug!("Booted with a {rom_size} byte ROM");
        Ok(())
    }

    fn tick(&mut self) -> Result<TickInfo, MachineError> {
        if !self.booted {
            return Err(MachineError::fatal("unreachable: ticked before boot"));
        }
        if self
            .fault
            .as_ref()
            .is_some_and(|fault| fault.after == self.state.ticks)
        {
            if let Some(Fault { message, .. }) = self.fault.take() {
                return Err(MachineError::from_message(message));
            }
        }
        let cycles = self.step();
        trace!("Tick {} ran {cycles} cycles", self.state.ticks);
        Ok(TickInfo { cycles })
    }

    fn hard_reset(&mut self) -> Result<(), MachineError> {
        self.booted = false;
        self.boot(&BootOptions::soft_reset())
    }

    fn features(&self) -> &[Feature] {
        &[
            Feature::Benchmark,
            Feature::LoopMode,
            Feature::DisplayFrequency,
            Feature::Framerate,
            Feature::Cyclerate,
            Feature::Animationrate,
            Feature::EmulationSpeed,
            Feature::SaveState,
        ]
    }

    fn save_states(&mut self) -> Option<&mut dyn SaveStates> {
        Some(self)
    }

    fn benchmark(&mut self) -> Option<&mut dyn Benchmark> {
        Some(self)
    }
}

impl SaveStates for SyntheticMachine {
    fn serialize_state(&mut self) -> Result<Vec<u8>, MachineError> {
        postcard::to_allocvec(&self.state)
            .map_err(|err| MachineError::transient(format!("unable to save the state: {err}")))
    }

    fn unserialize_state(&mut self, data: &[u8]) -> Result<(), MachineError> {
        self.state = postcard::from_bytes(data)
            .map_err(|err| MachineError::transient(format!("unable to load the state: {err}")))?;
        Ok(())
    }
}

impl Benchmark for SyntheticMachine {
    fn benchmark(&mut self, count: usize) -> BenchmarkResult {
        let start = Instant::now();
        let cycles = (0..count).map(|_| self.step()).sum::<u64>();
        let delta = start.elapsed().as_secs_f64();
        let frequency_mhz = if delta > 0.0 {
            cycles as f64 / delta / 1_000_000.0
        } else {
            0.0
        };
        BenchmarkResult {
            delta,
            count,
            cycles,
            frequency_mhz,
        }
    }
}

#[cfg(test)]
mod tests {
    use wisp::BootOptions;
    use wisp::FailureKind;
    use wisp::Feature;
    use wisp::Machine;
    use wisp::SaveStates;
    use wisp::has_feature;

    use super::MachineState;
    use super::SyntheticMachine;
    use crate::config::Fault;

    fn booted() -> SyntheticMachine {
        let mut machine = SyntheticMachine::new(100);
        machine.boot(&BootOptions::default()).unwrap();
        machine
    }

    #[test]
    fn ticks_consume_cycles() {
        let mut machine = booted();
        for _ in 0..3 {
            assert_eq!(machine.tick().unwrap().cycles, 100);
        }
        assert_eq!(
            *machine.state(),
            MachineState {
                ticks: 3,
                cycles: 300,
                rom_size: 0
            }
        );
    }

    #[test]
    fn unbooted_tick_is_fatal() {
        let mut machine = SyntheticMachine::new(100);
        let err = machine.tick().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Fatal);
    }

    #[test]
    fn fault_fires_once() {
        let mut machine = booted().with_fault(Fault {
            after: 2,
            message: "Recursive use of an object".to_owned(),
        });
        machine.tick().unwrap();
        machine.tick().unwrap();
        let err = machine.tick().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.message(), "Recursive use of an object");
        machine.tick().unwrap();
    }

    #[test]
    fn boot_reads_rom() {
        let path = std::env::temp_dir().join(format!("wraith-rom-{}.gb", std::process::id()));
        std::fs::write(&path, [0u8; 512]).unwrap();
        let mut machine = SyntheticMachine::new(100);
        let res = machine.boot(&BootOptions::with_rom(Some(path.display().to_string())));
        std::fs::remove_file(&path).unwrap();
        res.unwrap();
        machine.tick().unwrap();
        assert_eq!(machine.state().rom_size, 512);

        // A soft reset keeps the cartridge
        machine.boot(&BootOptions::soft_reset()).unwrap();
        assert_eq!(machine.state().rom_size, 512);
        assert_eq!(machine.state().ticks, 0);
    }

    #[test]
    fn missing_rom_is_transient() {
        let mut machine = SyntheticMachine::new(100);
        let err = machine
            .boot(&BootOptions::with_rom(Some("/nonexistent/rom.gb".to_owned())))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(!machine.is_booted());
    }

    #[test]
    fn state_survives_a_reboot() {
        let mut machine = booted();
        for _ in 0..5 {
            machine.tick().unwrap();
        }
        let data = machine.serialize_state().unwrap();
        machine.hard_reset().unwrap();
        assert_eq!(machine.state().ticks, 0);
        machine.unserialize_state(&data).unwrap();
        assert_eq!(machine.state().ticks, 5);
        assert_eq!(machine.state().cycles, 500);
        assert!(machine.unserialize_state(&[]).is_err());
    }

    #[test]
    fn benchmark_runs_unpaced() {
        let mut machine = booted();
        let bench = Machine::benchmark(&mut machine).unwrap();
        let result = bench.benchmark(1_000);
        assert_eq!(result.count, 1_000);
        assert_eq!(result.cycles, 100_000);
        assert!(has_feature(&machine, Feature::Benchmark));
        assert!(has_feature(&machine, Feature::SaveState));
    }
}
