//! The runner's configuration. Everything can be set from a TOML file; anything left out of the
//! file takes its default.

use std::path::Path;
use std::path::PathBuf;
use std::sync::LazyLock;

use serde::Deserialize;
use serde::Serialize;
use wisp::IDLE_HZ;
use wisp::LoopMode;
use wisp::StartOptions;
use wisp::VISUAL_HZ;

/// `~/.wraith.toml`, if there is a home directory to speak of.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let mut path = homedir::my_home().ok().flatten()?;
    path.push(".wraith.toml");
    Some(path)
});

/// The clock speed of a DMG, in Hz.
pub const DMG_FREQUENCY: f64 = 4_194_304.0;

/// The cycles one tick consumes to keep a DMG at full speed when paced at 60 Hz. A real DMG frame
/// is 70_224 cycles, but the hardware refreshes at about 59.73 Hz rather than 60.
pub const DMG_FRAME_CYCLES: u64 = 69_905;

/// The fastest display refresh the host will simulate, in Hz.
pub const MAX_REFRESH_RATE: f64 = 1000.0;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ConfigError {
    #[display("unable to access the config file: {_0}")]
    Io(std::io::Error),
    #[display("unable to parse the config file: {_0}")]
    Parse(toml::de::Error),
    #[display("unable to write the config file: {_0}")]
    Serialize(toml::ser::Error),
    #[display("invalid {name}: {value}")]
    #[from(skip)]
    Invalid { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `auto`, `settimeout`, or `animation`.
    pub loop_mode: LoopMode,
    pub logic_frequency: f64,
    pub visual_frequency: f64,
    pub idle_frequency: f64,
    /// The rate of the simulated display refresh, in Hz. Zero means the host has none.
    pub refresh_rate: f64,
    pub cycles_per_tick: u64,
    pub rom_path: Option<PathBuf>,
    /// Where the machine state is restored from at boot and saved to on exit.
    pub state_path: Option<PathBuf>,
    /// The default log filter. `RUST_LOG` takes precedence.
    pub log_level: String,
    pub fault: Option<Fault>,
}

/// A failure to inject into the machine, for exercising error recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// The number of successful ticks before the failure.
    pub after: u64,
    /// Messages starting with "unreachable" or "recursive use of" are unrecoverable.
    pub message: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loop_mode: LoopMode::Auto,
            logic_frequency: DMG_FREQUENCY,
            visual_frequency: VISUAL_HZ,
            idle_frequency: IDLE_HZ,
            refresh_rate: VISUAL_HZ,
            cycles_per_tick: DMG_FRAME_CYCLES,
            rom_path: None,
            state_path: None,
            log_level: "info".to_owned(),
            fault: None,
        }
    }
}

impl Config {
    /// Loads the config from the default location. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match CONFIG_PATH.as_deref() {
            Some(path) => Self::read(path),
            None => Ok(Self::default()),
        }
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(data) => Self::parse(&data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values the scheduler does not check for itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=MAX_REFRESH_RATE).contains(&self.refresh_rate) {
            return Err(ConfigError::Invalid {
                name: "refresh_rate",
                value: self.refresh_rate,
            });
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn start_options(&self) -> StartOptions {
        StartOptions {
            rom_url: self.rom_path.as_ref().map(|p| p.display().to_string()),
            loop_mode: self.loop_mode,
        }
    }
}
