use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wisp::Benchmark;
use wisp::BootOptions;
use wisp::LoopMode;
use wisp::Machine;
use wraith::Config;
use wraith::EmuHandle;
use wraith::SyntheticMachine;

#[derive(Debug, Parser)]
struct Args {
    /// The config file to use instead of ~/.wraith.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// One of auto, settimeout, or animation.
    #[arg(short, long)]
    loop_mode: Option<String>,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(short, long)]
    seconds: Option<f64>,
    /// The ROM to boot.
    #[arg(short, long)]
    rom: Option<PathBuf>,
    /// Time this many unpaced ticks, then exit.
    #[arg(short, long)]
    benchmark: Option<usize>,
}

impl Args {
    fn config(&self) -> Result<Config, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => Config::read(path)?,
            None => Config::load()?,
        };
        if let Some(mode) = &self.loop_mode {
            config.loop_mode = LoopMode::from_token(mode);
        }
        if let Some(rom) = &self.rom {
            config.rom_path = Some(rom.clone());
        }
        Ok(config)
    }
}

/// How long to run for. A run time too long for the timer is the same as no limit at all.
fn run_time(seconds: Option<f64>) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds?.max(0.0)).ok()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = args.config()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(count) = args.benchmark {
        let mut machine = SyntheticMachine::from_config(&config);
        machine.boot(&BootOptions::with_rom(config.start_options().rom_url))?;
        let result = Benchmark::benchmark(&mut machine, count);
        info!(
            "{} ticks ({} cycles) in {:.3}s: {:.2} MHz",
            result.count, result.cycles, result.delta, result.frequency_mhz
        );
        return Ok(());
    }

    let handle = EmuHandle::launch(config)?;
    let deadline = async {
        match run_time(args.seconds) {
            Some(time) => tokio::time::sleep(time).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => info!("Interrupted"),
            Err(err) => warn!("Unable to listen for Ctrl-C: {err}"),
        },
        _ = deadline => info!("Time is up"),
        _ = handle.closed() => {}
    }
    // The core may have already shut down on its own; join reports why
    let _ = handle.stop().await;

    let summary = handle.join().await?;
    info!(
        ticks = summary.ticks,
        fps = summary.rates.framerate,
        refreshes = summary.rates.animationrate,
        "Finished at {:.1}% speed",
        summary.emulation_speed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;
    use wisp::LoopMode;

    use super::Args;
    use super::run_time;

    #[test]
    fn flags_override_config() -> Result<(), Box<dyn Error>> {
        let path = std::env::temp_dir().join(format!("wraith-args-{}.toml", std::process::id()));
        std::fs::write(&path, "loop_mode = \"animation\"\nvisual_frequency = 50.0\n")?;
        let config_path = path.display().to_string();
        let args = Args::try_parse_from([
            "wraith",
            "--config",
            config_path.as_str(),
            "--loop-mode",
            "settimeout",
            "--rom",
            "tetris.gb",
        ])?;
        let config = args.config();
        std::fs::remove_file(&path)?;
        let config = config?;
        assert_eq!(config.loop_mode, LoopMode::FixedDelay);
        assert_eq!(config.visual_frequency, 50.0);
        assert_eq!(config.rom_path, Some(PathBuf::from("tetris.gb")));
        Ok(())
    }

    #[test]
    fn run_time_limits() {
        assert_eq!(run_time(None), None);
        assert_eq!(run_time(Some(1.5)), Some(Duration::from_millis(1500)));
        assert_eq!(run_time(Some(-3.0)), Some(Duration::ZERO));
        assert_eq!(run_time(Some(f64::INFINITY)), None);
        assert_eq!(run_time(Some(1e300)), None);
        let args = Args::try_parse_from(["wraith", "--seconds", "inf"]).unwrap();
        assert_eq!(run_time(args.seconds), None);
    }
}
