use std::path::PathBuf;

use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::channel;
use tokio::task::JoinHandle;
use tracing::Span;
use tracing::info;
use tracing::info_span;
use tracing::warn;
use wisp::Control;
use wisp::Host;
use wisp::LoopMode;
use wisp::Rates;
use wisp::Scheduler;
use wisp::SchedulerBuilder;
use wisp::SchedulerError;
use wisp::StartOptions;
use wisp::SystemClock;
use wisp::Visibility;

use crate::config::Config;
use crate::config::ConfigError;
use crate::host::TokioHost;
use crate::machine::SyntheticMachine;
use crate::report;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum CoreError {
    #[display("{_0}")]
    Config(ConfigError),
    #[display("{_0}")]
    Scheduler(SchedulerError),
    #[display("unable to access the save state: {_0}")]
    Io(std::io::Error),
    #[display("the emulator core has shut down")]
    #[from(skip)]
    Closed,
    #[display("the emulator core task failed: {_0}")]
    Join(tokio::task::JoinError),
}

/// How a session went.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// The rates of the last completed window.
    pub rates: Rates,
    pub emulation_speed: f64,
    pub ticks: u64,
}

pub struct EmuHandle {
    send: Sender<Control>,
    core: JoinHandle<Result<Summary, CoreError>>,
}

impl EmuHandle {
    /// This constructs the emulator core and launches it into a separate task, returning the
    /// handle in order to interface with it. Must be called from within a tokio runtime.
    pub fn launch(config: Config) -> Result<Self, CoreError> {
        let (send, recv) = channel(100);
        let core = EmuCore::new(config, recv)?;
        let core = tokio::task::spawn(core.run());
        Ok(Self { send, core })
    }

    pub async fn send(&self, control: Control) -> Result<(), CoreError> {
        self.send.send(control).await.map_err(|_| CoreError::Closed)
    }

    pub async fn pause(&self) -> Result<(), CoreError> {
        self.send(Control::Pause).await
    }

    pub async fn resume(&self) -> Result<(), CoreError> {
        self.send(Control::Resume).await
    }

    pub async fn toggle_running(&self) -> Result<(), CoreError> {
        self.send(Control::ToggleRunning).await
    }

    pub async fn reset(&self) -> Result<(), CoreError> {
        self.send(Control::Reset).await
    }

    pub async fn hard_reset(&self) -> Result<(), CoreError> {
        self.send(Control::HardReset).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<(), CoreError> {
        self.send(Control::SetLoopMode(mode)).await
    }

    pub async fn set_logic_frequency(&self, hz: f64) -> Result<(), CoreError> {
        self.send(Control::SetLogicFrequency(hz)).await
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), CoreError> {
        self.send(Control::Visibility(visibility)).await
    }

    pub async fn stop(&self) -> Result<(), CoreError> {
        self.send(Control::Stop).await
    }

    /// Resolves once the core has shut down, for whatever reason.
    pub async fn closed(&self) {
        self.send.closed().await
    }

    /// Waits for the core to finish its session. This does not stop the session; see
    /// [`EmuHandle::stop`].
    pub async fn join(self) -> Result<Summary, CoreError> {
        let Self { send: _send, core } = self;
        core.await?
    }
}

/// This is the core of the emulator. It owns the scheduler and is interfaced with via the
/// `EmuHandle`. It is intended that the core is ran in a separate task from the rest of the app.
struct EmuCore {
    scheduler: Scheduler<SyntheticMachine>,
    host: TokioHost,
    options: StartOptions,
    state_path: Option<PathBuf>,
    span: Span,
}

impl EmuCore {
    fn new(config: Config, recv: Receiver<Control>) -> Result<Self, CoreError> {
        config.validate()?;
        let span = info_span!("core");
        let clock = SystemClock::new();
        let mut scheduler = SchedulerBuilder::new(SyntheticMachine::from_config(&config))
            .clock(clock)
            .logic_frequency(config.logic_frequency)
            .visual_frequency(config.visual_frequency)
            .idle_frequency(config.idle_frequency)
            .span(span.clone())
            .build()?;
        report::bind(
            scheduler.events_mut(),
            span.clone(),
            config.logic_frequency,
        );
        Ok(Self {
            scheduler,
            host: TokioHost::new(clock, config.refresh_rate, recv, span.clone()),
            options: config.start_options(),
            state_path: config.state_path,
            span,
        })
    }

    async fn run(self) -> Result<Summary, CoreError> {
        let Self {
            mut scheduler,
            mut host,
            options,
            state_path,
            span,
        } = self;
        scheduler.prepare(&options, host.has_display_refresh())?;

        if let Some(path) = state_path.as_deref().filter(|p| p.exists()) {
            let data = tokio::fs::read(path).await?;
            match scheduler.load_state(&data) {
                Ok(()) => info!(parent: &span, "Restored state from {}", path.display()),
                Err(err) => warn!(parent: &span, "Ignoring the saved state: {err}"),
            }
        }

        scheduler.run(&mut host).await?;

        if let Some(path) = state_path.as_deref() {
            tokio::fs::write(path, scheduler.save_state()?).await?;
            info!(parent: &span, "Saved state to {}", path.display());
        }

        Ok(Summary {
            rates: scheduler.rates(),
            emulation_speed: scheduler.emulation_speed(),
            ticks: scheduler.machine().state().ticks,
        })
    }
}
