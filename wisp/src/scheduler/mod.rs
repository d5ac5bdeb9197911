//! The game-loop scheduler. It owns the run/pause state of a session, runs tick cycles on the
//! machine, keeps the next tick deadline in line with wall time, samples the rate meter, and
//! recovers the machine when a tick fails.
//!
//! The two loop strategies live in [`driver`]. Everything here is synchronous; a tick cycle always
//! runs to completion before anything else (mode switches, pause requests) is considered.

use std::time::Duration;

use tracing::Span;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::trace;
use tracing::warn;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::error::SchedulerError;
use crate::events::Event;
use crate::events::EventBus;
use crate::events::Notice;
use crate::host::Control;
use crate::host::Visibility;
use crate::loop_mode::LoopMode;
use crate::machine::BenchmarkResult;
use crate::machine::BootOptions;
use crate::machine::Feature;
use crate::machine::Machine;
use crate::machine::MachineError;
use crate::machine::TickInfo;
use crate::rates::RateMeter;
use crate::rates::Rates;

mod driver;


/// The logic frequency used until a real one is configured. Concrete machines should always
/// override it.
pub const LOGIC_HZ: f64 = 1000.0;

/// The default pacing frequency of tick cycles, which is also the expected number of logical
/// frames per second.
pub const VISUAL_HZ: f64 = 60.0;

/// How often a paused fixed-delay loop wakes up to check whether it was resumed.
pub const IDLE_HZ: f64 = 10.0;

/// The length, in seconds, of the window rates are computed over.
pub const SAMPLE_WINDOW_SECONDS: f64 = 3.0;

/// The most tick cycles a single display refresh may run. This lets a 30 Hz refresh drive a
/// machine paced at 90 Hz, but no faster.
pub const MAX_TICKS_PER_REFRESH: u32 = 3;

/// How long failure notices should stay on screen.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_millis(5000);

/// The notice shown when the machine has to be rebuilt.
pub const UNRECOVERABLE_TEXT: &str = "Unrecoverable error, restarting emulator";

/// The notice shown after a state is loaded.
pub const STATE_LOADED_TEXT: &str = "Loaded the saved state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::IsVariant)]
pub enum State {
    Stopped,
    Booting,
    Running,
    Paused,
}

/// Where the session is in its lifetime. Running vs paused is tracked separately since pausing
/// does not stop the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Booting,
    Active,
}

/// The strategy a tick cycle is being run under, which decides how the deadline advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    FixedDelay,
    DisplayRefresh,
}

/// What [`Scheduler::start`] needs to know about the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartOptions {
    #[serde(default)]
    pub rom_url: Option<String>,
    #[serde(default)]
    pub loop_mode: LoopMode,
}

pub struct SchedulerBuilder<M, C = SystemClock> {
    machine: M,
    clock: C,
    logic_frequency: f64,
    visual_frequency: f64,
    idle_frequency: f64,
    sample_window: f64,
    max_ticks_per_refresh: u32,
    span: Option<Span>,
}

impl<M: Machine> SchedulerBuilder<M> {
    pub fn new(machine: M) -> Self {
        Self {
            machine,
            clock: SystemClock::new(),
            logic_frequency: LOGIC_HZ,
            visual_frequency: VISUAL_HZ,
            idle_frequency: IDLE_HZ,
            sample_window: SAMPLE_WINDOW_SECONDS,
            max_ticks_per_refresh: MAX_TICKS_PER_REFRESH,
            span: None,
        }
    }
}

impl<M: Machine, C: Clock> SchedulerBuilder<M, C> {
    pub fn clock<C2: Clock>(self, clock: C2) -> SchedulerBuilder<M, C2> {
        let Self {
            machine,
            logic_frequency,
            visual_frequency,
            idle_frequency,
            sample_window,
            max_ticks_per_refresh,
            span,
            ..
        } = self;
        SchedulerBuilder {
            machine,
            clock,
            logic_frequency,
            visual_frequency,
            idle_frequency,
            sample_window,
            max_ticks_per_refresh,
            span,
        }
    }

    pub fn logic_frequency(mut self, hz: f64) -> Self {
        self.logic_frequency = hz;
        self
    }

    pub fn visual_frequency(mut self, hz: f64) -> Self {
        self.visual_frequency = hz;
        self
    }

    pub fn idle_frequency(mut self, hz: f64) -> Self {
        self.idle_frequency = hz;
        self
    }

    pub fn sample_window(mut self, seconds: f64) -> Self {
        self.sample_window = seconds;
        self
    }

    pub fn max_ticks_per_refresh(mut self, ticks: u32) -> Self {
        self.max_ticks_per_refresh = ticks;
        self
    }

    /// The span every log event of the scheduler is recorded under.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<Scheduler<M, C>, SchedulerError> {
        check_frequency("logic", self.logic_frequency, true)?;
        check_frequency("visual", self.visual_frequency, false)?;
        check_frequency("idle", self.idle_frequency, false)?;
        let now = self.clock.now();
        Ok(Scheduler {
            machine: self.machine,
            meter: RateMeter::new(now, self.sample_window),
            clock: self.clock,
            events: EventBus::new(),
            span: self.span.unwrap_or_else(|| info_span!("scheduler")),
            phase: Phase::Stopped,
            paused: false,
            stop_requested: false,
            loop_mode: LoopMode::Auto,
            refresh_available: false,
            next_tick_time: None,
            logic_frequency: self.logic_frequency,
            visual_frequency: self.visual_frequency,
            idle_frequency: self.idle_frequency,
            max_ticks_per_refresh: self.max_ticks_per_refresh,
            visibility: Visibility::Visible,
        })
    }
}

fn check_frequency(name: &'static str, value: f64, allow_zero: bool) -> Result<(), SchedulerError> {
    let valid = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if valid {
        Ok(())
    } else {
        Err(SchedulerError::InvalidFrequency { name, value })
    }
}

/// Drives a [`Machine`] for the lifetime of one session.
pub struct Scheduler<M, C = SystemClock> {
    machine: M,
    clock: C,
    events: EventBus,
    span: Span,
    phase: Phase,
    paused: bool,
    stop_requested: bool,
    /// Never `Auto` once the session has been prepared.
    loop_mode: LoopMode,
    refresh_available: bool,
    /// `None` until the first tick cycle runs.
    next_tick_time: Option<f64>,
    logic_frequency: f64,
    visual_frequency: f64,
    idle_frequency: f64,
    max_ticks_per_refresh: u32,
    meter: RateMeter,
    visibility: Visibility,
}

impl<M: Machine, C: Clock> Scheduler<M, C> {
    pub fn state(&self) -> State {
        match self.phase {
            Phase::Stopped => State::Stopped,
            Phase::Booting => State::Booting,
            Phase::Active if self.paused => State::Paused,
            Phase::Active => State::Running,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Mutable access for control requests (input, palettes, etc). Never tick the machine through
    /// this; the scheduler is the only thing that may.
    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn meter(&self) -> &RateMeter {
        &self.meter
    }

    pub fn rates(&self) -> Rates {
        self.meter.rates()
    }

    pub fn framerate(&self) -> u64 {
        self.meter.frames().rate()
    }

    pub fn cyclerate(&self) -> u64 {
        self.meter.cycles().rate()
    }

    pub fn animationrate(&self) -> u64 {
        self.meter.refreshes().rate()
    }

    /// The measured cycle rate as a percentage of the logic frequency. Zero if the logic frequency
    /// is zero.
    pub fn emulation_speed(&self) -> f64 {
        self.rates().emulation_speed(self.logic_frequency)
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn next_tick_time(&self) -> Option<f64> {
        self.next_tick_time
    }

    pub fn logic_frequency(&self) -> f64 {
        self.logic_frequency
    }

    pub fn visual_frequency(&self) -> f64 {
        self.visual_frequency
    }

    pub fn idle_frequency(&self) -> f64 {
        self.idle_frequency
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The time between two tick deadlines, in milliseconds.
    pub fn tick_interval(&self) -> f64 {
        1000.0 / self.visual_frequency
    }

    /// Switches the loop strategy. `Auto` is resolved immediately against the display refresh
    /// support of the host. A running loop notices the switch at its next iteration.
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        let resolved = mode.resolve(self.refresh_available);
        if resolved != self.loop_mode {
            info!(parent: &self.span, requested = %mode, "Running on loop mode {resolved}");
        }
        self.loop_mode = resolved;
    }

    pub fn set_logic_frequency(&mut self, hz: f64) -> Result<(), SchedulerError> {
        check_frequency("logic", hz, true)?;
        self.logic_frequency = hz;
        self.emit(Event::Frequency(hz));
        Ok(())
    }

    pub fn set_visual_frequency(&mut self, hz: f64) -> Result<(), SchedulerError> {
        check_frequency("visual", hz, false)?;
        self.visual_frequency = hz;
        Ok(())
    }

    pub fn set_idle_frequency(&mut self, hz: f64) -> Result<(), SchedulerError> {
        check_frequency("idle", hz, false)?;
        self.idle_frequency = hz;
        Ok(())
    }

    /// Resolves the loop mode against the host and boots the machine, leaving the session
    /// running. [`Scheduler::start`] does this before entering the loop; call it directly to get
    /// between the boot and the loop (e.g. to restore a save state).
    pub fn prepare(
        &mut self,
        options: &StartOptions,
        display_refresh: bool,
    ) -> Result<(), SchedulerError> {
        self.refresh_available = display_refresh;
        self.set_loop_mode(options.loop_mode);
        self.stop_requested = false;
        self.paused = false;
        if let Err(err) = self.boot(&BootOptions::with_rom(options.rom_url.clone())) {
            self.phase = Phase::Stopped;
            return Err(SchedulerError::Boot(err));
        }
        self.next_tick_time = None;
        self.meter.reset(self.clock.now());
        Ok(())
    }

    /// Asks the loop to return at its next iteration boundary.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn toggle_running(&mut self) {
        if self.paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Stops ticking. The loop keeps iterating (and emitting animation frames) but idles.
    pub fn pause(&mut self) {
        if !self.paused {
            debug!(parent: &self.span, "Pausing");
        }
        self.paused = true;
    }

    /// Resumes ticking from now. Neither the deadline nor the rate windows carry over the paused
    /// time.
    pub fn resume(&mut self) {
        if self.paused {
            debug!(parent: &self.span, "Resuming");
        }
        self.paused = false;
        let now = self.clock.now();
        self.next_tick_time = Some(now);
        self.meter.reset(now);
    }

    /// Soft reset: boots the machine again without changing the ROM.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        info!(parent: &self.span, "Resetting the machine");
        self.boot(&BootOptions::soft_reset())
            .map_err(SchedulerError::Boot)?;
        self.meter.reset(self.clock.now());
        Ok(())
    }

    /// Rebuilds the machine through [`Machine::hard_reset`]. Afterwards the machine is tickable
    /// again; if it can not be rebuilt the session is over.
    pub fn hard_reset(&mut self) -> Result<(), SchedulerError> {
        warn!(parent: &self.span, "Hard resetting the machine");
        let phase = std::mem::replace(&mut self.phase, Phase::Booting);
        self.machine
            .hard_reset()
            .map_err(SchedulerError::HardReset)?;
        self.phase = phase;
        self.emit(Event::Booted);
        self.meter.reset(self.clock.now());
        Ok(())
    }

    /// Reports a change of the hosting document's visibility. Coming back into view discards the
    /// rate windows, as they would include time in which nothing ran. The paused state is left to
    /// the caller.
    pub fn set_visibility(&mut self, visibility: Visibility) {
        if visibility == self.visibility {
            return;
        }
        debug!(parent: &self.span, "Visibility changed to {visibility}");
        self.visibility = visibility;
        match visibility {
            Visibility::Visible => {
                self.meter.reset(self.clock.now());
                self.emit(Event::Visible);
            }
            Visibility::Hidden => self.emit(Event::Hidden),
        }
    }

    /// Applies a control request. Only a failed hard reset escapes: a failed soft reset is handled
    /// like a failed tick.
    pub fn apply(&mut self, control: Control) -> Result<(), SchedulerError> {
        trace!(parent: &self.span, "Applying {control:?}");
        match control {
            Control::Pause => self.pause(),
            Control::Resume => self.resume(),
            Control::ToggleRunning => self.toggle_running(),
            Control::Reset => match self.reset() {
                Err(SchedulerError::Boot(err)) => self.handle_error(err)?,
                res => res?,
            },
            Control::HardReset => self.hard_reset()?,
            Control::SetLoopMode(mode) => self.set_loop_mode(mode),
            Control::SetLogicFrequency(hz) => {
                if let Err(err) = self.set_logic_frequency(hz) {
                    warn!(parent: &self.span, "Ignoring request: {err}");
                }
            }
            Control::SetVisualFrequency(hz) => {
                if let Err(err) = self.set_visual_frequency(hz) {
                    warn!(parent: &self.span, "Ignoring request: {err}");
                }
            }
            Control::Visibility(visibility) => self.set_visibility(visibility),
            Control::Stop => self.stop(),
        }
        Ok(())
    }

    pub fn save_state(&mut self) -> Result<Vec<u8>, SchedulerError> {
        let states = self
            .machine
            .save_states()
            .ok_or(SchedulerError::Unsupported(Feature::SaveState))?;
        states.serialize_state().map_err(SchedulerError::State)
    }

    /// Loads a machine state. Like a resume, the deadline and the rate windows start over.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), SchedulerError> {
        let states = self
            .machine
            .save_states()
            .ok_or(SchedulerError::Unsupported(Feature::SaveState))?;
        states.unserialize_state(data).map_err(SchedulerError::State)?;
        let now = self.clock.now();
        self.next_tick_time = Some(now);
        self.meter.reset(now);
        self.emit(Event::Message(Notice::info(STATE_LOADED_TEXT)));
        Ok(())
    }

    pub fn benchmark(&mut self, count: usize) -> Result<BenchmarkResult, SchedulerError> {
        let bench = self
            .machine
            .benchmark()
            .ok_or(SchedulerError::Unsupported(Feature::Benchmark))?;
        Ok(bench.benchmark(count))
    }

    fn boot(&mut self, options: &BootOptions) -> Result<(), MachineError> {
        let phase = std::mem::replace(&mut self.phase, Phase::Booting);
        if let Err(err) = self.machine.boot(options) {
            self.phase = phase;
            return Err(err);
        }
        self.phase = Phase::Active;
        self.emit(Event::Booted);
        Ok(())
    }

    /// Runs the machine once, accounts for it, and moves the tick deadline.
    fn tick_cycle(&mut self, time: Option<f64>, strategy: Strategy) -> Result<(), SchedulerError> {
        let before = time.unwrap_or_else(|| self.clock.now());

        let cycles = match self.machine.tick() {
            Ok(TickInfo { cycles }) => cycles,
            Err(err) => {
                self.handle_error(err)?;
                0
            }
        };
        self.emit(Event::Tick(TickInfo { cycles }));

        // Failed ticks are still attempted logical frames
        self.meter.record_frame();
        if self.meter.window_full(self.visual_frequency) {
            let rates = self.meter.sample(self.clock.now());
            debug!(
                parent: &self.span,
                framerate = rates.framerate,
                cyclerate = rates.cyclerate,
                animationrate = rates.animationrate,
                "Sampled rates"
            );
            self.emit(Event::Frame(rates));
        }

        // When the host could not keep up, whole intervals are skipped rather than run late. The
        // display refresh loop does its own catching up, so it only ever advances by one.
        let interval = self.tick_interval();
        let next = *self.next_tick_time.get_or_insert(before);
        let ticks = match strategy {
            Strategy::FixedDelay => ((before - next) / interval).ceil().max(1.0),
            Strategy::DisplayRefresh => 1.0,
        };
        self.next_tick_time = Some(next + interval * ticks);
        Ok(())
    }

    /// Surfaces a tick failure and pauses. Fatal failures also rebuild the machine.
    fn handle_error(&mut self, err: MachineError) -> Result<(), SchedulerError> {
        let fatal = err.is_fatal();
        let text = if fatal {
            UNRECOVERABLE_TEXT.to_owned()
        } else {
            err.to_string()
        };
        self.emit(Event::Message(Notice::error(text)));
        error!(parent: &self.span, kind = %err.kind(), "Tick failed: {err}");

        self.pause();

        if fatal {
            self.hard_reset()?;
            self.emit(Event::Error);
        }
        Ok(())
    }

    /// Triggers an event, keeping the rate meter in step with what is emitted.
    fn emit(&mut self, event: Event) {
        match &event {
            Event::Tick(info) => self.meter.record_cycles(info.cycles),
            Event::AnimationFrame => self.meter.record_refresh(),
            _ => {}
        }
        self.events.trigger(&event);
    }
}
