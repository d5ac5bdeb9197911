#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use wisp::BootOptions;
use wisp::Clock;
use wisp::Control;
use wisp::Host;
use wisp::Machine;
use wisp::MachineError;
use wisp::ManualClock;
use wisp::TickInfo;

/// One full DMG frame worth of cycles.
pub const DMG_FRAME_CYCLES: u64 = 69_905;
pub const DMG_FREQUENCY: f64 = 4_194_304.0;

/// A host whose time only moves when the loop waits on it. Sleeps can be made to overshoot, the
/// display refresh can be stalled, and controls can be scripted to arrive at a given time.
pub struct SimHost {
    pub clock: ManualClock,
    /// Extra time every sleep takes, in ms.
    pub overshoot: f64,
    /// `None` disables the display refresh.
    pub refresh_period: Option<f64>,
    last_refresh: f64,
    /// Refreshes (by index) that are delayed by the given ms.
    stalls: VecDeque<(usize, f64)>,
    refreshes: usize,
    controls: VecDeque<(f64, Control)>,
    stop_at: f64,
}

impl SimHost {
    pub fn new(clock: ManualClock, stop_at: f64) -> Self {
        Self {
            last_refresh: clock.now(),
            clock,
            overshoot: 0.0,
            refresh_period: None,
            stalls: VecDeque::new(),
            refreshes: 0,
            controls: VecDeque::new(),
            stop_at,
        }
    }

    pub fn with_refresh(self, hz: f64) -> Self {
        self.with_refresh_period(1000.0 / hz)
    }

    pub fn with_refresh_period(mut self, ms: f64) -> Self {
        self.refresh_period = Some(ms);
        self
    }

    pub fn with_overshoot(mut self, ms: f64) -> Self {
        self.overshoot = ms;
        self
    }

    pub fn stall(mut self, refresh: usize, ms: f64) -> Self {
        self.stalls.push_back((refresh, ms));
        self
    }

    pub fn at(mut self, time: f64, control: Control) -> Self {
        self.controls.push_back((time, control));
        self
    }
}

impl Host for SimHost {
    fn has_display_refresh(&self) -> bool {
        self.refresh_period.is_some()
    }

    async fn sleep(&mut self, ms: f64) {
        self.clock.advance(ms + self.overshoot);
    }

    async fn next_refresh(&mut self) -> f64 {
        let period = self.refresh_period.unwrap_or(1000.0 / 60.0);
        self.last_refresh += period;
        if let Some((index, ms)) = self.stalls.front().copied() {
            if index == self.refreshes {
                self.stalls.pop_front();
                self.last_refresh += ms;
            }
        }
        self.refreshes += 1;
        // A refresh never lands in the past, e.g. after the fixed delay loop moved the clock on
        self.last_refresh = self.last_refresh.max(self.clock.now());
        self.clock.set(self.last_refresh);
        self.last_refresh
    }

    fn poll_control(&mut self) -> Option<Control> {
        let now = self.clock.now();
        if now >= self.stop_at {
            self.stop_at = f64::INFINITY;
            return Some(Control::Stop);
        }
        match self.controls.front() {
            Some((time, _)) if *time <= now => self.controls.pop_front().map(|(_, c)| c),
            _ => None,
        }
    }
}

/// A DMG-like machine that records when it was ticked.
pub struct Dmg {
    pub clock: ManualClock,
    pub ticks: Arc<Mutex<Vec<f64>>>,
    pub hard_resets: usize,
    /// Time a tick takes, in ms.
    pub work: f64,
    failures: VecDeque<(usize, MachineError)>,
}

impl Dmg {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            ticks: Arc::new(Mutex::new(Vec::new())),
            hard_resets: 0,
            work: 0.0,
            failures: VecDeque::new(),
        }
    }

    pub fn failing_at(mut self, tick: usize, err: MachineError) -> Self {
        self.failures.push_back((tick, err));
        self
    }

    pub fn tick_times(&self) -> Vec<f64> {
        self.ticks.lock().unwrap().clone()
    }
}

impl Machine for Dmg {
    fn boot(&mut self, _options: &BootOptions) -> Result<(), MachineError> {
        Ok(())
    }

    fn tick(&mut self) -> Result<TickInfo, MachineError> {
        let mut ticks = self.ticks.lock().unwrap();
        ticks.push(self.clock.now());
        let count = ticks.len();
        drop(ticks);
        self.clock.advance(self.work);
        match self.failures.front() {
            Some((tick, _)) if *tick == count => Err(self.failures.pop_front().unwrap().1),
            _ => Ok(TickInfo {
                cycles: DMG_FRAME_CYCLES,
            }),
        }
    }

    fn hard_reset(&mut self) -> Result<(), MachineError> {
        self.hard_resets += 1;
        Ok(())
    }
}

/// The mean time between consecutive ticks.
pub fn mean_interval(times: &[f64]) -> f64 {
    let (first, last) = (times[0], times[times.len() - 1]);
    (last - first) / (times.len() - 1) as f64
}
