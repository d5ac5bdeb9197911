use serde::Deserialize;
use serde::Serialize;

/// Counts occurrences since the start of a window. The rate is only recomputed when the window is
/// sampled, never interpolated in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCounter {
    count: u64,
    window_start: f64,
    rate: u64,
}

impl RateCounter {
    pub fn new(now: f64) -> Self {
        Self {
            count: 0,
            window_start: now,
            rate: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> f64 {
        self.window_start
    }

    /// The rate, per second, computed at the last sample.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    fn add(&mut self, amount: u64) {
        self.count = self.count.saturating_add(amount);
    }

    fn reset(&mut self, now: f64) {
        self.count = 0;
        self.window_start = now;
    }

    /// Recomputes the rate over the current window. A window with no elapsed time keeps the last
    /// rate.
    fn sample(&mut self, now: f64) {
        let elapsed = (now - self.window_start) / 1000.0;
        if elapsed > 0.0 {
            self.rate = (self.count as f64 / elapsed).round() as u64;
        }
    }
}

/// A snapshot of the three measured rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rates {
    /// Logical frames (tick cycle attempts) per second.
    pub framerate: u64,
    /// Emulated cycles per second.
    pub cyclerate: u64,
    /// Loop iterations (display refreshes) per second.
    pub animationrate: u64,
}

impl Rates {
    /// The emulation speed as a percentage of the target logic frequency.
    pub fn emulation_speed(&self, logic_frequency: f64) -> f64 {
        if logic_frequency == 0.0 {
            return 0.0;
        }
        (self.cyclerate as f64 / logic_frequency) * 100.0
    }
}

/// The logical-frame, cycle, and display-refresh counters. All three share one window: they are
/// sampled together and reset together so their rates cover the same span of wall time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateMeter {
    frames: RateCounter,
    cycles: RateCounter,
    refreshes: RateCounter,
    window_seconds: f64,
}

impl RateMeter {
    pub fn new(now: f64, window_seconds: f64) -> Self {
        Self {
            frames: RateCounter::new(now),
            cycles: RateCounter::new(now),
            refreshes: RateCounter::new(now),
            window_seconds,
        }
    }

    pub fn frames(&self) -> &RateCounter {
        &self.frames
    }

    pub fn cycles(&self) -> &RateCounter {
        &self.cycles
    }

    pub fn refreshes(&self) -> &RateCounter {
        &self.refreshes
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn record_frame(&mut self) {
        self.frames.add(1);
    }

    pub fn record_cycles(&mut self, cycles: u64) {
        self.cycles.add(cycles);
    }

    pub fn record_refresh(&mut self) {
        self.refreshes.add(1);
    }

    /// Whether enough logical frames have been counted to close the window at the given visual
    /// frequency.
    pub fn window_full(&self, visual_frequency: f64) -> bool {
        self.frames.count as f64 >= visual_frequency * self.window_seconds
    }

    /// Computes all three rates over the window, then starts a new window at `now`.
    pub fn sample(&mut self, now: f64) -> Rates {
        self.frames.sample(now);
        self.cycles.sample(now);
        self.refreshes.sample(now);
        self.reset(now);
        self.rates()
    }

    /// Discards everything counted so far and starts a new window at `now`. Rates are kept.
    pub fn reset(&mut self, now: f64) {
        self.frames.reset(now);
        self.cycles.reset(now);
        self.refreshes.reset(now);
    }

    pub fn rates(&self) -> Rates {
        Rates {
            framerate: self.frames.rate,
            cyclerate: self.cycles.rate,
            animationrate: self.refreshes.rate,
        }
    }
}
