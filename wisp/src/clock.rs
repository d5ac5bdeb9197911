use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

/// A monotonic time source. Timestamps are in milliseconds and only meaningful relative to other
/// timestamps from the same clock.
pub trait Clock {
    fn now(&self) -> f64;
}

/// The wall clock, measured from the moment the clock was created. Clones share the same origin,
/// so a host and a scheduler holding clones agree on what "now" means.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock that only moves when told to. Clones share the same reading, which lets a simulated
/// host advance the time the scheduler observes.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            time: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, time: f64) {
        *self.lock() = time;
    }

    pub fn advance(&self, delta: f64) {
        *self.lock() += delta;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, f64> {
        // A poisoned reading is still a valid f64
        self.time.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.lock()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock, SystemClock};

    #[test]
    fn manual_clock_is_shared() {
        let clock = ManualClock::new(10.0);
        let other = clock.clone();
        other.advance(5.5);
        assert_eq!(clock.now(), 15.5);
        clock.set(100.0);
        assert_eq!(other.now(), 100.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        // Copies share the origin
        let copy = clock;
        let second = copy.now();
        assert!(first >= 0.0);
        assert!(second >= first);
    }
}
