use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tracing::Span;
use tracing::debug;
use wisp::Clock;
use wisp::Control;
use wisp::Host;
use wisp::SystemClock;

/// The longest the host will wait in one go. Longer waits are cut short; the scheduler measures
/// elapsed time itself, so it only sees an early wakeup.
pub const MAX_WAIT: Duration = Duration::from_secs(60);

/// The shortest refresh period the host will simulate.
const MIN_REFRESH_PERIOD: Duration = Duration::from_millis(1);

/// Converts a wait in milliseconds into a timer duration. `None` means there is nothing to wait
/// for, which includes NaN.
fn wait_for(ms: f64) -> Option<Duration> {
    if ms.is_nan() || ms <= 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(ms / 1000.0).map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT)))
}

/// A [`Host`] on top of the tokio timer. There is no display to sync with, so the display refresh
/// is simulated with an interval.
pub struct TokioHost {
    clock: SystemClock,
    refresh: Option<Interval>,
    recv: Receiver<Control>,
    hung_up: bool,
    span: Span,
}

impl TokioHost {
    /// A `refresh_rate` of zero leaves the host without a display refresh. Timestamps are taken
    /// from `clock`, which should be the scheduler's, and logs go to `span`.
    pub fn new(
        clock: SystemClock,
        refresh_rate: f64,
        recv: Receiver<Control>,
        span: Span,
    ) -> Self {
        let refresh = (refresh_rate.is_finite() && refresh_rate > 0.0).then(|| {
            let period = wait_for(1000.0 / refresh_rate).unwrap_or(MIN_REFRESH_PERIOD);
            let mut timer = tokio::time::interval(period.max(MIN_REFRESH_PERIOD));
            // Like a real display, a late refresh does not make the next ones come any sooner
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        Self {
            clock,
            refresh,
            recv,
            hung_up: false,
            span,
        }
    }
}

impl Host for TokioHost {
    fn has_display_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    async fn sleep(&mut self, ms: f64) {
        match wait_for(ms) {
            Some(wait) => tokio::time::sleep(wait).await,
            // Still give the rest of the runtime a turn
            None => tokio::task::yield_now().await,
        }
    }

    async fn next_refresh(&mut self) -> f64 {
        match self.refresh.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => tokio::time::sleep(Duration::from_secs_f64(1.0 / 60.0)).await,
        }
        self.clock.now()
    }

    fn poll_control(&mut self) -> Option<Control> {
        if self.hung_up {
            return None;
        }
        match self.recv.try_recv() {
            Ok(control) => Some(control),
            Err(TryRecvError::Empty) => None,
            // Nothing can reach the loop anymore, including a stop request
            Err(TryRecvError::Disconnected) => {
                debug!(parent: &self.span, "Handle hung up, stopping");
                self.hung_up = true;
                Some(Control::Stop)
            }
        }
    }
}
