//! The two loop strategies and the dispatcher that picks between them.
//!
//! Both loops have a single thread of control. The only places they yield are the host's waits,
//! and control requests are only looked at right after such a wait, so a request never lands in
//! the middle of a tick cycle.

use tracing::debug;
use tracing::info;

use super::Phase;
use super::Scheduler;
use super::StartOptions;
use super::Strategy;
use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::events::Event;
use crate::host::Host;
use crate::loop_mode::LoopMode;
use crate::machine::Machine;

impl<M: Machine, C: Clock> Scheduler<M, C> {
    /// Boots the machine and runs the loop until the session is stopped. This is the main entry
    /// point of a session and should only be called once per scheduler.
    pub async fn start<H: Host>(
        &mut self,
        options: StartOptions,
        host: &mut H,
    ) -> Result<(), SchedulerError> {
        self.prepare(&options, host.has_display_refresh())?;
        self.run(host).await
    }

    /// Runs the loop of a prepared session. Returns once a stop is requested, or with the error
    /// that ended the session.
    pub async fn run<H: Host>(&mut self, host: &mut H) -> Result<(), SchedulerError> {
        if self.phase == Phase::Stopped {
            return Err(SchedulerError::NotStarted);
        }
        let digest = self.dispatch(host).await;
        self.phase = Phase::Stopped;
        info!(parent: &self.span, "Scheduler stopped");
        digest
    }

    async fn dispatch<H: Host>(&mut self, host: &mut H) -> Result<(), SchedulerError> {
        while !self.stop_requested {
            match self.loop_mode {
                LoopMode::FixedDelay => self.loop_fixed_delay(host).await?,
                LoopMode::DisplayRefresh if self.refresh_available => {
                    self.loop_display_refresh(host).await?
                }
                mode => return Err(SchedulerError::UnsupportedLoopMode(mode)),
            }
        }
        Ok(())
    }

    async fn loop_fixed_delay<H: Host>(&mut self, host: &mut H) -> Result<(), SchedulerError> {
        debug!(parent: &self.span, "Entering the fixed delay loop");
        loop {
            self.drain_controls(host)?;
            if self.stop_requested || self.loop_mode != LoopMode::FixedDelay {
                return Ok(());
            }
            let pending = self.fixed_delay_iteration()?;
            host.sleep(pending).await;
        }
    }

    async fn loop_display_refresh<H: Host>(&mut self, host: &mut H) -> Result<(), SchedulerError> {
        debug!(parent: &self.span, "Entering the display refresh loop");
        loop {
            let time = host.next_refresh().await;
            self.drain_controls(host)?;
            if self.stop_requested || self.loop_mode != LoopMode::DisplayRefresh {
                return Ok(());
            }
            self.refresh_iteration(time)?;
        }
    }

    fn drain_controls<H: Host>(&mut self, host: &mut H) -> Result<(), SchedulerError> {
        while let Some(control) = host.poll_control() {
            self.apply(control)?;
        }
        Ok(())
    }

    /// One iteration of the fixed delay loop. Runs at most one tick cycle and returns how long to
    /// wait, in milliseconds, before the next iteration.
    pub fn fixed_delay_iteration(&mut self) -> Result<f64, SchedulerError> {
        if self.paused {
            self.emit(Event::AnimationFrame);
            return Ok(1000.0 / self.idle_frequency);
        }

        self.tick_cycle(None, Strategy::FixedDelay)?;

        let after = self.clock.now();
        let pending = self
            .next_tick_time
            .map_or(0.0, |next| (next - after).max(0.0));
        self.emit(Event::AnimationFrame);
        Ok(pending)
    }

    /// The body of one display refresh at time `time`. Runs tick cycles until the deadline is
    /// caught up with, but never more than the per-refresh cap. A backlog beyond that cap is
    /// dropped.
    pub fn refresh_iteration(&mut self, time: f64) -> Result<(), SchedulerError> {
        if !self.paused {
            let mut remaining = self.max_ticks_per_refresh;
            while self.next_tick_time.is_none_or(|next| time >= next) {
                if remaining == 0 {
                    self.next_tick_time = Some(time);
                    break;
                }
                self.tick_cycle(Some(time), Strategy::DisplayRefresh)?;
                remaining -= 1;
                // A failed tick pauses the machine; what is left of the backlog is moot
                if self.paused {
                    break;
                }
            }
        }
        self.emit(Event::AnimationFrame);
        Ok(())
    }
}
