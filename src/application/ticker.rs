use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Owns the periodic task that drives break countdowns.
///
/// The task exists only between an `ensure_running` and the matching `stop`
/// (or until the tick callback returns `false`). The first tick fires one full
/// period after start.
#[derive(Debug)]
pub struct BreakTicker {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl BreakTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawns the ticker unless one is already live. Returns whether a task was spawned.
    pub fn ensure_running<F>(&mut self, mut on_tick: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.is_running() {
            return false;
        }

        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });
        self.handle = Some(handle);
        debug!(period_ms = period.as_millis() as u64, "break ticker started");
        true
    }

    /// Cancels the task. Safe to call from inside the tick callback.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                debug!("break ticker stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for BreakTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
