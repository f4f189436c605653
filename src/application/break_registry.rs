use crate::application::ticker::BreakTicker;
use crate::domain::breaks::BreakBook;
use crate::domain::models::{BreakState, BreakStatus, BreakSummary, Schedule, ScheduleId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::migration::BREAK_STATES_KEY;
use crate::infrastructure::store_writer::StoreWriter;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared owner of the per-schedule break records.
///
/// Each operation runs in one critical section: mutate the book, queue the
/// durable write, then start or stop the ticker to match what is running.
#[derive(Clone)]
pub struct BreakRegistry {
    shared: Arc<RegistryShared>,
}

struct RegistryShared {
    state: Mutex<RegistryState>,
    writer: StoreWriter,
}

struct RegistryState {
    book: BreakBook,
    ticker: BreakTicker,
}

impl BreakRegistry {
    /// Rebuilds the registry from a stored book; a recovered running break restarts the ticker.
    pub fn new(book: BreakBook, writer: StoreWriter, tick_period: Duration) -> Result<Self, InfraError> {
        let registry = Self {
            shared: Arc::new(RegistryShared {
                state: Mutex::new(RegistryState {
                    book,
                    ticker: BreakTicker::new(tick_period),
                }),
                writer,
            }),
        };
        {
            let mut state = registry.shared.lock_state()?;
            if state.book.has_running() {
                info!(running = state.book.running_ids().len(), "resuming break countdown after restart");
                RegistryShared::start_ticker(&registry.shared, &mut state);
            }
        }
        Ok(registry)
    }

    pub fn start(&self, schedule: &Schedule, today: NaiveDate) -> Result<BreakState, InfraError> {
        let mut state = self.shared.lock_state()?;
        let started = state.book.start(schedule, today)?;
        self.shared.persist(&state.book);
        RegistryShared::start_ticker(&self.shared, &mut state);
        info!(schedule_id = %schedule.id, seconds = started.remaining_seconds, "break started");
        Ok(started)
    }

    pub fn pause(&self, id: &ScheduleId) -> Result<BreakState, InfraError> {
        let mut state = self.shared.lock_state()?;
        let paused = state.book.pause(id)?;
        self.shared.persist(&state.book);
        stop_ticker_if_idle(&mut state);
        info!(schedule_id = %id, remaining = paused.remaining_seconds, "break paused");
        Ok(paused)
    }

    pub fn resume(&self, id: &ScheduleId) -> Result<BreakState, InfraError> {
        let mut state = self.shared.lock_state()?;
        let resumed = state.book.resume(id)?;
        self.shared.persist(&state.book);
        RegistryShared::start_ticker(&self.shared, &mut state);
        info!(schedule_id = %id, remaining = resumed.remaining_seconds, "break resumed");
        Ok(resumed)
    }

    pub fn end(&self, id: &ScheduleId) -> Result<BreakState, InfraError> {
        let mut state = self.shared.lock_state()?;
        let ended = state.book.end(id)?;
        self.shared.persist(&state.book);
        stop_ticker_if_idle(&mut state);
        info!(schedule_id = %id, "break ended");
        Ok(ended)
    }

    /// One countdown step. Returns whether any break is still running afterwards.
    pub fn tick(&self) -> Result<bool, InfraError> {
        self.shared.tick()
    }

    pub fn status_of(&self, schedule: &Schedule, today: NaiveDate) -> Result<BreakStatus, InfraError> {
        Ok(self.shared.lock_state()?.book.status_of(schedule, today))
    }

    pub fn summary(&self, schedules: &[Schedule]) -> Result<Option<BreakSummary>, InfraError> {
        Ok(self.shared.lock_state()?.book.summary(schedules))
    }

    pub fn running_breaks(&self) -> Result<HashSet<ScheduleId>, InfraError> {
        Ok(self.shared.lock_state()?.book.running_ids())
    }

    pub fn snapshot(&self) -> Result<BreakBook, InfraError> {
        Ok(self.shared.lock_state()?.book.clone())
    }

    pub fn is_ticking(&self) -> Result<bool, InfraError> {
        Ok(self.shared.lock_state()?.ticker.is_running())
    }

    pub async fn flush(&self) -> Result<(), InfraError> {
        self.shared.writer.flush().await
    }
}

impl RegistryShared {
    fn lock_state(&self) -> Result<MutexGuard<'_, RegistryState>, InfraError> {
        self.state
            .lock()
            .map_err(|_| InfraError::InvalidConfig("break registry lock poisoned".to_string()))
    }

    fn persist(&self, book: &BreakBook) {
        match serde_json::to_value(book) {
            Ok(value) => self.writer.queue_value(BREAK_STATES_KEY, value),
            Err(error) => warn!(%error, "failed to encode break states"),
        }
    }

    fn tick(&self) -> Result<bool, InfraError> {
        let mut state = self.lock_state()?;
        if state.book.tick() {
            self.persist(&state.book);
        }
        let still_running = state.book.has_running();
        if !still_running {
            debug!("no break running; stopping ticker");
            state.ticker.stop();
        }
        Ok(still_running)
    }

    fn start_ticker(shared: &Arc<Self>, state: &mut RegistryState) {
        let weak: Weak<Self> = Arc::downgrade(shared);
        state.ticker.ensure_running(move || {
            let Some(shared) = weak.upgrade() else {
                return false;
            };
            match shared.tick() {
                Ok(still_running) => still_running,
                Err(error) => {
                    warn!(%error, "break tick failed");
                    false
                }
            }
        });
    }
}

fn stop_ticker_if_idle(state: &mut RegistryState) {
    if !state.book.has_running() {
        state.ticker.stop();
    }
}
