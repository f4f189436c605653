use crate::domain::models::{BreakState, BreakStatus, BreakSummary, Schedule, ScheduleId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakError {
    #[error("no break is configured for this schedule")]
    NoBreakConfigured,
    #[error("break already used today")]
    AlreadyUsedToday,
    #[error("break already active")]
    AlreadyActive,
    #[error("no active break")]
    NoActiveBreak,
    #[error("no break to resume")]
    NoBreakToResume,
    #[error("no break to end")]
    NoBreakToEnd,
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),
}

/// Per-schedule break records. Expired records stay as the "used today" marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakBook {
    states: BTreeMap<ScheduleId, BreakState>,
}

impl BreakBook {
    pub fn from_states(states: BTreeMap<ScheduleId, BreakState>) -> Self {
        Self { states }
    }

    pub fn states(&self) -> &BTreeMap<ScheduleId, BreakState> {
        &self.states
    }

    pub fn get(&self, id: &ScheduleId) -> Option<&BreakState> {
        self.states.get(id)
    }

    pub fn start(&mut self, schedule: &Schedule, today: NaiveDate) -> Result<BreakState, BreakError> {
        if schedule.break_duration == 0 {
            return Err(BreakError::NoBreakConfigured);
        }
        if let Some(existing) = self.states.get(&schedule.id) {
            if existing.has_time_left() {
                return Err(BreakError::AlreadyActive);
            }
            if existing.last_used_date == today {
                return Err(BreakError::AlreadyUsedToday);
            }
        }
        let state = BreakState::fresh(schedule.break_seconds(), today);
        self.states.insert(schedule.id.clone(), state);
        Ok(state)
    }

    pub fn pause(&mut self, id: &ScheduleId) -> Result<BreakState, BreakError> {
        let state = self
            .states
            .get_mut(id)
            .filter(|state| state.has_time_left())
            .ok_or(BreakError::NoActiveBreak)?;
        state.is_paused = true;
        Ok(*state)
    }

    pub fn resume(&mut self, id: &ScheduleId) -> Result<BreakState, BreakError> {
        let state = self
            .states
            .get_mut(id)
            .filter(|state| state.has_time_left())
            .ok_or(BreakError::NoBreakToResume)?;
        state.is_paused = false;
        Ok(*state)
    }

    pub fn end(&mut self, id: &ScheduleId) -> Result<BreakState, BreakError> {
        let state = self.states.get_mut(id).ok_or(BreakError::NoBreakToEnd)?;
        state.remaining_seconds = 0;
        state.is_paused = true;
        Ok(*state)
    }

    /// Advances every running break by one second. Returns whether anything changed.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;
        for state in self.states.values_mut().filter(|state| state.is_running()) {
            state.remaining_seconds -= 1;
            if state.remaining_seconds == 0 {
                state.is_paused = true;
            }
            changed = true;
        }
        changed
    }

    pub fn has_running(&self) -> bool {
        self.states.values().any(BreakState::is_running)
    }

    pub fn running_ids(&self) -> HashSet<ScheduleId> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_running())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn status_of(&self, schedule: &Schedule, today: NaiveDate) -> BreakStatus {
        let record = self.states.get(&schedule.id);
        let remaining_seconds = record.map_or(0, |state| state.remaining_seconds);
        let used_today =
            record.is_some_and(|state| !state.has_time_left() && state.last_used_date == today);
        let can_start_break = schedule.break_duration > 0
            && record.is_none_or(|state| !state.has_time_left() && state.last_used_date != today);

        BreakStatus {
            schedule_id: schedule.id.clone(),
            schedule_name: schedule.name.clone(),
            break_duration: schedule.break_duration,
            has_active_break: remaining_seconds > 0,
            remaining_seconds,
            is_paused: record.is_some_and(|state| state.is_paused),
            used_today,
            can_start_break,
        }
    }

    /// First schedule, in list order, whose record satisfies `predicate`.
    pub fn first_in_order<'a, P>(&self, schedules: &'a [Schedule], predicate: P) -> Option<(usize, &'a Schedule)>
    where
        P: Fn(&BreakState) -> bool,
    {
        schedules
            .iter()
            .enumerate()
            .find(|(_, schedule)| self.states.get(&schedule.id).is_some_and(&predicate))
    }

    /// Running breaks take precedence over paused ones; list order breaks ties.
    pub fn summary(&self, schedules: &[Schedule]) -> Option<BreakSummary> {
        let (index, schedule) = self
            .first_in_order(schedules, BreakState::is_running)
            .or_else(|| self.first_in_order(schedules, |state| state.is_paused && state.has_time_left()))?;
        let state = self.states.get(&schedule.id)?;
        Some(BreakSummary {
            schedule_id: schedule.id.clone(),
            schedule_index: index,
            schedule_name: schedule.name.clone(),
            remaining_seconds: state.remaining_seconds,
            is_paused: state.is_paused,
            display: format_clock(state.remaining_seconds),
        })
    }
}

/// `m:ss`, minutes unpadded.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
