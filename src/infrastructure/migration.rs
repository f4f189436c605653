//! Stored-state schema versions.
//!
//! Version 1 stored schedules as a positional list, possibly with a single
//! `startTime`/`endTime` pair instead of `timeIntervals`, and keyed
//! `breakStates` by list position. Version 2 gives every schedule a stable id
//! and keys break state by it.

use crate::domain::breaks::BreakBook;
use crate::domain::models::{BreakState, Rule, RuleKind, Schedule, ScheduleId, Settings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{DurableStore, StoreRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const SCHEMA_VERSION_KEY: &str = "schemaVersion";
pub const BLOCKED_SITES_KEY: &str = "blockedSites";
pub const SCHEDULES_KEY: &str = "schedules";
pub const GLOBAL_REDIRECT_URL_KEY: &str = "globalRedirectUrl";
pub const BREAK_STATES_KEY: &str = "breakStates";
const LEGACY_BREAK_STATE_KEY: &str = "breakState";

pub const CURRENT_SCHEMA_VERSION: u64 = 2;

const LOAD_KEYS: [&str; 6] = [
    SCHEMA_VERSION_KEY,
    BLOCKED_SITES_KEY,
    SCHEDULES_KEY,
    GLOBAL_REDIRECT_URL_KEY,
    BREAK_STATES_KEY,
    LEGACY_BREAK_STATE_KEY,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub settings: Settings,
    pub breaks: BreakBook,
}

#[derive(Debug)]
pub struct DecodedSnapshot {
    pub state: PersistedState,
    /// Set when the stored record was not already at the current version.
    pub migrated_from: Option<u64>,
}

/// Gives a schedule read from storage the identity version 2 requires.
fn complete_stored_schedule(mut schedule: Schedule, position: usize) -> Schedule {
    if schedule.id.is_unassigned() {
        schedule.id = ScheduleId::generate();
    }
    if schedule.name.trim().is_empty() {
        schedule.name = format!("Schedule {}", position + 1);
    }
    schedule
}

pub fn decode_snapshot(
    record: &StoreRecord,
    default_redirect_url: &str,
) -> Result<DecodedSnapshot, InfraError> {
    if record.is_empty() {
        return Ok(DecodedSnapshot {
            state: PersistedState {
                settings: Settings {
                    global_redirect_url: default_redirect_url.to_string(),
                    ..Settings::default()
                },
                breaks: BreakBook::default(),
            },
            migrated_from: None,
        });
    }

    let version = record
        .get(SCHEMA_VERSION_KEY)
        .and_then(Value::as_u64)
        .unwrap_or(1);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported stored schema version {version}"
        )));
    }

    let schedules = decode_schedules(record.get(SCHEDULES_KEY));
    let settings = Settings {
        global_redirect_url: record
            .get(GLOBAL_REDIRECT_URL_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(default_redirect_url)
            .to_string(),
        blocked_sites: decode_rules(record.get(BLOCKED_SITES_KEY)),
        schedules,
    };

    let breaks = if version < CURRENT_SCHEMA_VERSION {
        rekey_positional_breaks(record.get(BREAK_STATES_KEY), &settings.schedules)
    } else {
        decode_breaks(record.get(BREAK_STATES_KEY))
    };
    if record
        .get(LEGACY_BREAK_STATE_KEY)
        .is_some_and(|value| !value.is_null())
    {
        warn!("discarding legacy global break state; it cannot be attributed to a schedule");
    }

    let migrated_from = (version < CURRENT_SCHEMA_VERSION
        || settings.schedules.len() != count_ids(record.get(SCHEDULES_KEY)))
    .then_some(version);

    Ok(DecodedSnapshot {
        state: PersistedState { settings, breaks },
        migrated_from,
    })
}

pub fn encode_snapshot(state: &PersistedState) -> Result<StoreRecord, InfraError> {
    let mut record = settings_record(&state.settings)?;
    record.insert(BREAK_STATES_KEY.to_string(), serde_json::to_value(&state.breaks)?);
    record.insert(LEGACY_BREAK_STATE_KEY.to_string(), Value::Null);
    Ok(record)
}

pub fn settings_record(settings: &Settings) -> Result<StoreRecord, InfraError> {
    let mut record = StoreRecord::new();
    record.insert(SCHEMA_VERSION_KEY.to_string(), Value::from(CURRENT_SCHEMA_VERSION));
    record.insert(BLOCKED_SITES_KEY.to_string(), serde_json::to_value(&settings.blocked_sites)?);
    record.insert(SCHEDULES_KEY.to_string(), serde_json::to_value(&settings.schedules)?);
    record.insert(
        GLOBAL_REDIRECT_URL_KEY.to_string(),
        Value::String(settings.global_redirect_url.clone()),
    );
    Ok(record)
}

/// Reads the stored snapshot, migrating and writing it back once when needed.
pub async fn load_state(
    store: &dyn DurableStore,
    default_redirect_url: &str,
) -> Result<PersistedState, InfraError> {
    let record = store.get(&LOAD_KEYS).await?;
    let decoded = decode_snapshot(&record, default_redirect_url)?;
    if let Some(from) = decoded.migrated_from {
        info!(
            from,
            to = CURRENT_SCHEMA_VERSION,
            schedules = decoded.state.settings.schedules.len(),
            "migrating stored state"
        );
        let migrated = encode_snapshot(&decoded.state)?;
        if let Err(error) = store.set(migrated).await {
            warn!(%error, "failed to write migrated state; will migrate again next load");
        }
    }
    Ok(decoded.state)
}

fn decode_schedules(value: Option<&Value>) -> Vec<Schedule> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            match serde_json::from_value::<Schedule>(item.clone()) {
                Ok(schedule) => Some(complete_stored_schedule(schedule, position)),
                Err(error) => {
                    warn!(position, %error, "skipping unreadable stored schedule");
                    None
                }
            }
        })
        .collect()
}

fn decode_rules(value: Option<&Value>) -> Vec<Rule> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(host) => Some(Rule {
                kind: RuleKind::Url,
                value: host.clone(),
            }),
            other => serde_json::from_value::<Rule>(other.clone())
                .map_err(|error| warn!(%error, "skipping unreadable blocked-site rule"))
                .ok(),
        })
        .filter(|rule| !rule.value.trim().is_empty())
        .collect()
}

fn decode_breaks(value: Option<&Value>) -> BreakBook {
    let Some(entries) = value.and_then(Value::as_object) else {
        return BreakBook::default();
    };
    let states = entries
        .iter()
        .filter_map(|(id, raw)| {
            serde_json::from_value::<BreakState>(raw.clone())
                .map(|state| (ScheduleId::from(id.as_str()), state))
                .map_err(|error| warn!(schedule_id = %id, %error, "skipping unreadable break state"))
                .ok()
        })
        .collect();
    BreakBook::from_states(states)
}

fn rekey_positional_breaks(value: Option<&Value>, schedules: &[Schedule]) -> BreakBook {
    let positional: Vec<(usize, &Value)> = match value {
        Some(Value::Array(items)) => items.iter().enumerate().collect(),
        Some(Value::Object(entries)) => entries
            .iter()
            .filter_map(|(key, raw)| key.parse::<usize>().ok().map(|position| (position, raw)))
            .collect(),
        _ => Vec::new(),
    };

    let mut states = BTreeMap::new();
    for (position, raw) in positional {
        let Some(schedule) = schedules.get(position) else {
            warn!(position, "dropping break state for a schedule that no longer exists");
            continue;
        };
        match serde_json::from_value::<BreakState>(raw.clone()) {
            Ok(state) => {
                states.insert(schedule.id.clone(), state);
            }
            Err(error) => warn!(position, %error, "skipping unreadable break state"),
        }
    }
    BreakBook::from_states(states)
}

fn count_ids(value: Option<&Value>) -> usize {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.get("id")
                        .and_then(Value::as_str)
                        .is_some_and(|id| !id.trim().is_empty())
                })
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DEFAULT_REDIRECT_URL, TimeInterval};
    use crate::infrastructure::storage::InMemoryStore;
    use serde_json::json;

    fn record(value: Value) -> StoreRecord {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn empty_store_decodes_to_defaults_without_migration() {
        let decoded = decode_snapshot(&StoreRecord::new(), DEFAULT_REDIRECT_URL).expect("decode");
        assert_eq!(decoded.state, PersistedState::default());
        assert_eq!(decoded.migrated_from, None);
        assert_eq!(decoded.state.settings.global_redirect_url, DEFAULT_REDIRECT_URL);
    }

    #[test]
    fn legacy_single_window_becomes_interval_list() {
        let decoded = decode_snapshot(
            &record(json!({
                "blockedSites": [{ "type": "url", "value": "x.com" }],
                "schedules": [{
                    "name": "Work Hours",
                    "days": [1, 2, 3, 4, 5],
                    "startTime": "09:00",
                    "endTime": "17:00",
                    "sites": ["social.example"],
                    "keywords": [],
                    "redirectUrl": "pages/blocked.html"
                }]
            })),
            DEFAULT_REDIRECT_URL,
        )
        .expect("decode");

        let schedule = &decoded.state.settings.schedules[0];
        assert_eq!(schedule.time_intervals, vec![TimeInterval::new("09:00", "17:00")]);
        assert!(schedule.id.as_str().starts_with("sch-"));
        assert_eq!(schedule.break_duration, 0);
        assert_eq!(decoded.migrated_from, Some(1));
    }

    #[test]
    fn positional_break_states_are_rekeyed_by_schedule_id() {
        let decoded = decode_snapshot(
            &record(json!({
                "schedules": [
                    { "id": "sch-a", "name": "A", "days": [1], "timeIntervals": [{ "start": "09:00", "end": "10:00" }] },
                    { "id": "sch-b", "name": "B", "days": [1], "timeIntervals": [{ "start": "09:00", "end": "10:00" }] }
                ],
                "breakStates": {
                    "1": { "remainingSeconds": 42, "isPaused": true, "lastUsedDate": "2026-02-16" },
                    "7": { "remainingSeconds": 10, "isPaused": false, "lastUsedDate": "2026-02-16" }
                }
            })),
            DEFAULT_REDIRECT_URL,
        )
        .expect("decode");

        let breaks = decoded.state.breaks.states();
        assert_eq!(breaks.len(), 1);
        assert_eq!(
            breaks.get(&ScheduleId::from("sch-b")).map(|state| state.remaining_seconds),
            Some(42)
        );
    }

    #[test]
    fn current_version_keeps_id_keyed_breaks_and_skips_rewrite() {
        let decoded = decode_snapshot(
            &record(json!({
                "schemaVersion": 2,
                "schedules": [
                    { "id": "sch-a", "name": "A", "days": [1], "timeIntervals": [{ "start": "09:00", "end": "10:00" }], "breakDuration": 5 }
                ],
                "breakStates": {
                    "sch-a": { "remainingSeconds": 120, "isPaused": false, "lastUsedDate": "2026-02-16" },
                    "sch-gone": { "remainingSeconds": 0, "isPaused": true, "lastUsedDate": "2026-02-15" }
                }
            })),
            DEFAULT_REDIRECT_URL,
        )
        .expect("decode");

        assert_eq!(decoded.migrated_from, None);
        assert_eq!(decoded.state.breaks.states().len(), 2);
        assert!(decoded.state.breaks.has_running());
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let decoded = decode_snapshot(
            &record(json!({
                "schemaVersion": 2,
                "blockedSites": ["x.com", { "type": "keyword", "value": "casino" }, 17, { "type": "url", "value": " " }],
                "schedules": [
                    "garbage",
                    { "id": "sch-a", "name": "A", "days": [1], "timeIntervals": [{ "start": "09:00", "end": "10:00" }] }
                ],
                "breakStates": { "sch-a": { "remainingSeconds": "soon" } }
            })),
            DEFAULT_REDIRECT_URL,
        )
        .expect("decode");

        assert_eq!(
            decoded.state.settings.blocked_sites,
            vec![Rule::url("x.com"), Rule::keyword("casino")]
        );
        assert_eq!(decoded.state.settings.schedules.len(), 1);
        assert!(decoded.state.breaks.states().is_empty());
    }

    #[test]
    fn newer_schema_is_rejected() {
        let result = decode_snapshot(
            &record(json!({ "schemaVersion": 3 })),
            DEFAULT_REDIRECT_URL,
        );
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn load_state_writes_migrated_snapshot_once() {
        let store = InMemoryStore::with_record(record(json!({
            "schedules": [{ "name": "Work", "days": [1], "startTime": "09:00", "endTime": "17:00" }],
            "breakState": { "remainingSeconds": 30, "isPaused": false }
        })));

        let first = load_state(&store, DEFAULT_REDIRECT_URL).await.expect("first load");
        let stored = store
            .get(&[SCHEMA_VERSION_KEY, SCHEDULES_KEY, LEGACY_BREAK_STATE_KEY])
            .await
            .expect("get");
        assert_eq!(stored[SCHEMA_VERSION_KEY], 2);
        assert!(stored[LEGACY_BREAK_STATE_KEY].is_null());
        assert!(first.breaks.states().is_empty());

        let second = load_state(&store, DEFAULT_REDIRECT_URL).await.expect("second load");
        assert_eq!(second.settings.schedules[0].id, first.settings.schedules[0].id);
        assert_eq!(
            second.settings.schedules[0].time_intervals,
            vec![TimeInterval::new("09:00", "17:00")]
        );
    }
}
