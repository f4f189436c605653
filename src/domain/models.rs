use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_REDIRECT_URL: &str = "pages/blocked.html";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Url,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub value: String,
}

impl Rule {
    pub fn url(value: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Url,
            value: value.into(),
        }
    }

    pub fn keyword(value: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Keyword,
            value: value.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.value, "rule.value")
    }
}

/// Half-open daily window `[start, end)` in local wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: String,
    pub end: String,
}

impl TimeInterval {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_hhmm(&self.start, "interval.start")?;
        validate_hhmm(&self.end, "interval.end")?;
        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            return Err("interval must be HH:MM".to_string());
        };
        if end <= start {
            return Err("interval.end must be after interval.start".to_string());
        }
        Ok(())
    }

    pub fn bounds(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_hhmm(&self.start)?, parse_hhmm(&self.end)?))
    }
}

/// Stable schedule identifier; break state is keyed by it, not by list position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn generate() -> Self {
        Self(next_id("sch"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ScheduleId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<String> for ScheduleId {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "ScheduleRecord")]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    /// 0 = Sunday .. 6 = Saturday.
    pub days: Vec<u8>,
    pub time_intervals: Vec<TimeInterval>,
    pub sites: Vec<String>,
    pub keywords: Vec<String>,
    /// Empty means the global redirect target applies.
    pub redirect_url: String,
    /// Minutes; 0 means no break is offered.
    pub break_duration: u32,
}

/// Incoming schedule shape. Older writers send one `startTime`/`endTime`
/// window instead of `timeIntervals`; missing fields are left for `validate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ScheduleRecord {
    id: Option<ScheduleId>,
    name: Option<String>,
    days: Vec<u8>,
    time_intervals: Option<Vec<TimeInterval>>,
    start_time: Option<String>,
    end_time: Option<String>,
    sites: Vec<String>,
    keywords: Vec<String>,
    redirect_url: Option<String>,
    #[serde(alias = "breakDurationMinutes")]
    break_duration: Option<u32>,
}

impl From<ScheduleRecord> for Schedule {
    fn from(record: ScheduleRecord) -> Self {
        let time_intervals = match (record.time_intervals, record.start_time, record.end_time) {
            (Some(intervals), _, _) if !intervals.is_empty() => intervals,
            (_, Some(start), Some(end)) => vec![TimeInterval::new(start, end)],
            _ => Vec::new(),
        };
        Self {
            id: record.id.unwrap_or_default(),
            name: record.name.unwrap_or_default(),
            days: record.days,
            time_intervals,
            sites: record.sites,
            keywords: record.keywords,
            redirect_url: record.redirect_url.unwrap_or_default(),
            break_duration: record.break_duration.unwrap_or(0),
        }
    }
}

impl Schedule {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "schedule.name")?;
        if self.days.is_empty() {
            return Err("schedule.days must not be empty".to_string());
        }
        if let Some(day) = self.days.iter().find(|day| **day > 6) {
            return Err(format!("schedule.days[] must be 0..6 (got {day})"));
        }
        if self.time_intervals.is_empty() {
            return Err("schedule.time_intervals must not be empty".to_string());
        }
        for interval in &self.time_intervals {
            interval.validate()?;
        }
        for site in &self.sites {
            validate_non_empty(site, "schedule.sites[]")?;
        }
        for keyword in &self.keywords {
            validate_non_empty(keyword, "schedule.keywords[]")?;
        }
        Ok(())
    }

    pub fn effective_redirect<'a>(&'a self, global_redirect_url: &'a str) -> &'a str {
        let own = self.redirect_url.trim();
        if own.is_empty() {
            global_redirect_url
        } else {
            own
        }
    }

    pub fn break_seconds(&self) -> u32 {
        self.break_duration.saturating_mul(60)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakState {
    pub remaining_seconds: u32,
    pub is_paused: bool,
    pub last_used_date: NaiveDate,
}

impl BreakState {
    pub fn fresh(seconds: u32, today: NaiveDate) -> Self {
        Self {
            remaining_seconds: seconds,
            is_paused: false,
            last_used_date: today,
        }
    }

    pub fn has_time_left(&self) -> bool {
        self.remaining_seconds > 0
    }

    pub fn is_running(&self) -> bool {
        !self.is_paused && self.has_time_left()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakStatus {
    pub schedule_id: ScheduleId,
    pub schedule_name: String,
    pub break_duration: u32,
    pub has_active_break: bool,
    pub remaining_seconds: u32,
    pub is_paused: bool,
    pub used_today: bool,
    pub can_start_break: bool,
}

/// The single break shown on the badge and page overlay.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakSummary {
    pub schedule_id: ScheduleId,
    pub schedule_index: usize,
    pub schedule_name: String,
    pub remaining_seconds: u32,
    pub is_paused: bool,
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub global_redirect_url: String,
    pub blocked_sites: Vec<Rule>,
    pub schedules: Vec<Schedule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global_redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            blocked_sites: Vec::new(),
            schedules: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.blocked_sites {
            rule.validate()?;
        }
        for schedule in &self.schedules {
            schedule.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for schedule in &self.schedules {
            if !schedule.id.is_unassigned() && !seen.insert(&schedule.id) {
                return Err(format!("duplicate schedule id: {}", schedule.id));
            }
        }
        Ok(())
    }

    /// Fills defaults the settings UI may leave out and gives new schedules an id.
    pub fn normalize(&mut self, default_redirect_url: &str) {
        if self.global_redirect_url.trim().is_empty() {
            self.global_redirect_url = default_redirect_url.to_string();
        } else {
            self.global_redirect_url = self.global_redirect_url.trim().to_string();
        }
        for schedule in &mut self.schedules {
            if schedule.id.is_unassigned() {
                schedule.id = ScheduleId::generate();
            }
        }
    }

    pub fn schedule(&self, id: &ScheduleId) -> Option<(usize, &Schedule)> {
        self.schedules
            .iter()
            .enumerate()
            .find(|(_, schedule)| &schedule.id == id)
    }
}

/// Wall-clock reading the resolver works against: minute precision, 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMoment {
    pub date: NaiveDate,
    pub day: u8,
    pub time: NaiveTime,
}

impl LocalMoment {
    pub fn from_naive(value: NaiveDateTime) -> Self {
        let time = NaiveTime::from_hms_opt(value.hour(), value.minute(), 0).unwrap_or(value.time());
        Self {
            date: value.date(),
            day: value.weekday().num_days_from_sunday() as u8,
            time,
        }
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    let mut split = value.split(':');
    let Some(hour_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    let Some(minute_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    if split.next().is_some() || hour_str.len() != 2 || minute_str.len() != 2 {
        return Err(format!("{field_name} must be HH:MM"));
    }

    let hour = hour_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{field_name} must be HH:MM"));
    }
    Ok(())
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
