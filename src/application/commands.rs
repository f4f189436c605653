use crate::application::bootstrap::bootstrap_workspace;
use crate::application::break_registry::BreakRegistry;
use crate::application::clock::{Clock, NowProvider};
use crate::application::decision::{BlockDecisionEngine, Decision, NavigationOutcome, RedirectResolver};
use crate::domain::breaks::BreakError;
use crate::domain::models::{
    BreakState, BreakStatus, BreakSummary, LocalMoment, Rule, Schedule, ScheduleId, Settings,
};
use crate::domain::schedule::is_active;
use crate::infrastructure::config::HostConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::migration::{load_state, settings_record};
use crate::infrastructure::storage::{DurableStore, SqliteStore};
use crate::infrastructure::store_writer::StoreWriter;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    config: HostConfig,
    clock: Clock,
    redirects: RedirectResolver,
    settings: RwLock<Settings>,
    breaks: BreakRegistry,
    writer: StoreWriter,
    log_guard: Mutex<()>,
}

impl AppState {
    pub async fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::open(workspace_root, None, None).await
    }

    /// Builds the state from the workspace's stored snapshot. `store` defaults to
    /// the workspace SQLite file and `now_provider` to the system clock.
    pub async fn open(
        workspace_root: PathBuf,
        store: Option<Arc<dyn DurableStore>>,
        now_provider: Option<NowProvider>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = bootstrap.config;
        let store = store.unwrap_or_else(|| {
            Arc::new(SqliteStore::new(&bootstrap.database_path)) as Arc<dyn DurableStore>
        });

        let mut clock = Clock::system(config.timezone()?);
        if let Some(now_provider) = now_provider {
            clock = clock.with_now_provider(now_provider);
        }
        let redirects = RedirectResolver::new(&config.extension_origin, &config.blocked_page_path)?;

        let persisted = load_state(store.as_ref(), &config.default_redirect_url).await?;
        let writer = StoreWriter::spawn(store);
        let breaks = BreakRegistry::new(persisted.breaks, writer.clone(), config.tick_interval())?;
        info!(
            rules = persisted.settings.blocked_sites.len(),
            schedules = persisted.settings.schedules.len(),
            "policy state loaded"
        );

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            config,
            clock,
            redirects,
            settings: RwLock::new(persisted.settings),
            breaks,
            writer,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn breaks(&self) -> &BreakRegistry {
        &self.breaks
    }

    /// Waits for every queued durable write.
    pub async fn flush(&self) -> Result<(), InfraError> {
        self.writer.flush().await
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn read_settings(&self) -> Result<RwLockReadGuard<'_, Settings>, InfraError> {
        self.settings
            .read()
            .map_err(|_| InfraError::InvalidConfig("settings lock poisoned".to_string()))
    }

    fn write_settings(&self) -> Result<RwLockWriteGuard<'_, Settings>, InfraError> {
        self.settings
            .write()
            .map_err(|_| InfraError::InvalidConfig("settings lock poisoned".to_string()))
    }

    fn evaluate(&self, url: &str) -> Result<Decision, InfraError> {
        let settings = self.read_settings()?;
        let running = self.breaks.running_breaks()?;
        Ok(BlockDecisionEngine::new(&settings).evaluate(url, &self.clock.moment(), &running))
    }
}

/// Addresses a schedule by stable id or by list position; neither means "pick one".
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakTarget {
    #[serde(default)]
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub schedule_index: Option<usize>,
}

impl BreakTarget {
    pub fn id(id: &str) -> Self {
        Self {
            schedule_id: Some(id.to_string()),
            schedule_index: None,
        }
    }

    pub fn index(index: usize) -> Self {
        Self {
            schedule_id: None,
            schedule_index: Some(index),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckUrlResponse {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<ScheduleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<Rule>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResponse {
    pub redirect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakActionResponse {
    pub schedule_id: ScheduleId,
    pub schedule_index: usize,
    pub remaining_seconds: u32,
    pub is_paused: bool,
}

impl BreakActionResponse {
    fn new(index: usize, schedule: &Schedule, state: BreakState) -> Self {
        Self {
            schedule_id: schedule.id.clone(),
            schedule_index: index,
            remaining_seconds: state.remaining_seconds,
            is_paused: state.is_paused,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakOverview {
    pub schedules: Vec<BreakStatus>,
    pub active: Option<BreakSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BreakStatusResponse {
    Single(BreakStatus),
    Overview(BreakOverview),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OverlayResponse {
    pub has_active_break: bool,
    #[serde(flatten)]
    pub summary: Option<BreakSummary>,
}

fn find_schedule<'a>(
    settings: &'a Settings,
    target: &BreakTarget,
) -> Result<Option<(usize, &'a Schedule)>, InfraError> {
    if let Some(id) = target
        .schedule_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return settings
            .schedule(&ScheduleId::from(id))
            .map(Some)
            .ok_or_else(|| BreakError::ScheduleNotFound(id.to_string()).into());
    }
    if let Some(index) = target.schedule_index {
        return settings
            .schedules
            .get(index)
            .map(|schedule| Some((index, schedule)))
            .ok_or_else(|| BreakError::ScheduleNotFound(format!("index {index}")).into());
    }
    Ok(None)
}

/// Prefers an active schedule whose break can start now, else the first active
/// one offering a break so the caller gets its specific refusal.
fn implicit_start_target<'a>(
    state: &AppState,
    settings: &'a Settings,
    moment: &LocalMoment,
) -> Result<(usize, &'a Schedule), InfraError> {
    let book = state.breaks.snapshot()?;
    let candidates = settings
        .schedules
        .iter()
        .enumerate()
        .filter(|(_, schedule)| schedule.break_duration > 0 && is_active(schedule, moment))
        .collect::<Vec<_>>();
    candidates
        .iter()
        .find(|(_, schedule)| book.status_of(schedule, moment.date).can_start_break)
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| BreakError::NoBreakConfigured.into())
}

pub fn check_url_impl(state: &AppState, url: String) -> Result<CheckUrlResponse, InfraError> {
    let response = match state.evaluate(&url)? {
        Decision::Allow => CheckUrlResponse {
            blocked: false,
            redirect_url: None,
            schedule_index: None,
            schedule_id: None,
            matched_rule: None,
        },
        Decision::Block(verdict) => {
            let (schedule_index, schedule_id) = verdict.schedule.unzip();
            CheckUrlResponse {
                blocked: true,
                redirect_url: Some(verdict.redirect_url),
                schedule_index,
                schedule_id,
                matched_rule: Some(verdict.rule),
            }
        }
    };
    debug!(url = %url, blocked = response.blocked, "checked url");
    Ok(response)
}

pub fn navigate_impl(
    state: &AppState,
    url: String,
    frame_id: Option<u32>,
) -> Result<NavigationResponse, InfraError> {
    let decision = state.evaluate(&url)?;
    match state.redirects.navigation_outcome(&url, frame_id, &decision)? {
        NavigationOutcome::Allow => Ok(NavigationResponse {
            redirect: false,
            redirect_url: None,
        }),
        NavigationOutcome::Redirect(target) => {
            state.log_info("navigate", &format!("redirected {url} to {target}"));
            Ok(NavigationResponse {
                redirect: true,
                redirect_url: Some(target),
            })
        }
    }
}

pub fn start_break_impl(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, InfraError> {
    let settings = state.read_settings()?;
    let moment = state.clock.moment();
    let (index, schedule) = match find_schedule(&settings, &target)? {
        Some(found) => found,
        None => implicit_start_target(state, &settings, &moment)?,
    };

    let started = state.breaks.start(schedule, moment.date)?;
    state.log_info(
        "start_break",
        &format!("started {}s break for schedule {}", started.remaining_seconds, schedule.id),
    );
    Ok(BreakActionResponse::new(index, schedule, started))
}

pub fn pause_break_impl(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, InfraError> {
    let settings = state.read_settings()?;
    let (index, schedule) = match find_schedule(&settings, &target)? {
        Some(found) => found,
        None => state
            .breaks
            .snapshot()?
            .first_in_order(&settings.schedules, BreakState::is_running)
            .ok_or(BreakError::NoActiveBreak)?,
    };

    let paused = state.breaks.pause(&schedule.id)?;
    state.log_info(
        "pause_break",
        &format!("paused break for schedule {} at {}s", schedule.id, paused.remaining_seconds),
    );
    Ok(BreakActionResponse::new(index, schedule, paused))
}

pub fn resume_break_impl(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, InfraError> {
    let settings = state.read_settings()?;
    let (index, schedule) = match find_schedule(&settings, &target)? {
        Some(found) => found,
        None => state
            .breaks
            .snapshot()?
            .first_in_order(&settings.schedules, |record| {
                record.is_paused && record.has_time_left()
            })
            .ok_or(BreakError::NoBreakToResume)?,
    };

    let resumed = state.breaks.resume(&schedule.id)?;
    state.log_info(
        "resume_break",
        &format!("resumed break for schedule {} at {}s", schedule.id, resumed.remaining_seconds),
    );
    Ok(BreakActionResponse::new(index, schedule, resumed))
}

pub fn end_break_impl(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, InfraError> {
    let settings = state.read_settings()?;
    let (index, schedule) = match find_schedule(&settings, &target)? {
        Some(found) => found,
        None => state
            .breaks
            .snapshot()?
            .first_in_order(&settings.schedules, BreakState::has_time_left)
            .ok_or(BreakError::NoBreakToEnd)?,
    };

    let ended = state.breaks.end(&schedule.id)?;
    state.log_info("end_break", &format!("ended break for schedule {}", schedule.id));
    Ok(BreakActionResponse::new(index, schedule, ended))
}

pub fn get_break_status_impl(
    state: &AppState,
    target: BreakTarget,
) -> Result<BreakStatusResponse, InfraError> {
    let settings = state.read_settings()?;
    let today = state.clock.moment().date;
    if let Some((_, schedule)) = find_schedule(&settings, &target)? {
        return Ok(BreakStatusResponse::Single(state.breaks.status_of(schedule, today)?));
    }

    let book = state.breaks.snapshot()?;
    Ok(BreakStatusResponse::Overview(BreakOverview {
        schedules: settings
            .schedules
            .iter()
            .map(|schedule| book.status_of(schedule, today))
            .collect(),
        active: book.summary(&settings.schedules),
    }))
}

pub fn get_active_break_for_overlay_impl(state: &AppState) -> Result<OverlayResponse, InfraError> {
    let settings = state.read_settings()?;
    let summary = state.breaks.summary(&settings.schedules)?;
    Ok(OverlayResponse {
        has_active_break: summary.is_some(),
        summary,
    })
}

pub fn get_settings_impl(state: &AppState) -> Result<Settings, InfraError> {
    Ok(state.read_settings()?.clone())
}

/// Replaces rules, schedules and redirect target in one step. Break records
/// are left as they are; records of removed schedules simply go unused.
pub fn update_settings_impl(state: &AppState, settings: Settings) -> Result<Settings, InfraError> {
    let mut settings = settings;
    settings.normalize(&state.config.default_redirect_url);
    settings.validate().map_err(InfraError::InvalidConfig)?;
    let record = settings_record(&settings)?;

    *state.write_settings()? = settings.clone();
    state.writer.queue(record);
    state.log_info(
        "update_settings",
        &format!(
            "stored {} rules and {} schedules",
            settings.blocked_sites.len(),
            settings.schedules.len()
        ),
    );
    Ok(settings)
}
