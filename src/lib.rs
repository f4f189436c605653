pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    AppState, BreakActionResponse, BreakStatusResponse, BreakTarget, CheckUrlResponse,
    NavigationResponse, OverlayResponse, check_url_impl, end_break_impl,
    get_active_break_for_overlay_impl, get_break_status_impl, get_settings_impl, navigate_impl,
    pause_break_impl, resume_break_impl, start_break_impl, update_settings_impl,
};
use application::host::{HostRequest, failure, serve, success};
use domain::models::Settings;
use infrastructure::error::InfraError;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct SettingsResponse {
    settings: Settings,
}

fn ping() -> &'static str {
    "pong"
}

fn check_if_current_url_blocked(state: &AppState, url: String) -> Result<CheckUrlResponse, String> {
    check_url_impl(state, url)
        .map_err(|error| state.command_error("check_if_current_url_blocked", &error))
}

fn navigate(state: &AppState, url: String, frame_id: Option<u32>) -> Result<NavigationResponse, String> {
    navigate_impl(state, url, frame_id).map_err(|error| state.command_error("navigate", &error))
}

fn start_break(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, String> {
    start_break_impl(state, target).map_err(|error| state.command_error("start_break", &error))
}

fn pause_break(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, String> {
    pause_break_impl(state, target).map_err(|error| state.command_error("pause_break", &error))
}

fn resume_break(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, String> {
    resume_break_impl(state, target).map_err(|error| state.command_error("resume_break", &error))
}

fn end_break(state: &AppState, target: BreakTarget) -> Result<BreakActionResponse, String> {
    end_break_impl(state, target).map_err(|error| state.command_error("end_break", &error))
}

fn get_break_status(state: &AppState, target: BreakTarget) -> Result<BreakStatusResponse, String> {
    get_break_status_impl(state, target)
        .map_err(|error| state.command_error("get_break_status", &error))
}

fn get_active_break_for_overlay(state: &AppState) -> Result<OverlayResponse, String> {
    get_active_break_for_overlay_impl(state)
        .map_err(|error| state.command_error("get_active_break_for_overlay", &error))
}

fn get_settings(state: &AppState) -> Result<SettingsResponse, String> {
    get_settings_impl(state)
        .map(|settings| SettingsResponse { settings })
        .map_err(|error| state.command_error("get_settings", &error))
}

fn update_settings(state: &AppState, settings: Settings) -> Result<SettingsResponse, String> {
    update_settings_impl(state, settings)
        .map(|settings| SettingsResponse { settings })
        .map_err(|error| state.command_error("update_settings", &error))
}

fn respond<T: Serialize>(result: Result<T, String>) -> Value {
    match result {
        Ok(payload) => success(payload),
        Err(error) => failure(error),
    }
}

pub fn dispatch(state: &AppState, request: HostRequest) -> Value {
    match request {
        HostRequest::Ping => success(ping()),
        HostRequest::CheckIfCurrentUrlBlocked { url } => {
            respond(check_if_current_url_blocked(state, url))
        }
        HostRequest::Navigate { url, frame_id } => respond(navigate(state, url, frame_id)),
        HostRequest::StartBreak(target) => respond(start_break(state, target)),
        HostRequest::PauseBreak(target) => respond(pause_break(state, target)),
        HostRequest::ResumeBreak(target) => respond(resume_break(state, target)),
        HostRequest::EndBreak(target) => respond(end_break(state, target)),
        HostRequest::GetBreakStatus(target) => respond(get_break_status(state, target)),
        HostRequest::GetActiveBreakForOverlay => respond(get_active_break_for_overlay(state)),
        HostRequest::GetSettings => respond(get_settings(state)),
        HostRequest::UpdateSettings { settings } => respond(update_settings(state, settings)),
    }
}

/// `BLOCKOCLOCK_HOME` when set, else the current directory.
pub fn workspace_root() -> Result<PathBuf, InfraError> {
    match std::env::var_os("BLOCKOCLOCK_HOME") {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(std::env::current_dir()?),
    }
}

pub fn run() -> Result<(), InfraError> {
    // stdout carries the protocol, so diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "blockoclock=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let state = AppState::new(workspace_root()?).await?;
        info!(
            app = %state.config().app_name,
            config_dir = %state.config_dir().display(),
            database = %state.database_path().display(),
            "policy host ready"
        );
        serve(&state, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    })
}
