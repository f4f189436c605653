//! Line-delimited JSON protocol spoken with the browser side.
//!
//! Each request is one JSON object tagged by `action`; each response is one
//! JSON object carrying `success` and either the payload fields or `error`.

use crate::application::commands::{AppState, BreakTarget};
use crate::domain::models::Settings;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostRequest {
    Ping,
    CheckIfCurrentUrlBlocked {
        url: String,
    },
    Navigate {
        url: String,
        #[serde(default, rename = "frameId")]
        frame_id: Option<u32>,
    },
    StartBreak(BreakTarget),
    PauseBreak(BreakTarget),
    ResumeBreak(BreakTarget),
    EndBreak(BreakTarget),
    GetBreakStatus(BreakTarget),
    GetActiveBreakForOverlay,
    GetSettings,
    UpdateSettings {
        settings: Settings,
    },
}

pub fn success<T: Serialize>(payload: T) -> Value {
    match serde_json::to_value(payload) {
        Ok(Value::Object(mut fields)) => {
            fields.insert("success".to_string(), Value::Bool(true));
            Value::Object(fields)
        }
        Ok(other) => json!({ "success": true, "data": other }),
        Err(error) => failure(format!("failed to encode response: {error}")),
    }
}

pub fn failure(error: impl Into<String>) -> Value {
    json!({ "success": false, "error": error.into() })
}

/// Answers requests in arrival order until the input closes, then flushes pending writes.
pub async fn serve<R, W>(state: &AppState, mut reader: R, mut writer: W) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer).await? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buffer) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(state, line)
            }
            Err(error) => {
                warn!(%error, "rejected request that is not utf-8");
                failure(format!("invalid request: {error}"))
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }

    info!("request stream closed");
    state.flush().await
}

fn handle_line(state: &AppState, line: &str) -> Value {
    match serde_json::from_str::<HostRequest>(line) {
        Ok(request) => {
            debug!(?request, "handling request");
            crate::dispatch(state, request)
        }
        Err(error) => {
            warn!(%error, "rejected malformed request");
            failure(format!("invalid request: {error}"))
        }
    }
}
