use crate::domain::models::DEFAULT_REDIRECT_URL;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const MIN_TICK_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub schema: u8,
    pub app_name: String,
    /// IANA zone name; empty means the host's local zone.
    pub timezone: String,
    pub extension_origin: String,
    pub blocked_page_path: String,
    pub default_redirect_url: String,
    pub tick_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            app_name: "Block-O-Clock".to_string(),
            timezone: String::new(),
            extension_origin: "chrome-extension://blockoclock/".to_string(),
            blocked_page_path: DEFAULT_REDIRECT_URL.to_string(),
            default_redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            tick_interval_ms: 1000,
        }
    }
}

impl HostConfig {
    pub fn timezone(&self) -> Result<Option<Tz>, InfraError> {
        let name = self.timezone.trim();
        if name.is_empty() {
            return Ok(None);
        }
        name.parse::<Tz>()
            .map(Some)
            .map_err(|_| InfraError::InvalidConfig(format!("unknown timezone: {name}")))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&HostConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_host_config(config_dir: &Path) -> Result<HostConfig, InfraError> {
    let config: HostConfig = serde_json::from_value(read_config(&config_dir.join(APP_JSON))?)?;
    config.timezone()?;
    Ok(config)
}
