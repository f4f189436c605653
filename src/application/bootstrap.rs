use crate::infrastructure::config::{HostConfig, ensure_default_configs, load_host_config};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub config: HostConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("blockoclock.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_host_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn bootstrap_creates_layout_and_is_idempotent() {
        let root = std::env::temp_dir().join(format!(
            "blockoclock-bootstrap-tests-{}-{}",
            std::process::id(),
            NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed)
        ));

        let first = bootstrap_workspace(&root).expect("first bootstrap");
        assert!(first.config_dir.join("app.json").exists());
        assert!(first.logs_dir.is_dir());
        assert!(first.database_path.exists());

        let second = bootstrap_workspace(&root).expect("second bootstrap");
        assert_eq!(second.config, first.config);

        let _ = fs::remove_dir_all(&root);
    }
}
