use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::error::OfflineError;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<OfflineConfig>> = OnceCell::new();

/// Offline-layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Store-wide offline-sync opt-in: when true every folder participates
    /// in prefetch sweeps and auto-prefetch, regardless of per-folder flags
    #[serde(default)]
    pub offline_sync_all: bool,

    /// Directory for journal files; `default_journal_dir()` when unset
    pub journal_dir: Option<PathBuf>,

    /// Minimum percent step between prefetch progress reports
    #[serde(default = "default_progress_granularity")]
    pub prefetch_progress_granularity: u8,
}

fn default_progress_granularity() -> u8 {
    1
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            offline_sync_all: false,
            journal_dir: None,
            prefetch_progress_granularity: default_progress_granularity(),
        }
    }
}

/// Default directory for journal files (inside the store's private state
/// directory when the caller does not supply one).
pub fn default_journal_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mail-offline")
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mail-offline").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("mail-offline")
                .join("config.toml"),
        );
    }

    paths
}

/// Initialize configuration from default paths
pub fn init_config() -> Result<(), OfflineError> {
    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    // No config found, initialize with defaults
    set_config(OfflineConfig::default())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &PathBuf) -> Result<(), OfflineError> {
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .map_err(|e| OfflineError::Config(format!("Failed to read config: {}", e)))?;

    let config: OfflineConfig = toml::from_str(&content)
        .map_err(|e| OfflineError::Config(format!("Failed to parse config: {}", e)))?;

    set_config(config)
}

/// Set the global configuration
pub fn set_config(config: OfflineConfig) -> Result<(), OfflineError> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock.write().unwrap_or_else(PoisonError::into_inner);
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Check if configuration is initialized
pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

/// Minimum percent step between prefetch progress reports
pub fn prefetch_progress_granularity() -> u8 {
    CONFIG
        .get()
        .map(|lock| {
            lock.read()
                .unwrap_or_else(PoisonError::into_inner)
                .prefetch_progress_granularity
        })
        .unwrap_or_else(default_progress_granularity)
        .max(1)
}

/// Directory for journal files, configured or default
pub fn journal_dir() -> PathBuf {
    CONFIG
        .get()
        .and_then(|lock| {
            lock.read()
                .unwrap_or_else(PoisonError::into_inner)
                .journal_dir
                .clone()
        })
        .unwrap_or_else(default_journal_dir)
}

/// Store-wide offline-sync opt-in (false when config is uninitialized)
pub fn offline_sync_all() -> bool {
    CONFIG
        .get()
        .map(|lock| {
            lock.read()
                .unwrap_or_else(PoisonError::into_inner)
                .offline_sync_all
        })
        .unwrap_or(false)
}
