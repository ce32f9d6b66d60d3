use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::FavoritesError;
use crate::platform::Platform;

pub const APP_DIR_NAME: &str = "mealmates";
pub const DB_FILE_NAME: &str = "mealmates.db";
pub const FALLBACK_FILE_NAME: &str = "local_storage.json";
pub const CONFIG_FILE_NAME: &str = "favorites.json";
pub const STORAGE_PREFIX: &str = "mealmates";
pub const PLATFORM_ENV_VAR: &str = "MEALMATES_PLATFORM";
pub const USER_AGENT_ENV_VAR: &str = "MEALMATES_USER_AGENT";
pub const HOST_NAME_ENV_VAR: &str = "MEALMATES_HOST_NAME";

pub const OPERATION_TIMEOUT_MS: u64 = 5000;
pub const QUEUE_PAUSE_MS: u64 = 50;
pub const WEB_READY_TIMEOUT_MS: u64 = 1000;
pub const WEB_READY_POLL_MS: u64 = 50;
pub const MEMORY_CHECK_INTERVAL_MS: u64 = 5000;

pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn get_config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Where the relational backend keeps its data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
    pub platform: Platform,
    pub database: DatabaseLocation,
    pub fallback_path: PathBuf,
    pub storage_prefix: String,
    pub operation_timeout_ms: u64,
    pub queue_pause_ms: u64,
    pub web_ready_timeout_ms: u64,
    pub web_ready_poll_ms: u64,
    pub memory_check_interval_ms: u64,
    /// Route to the fallback store when an Android emulator is detected.
    pub fallback_on_emulator: bool,
    /// Reported by the embedding shell; used for emulator detection.
    pub user_agent: Option<String>,
    pub host_name: Option<String>,
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        let data_dir = get_data_dir();
        Self {
            platform: Platform::current(),
            database: DatabaseLocation::File(data_dir.join(DB_FILE_NAME)),
            fallback_path: data_dir.join(FALLBACK_FILE_NAME),
            storage_prefix: STORAGE_PREFIX.to_string(),
            operation_timeout_ms: OPERATION_TIMEOUT_MS,
            queue_pause_ms: QUEUE_PAUSE_MS,
            web_ready_timeout_ms: WEB_READY_TIMEOUT_MS,
            web_ready_poll_ms: WEB_READY_POLL_MS,
            memory_check_interval_ms: MEMORY_CHECK_INTERVAL_MS,
            fallback_on_emulator: false,
            user_agent: None,
            host_name: None,
        }
    }
}

impl FavoritesConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self, FavoritesError> {
        let content = fs::read_to_string(path)?;
        let config: FavoritesConfig = serde_json::from_str(&content)
            .map_err(|e| FavoritesError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Default config file if present, then platform and host overrides from the environment.
    pub fn load() -> Self {
        let path = get_config_file_path();
        let mut config = if path.exists() {
            match Self::load_from(&path) {
                Ok(config) => {
                    log::info!("Loaded favorites config from {:?}", path);
                    config
                }
                Err(e) => {
                    log::warn!("Ignoring invalid config at {:?}: {}", path, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        if let Ok(value) = std::env::var(PLATFORM_ENV_VAR) {
            match value.parse::<Platform>() {
                Ok(platform) => config.platform = platform,
                Err(e) => log::warn!("Ignoring {}: {}", PLATFORM_ENV_VAR, e),
            }
        }
        if let Ok(value) = std::env::var(USER_AGENT_ENV_VAR) {
            config.user_agent = Some(value);
        }
        if let Ok(value) = std::env::var(HOST_NAME_ENV_VAR) {
            config.host_name = Some(value);
        }

        config
    }

    /// In-memory database and no inter-operation pause, for tests and tooling.
    pub fn in_memory(fallback_path: PathBuf) -> Self {
        Self {
            database: DatabaseLocation::Memory,
            fallback_path,
            queue_pause_ms: 0,
            ..Self::default()
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn queue_pause(&self) -> Duration {
        Duration::from_millis(self.queue_pause_ms)
    }

    pub fn web_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.web_ready_timeout_ms)
    }

    pub fn web_ready_poll(&self) -> Duration {
        Duration::from_millis(self.web_ready_poll_ms.max(1))
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_millis(self.memory_check_interval_ms.max(1))
    }
}
