//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

use crate::constants::paths;

/// Get the relay config directory (`$RELAY_HOME`, else ~/.relay)
pub fn config_dir() -> PathBuf {
    if let Ok(home) = std::env::var(paths::HOME_ENV) {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(paths::CONFIG_DIR_NAME)
}

/// Get the logs directory (~/.relay/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Tool server list (~/.relay/servers.json)
pub fn servers_path() -> PathBuf {
    config_dir().join(paths::SERVERS_FILE)
}

/// Agent settings (~/.relay/config.toml)
pub fn config_path() -> PathBuf {
    config_dir().join(paths::CONFIG_FILE)
}
