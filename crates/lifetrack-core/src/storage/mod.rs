mod adapter;
mod config;
pub mod database;
mod memory;

pub use adapter::PersistenceAdapter;
pub use config::{Config, NotificationsConfig, TimerConfig};
pub use database::{AccountStore, Database};
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory.
///
/// `LIFETRACK_DATA_DIR` wins when set. Otherwise `~/.config/lifetrack[-dev]/`
/// based on LIFETRACK_ENV (set LIFETRACK_ENV=dev for a development
/// data directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("LIFETRACK_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("LIFETRACK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("lifetrack-dev")
            } else {
                base_dir.join("lifetrack")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
