//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Which account the timer belongs to
//! - Default timer mode and durations
//! - Notification preferences
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::{Mode, StartParams};

/// Defaults used when a session is started without explicit durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default)]
    pub default_mode: Mode,
    /// Focus block length in minutes.
    #[serde(default = "default_focus_duration")]
    pub focus_duration: u32,
    /// Break length in minutes.
    #[serde(default = "default_break_duration")]
    pub break_duration: u32,
    #[serde(default = "default_cycles")]
    pub cycles: u32,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Show the persistent "ongoing" indicator while a session runs.
    #[serde(default = "default_true")]
    pub ongoing: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_account")]
    pub account: String,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_focus_duration() -> u32 {
    25
}
fn default_break_duration() -> u32 {
    5
}
fn default_cycles() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_account() -> String {
    "default".into()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            default_mode: Mode::default(),
            focus_duration: default_focus_duration(),
            break_duration: default_break_duration(),
            cycles: default_cycles(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ongoing: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: default_account(),
            timer: TimerConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing the default if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.account.trim().is_empty() {
            return Err(invalid("account", "must not be empty"));
        }
        if self.timer.focus_duration == 0 {
            return Err(invalid("timer.focus_duration", "must be at least 1 minute"));
        }
        if self.timer.cycles == 0 {
            return Err(invalid("timer.cycles", "must be at least 1"));
        }
        Ok(())
    }

    /// Start parameters for `mode` (or the configured default) with any
    /// explicit overrides in minutes.
    pub fn start_params(
        &self,
        mode: Option<Mode>,
        focus_min: Option<u32>,
        break_min: Option<u32>,
        cycles: Option<u32>,
    ) -> StartParams {
        let mode = mode.unwrap_or(self.timer.default_mode);
        let focus_sec = u64::from(focus_min.unwrap_or(self.timer.focus_duration)) * 60;
        let break_sec = u64::from(break_min.unwrap_or(self.timer.break_duration)) * 60;
        match mode {
            Mode::Pomodoro => {
                StartParams::pomodoro(focus_sec, break_sec, cycles.unwrap_or(self.timer.cycles))
            }
            Mode::Countdown => StartParams::countdown(focus_sec),
            Mode::Countup => StartParams::countup(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.account, "default");
        assert_eq!(parsed.timer.default_mode, Mode::Pomodoro);
        assert!(parsed.notifications.enabled);
    }

    #[test]
    fn sparse_file_fills_in_defaults() {
        let parsed: Config = toml::from_str("[timer]\nfocus_duration = 50\n").unwrap();
        assert_eq!(parsed.timer.focus_duration, 50);
        assert_eq!(parsed.timer.break_duration, 5);
        assert_eq!(parsed.account, "default");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.focus_duration").as_deref(), Some("25"));
        assert_eq!(cfg.get("timer.default_mode").as_deref(), Some("pomodoro"));
        assert_eq!(cfg.get("notifications.enabled").as_deref(), Some("true"));
        assert!(cfg.get("timer.missing_key").is_none());
    }

    #[test]
    fn set_value_updates_fields() {
        let mut cfg = Config::default();
        cfg.set_value("timer.cycles", "6").unwrap();
        cfg.set_value("timer.default_mode", "countdown").unwrap();
        cfg.set_value("notifications.ongoing", "false").unwrap();
        cfg.set_value("account", "alice").unwrap();
        assert_eq!(cfg.timer.cycles, 6);
        assert_eq!(cfg.timer.default_mode, Mode::Countdown);
        assert!(!cfg.notifications.ongoing);
        assert_eq!(cfg.account, "alice");
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set_value("timer.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set_value("notifications.enabled", "maybe").is_err());
        assert!(cfg.set_value("timer.default_mode", "hourglass").is_err());
        assert!(cfg.set_value("timer.focus_duration", "0").is_err());
        assert!(cfg.set_value("timer", "1").is_err());
        assert_eq!(cfg.timer.focus_duration, 25);
    }

    #[test]
    fn start_params_apply_overrides() {
        let cfg = Config::default();
        let p = cfg.start_params(None, None, None, None);
        assert_eq!(p, StartParams::pomodoro(1500, 300, 4));
        let p = cfg.start_params(Some(Mode::Countdown), Some(10), None, None);
        assert_eq!(p, StartParams::countdown(600));
        assert_eq!(
            cfg.start_params(Some(Mode::Countup), Some(10), None, None),
            StartParams::countup()
        );
    }

    #[test]
    fn load_from_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.timer.focus_duration, 25);
        assert!(path.exists());

        let mut cfg = cfg;
        cfg.set_value("timer.focus_duration", "45").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().timer.focus_duration, 45);
    }

    #[test]
    fn load_from_unparsable_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timer = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
