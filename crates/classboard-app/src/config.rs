//! Application configuration.

use classboard_core::RgbColor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// How local edits reach the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Stream buffered draw ops.
    #[default]
    Incremental,
    /// Resend the whole deck as scenes.
    FullSnapshot,
}

impl std::str::FromStr for SyncStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(SyncStrategy::Incremental),
            "full_snapshot" => Ok(SyncStrategy::FullSnapshot),
            other => Err(ConfigError::Invalid {
                key: "sync_strategy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP base of the backing store.
    pub server_url: String,
    /// WebSocket base of the sync channel.
    pub ws_url: String,
    pub school_id: String,
    pub auth_token: String,
    pub surface_width: u32,
    pub surface_height: u32,
    pub flush_threshold: usize,
    pub flush_interval_secs: u64,
    pub history_cap: usize,
    pub undo_intercept_secs: u64,
    pub sync_strategy: SyncStrategy,
    pub background: RgbColor,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000".to_string(),
            school_id: String::new(),
            auth_token: String::new(),
            surface_width: 800,
            surface_height: 600,
            flush_threshold: classboard_core::buffer::DEFAULT_FLUSH_THRESHOLD,
            flush_interval_secs: 5,
            history_cap: classboard_core::history::DEFAULT_HISTORY_CAP,
            undo_intercept_secs: 2,
            sync_strategy: SyncStrategy::Incremental,
            background: RgbColor::WHITE,
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// `<config dir>/classboard/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("classboard").join("config.json"))
    }

    /// Load the config file if present, then apply `CLASSBOARD_*` overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load(path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from `CLASSBOARD_*` variables supplied by `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("CLASSBOARD_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = lookup("CLASSBOARD_WS_URL") {
            self.ws_url = v;
        }
        if let Some(v) = lookup("CLASSBOARD_SCHOOL_ID") {
            self.school_id = v;
        }
        if let Some(v) = lookup("CLASSBOARD_AUTH_TOKEN") {
            self.auth_token = v;
        }
        if let Some(v) = lookup("CLASSBOARD_SYNC_STRATEGY") {
            self.sync_strategy = v.parse()?;
        }
        if let Some(v) = lookup("CLASSBOARD_FLUSH_THRESHOLD") {
            self.flush_threshold = parse_number("CLASSBOARD_FLUSH_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("CLASSBOARD_SURFACE_WIDTH") {
            self.surface_width = parse_number("CLASSBOARD_SURFACE_WIDTH", &v)?;
        }
        if let Some(v) = lookup("CLASSBOARD_SURFACE_HEIGHT") {
            self.surface_height = parse_number("CLASSBOARD_SURFACE_HEIGHT", &v)?;
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn undo_intercept_window(&self) -> Duration {
        Duration::from_secs(self.undo_intercept_secs)
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!((config.surface_width, config.surface_height), (800, 600));
        assert_eq!(config.flush_threshold, 20);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.history_cap, 50);
        assert_eq!(config.undo_intercept_window(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r##"{"school_id":"12","sync_strategy":"full_snapshot","background":"#fafafa"}"##,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.school_id, "12");
        assert_eq!(config.sync_strategy, SyncStrategy::FullSnapshot);
        assert_eq!(config.background, RgbColor::new(250, 250, 250));
        assert_eq!(config.surface_width, 800);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CLASSBOARD_SCHOOL_ID", "4"),
            ("CLASSBOARD_FLUSH_THRESHOLD", "10"),
            ("CLASSBOARD_SYNC_STRATEGY", "incremental"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.school_id, "4");
        assert_eq!(config.flush_threshold, 10);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "CLASSBOARD_SURFACE_WIDTH").then(|| "wide".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let result = config.apply_overrides(|key| {
            (key == "CLASSBOARD_SYNC_STRATEGY").then(|| "crdt".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
