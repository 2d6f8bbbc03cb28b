//! File-backed settings.
//!
//! Settings are the lowest-precedence configuration layer: values here are
//! overridden by environment variables during `Config::resolve`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub notifications: NotificationSettingsFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub libsql_path: Option<String>,
    pub libsql_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            cors_origins: Vec::new(),
            body_limit_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub session_ttl_hours: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettingsFile {
    pub notifications_table: String,
    pub types_table: String,
    pub priorities_table: String,
    pub channels_table: String,
    pub settings_table: String,
    pub ttl_days: u64,
    pub default_page_size: u64,
    pub purge_on_start: bool,
}

impl Default for NotificationSettingsFile {
    fn default() -> Self {
        Self {
            notifications_table: "notifications".to_string(),
            types_table: "notification_types".to_string(),
            priorities_table: "notification_priorities".to_string(),
            channels_table: "notification_channels".to_string(),
            settings_table: "notification_settings".to_string(),
            ttl_days: 7,
            default_page_size: 20,
            purge_on_start: false,
        }
    }
}

impl Settings {
    /// Default settings file location (`~/.lexcase/settings.toml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lexcase")
            .join("settings.toml")
    }

    /// Load settings from a TOML file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw).map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", path.display(), e))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Load from `LEXCASE_CONFIG` when set, else from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("LEXCASE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self::load_from(&path)
    }
}
