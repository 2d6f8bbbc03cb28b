//! Runtime configuration.
//!
//! Resolution order: environment variables, then `settings.toml`, then
//! built-in defaults.

mod helpers;
mod notifications;
mod server;

use std::path::PathBuf;

use secrecy::SecretString;

pub use self::notifications::{NotificationConfig, NotificationTables};
pub use self::server::{AuthConfig, ServerConfig};

use crate::config::helpers::{optional_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Default libSQL database file (`~/.lexcase/lexcase.db`).
pub fn default_libsql_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lexcase")
        .join("lexcase.db")
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub libsql_path: Option<PathBuf>,
    /// Remote primary for embedded replica mode.
    pub libsql_url: Option<String>,
    pub libsql_auth_token: Option<SecretString>,
}

impl DatabaseConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let libsql_path = optional_env("LIBSQL_PATH")?
            .or_else(|| settings.database.libsql_path.clone())
            .map(PathBuf::from);
        let libsql_url = optional_env("LIBSQL_URL")?.or_else(|| settings.database.libsql_url.clone());
        let libsql_auth_token = optional_env("LIBSQL_AUTH_TOKEN")?.map(SecretString::from);

        if let Some(url) = libsql_url.as_deref() {
            if !(url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidValue {
                    key: "LIBSQL_URL".to_string(),
                    message: format!("unsupported scheme in '{url}'"),
                });
            }
            if libsql_auth_token.is_none() {
                return Err(ConfigError::MissingRequired {
                    key: "LIBSQL_AUTH_TOKEN".to_string(),
                    hint: "required when LIBSQL_URL is set".to_string(),
                });
            }
        }

        Ok(Self {
            libsql_path,
            libsql_url,
            libsql_auth_token,
        })
    }

    /// Config for a local database file, used by tests and the CLI.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            libsql_path: Some(path.into()),
            libsql_url: None,
            libsql_auth_token: None,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub notifications: NotificationConfig,
    pub log_format: LogFormat,
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn resolve() -> Result<Self, ConfigError> {
        match parse_string_env("LOG_FORMAT", "pretty")?
            .to_ascii_lowercase()
            .as_str()
        {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                message: format!("unsupported format '{other}'"),
            }),
        }
    }
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(settings)?,
            server: ServerConfig::resolve(settings)?,
            auth: AuthConfig::resolve(settings)?,
            notifications: NotificationConfig::resolve(settings)?,
            log_format: LogFormat::resolve()?,
        })
    }

    /// Load `.env`, read settings, and resolve.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let settings = Settings::load()?;
        Self::resolve(&settings)
    }
}
