use std::net::{IpAddr, SocketAddr};

use crate::config::helpers::{optional_env, parse_csv, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Extra origins allowed by CORS in addition to the listener's own.
    pub cors_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let host_raw = parse_string_env("LEXCASE_HOST", settings.server.host.clone())?;
        let host = host_raw
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "LEXCASE_HOST".to_string(),
                message: format!("'{host_raw}' is not an IP address: {e}"),
            })?;

        let port = parse_u64_env("LEXCASE_PORT", u64::from(settings.server.port))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
            key: "LEXCASE_PORT".to_string(),
            message: format!("{port} is out of range"),
        })?;

        let cors_origins = match optional_env("LEXCASE_CORS_ORIGINS")? {
            Some(raw) => parse_csv(&raw),
            None => settings.server.cors_origins.clone(),
        };
        for origin in &cors_origins {
            validate_origin(origin)?;
        }

        let body_limit = parse_u64_env(
            "LEXCASE_BODY_LIMIT_BYTES",
            settings.server.body_limit_bytes as u64,
        )?;
        if body_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEXCASE_BODY_LIMIT_BYTES".to_string(),
                message: "body limit must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            body_limit_bytes: usize::try_from(body_limit).unwrap_or(usize::MAX),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    if origin.starts_with("http://") || origin.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "LEXCASE_CORS_ORIGINS".to_string(),
            message: format!("origin '{origin}' must start with http:// or https://"),
        })
    }
}

/// Session settings for the account endpoints.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_ttl_hours: u64,
}

impl AuthConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let session_ttl_hours =
            parse_u64_env("LEXCASE_SESSION_TTL_HOURS", settings.auth.session_ttl_hours)?;
        if session_ttl_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEXCASE_SESSION_TTL_HOURS".to_string(),
                message: "session lifetime must be at least one hour".to_string(),
            });
        }
        Ok(Self { session_ttl_hours })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;
    use crate::settings::Settings;

    #[test]
    fn server_resolve_uses_loopback_defaults() {
        let config = super::ServerConfig::resolve(&Settings::default()).expect("server config");
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3030");
        assert_eq!(config.body_limit_bytes, 1024 * 1024);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn server_resolve_rejects_non_ip_host() {
        let mut settings = Settings::default();
        settings.server.host = "localhost".to_string();

        let err = super::ServerConfig::resolve(&settings).expect_err("must reject hostname");
        let ConfigError::InvalidValue { key, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "LEXCASE_HOST");
    }

    #[test]
    fn server_resolve_rejects_bare_cors_origin() {
        let mut settings = Settings::default();
        settings.server.cors_origins = vec!["example.com".to_string()];

        let err = super::ServerConfig::resolve(&settings).expect_err("must reject origin");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "LEXCASE_CORS_ORIGINS");
        assert!(message.contains("http://"), "unexpected message: {message}");
    }

    #[test]
    fn auth_resolve_rejects_zero_ttl() {
        let mut settings = Settings::default();
        settings.auth.session_ttl_hours = 0;

        let err = super::AuthConfig::resolve(&settings).expect_err("must reject zero");
        let ConfigError::InvalidValue { key, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "LEXCASE_SESSION_TTL_HOURS");
    }
}
