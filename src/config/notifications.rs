use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::helpers::{parse_bool_env, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]{1,255}$").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Logical table names inside the single-table store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTables {
    pub notifications: String,
    pub types: String,
    pub priorities: String,
    pub channels: String,
    pub settings: String,
}

impl Default for NotificationTables {
    fn default() -> Self {
        Self {
            notifications: "notifications".to_string(),
            types: "notification_types".to_string(),
            priorities: "notification_priorities".to_string(),
            channels: "notification_channels".to_string(),
            settings: "notification_settings".to_string(),
        }
    }
}

/// Single-table notification service settings.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub tables: NotificationTables,
    pub ttl_days: u64,
    pub default_page_size: u64,
    /// Drop expired items before `serve` starts listening.
    pub purge_on_start: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            tables: NotificationTables::default(),
            ttl_days: 7,
            default_page_size: 20,
            purge_on_start: false,
        }
    }
}

fn validate_table_name(key: &str, raw: String) -> Result<String, ConfigError> {
    if TABLE_NAME.is_match(&raw) {
        Ok(raw)
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a valid table name"),
        })
    }
}

impl NotificationConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let file = &settings.notifications;
        let tables = NotificationTables {
            notifications: validate_table_name(
                "NOTIFICATIONS_TABLE",
                parse_string_env("NOTIFICATIONS_TABLE", file.notifications_table.clone())?,
            )?,
            types: validate_table_name(
                "NOTIFICATION_TYPES_TABLE",
                parse_string_env("NOTIFICATION_TYPES_TABLE", file.types_table.clone())?,
            )?,
            priorities: validate_table_name(
                "NOTIFICATION_PRIORITIES_TABLE",
                parse_string_env("NOTIFICATION_PRIORITIES_TABLE", file.priorities_table.clone())?,
            )?,
            channels: validate_table_name(
                "NOTIFICATION_CHANNELS_TABLE",
                parse_string_env("NOTIFICATION_CHANNELS_TABLE", file.channels_table.clone())?,
            )?,
            settings: validate_table_name(
                "NOTIFICATION_SETTINGS_TABLE",
                parse_string_env("NOTIFICATION_SETTINGS_TABLE", file.settings_table.clone())?,
            )?,
        };

        let distinct: HashSet<&str> = [
            tables.notifications.as_str(),
            tables.types.as_str(),
            tables.priorities.as_str(),
            tables.channels.as_str(),
            tables.settings.as_str(),
        ]
        .into_iter()
        .collect();
        if distinct.len() != 5 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFICATIONS_TABLE".to_string(),
                message: "notification table names must be distinct".to_string(),
            });
        }

        let ttl_days = parse_u64_env("NOTIFICATION_TTL_DAYS", file.ttl_days)?;
        if ttl_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFICATION_TTL_DAYS".to_string(),
                message: "ttl must be at least one day".to_string(),
            });
        }

        let default_page_size =
            parse_u64_env("NOTIFICATION_DEFAULT_PAGE_SIZE", file.default_page_size)?;
        if !(1..=100).contains(&default_page_size) {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFICATION_DEFAULT_PAGE_SIZE".to_string(),
                message: "page size must be between 1 and 100".to_string(),
            });
        }

        let purge_on_start =
            parse_bool_env("NOTIFICATION_PURGE_ON_START", file.purge_on_start)?;

        Ok(Self {
            tables,
            ttl_days,
            default_page_size,
            purge_on_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;
    use crate::settings::Settings;

    #[test]
    fn resolve_defaults_match_seven_day_ttl() {
        let config = super::NotificationConfig::resolve(&Settings::default()).expect("config");
        assert_eq!(config.ttl_days, 7);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.tables, super::NotificationTables::default());
    }

    #[test]
    fn resolve_rejects_shared_table_names() {
        let mut settings = Settings::default();
        settings.notifications.types_table = "notifications".to_string();

        let err = super::NotificationConfig::resolve(&settings).expect_err("must reject");
        let ConfigError::InvalidValue { message, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert!(message.contains("distinct"), "unexpected message: {message}");
    }

    #[test]
    fn resolve_rejects_table_names_with_spaces() {
        let mut settings = Settings::default();
        settings.notifications.channels_table = "bad name".to_string();

        let err = super::NotificationConfig::resolve(&settings).expect_err("must reject");
        let ConfigError::InvalidValue { key, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "NOTIFICATION_CHANNELS_TABLE");
    }

    #[test]
    fn resolve_rejects_zero_ttl() {
        let mut settings = Settings::default();
        settings.notifications.ttl_days = 0;

        let err = super::NotificationConfig::resolve(&settings).expect_err("must reject");
        let ConfigError::InvalidValue { key, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "NOTIFICATION_TTL_DAYS");
    }
}
