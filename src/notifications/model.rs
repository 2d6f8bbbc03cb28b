//! Notification entities as stored in item attributes and returned by the
//! service. Field names are camelCase on the wire and in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::notifications::table::BatchOutcome;

/// Distinguish an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub type_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub is_archived: bool,
    pub priority_id: String,
    #[serde(default)]
    pub channels: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateNotificationInput {
    pub user_id: String,
    pub type_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub priority_id: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationInput {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub data: Option<Option<serde_json::Value>>,
    pub priority_id: Option<String>,
    pub channels: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

/// Filters for listing notifications. Which index serves the query is
/// decided by the first of `user_id`, `type_id`, `priority_id`, `is_read`
/// that is set; everything else is applied as a filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    pub user_id: Option<String>,
    pub type_id: Option<String>,
    pub priority_id: Option<String>,
    pub is_read: Option<bool>,
    pub is_archived: Option<bool>,
    pub channel: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search_term: Option<String>,
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationType {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub template: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateNotificationTypeInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationTypeInput {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub template: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeFilter {
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub search_term: Option<String>,
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPriority {
    pub id: String,
    pub name: String,
    pub level: i64,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateNotificationPriorityInput {
    pub name: String,
    pub level: i64,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationPriorityInput {
    pub name: Option<String>,
    pub level: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityFilter {
    pub level: Option<i64>,
    pub search_term: Option<String>,
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub is_enabled: bool,
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateNotificationChannelInput {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationChannelInput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub channel_type: Option<String>,
    pub is_enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub config: Option<Option<serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFilter {
    #[serde(rename = "type")]
    pub channel_type: Option<String>,
    pub is_enabled: Option<bool>,
    pub search_term: Option<String>,
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

/// Per-user delivery preferences, keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub id: String,
    pub user_id: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub line_enabled: bool,
    pub in_app_enabled: bool,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub line_user_id: Option<String>,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub timezone: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationSettings {
    pub fn defaults(id: String, user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            email_enabled: true,
            sms_enabled: false,
            push_enabled: true,
            line_enabled: false,
            in_app_enabled: true,
            email_address: None,
            phone_number: None,
            line_user_id: None,
            quiet_hours_start: None,
            quiet_hours_end: None,
            timezone: "UTC".to_string(),
            language: "en".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.email_enabled {
            self.email_enabled = v;
        }
        if let Some(v) = patch.sms_enabled {
            self.sms_enabled = v;
        }
        if let Some(v) = patch.push_enabled {
            self.push_enabled = v;
        }
        if let Some(v) = patch.line_enabled {
            self.line_enabled = v;
        }
        if let Some(v) = patch.in_app_enabled {
            self.in_app_enabled = v;
        }
        if let Some(v) = &patch.email_address {
            self.email_address = v.clone();
        }
        if let Some(v) = &patch.phone_number {
            self.phone_number = v.clone();
        }
        if let Some(v) = &patch.line_user_id {
            self.line_user_id = v.clone();
        }
        if let Some(v) = &patch.quiet_hours_start {
            self.quiet_hours_start = v.clone();
        }
        if let Some(v) = &patch.quiet_hours_end {
            self.quiet_hours_end = v.clone();
        }
        if let Some(v) = &patch.timezone {
            self.timezone = v.clone();
        }
        if let Some(v) = &patch.language {
            self.language = v.clone();
        }
    }
}

/// Partial settings; used both for creation (unset fields take defaults)
/// and for updates (unset fields are kept).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub line_enabled: Option<bool>,
    pub in_app_enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub email_address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub line_user_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub quiet_hours_start: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub quiet_hours_end: Option<Option<String>>,
    pub timezone: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSettingsInput {
    pub user_id: String,
    #[serde(flatten)]
    pub settings: SettingsPatch,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub type_id: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityCount {
    pub priority_id: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCount {
    pub channel: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
    pub archived: u64,
    pub by_type: Vec<TypeCount>,
    pub by_priority: Vec<PriorityCount>,
    pub by_channel: Vec<ChannelCount>,
}

/// Result of mark-all-read / archive-all.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<BatchOutcome>,
}

impl BulkResult {
    pub fn from_outcomes(outcomes: Vec<BatchOutcome>) -> Self {
        let mut result = Self::default();
        for outcome in &outcomes {
            match outcome.status {
                crate::notifications::table::BatchStatus::Updated => result.updated += 1,
                crate::notifications::table::BatchStatus::Skipped => result.skipped += 1,
                crate::notifications::table::BatchStatus::Failed { .. } => result.failed += 1,
            }
        }
        result.outcomes = outcomes;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_null_clears_absent_keeps() {
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"emailAddress": null, "smsEnabled": true}"#).expect("json");
        assert_eq!(patch.email_address, Some(None));
        assert_eq!(patch.phone_number, None);
        assert_eq!(patch.sms_enabled, Some(true));
    }

    #[test]
    fn settings_defaults_and_patch() {
        let now = Utc::now();
        let mut settings = NotificationSettings::defaults("s1".into(), "u1".into(), now);
        assert!(settings.email_enabled && settings.push_enabled && settings.in_app_enabled);
        assert!(!settings.sms_enabled && !settings.line_enabled);
        assert_eq!(settings.timezone, "UTC");
        assert_eq!(settings.language, "en");

        settings.apply(&SettingsPatch {
            line_enabled: Some(true),
            email_address: Some(Some("a@b.co".into())),
            language: Some("ja".into()),
            ..Default::default()
        });
        assert!(settings.line_enabled);
        assert_eq!(settings.email_address.as_deref(), Some("a@b.co"));
        assert_eq!(settings.language, "ja");
        assert!(settings.email_enabled);
    }

    #[test]
    fn channel_type_is_named_type_on_the_wire() {
        let input: CreateNotificationChannelInput =
            serde_json::from_str(r#"{"name": "Email", "type": "email"}"#).expect("json");
        assert_eq!(input.channel_type, "email");
        assert_eq!(input.is_enabled, None);
    }
}
