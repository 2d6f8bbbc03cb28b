//! Key-value notification service over HTTP.
//!
//! Every response uses the result envelope
//! `{ success, <entity>, nextToken?, totalCount? }` or
//! `{ success: false, error: { message, code } }`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::NotificationError;
use crate::notifications::model::{
    ChannelFilter, CreateNotificationChannelInput, CreateNotificationInput,
    CreateNotificationPriorityInput, CreateNotificationTypeInput, CreateSettingsInput, Listing,
    NotificationFilter, PriorityFilter, SettingsPatch, TypeFilter, UpdateNotificationChannelInput,
    UpdateNotificationInput, UpdateNotificationPriorityInput, UpdateNotificationTypeInput,
};
use crate::web::server::AppState;

/// Successful result envelope.
pub struct Envelope {
    status: StatusCode,
    body: Map<String, Value>,
}

impl Envelope {
    fn with<T: Serialize>(key: &str, value: &T) -> Result<Self, NotificationError> {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        body.insert(key.into(), encode(value)?);
        Ok(Self {
            status: StatusCode::OK,
            body,
        })
    }

    fn listing<T: Serialize>(key: &str, listing: &Listing<T>) -> Result<Self, NotificationError> {
        let mut envelope = Self::with(key, &listing.items)?;
        envelope
            .body
            .insert("nextToken".into(), encode(&listing.next_token)?);
        envelope
            .body
            .insert("totalCount".into(), Value::from(listing.total_count));
        Ok(envelope)
    }

    fn done() -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn created(mut self) -> Self {
        self.status = StatusCode::CREATED;
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, NotificationError> {
    serde_json::to_value(value).map_err(|e| NotificationError::Storage(e.to_string()))
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message.clone()),
            Self::Storage(cause) => {
                tracing::error!(%cause, "notification storage failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "Notification storage is unavailable".to_string(),
                )
            }
        };
        let body = json!({
            "success": false,
            "error": { "message": message, "code": self.code() },
        });
        (status, Json(body)).into_response()
    }
}

type EnvelopeResult = Result<Envelope, NotificationError>;

/// JSON body whose rejection is reported inside the envelope.
pub struct Input<T>(pub T);

impl<S, T> FromRequest<S> for Input<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = NotificationError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(NotificationError::PayloadTooLarge(rejection.body_text()))
            }
            Err(rejection) => Err(NotificationError::Validation(rejection.body_text())),
        }
    }
}

/// Query string whose rejection is reported inside the envelope.
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = NotificationError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(NotificationError::Validation(rejection.body_text())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub search_term: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

// --- Notifications ---

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateNotificationInput>,
) -> EnvelopeResult {
    let notification = state.notifications.create(input).await?;
    Ok(Envelope::with("notification", &notification)?.created())
}

pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateNotificationInput>,
) -> EnvelopeResult {
    let notification = state.notifications.send(input).await?;
    Ok(Envelope::with("notification", &notification)?.created())
}

pub async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateNotificationInput>,
) -> EnvelopeResult {
    let notification = state.notifications.schedule(input).await?;
    Ok(Envelope::with("notification", &notification)?.created())
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Params(filter): Params<NotificationFilter>,
) -> EnvelopeResult {
    let listing = state.notifications.list(&filter).await?;
    Envelope::listing("notifications", &listing)
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Params(params): Params<SearchParams>,
) -> EnvelopeResult {
    let listing = state
        .notifications
        .search(
            params.search_term.as_deref().unwrap_or_default(),
            params.user_id,
            params.limit,
            params.next_token,
        )
        .await?;
    Envelope::listing("notifications", &listing)
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("notification", &state.notifications.get(&id).await?)
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Input(input): Input<UpdateNotificationInput>,
) -> EnvelopeResult {
    Envelope::with("notification", &state.notifications.update(&id, input).await?)
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    state.notifications.delete(&id).await?;
    Ok(Envelope::done())
}

pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("notification", &state.notifications.mark_read(&id).await?)
}

pub async fn mark_unread_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("notification", &state.notifications.mark_unread(&id).await?)
}

pub async fn archive_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("notification", &state.notifications.archive(&id).await?)
}

pub async fn unarchive_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("notification", &state.notifications.unarchive(&id).await?)
}

// --- Per-user views ---

pub async fn user_list_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Params(page): Params<PageParams>,
) -> EnvelopeResult {
    let listing = state
        .notifications
        .list_user(&user_id, page.limit, page.next_token)
        .await?;
    Envelope::listing("notifications", &listing)
}

pub async fn user_unread_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Params(page): Params<PageParams>,
) -> EnvelopeResult {
    let listing = state
        .notifications
        .list_unread(&user_id, page.limit, page.next_token)
        .await?;
    Envelope::listing("notifications", &listing)
}

pub async fn user_archived_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Params(page): Params<PageParams>,
) -> EnvelopeResult {
    let listing = state
        .notifications
        .list_archived(&user_id, page.limit, page.next_token)
        .await?;
    Envelope::listing("notifications", &listing)
}

pub async fn user_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("stats", &state.notifications.stats(&user_id).await?)
}

pub async fn user_read_all_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> EnvelopeResult {
    let result = state.notifications.mark_all_read(&user_id).await?;
    Envelope::with("result", &result)
}

pub async fn user_archive_all_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> EnvelopeResult {
    let result = state.notifications.archive_all(&user_id).await?;
    Envelope::with("result", &result)
}

// --- Types ---

pub async fn types_create_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateNotificationTypeInput>,
) -> EnvelopeResult {
    let created = state.notifications.create_type(input).await?;
    Ok(Envelope::with("notificationType", &created)?.created())
}

pub async fn types_list_handler(
    State(state): State<Arc<AppState>>,
    Params(filter): Params<TypeFilter>,
) -> EnvelopeResult {
    let listing = state.notifications.list_types(&filter).await?;
    Envelope::listing("notificationTypes", &listing)
}

pub async fn types_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    Envelope::with("notificationType", &state.notifications.get_type(&id).await?)
}

pub async fn types_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Input(input): Input<UpdateNotificationTypeInput>,
) -> EnvelopeResult {
    let updated = state.notifications.update_type(&id, input).await?;
    Envelope::with("notificationType", &updated)
}

pub async fn types_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    state.notifications.delete_type(&id).await?;
    Ok(Envelope::done())
}

pub async fn types_activate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    let updated = state.notifications.activate_type(&id).await?;
    Envelope::with("notificationType", &updated)
}

pub async fn types_deactivate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    let updated = state.notifications.deactivate_type(&id).await?;
    Envelope::with("notificationType", &updated)
}

// --- Priorities ---

pub async fn priorities_create_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateNotificationPriorityInput>,
) -> EnvelopeResult {
    let created = state.notifications.create_priority(input).await?;
    Ok(Envelope::with("notificationPriority", &created)?.created())
}

pub async fn priorities_list_handler(
    State(state): State<Arc<AppState>>,
    Params(filter): Params<PriorityFilter>,
) -> EnvelopeResult {
    let listing = state.notifications.list_priorities(&filter).await?;
    Envelope::listing("notificationPriorities", &listing)
}

pub async fn priorities_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    let priority = state.notifications.get_priority(&id).await?;
    Envelope::with("notificationPriority", &priority)
}

pub async fn priorities_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Input(input): Input<UpdateNotificationPriorityInput>,
) -> EnvelopeResult {
    let updated = state.notifications.update_priority(&id, input).await?;
    Envelope::with("notificationPriority", &updated)
}

pub async fn priorities_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    state.notifications.delete_priority(&id).await?;
    Ok(Envelope::done())
}

// --- Channels ---

pub async fn channels_create_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateNotificationChannelInput>,
) -> EnvelopeResult {
    let created = state.notifications.create_channel(input).await?;
    Ok(Envelope::with("notificationChannel", &created)?.created())
}

pub async fn channels_list_handler(
    State(state): State<Arc<AppState>>,
    Params(filter): Params<ChannelFilter>,
) -> EnvelopeResult {
    let listing = state.notifications.list_channels(&filter).await?;
    Envelope::listing("notificationChannels", &listing)
}

pub async fn channels_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    let channel = state.notifications.get_channel(&id).await?;
    Envelope::with("notificationChannel", &channel)
}

pub async fn channels_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Input(input): Input<UpdateNotificationChannelInput>,
) -> EnvelopeResult {
    let updated = state.notifications.update_channel(&id, input).await?;
    Envelope::with("notificationChannel", &updated)
}

pub async fn channels_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    state.notifications.delete_channel(&id).await?;
    Ok(Envelope::done())
}

pub async fn channels_enable_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    let updated = state.notifications.enable_channel(&id).await?;
    Envelope::with("notificationChannel", &updated)
}

pub async fn channels_disable_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EnvelopeResult {
    let updated = state.notifications.disable_channel(&id).await?;
    Envelope::with("notificationChannel", &updated)
}

// --- Settings ---

pub async fn settings_create_handler(
    State(state): State<Arc<AppState>>,
    Input(input): Input<CreateSettingsInput>,
) -> EnvelopeResult {
    let settings = state.notifications.create_settings(input).await?;
    Ok(Envelope::with("notificationSettings", &settings)?.created())
}

pub async fn settings_get_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> EnvelopeResult {
    let settings = state.notifications.get_settings(&user_id).await?;
    Envelope::with("notificationSettings", &settings)
}

/// Patch existing settings; 404 when the user has none.
pub async fn settings_patch_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Input(patch): Input<SettingsPatch>,
) -> EnvelopeResult {
    let settings = state.notifications.update_settings(&user_id, patch).await?;
    Envelope::with("notificationSettings", &settings)
}

/// Patch settings, creating them with defaults when missing.
pub async fn settings_put_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Input(patch): Input<SettingsPatch>,
) -> EnvelopeResult {
    let settings = state
        .notifications
        .update_settings_for_user(&user_id, patch)
        .await?;
    Envelope::with("notificationSettings", &settings)
}

pub async fn settings_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> EnvelopeResult {
    state.notifications.delete_settings(&user_id).await?;
    Ok(Envelope::done())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn errors_carry_code_and_status() {
        let response = NotificationError::NotFound {
            entity: "Notification",
            id: "n1".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn storage_errors_hide_the_cause() {
        let response = NotificationError::Storage("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "STORAGE_ERROR");
        assert!(
            !body["error"]["message"]
                .as_str()
                .unwrap_or_default()
                .contains("disk")
        );
    }

    #[tokio::test]
    async fn listing_envelope_has_token_and_count() {
        let listing = Listing {
            items: vec![1, 2],
            next_token: Some("t".to_string()),
            total_count: 2,
        };
        let response = Envelope::listing("notifications", &listing)
            .expect("envelope")
            .into_response();
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({"success": true, "notifications": [1, 2], "nextToken": "t", "totalCount": 2})
        );
    }
}
