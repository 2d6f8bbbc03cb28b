//! End-to-end tests for the notification endpoints and their result
//! envelopes, run against the in-memory key-value table.

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tempfile::TempDir;

use lexcase::config::{
    AuthConfig, Config, DatabaseConfig, LogFormat, NotificationConfig, ServerConfig,
};
use lexcase::db::{Database, connect_libsql};
use lexcase::legal::timesheet::TimerRegistry;
use lexcase::notifications::MemoryTable;
use lexcase::web::{AppState, start_server};

async fn start_test_server() -> (String, TempDir) {
    let tmpdir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        database: DatabaseConfig::local(tmpdir.path().join("lexcase.db")),
        server: ServerConfig {
            host: "127.0.0.1".parse().expect("ip"),
            port: 0,
            cors_origins: Vec::new(),
            body_limit_bytes: 1024 * 1024,
        },
        auth: AuthConfig::default(),
        notifications: NotificationConfig::default(),
        log_format: LogFormat::Pretty,
    };
    let backend = connect_libsql(&config.database)
        .await
        .expect("database should open");
    let db: Arc<dyn Database> = Arc::new(backend);
    let state = Arc::new(AppState::new(
        db,
        Arc::new(MemoryTable::new()),
        Arc::new(TimerRegistry::new()),
        &config,
    ));
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let bound = start_server(addr, state)
        .await
        .expect("Failed to start test server");
    (format!("http://{bound}"), tmpdir)
}

async fn call(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let response = request.send().await.expect("request");
    let status = response.status();
    let body = response.json::<Value>().await.expect("json body");
    (status, body)
}

fn notification(user: &str, title: &str) -> Value {
    json!({
        "userId": user,
        "typeId": "case-update",
        "priorityId": "high",
        "title": title,
        "message": format!("{title} body"),
        "channels": ["in_app"]
    })
}

#[tokio::test]
async fn create_read_and_list_by_read_state() {
    let (base, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, created) = call(
        client
            .post(format!("{base}/api/notifications"))
            .json(&notification("user-1", "Hearing moved")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["success"], true);
    let id = created["notification"]["id"].as_str().expect("id").to_string();
    assert_eq!(created["notification"]["isRead"], false);
    assert!(created["notification"]["ttl"].as_i64().is_some());

    let (status, read) = call(client.post(format!("{base}/api/notifications/{id}/read"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["notification"]["isRead"], true);
    assert!(read["notification"]["readAt"].is_string());

    let (_, read_list) = call(client.get(format!("{base}/api/notifications?isRead=true"))).await;
    assert_eq!(read_list["totalCount"], 1);
    assert_eq!(read_list["notifications"][0]["id"], id.as_str());

    let (_, unread_list) =
        call(client.get(format!("{base}/api/notifications?isRead=false"))).await;
    assert_eq!(unread_list["totalCount"], 0);
}

#[tokio::test]
async fn validation_and_not_found_use_the_error_envelope() {
    let (base, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = call(
        client
            .post(format!("{base}/api/notifications"))
            .json(&json!({"userId": "user-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = call(client.get(format!("{base}/api/notifications/missing"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = call(
        client
            .post(format!("{base}/api/notifications/schedule"))
            .json(&notification("user-1", "Reminder")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "scheduledAt is required");
}

#[tokio::test]
async fn user_views_and_bulk_operations() {
    let (base, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();
    for title in ["First", "Second", "Third"] {
        let (status, _) = call(
            client
                .post(format!("{base}/api/notifications/send"))
                .json(&notification("user-2", title)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    call(
        client
            .post(format!("{base}/api/notifications"))
            .json(&notification("someone-else", "Other")),
    )
    .await;

    let (_, page) = call(client.get(format!(
        "{base}/api/notifications/users/user-2?limit=2"
    )))
    .await;
    assert_eq!(page["notifications"].as_array().map(Vec::len), Some(2));
    let token = page["nextToken"].as_str().expect("next token").to_string();
    let (_, rest) = call(
        client
            .get(format!("{base}/api/notifications/users/user-2"))
            .query(&[("limit", "2"), ("nextToken", token.as_str())]),
    )
    .await;
    assert_eq!(rest["notifications"].as_array().map(Vec::len), Some(1));

    let (status, bulk) = call(client.post(format!(
        "{base}/api/notifications/users/user-2/read-all"
    )))
    .await;
    assert_eq!(status, StatusCode::OK, "{bulk}");
    assert_eq!(bulk["result"]["updated"], 3);

    let (_, unread) = call(client.get(format!(
        "{base}/api/notifications/users/user-2/unread"
    )))
    .await;
    assert_eq!(unread["totalCount"], 0);

    let (_, archived) = call(client.post(format!(
        "{base}/api/notifications/users/user-2/archive-all"
    )))
    .await;
    assert_eq!(archived["result"]["updated"], 3);

    let (_, stats) = call(client.get(format!(
        "{base}/api/notifications/users/user-2/stats"
    )))
    .await;
    assert_eq!(stats["stats"]["total"], 3);
    assert_eq!(stats["stats"]["archived"], 3);
    assert_eq!(stats["stats"]["unread"], 0);

    let (_, found) = call(
        client
            .get(format!("{base}/api/notifications/search"))
            .query(&[("searchTerm", "SECOND")]),
    )
    .await;
    assert_eq!(found["notifications"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn types_channels_and_settings() {
    let (base, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, created) = call(
        client
            .post(format!("{base}/api/notifications/types"))
            .json(&json!({"name": "Deadline", "category": "calendar"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let type_id = created["notificationType"]["id"]
        .as_str()
        .expect("id")
        .to_string();
    assert_eq!(created["notificationType"]["isActive"], true);

    let (_, deactivated) = call(client.post(format!(
        "{base}/api/notifications/types/{type_id}/deactivate"
    )))
    .await;
    assert_eq!(deactivated["notificationType"]["isActive"], false);

    let (status, channel) = call(
        client
            .post(format!("{base}/api/notifications/channels"))
            .json(&json!({"name": "Email", "type": "email"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{channel}");
    let channel_id = channel["notificationChannel"]["id"]
        .as_str()
        .expect("id")
        .to_string();
    let (_, disabled) = call(client.post(format!(
        "{base}/api/notifications/channels/{channel_id}/disable"
    )))
    .await;
    assert_eq!(disabled["notificationChannel"]["isEnabled"], false);

    // PATCH needs existing settings; PUT creates them.
    let (status, _) = call(
        client
            .patch(format!("{base}/api/notifications/settings/user-3"))
            .json(&json!({"smsEnabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, settings) = call(
        client
            .put(format!("{base}/api/notifications/settings/user-3"))
            .json(&json!({"smsEnabled": true, "phoneNumber": "+81-3-0000-0000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{settings}");
    assert_eq!(settings["notificationSettings"]["smsEnabled"], true);

    let (status, duplicate) = call(
        client
            .post(format!("{base}/api/notifications/settings"))
            .json(&json!({"userId": "user-3"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{duplicate}");

    let (status, cleared) = call(
        client
            .patch(format!("{base}/api/notifications/settings/user-3"))
            .json(&json!({"phoneNumber": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["notificationSettings"]["phoneNumber"], Value::Null);
    assert_eq!(cleared["notificationSettings"]["smsEnabled"], true);
}
