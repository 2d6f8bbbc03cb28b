//! HTTP server: shared state, route table and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::middleware;
use axum::routing::{get, post};
use tokio::sync::{RwLock, oneshot};
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::accounts::AccountService;
use crate::config::{Config, ServerConfig};
use crate::db::Database;
use crate::error::ServerError;
use crate::legal::timesheet::TimerRegistry;
use crate::notifications::{KeyValueTable, NotificationService};
use crate::web::auth::require_session;
use crate::web::handlers::accounts::*;
use crate::web::handlers::case_records::*;
use crate::web::handlers::cases::*;
use crate::web::handlers::courts::*;
use crate::web::handlers::documents::*;
use crate::web::handlers::firms::*;
use crate::web::handlers::health_handler;
use crate::web::handlers::hearings::*;
use crate::web::handlers::notices::*;
use crate::web::handlers::notifications as notify;
use crate::web::handlers::parties::*;
use crate::web::handlers::timesheet::*;
use crate::web::handlers::workflow::*;

/// Shared state for all handlers.
pub struct AppState {
    /// Relational store for cases, parties, courts and the rest.
    pub db: Arc<dyn Database>,
    pub accounts: AccountService,
    /// Single-table notification service.
    pub notifications: NotificationService,
    /// In-memory work timers.
    pub timers: Arc<TimerRegistry>,
    pub server: ServerConfig,
    /// Shutdown signal sender.
    pub shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn Database>,
        table: Arc<dyn KeyValueTable>,
        timers: Arc<TimerRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            accounts: AccountService::new(Arc::clone(&db), &config.auth),
            notifications: NotificationService::new(table, &config.notifications),
            db,
            timers,
            server: config.server.clone(),
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Signal a running server to stop accepting connections.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health_handler))
        // Accounts
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        // Workflow
        .route(
            "/api/case-categories",
            get(categories_list_handler).post(categories_create_handler),
        )
        .route("/api/case-categories/tree", get(categories_tree_handler))
        .route(
            "/api/case-categories/{id}",
            get(categories_get_handler)
                .put(categories_update_handler)
                .delete(categories_delete_handler),
        )
        .route(
            "/api/case-categories/{id}/phases",
            get(category_phases_list_handler).post(category_phases_create_handler),
        )
        .route(
            "/api/case-phases/{id}",
            get(phases_get_handler)
                .put(phases_update_handler)
                .delete(phases_delete_handler),
        )
        .route(
            "/api/task-templates",
            get(task_templates_list_handler).post(task_templates_create_handler),
        )
        .route(
            "/api/task-templates/{id}",
            get(task_templates_get_handler)
                .put(task_templates_update_handler)
                .delete(task_templates_delete_handler),
        )
        .route(
            "/api/task-templates/{id}/items",
            post(template_items_create_handler),
        )
        .route(
            "/api/task-template-items/{id}",
            get(template_items_get_handler)
                .put(template_items_update_handler)
                .delete(template_items_delete_handler),
        )
        .route(
            "/api/phase-transition-rules",
            get(rules_list_handler).post(rules_create_handler),
        )
        .route(
            "/api/phase-transition-rules/{id}",
            get(rules_get_handler)
                .put(rules_update_handler)
                .delete(rules_delete_handler),
        )
        // Cases
        .route(
            "/api/cases",
            get(cases_list_handler).post(cases_create_handler),
        )
        .route(
            "/api/cases/{id}",
            get(cases_get_handler)
                .put(cases_update_handler)
                .delete(cases_delete_handler),
        )
        .route(
            "/api/cases/{id}/parties",
            get(case_parties_list_handler).post(case_parties_add_handler),
        )
        .route(
            "/api/cases/{id}/parties/{party_id}/{role}",
            axum::routing::delete(case_parties_remove_handler),
        )
        .route(
            "/api/cases/{id}/assignments",
            get(case_assignments_list_handler).post(case_assignments_create_handler),
        )
        .route(
            "/api/cases/{id}/assignments/{user_id}",
            axum::routing::delete(case_assignments_delete_handler),
        )
        .route(
            "/api/cases/{id}/tasks",
            get(case_tasks_list_handler).post(case_tasks_create_handler),
        )
        .route(
            "/api/cases/{id}/events",
            get(case_events_list_handler).post(case_events_create_handler),
        )
        .route(
            "/api/cases/{id}/events/{event_id}",
            axum::routing::delete(case_events_delete_handler),
        )
        .route(
            "/api/cases/{id}/memos",
            get(case_memos_list_handler).post(case_memos_create_handler),
        )
        .route(
            "/api/cases/{id}/memos/{memo_id}",
            axum::routing::delete(case_memos_delete_handler),
        )
        .route(
            "/api/cases/{id}/expenses",
            get(case_expenses_list_handler).post(case_expenses_create_handler),
        )
        .route(
            "/api/cases/{id}/expenses/{entry_id}",
            axum::routing::delete(case_expenses_delete_handler),
        )
        .route(
            "/api/cases/{id}/deposits",
            get(case_deposits_list_handler).post(case_deposits_create_handler),
        )
        .route(
            "/api/cases/{id}/deposits/{entry_id}",
            axum::routing::delete(case_deposits_delete_handler),
        )
        .route("/api/cases/{id}/ledger", get(case_ledger_handler))
        .route(
            "/api/cases/{id}/events/{event_id}/hearing-report",
            get(event_hearing_report_get_handler).post(event_hearing_report_create_handler),
        )
        .route(
            "/api/cases/{id}/hearing-reports",
            get(case_hearing_reports_list_handler),
        )
        .route(
            "/api/cases/{id}/submitted-documents",
            get(case_submitted_documents_handler),
        )
        .route(
            "/api/hearing-reports/{id}",
            get(hearing_reports_get_handler)
                .put(hearing_reports_update_handler)
                .delete(hearing_reports_delete_handler),
        )
        .route(
            "/api/hearing-reports/{id}/documents",
            get(report_documents_list_handler).post(report_documents_create_handler),
        )
        .route(
            "/api/submitted-documents/{id}",
            get(submitted_documents_get_handler)
                .put(submitted_documents_update_handler)
                .delete(submitted_documents_delete_handler),
        )
        .route(
            "/api/cases/{id}/phase-transition",
            post(case_phase_transition_handler),
        )
        .route(
            "/api/cases/{id}/phase-history",
            get(case_phase_history_handler),
        )
        .route("/api/cases/{id}/timesheet/stats", get(case_stats_handler))
        .route(
            "/api/cases/{id}/generate-document",
            post(generate_document_handler),
        )
        .route(
            "/api/tasks/{id}",
            get(tasks_get_handler)
                .put(tasks_update_handler)
                .delete(tasks_delete_handler),
        )
        // Parties
        .route(
            "/api/parties",
            get(parties_list_handler).post(parties_create_handler),
        )
        .route(
            "/api/parties/{id}",
            get(parties_get_handler)
                .put(parties_update_handler)
                .delete(parties_delete_handler),
        )
        .route(
            "/api/parties/{id}/individual-profile",
            get(individual_profile_get_handler)
                .put(individual_profile_put_handler)
                .delete(individual_profile_delete_handler),
        )
        .route(
            "/api/parties/{id}/corporate-profile",
            get(corporate_profile_get_handler)
                .put(corporate_profile_put_handler)
                .delete(corporate_profile_delete_handler),
        )
        // Courts
        .route(
            "/api/courthouses",
            get(courthouses_list_handler).post(courthouses_create_handler),
        )
        .route(
            "/api/courthouses/{id}",
            get(courthouses_get_handler)
                .put(courthouses_update_handler)
                .delete(courthouses_delete_handler),
        )
        .route(
            "/api/courthouses/{id}/divisions",
            get(divisions_list_handler).post(divisions_create_handler),
        )
        .route(
            "/api/courthouses/{id}/personnel",
            get(personnel_list_handler).post(personnel_create_handler),
        )
        .route(
            "/api/jurisdiction-rules",
            get(jurisdiction_rules_list_handler).post(jurisdiction_rules_create_handler),
        )
        .route(
            "/api/jurisdiction-rules/{id}",
            get(jurisdiction_rules_get_handler)
                .put(jurisdiction_rules_update_handler)
                .delete(jurisdiction_rules_delete_handler),
        )
        // Firms and lawyers
        .route(
            "/api/law-firms",
            get(law_firms_list_handler).post(law_firms_create_handler),
        )
        .route(
            "/api/law-firms/{id}",
            get(law_firms_get_handler)
                .put(law_firms_update_handler)
                .delete(law_firms_delete_handler),
        )
        .route(
            "/api/law-firms/{id}/offices",
            get(offices_list_handler).post(offices_create_handler),
        )
        .route(
            "/api/law-firms/{id}/offices/{office_id}",
            axum::routing::put(offices_update_handler).delete(offices_delete_handler),
        )
        .route(
            "/api/lawyers",
            get(lawyers_list_handler).post(lawyers_create_handler),
        )
        .route(
            "/api/lawyers/{id}",
            get(lawyers_get_handler)
                .put(lawyers_update_handler)
                .delete(lawyers_delete_handler),
        )
        // Documents
        .route(
            "/api/document-templates",
            get(document_templates_list_handler).post(document_templates_create_handler),
        )
        .route(
            "/api/document-templates/{id}",
            get(document_templates_get_handler)
                .put(document_templates_update_handler)
                .delete(document_templates_delete_handler),
        )
}

fn notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/notifications",
            get(notify::list_handler).post(notify::create_handler),
        )
        .route("/api/notifications/search", get(notify::search_handler))
        .route("/api/notifications/send", post(notify::send_handler))
        .route("/api/notifications/schedule", post(notify::schedule_handler))
        .route(
            "/api/notifications/{id}",
            get(notify::get_handler)
                .put(notify::update_handler)
                .delete(notify::delete_handler),
        )
        .route("/api/notifications/{id}/read", post(notify::mark_read_handler))
        .route(
            "/api/notifications/{id}/unread",
            post(notify::mark_unread_handler),
        )
        .route("/api/notifications/{id}/archive", post(notify::archive_handler))
        .route(
            "/api/notifications/{id}/unarchive",
            post(notify::unarchive_handler),
        )
        // Per user
        .route(
            "/api/notifications/users/{user_id}",
            get(notify::user_list_handler),
        )
        .route(
            "/api/notifications/users/{user_id}/unread",
            get(notify::user_unread_handler),
        )
        .route(
            "/api/notifications/users/{user_id}/archived",
            get(notify::user_archived_handler),
        )
        .route(
            "/api/notifications/users/{user_id}/stats",
            get(notify::user_stats_handler),
        )
        .route(
            "/api/notifications/users/{user_id}/read-all",
            post(notify::user_read_all_handler),
        )
        .route(
            "/api/notifications/users/{user_id}/archive-all",
            post(notify::user_archive_all_handler),
        )
        // Types
        .route(
            "/api/notifications/types",
            get(notify::types_list_handler).post(notify::types_create_handler),
        )
        .route(
            "/api/notifications/types/{id}",
            get(notify::types_get_handler)
                .put(notify::types_update_handler)
                .delete(notify::types_delete_handler),
        )
        .route(
            "/api/notifications/types/{id}/activate",
            post(notify::types_activate_handler),
        )
        .route(
            "/api/notifications/types/{id}/deactivate",
            post(notify::types_deactivate_handler),
        )
        // Priorities
        .route(
            "/api/notifications/priorities",
            get(notify::priorities_list_handler).post(notify::priorities_create_handler),
        )
        .route(
            "/api/notifications/priorities/{id}",
            get(notify::priorities_get_handler)
                .put(notify::priorities_update_handler)
                .delete(notify::priorities_delete_handler),
        )
        // Channels
        .route(
            "/api/notifications/channels",
            get(notify::channels_list_handler).post(notify::channels_create_handler),
        )
        .route(
            "/api/notifications/channels/{id}",
            get(notify::channels_get_handler)
                .put(notify::channels_update_handler)
                .delete(notify::channels_delete_handler),
        )
        .route(
            "/api/notifications/channels/{id}/enable",
            post(notify::channels_enable_handler),
        )
        .route(
            "/api/notifications/channels/{id}/disable",
            post(notify::channels_disable_handler),
        )
        // Settings
        .route(
            "/api/notifications/settings",
            post(notify::settings_create_handler),
        )
        .route(
            "/api/notifications/settings/{user_id}",
            get(notify::settings_get_handler)
                .patch(notify::settings_patch_handler)
                .put(notify::settings_put_handler)
                .delete(notify::settings_delete_handler),
        )
}

fn protected_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/me", get(me_handler))
        .route("/api/users/me/notices", get(notices_list_handler))
        .route(
            "/api/users/me/notices/read",
            axum::routing::delete(notices_delete_read_handler),
        )
        .route(
            "/api/users/me/notices/read-all",
            post(notices_read_all_handler),
        )
        .route(
            "/api/users/me/notices/{id}/read",
            post(notices_read_handler),
        )
        // Timesheet
        .route(
            "/api/timesheet-entries",
            get(entries_list_handler).post(entries_create_handler),
        )
        .route(
            "/api/timesheet-entries/{id}",
            get(entries_get_handler)
                .put(entries_update_handler)
                .delete(entries_delete_handler),
        )
        .route("/api/timesheet/stats", get(user_stats_handler))
        // Timers
        .route("/api/tasks/{id}/timer/start", post(task_timer_start_handler))
        .route("/api/timers", get(timers_list_handler))
        .route("/api/timers/{id}", get(timers_get_handler))
        .route("/api/timers/{id}/pause", post(timers_pause_handler))
        .route("/api/timers/{id}/resume", post(timers_resume_handler))
        .route("/api/timers/{id}/stop", post(timers_stop_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(state),
            require_session,
        ))
}

fn cors_layer(addr: SocketAddr, config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://{}:{}", addr.ip(), addr.port()),
        format!("http://localhost:{}", addr.port()),
    ]
    .into_iter()
    .chain(config.cors_origins.iter().cloned())
    .filter_map(|origin| origin.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]))
}

/// Build the full application router.
pub fn router(state: Arc<AppState>, addr: SocketAddr) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(notification_routes())
        .merge(protected_routes(&state))
        .layer(DefaultBodyLimit::max(state.server.body_limit_bytes))
        .layer(cors_layer(addr, &state.server))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr`, spawn the server and return the bound address.
///
/// Binding port 0 picks a free port, which tests rely on.
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<SocketAddr, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::StartupFailed {
            name: "http".to_string(),
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ServerError::StartupFailed {
            name: "http".to_string(),
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let app = router(Arc::clone(&state), bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("HTTP server shutting down");
            })
            .await
        {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "HTTP server listening");
    Ok(bound_addr)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AuthConfig, DatabaseConfig, LogFormat, NotificationConfig};
    use crate::db::libsql::test_support::{TestBackend, setup_backend};
    use crate::notifications::MemoryTable;

    async fn test_app() -> (Router, TestBackend) {
        let test = setup_backend().await;
        let config = Config {
            database: DatabaseConfig::local("unused.db"),
            server: ServerConfig {
                host: "127.0.0.1".parse().expect("ip"),
                port: 3030,
                cors_origins: vec!["https://app.example.com".to_string()],
                body_limit_bytes: 1024,
            },
            auth: AuthConfig::default(),
            notifications: NotificationConfig::default(),
            log_format: LogFormat::Pretty,
        };
        let state = Arc::new(AppState::new(
            Arc::new(test.backend.clone()),
            Arc::new(MemoryTable::new()),
            Arc::new(TimerRegistry::new()),
            &config,
        ));
        let addr = config.server.socket_addr();
        (router(state, addr), test)
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let (app, _db) = test_app().await;
        let response = app
            .oneshot(
                Request::get("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_token() {
        let (app, _db) = test_app().await;
        let response = app
            .oneshot(
                Request::get("/api/timers")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cors_allows_configured_origins_only() {
        let (app, _db) = test_app().await;
        let preflight = |origin: &'static str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/cases")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .expect("request")
        };

        let allowed = app
            .clone()
            .oneshot(preflight("https://app.example.com"))
            .await
            .expect("response");
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );

        let denied = app
            .oneshot(preflight("https://evil.example.com"))
            .await
            .expect("response");
        assert!(
            !denied
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let (app, _db) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/api/case-categories")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(format!(r#"{{"name":"{}"}}"#, "x".repeat(4096))))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_notification_bodies_use_the_envelope() {
        let (app, _db) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/api/notifications")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(format!(r#"{{"title":"{}"}}"#, "x".repeat(4096))))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }
}
