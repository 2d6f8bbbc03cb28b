//! End-to-end tests for the case-management REST API.
//!
//! Each test starts a real server on a random port backed by a fresh
//! libSQL file and drives it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tempfile::TempDir;

use lexcase::config::{
    AuthConfig, Config, DatabaseConfig, LogFormat, NotificationConfig, ServerConfig,
};
use lexcase::db::{Database, TemplateItemParams, connect_libsql};
use lexcase::legal::timesheet::TimerRegistry;
use lexcase::notifications::MemoryTable;
use lexcase::web::{AppState, start_server};

struct TestServer {
    base: String,
    client: reqwest::Client,
    state: Arc<AppState>,
    _tmpdir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
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
        let bound = start_server(addr, Arc::clone(&state))
            .await
            .expect("Failed to start test server");
        Self {
            base: format!("http://{bound}"),
            client: reqwest::Client::new(),
            state,
            _tmpdir: tmpdir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.expect("get");
        read(response).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("post");
        read(response).await
    }

    async fn delete(&self, path: &str) -> StatusCode {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("delete")
            .status()
    }

    async fn category(&self, name: &str) -> String {
        let (status, body) = self.post("/api/case-categories", json!({"name": name})).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }

    async fn case(&self, name: &str, category_id: &str) -> String {
        let (status, body) = self
            .post(
                "/api/cases",
                json!({"name": name, "categoryId": category_id}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.expect("body");
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().expect("data.id").to_string()
}

#[tokio::test]
async fn health_reports_version() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    server.state.shutdown().await;
}

#[tokio::test]
async fn case_create_requires_name_and_category() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/api/cases", json!({"name": "Smith v. Jones"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Name and categoryId are required"}));

    let (status, body) = server
        .post(
            "/api/cases",
            json!({"name": "Smith v. Jones", "categoryId": uuid::Uuid::new_v4()}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid categoryId");
}

#[tokio::test]
async fn unknown_case_is_not_found() {
    let server = TestServer::start().await;
    let (status, body) = server
        .get(&format!("/api/cases/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Case not found"}));

    let (status, _) = server.get("/api/cases/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn case_list_paginates() {
    let server = TestServer::start().await;
    let category = server.category("Civil").await;
    for n in 0..15 {
        server.case(&format!("Case {n:02}"), &category).await;
    }

    let (status, body) = server.get("/api/cases?page=2&limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(5));
    assert_eq!(
        body["pagination"],
        json!({"page": 2, "limit": 5, "total": 15, "pages": 3})
    );

    let (status, body) = server.get("/api/cases?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid pagination parameters");
}

#[tokio::test]
async fn case_update_and_delete() {
    let server = TestServer::start().await;
    let category = server.category("Family").await;
    let case_id = server.case("Doe divorce", &category).await;

    let response = server
        .client
        .put(server.url(&format!("/api/cases/{case_id}")))
        .json(&json!({"status": "open", "remarks": "urgent"}))
        .send()
        .await
        .expect("put");
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "open");
    assert_eq!(body["data"]["remarks"], "urgent");
    assert_eq!(body["data"]["name"], "Doe divorce");

    assert_eq!(
        server.delete(&format!("/api/cases/{case_id}")).await,
        StatusCode::NO_CONTENT
    );
    let (status, _) = server.get(&format!("/api/cases/{case_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn case_parties_reject_duplicate_roles() {
    let server = TestServer::start().await;
    let category = server.category("Civil").await;
    let case_id = server.case("Acme v. Widget", &category).await;
    let (status, party) = server
        .post(
            "/api/parties",
            json!({
                "isCorporation": true,
                "corporateProfile": {"name": "Acme Corp"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{party}");
    let party_id = id_of(&party);

    let link = json!({"partyId": party_id, "role": "plaintiff"});
    let (status, _) = server
        .post(&format!("/api/cases/{case_id}/parties"), link.clone())
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server
        .post(&format!("/api/cases/{case_id}/parties"), link)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Party already exists in this case with this role"
    );

    // Same party under a different role is fine.
    let (status, _) = server
        .post(
            &format!("/api/cases/{case_id}/parties"),
            json!({"partyId": party_id, "role": "counterclaim-defendant"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listed) = server.get(&format!("/api/cases/{case_id}/parties")).await;
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(2));

    assert_eq!(
        server
            .delete(&format!("/api/cases/{case_id}/parties/{party_id}/plaintiff"))
            .await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        server
            .delete(&format!("/api/cases/{case_id}/parties/{party_id}/plaintiff"))
            .await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn party_with_profile_cannot_be_deleted() {
    let server = TestServer::start().await;
    let (status, party) = server
        .post(
            "/api/parties",
            json!({
                "isCorporation": false,
                "individualProfile": {"lastName": "Doe", "firstName": "Jane"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{party}");
    let party_id = id_of(&party);

    assert_eq!(
        server.delete(&format!("/api/parties/{party_id}")).await,
        StatusCode::CONFLICT
    );

    assert_eq!(
        server
            .delete(&format!("/api/parties/{party_id}/individual-profile"))
            .await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        server.delete(&format!("/api/parties/{party_id}")).await,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn category_cycles_are_rejected() {
    let server = TestServer::start().await;
    let root = server.category("Litigation").await;
    let (status, child) = server
        .post(
            "/api/case-categories",
            json!({"name": "Appeals", "parentCategoryId": root}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let child = id_of(&child);

    let response = server
        .client
        .put(server.url(&format!("/api/case-categories/{root}")))
        .json(&json!({"parentCategoryId": child}))
        .send()
        .await
        .expect("put");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, tree) = server.get("/api/case-categories/tree").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["data"].as_array().map(Vec::len), Some(1));

    assert_eq!(
        server.delete(&format!("/api/case-categories/{root}")).await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn phase_transitions_follow_rules_and_generate_tasks() {
    let server = TestServer::start().await;
    let category = server.category("Civil").await;
    let (_, intake) = server
        .post(
            &format!("/api/case-categories/{category}/phases"),
            json!({"name": "Intake", "order": 1}),
        )
        .await;
    let (_, filing) = server
        .post(
            &format!("/api/case-categories/{category}/phases"),
            json!({"name": "Filing", "order": 2}),
        )
        .await;
    let (intake, filing) = (id_of(&intake), id_of(&filing));

    let (status, template) = server
        .post(
            "/api/task-templates",
            json!({
                "name": "Filing checklist",
                "items": [{"description": "Draft complaint", "dueDateOffsetDays": 7}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{template}");
    let (status, rule) = server
        .post(
            "/api/phase-transition-rules",
            json!({
                "fromPhaseId": intake,
                "toPhaseId": filing,
                "taskTemplateId": id_of(&template)
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rule}");

    let case_id = server.case("Roe v. Wade Industries", &category).await;
    let transition = format!("/api/cases/{case_id}/phase-transition");

    // A phaseless case may only enter the first phase.
    let (status, _) = server.post(&transition, json!({"toPhaseId": filing})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.post(&transition, json!({"toPhaseId": intake})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["case"]["currentPhaseId"], intake.as_str());

    let (status, body) = server
        .post(
            &transition,
            json!({"toPhaseId": filing, "reason": "client signed"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let tasks = body["data"]["generatedTasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], "Draft complaint");

    // No rule leads back.
    let (status, _) = server.post(&transition, json!({"toPhaseId": intake})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, history) = server
        .get(&format!("/api/cases/{case_id}/phase-history"))
        .await;
    assert_eq!(history["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn out_of_range_due_date_offsets_are_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/api/task-templates",
            json!({
                "name": "Far future",
                "items": [{"description": "Never", "dueDateOffsetDays": 100_000_000_000_i64}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    // Rows written before the bound existed still fail cleanly on transition.
    let template = server
        .state
        .db
        .create_task_template(
            "Legacy",
            &[TemplateItemParams {
                description: "Overflowing item".to_string(),
                due_date_offset_days: 100_000_000_000,
            }],
        )
        .await
        .expect("template");

    let response = server
        .client
        .put(server.url(&format!(
            "/api/task-template-items/{}",
            template.items[0].id
        )))
        .json(&json!({"dueDateOffsetDays": -40_000}))
        .send()
        .await
        .expect("update item");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let category = server.category("Civil").await;
    let (_, intake) = server
        .post(
            &format!("/api/case-categories/{category}/phases"),
            json!({"name": "Intake", "order": 1}),
        )
        .await;
    let (_, filing) = server
        .post(
            &format!("/api/case-categories/{category}/phases"),
            json!({"name": "Filing", "order": 2}),
        )
        .await;
    let (intake, filing) = (id_of(&intake), id_of(&filing));
    let (status, rule) = server
        .post(
            "/api/phase-transition-rules",
            json!({
                "fromPhaseId": intake,
                "toPhaseId": filing,
                "taskTemplateId": template.template.id
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rule}");

    let case_id = server.case("Overflow v. Chrono", &category).await;
    let transition = format!("/api/cases/{case_id}/phase-transition");
    let (status, _) = server.post(&transition, json!({"toPhaseId": intake})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.post(&transition, json!({"toPhaseId": filing})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(
        body["error"],
        "Due date offset of 100000000000 days is out of range"
    );

    let (_, case) = server.get(&format!("/api/cases/{case_id}")).await;
    assert_eq!(case["data"]["currentPhaseId"], intake.as_str());
}

#[tokio::test]
async fn ledger_totals_sum_expenses_and_deposits() {
    let server = TestServer::start().await;
    let category = server.category("Civil").await;
    let case_id = server.case("Ledger case", &category).await;
    for (kind, amount) in [("expenses", "120.50"), ("expenses", "9.50"), ("deposits", "500")] {
        let (status, body) = server
            .post(
                &format!("/api/cases/{case_id}/{kind}"),
                json!({"amount": amount, "description": "filing fee", "date": "2026-01-05"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
    let (status, ledger) = server.get(&format!("/api/cases/{case_id}/ledger")).await;
    assert_eq!(status, StatusCode::OK, "{ledger}");
    assert_eq!(ledger["data"]["expenses"].as_array().map(Vec::len), Some(2));
    assert_eq!(ledger["data"]["deposits"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn jurisdiction_rules_link_existing_courthouses() {
    let server = TestServer::start().await;
    let mut courthouses = Vec::new();
    for name in ["Tokyo District Court", "Tokyo High Court"] {
        let (status, body) = server.post("/api/courthouses", json!({"name": name})).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        courthouses.push(id_of(&body));
    }
    let (district, high) = (&courthouses[0], &courthouses[1]);
    let category = server.category("Civil").await;

    let (status, body) = server
        .post(
            "/api/jurisdiction-rules",
            json!({"lowerCourthouseId": district, "superiorCourthouseId": district}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = server
        .post(
            "/api/jurisdiction-rules",
            json!({
                "lowerCourthouseId": district,
                "superiorCourthouseId": "00000000-0000-4000-8000-000000000000"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid superiorCourthouseId");

    let (status, rule) = server
        .post(
            "/api/jurisdiction-rules",
            json!({
                "lowerCourthouseId": district,
                "superiorCourthouseId": high,
                "caseCategoryId": category
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rule}");
    assert_eq!(rule["data"]["superiorCourthouseName"], "Tokyo High Court");
    let rule_id = id_of(&rule);

    let (status, listed) = server
        .get(&format!("/api/jurisdiction-rules?lowerCourthouseId={district}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

    let response = server
        .client
        .put(server.url(&format!("/api/jurisdiction-rules/{rule_id}")))
        .json(&json!({"caseCategoryId": null}))
        .send()
        .await
        .expect("update rule");
    let (status, updated) = read(response).await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["caseCategoryId"], Value::Null);

    assert_eq!(
        server.delete(&format!("/api/courthouses/{high}")).await,
        StatusCode::NO_CONTENT
    );
    let (status, _) = server.get(&format!("/api/jurisdiction-rules/{rule_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hearing_reports_collect_submitted_documents() {
    let server = TestServer::start().await;
    let category = server.category("Civil").await;
    let case_id = server.case("Sato v. Kato", &category).await;
    let other_case = server.case("Unrelated", &category).await;
    let (status, event) = server
        .post(
            &format!("/api/cases/{case_id}/events"),
            json!({"eventType": "hearing", "dateTime": "2026-04-10T01:00:00Z"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{event}");
    let event_id = id_of(&event);

    let (status, _) = server
        .get(&format!("/api/cases/{other_case}/events/{event_id}/hearing-report"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let report_path = format!("/api/cases/{case_id}/events/{event_id}/hearing-report");
    let (status, report) = server
        .post(
            &report_path,
            json!({"attendees": ["Judge Mori", "Counsel Ito"], "notes": "Next date set"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{report}");
    let report_id = id_of(&report);

    let (status, body) = server.post(&report_path, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Hearing report already exists for this event");

    let documents = format!("/api/hearing-reports/{report_id}/documents");
    let (status, _) = server.post(&documents, json!({"documentName": " "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, doc) = server
        .post(&documents, json!({"documentName": "Reply brief"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{doc}");
    assert_eq!(doc["data"]["status"], "Submitted");
    let (status, _) = server
        .post(&documents, json!({"documentName": "Evidence A-1", "status": "Pending"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, loaded) = server.get(&report_path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        loaded["data"]["submittedDocuments"][0]["documentName"],
        "Evidence A-1"
    );

    let (status, pending) = server
        .get(&format!("/api/cases/{case_id}/submitted-documents?status=Pending"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

    assert_eq!(
        server.delete(&format!("/api/hearing-reports/{report_id}")).await,
        StatusCode::NO_CONTENT
    );
    let (status, _) = server
        .get(&format!("/api/submitted-documents/{}", id_of(&doc)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, reports) = server
        .get(&format!("/api/cases/{case_id}/hearing-reports"))
        .await;
    assert_eq!(reports["data"], json!([]));
}

#[tokio::test]
async fn generate_document_renders_case_fields() {
    let server = TestServer::start().await;
    let category = server.category("Civil").await;
    let case_id = server.case("Smith v. Jones", &category).await;
    let (status, template) = server
        .post(
            "/api/document-templates",
            json!({"name": "Cover", "body": "Re: {{ case.name }} ({{ category.name }})"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{template}");

    let response = server
        .client
        .post(server.url(&format!("/api/cases/{case_id}/generate-document")))
        .json(&json!({"templateId": id_of(&template)}))
        .send()
        .await
        .expect("post");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.text().await.expect("text"),
        "Re: Smith v. Jones (Civil)"
    );

    let (status, broken) = server
        .post(
            "/api/document-templates",
            json!({"name": "Broken", "body": "{{ missing.field }}"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = server
        .post(
            &format!("/api/cases/{case_id}/generate-document"),
            json!({"templateId": id_of(&broken)}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

async fn register_and_login(server: &TestServer, email: &str) -> String {
    let (status, body) = server
        .post(
            "/api/auth/register",
            json!({"email": email, "password": "correct horse", "name": "Test User"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["data"].get("passwordHash").is_none());

    let (status, body) = server
        .post(
            "/api/auth/login",
            json!({"email": email, "password": "correct horse"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/api/users/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing or invalid Authorization header");

    let token = register_and_login(&server, "paralegal@example.com").await;
    let response = server
        .client
        .get(server.url("/api/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("me");
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "paralegal@example.com");

    let (status, _) = server
        .post(
            "/api/auth/login",
            json!({"email": "paralegal@example.com", "password": "wrong password"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = server
        .client
        .post(server.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("logout");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = server
        .client
        .get(server.url("/api/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn timer_stop_saves_a_timesheet_entry() {
    let server = TestServer::start().await;
    let token = register_and_login(&server, "lawyer@example.com").await;
    let category = server.category("Civil").await;
    let case_id = server.case("Timer case", &category).await;
    let (status, task) = server
        .post(
            &format!("/api/cases/{case_id}/tasks"),
            json!({"title": "Review discovery"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    let task_id = id_of(&task);

    let authed = |builder: reqwest::RequestBuilder| builder.bearer_auth(&token);

    let response = authed(
        server
            .client
            .post(server.url(&format!("/api/tasks/{task_id}/timer/start"))),
    )
    .json(&json!({"description": "Discovery review"}))
    .send()
    .await
    .expect("start");
    let (status, timer) = read(response).await;
    assert_eq!(status, StatusCode::CREATED, "{timer}");
    let timer_id = id_of(&timer);
    assert_eq!(timer["data"]["caseId"], case_id.as_str());

    for action in ["pause", "resume"] {
        let response = authed(
            server
                .client
                .post(server.url(&format!("/api/timers/{timer_id}/{action}"))),
        )
        .send()
        .await
        .expect("timer action");
        assert_eq!(response.status(), StatusCode::OK, "{action}");
    }

    // Resuming a running timer is a conflict.
    let response = authed(
        server
            .client
            .post(server.url(&format!("/api/timers/{timer_id}/resume"))),
    )
    .send()
    .await
    .expect("resume");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = authed(
        server
            .client
            .post(server.url(&format!("/api/timers/{timer_id}/stop"))),
    )
    .send()
    .await
    .expect("stop");
    let (status, entry) = read(response).await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(entry["data"]["taskId"], task_id.as_str());
    assert_eq!(entry["data"]["description"], "Discovery review");
    assert!(entry["data"]["duration"].as_i64().expect("duration") >= 0);

    let response = authed(server.client.get(server.url("/api/timers")))
        .send()
        .await
        .expect("timers");
    let (_, timers) = read(response).await;
    assert_eq!(timers["data"], json!([]));

    let response = authed(server.client.get(server.url("/api/timesheet-entries")))
        .send()
        .await
        .expect("entries");
    let (status, entries) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries["pagination"]["total"], 1);

    let (status, stats) = server
        .get(&format!("/api/cases/{case_id}/timesheet/stats"))
        .await;
    assert_eq!(status, StatusCode::OK, "{stats}");
}

#[tokio::test]
async fn failed_timer_save_keeps_the_timer() {
    let server = TestServer::start().await;
    let token = register_and_login(&server, "associate@example.com").await;
    let category = server.category("Civil").await;
    let case_id = server.case("Short-lived case", &category).await;
    let (_, task) = server
        .post(
            &format!("/api/cases/{case_id}/tasks"),
            json!({"title": "Prepare memo"}),
        )
        .await;
    let task_id = id_of(&task);

    let response = server
        .client
        .post(server.url(&format!("/api/tasks/{task_id}/timer/start")))
        .bearer_auth(&token)
        .send()
        .await
        .expect("start");
    let (status, timer) = read(response).await;
    assert_eq!(status, StatusCode::CREATED, "{timer}");
    let timer_id = id_of(&timer);

    assert_eq!(
        server.delete(&format!("/api/cases/{case_id}")).await,
        StatusCode::NO_CONTENT
    );

    let stop = server.url(&format!("/api/timers/{timer_id}/stop"));
    let response = server
        .client
        .post(&stop)
        .bearer_auth(&token)
        .send()
        .await
        .expect("stop");
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let response = server
        .client
        .get(server.url(&format!("/api/timers/{timer_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get timer");
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .client
        .post(&stop)
        .bearer_auth(&token)
        .json(&json!({"save": false}))
        .send()
        .await
        .expect("discard");
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["timer"]["status"], "stopped");

    let response = server
        .client
        .get(server.url(&format!("/api/timers/{timer_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get timer");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn timesheet_entries_are_private_to_their_owner() {
    let server = TestServer::start().await;
    let alice = register_and_login(&server, "alice@example.com").await;
    let bob = register_and_login(&server, "bob@example.com").await;
    let category = server.category("Civil").await;
    let case_id = server.case("Shared case", &category).await;

    let response = server
        .client
        .post(server.url("/api/timesheet-entries"))
        .bearer_auth(&alice)
        .json(&json!({
            "caseId": case_id,
            "startTime": "2026-03-02T09:00:00Z",
            "endTime": "2026-03-02T10:30:00Z",
            "description": "Drafting"
        }))
        .send()
        .await
        .expect("create");
    let (status, entry) = read(response).await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(entry["data"]["duration"], 5_400_000);
    let entry_id = id_of(&entry);

    let response = server
        .client
        .get(server.url(&format!("/api/timesheet-entries/{entry_id}")))
        .bearer_auth(&bob)
        .send()
        .await
        .expect("get");
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Timesheet entry not found");

    let response = server
        .client
        .post(server.url("/api/timesheet-entries"))
        .bearer_auth(&alice)
        .json(&json!({
            "caseId": case_id,
            "startTime": "2026-03-02T10:00:00Z",
            "endTime": "2026-03-02T09:00:00Z"
        }))
        .send()
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
