use libsql::params;
use uuid::Uuid;

use crate::db::{
    CreateHearingReportParams, CreateSubmittedDocumentParams, DEFAULT_SUBMITTED_DOCUMENT_STATUS,
    HearingReportRecord, HearingReportStore, SubmittedDocumentFilter, SubmittedDocumentRecord,
    UpdateHearingReportParams, UpdateSubmittedDocumentParams,
};
use crate::error::DatabaseError;

use super::{
    Filter, LibSqlBackend, get_opt_text, get_text, like_pattern, now_ts, opt_text, parse_json,
    parse_ts, parse_uuid,
};

const REPORT_SELECT: &str = "SELECT h.id, h.case_event_id, e.case_id, e.date_time, h.attendees, h.notes, \
       h.created_at, h.updated_at \
     FROM hearing_reports h \
     JOIN case_events e ON e.id = h.case_event_id";
const DOCUMENT_COLUMNS: &str =
    "d.id, d.hearing_report_id, d.document_name, d.status, d.created_at, d.updated_at";

fn row_to_report_record(row: &libsql::Row) -> Result<HearingReportRecord, DatabaseError> {
    Ok(HearingReportRecord {
        id: parse_uuid(&get_text(row, 0), "hearing_reports.id")?,
        case_event_id: parse_uuid(&get_text(row, 1), "hearing_reports.case_event_id")?,
        case_id: parse_uuid(&get_text(row, 2), "case_events.case_id")?,
        event_date_time: parse_ts(&get_text(row, 3))?,
        attendees: parse_json(&get_text(row, 4), serde_json::json!([]))?,
        notes: get_opt_text(row, 5),
        created_at: parse_ts(&get_text(row, 6))?,
        updated_at: parse_ts(&get_text(row, 7))?,
        submitted_documents: Vec::new(),
    })
}

fn row_to_document_record(row: &libsql::Row) -> Result<SubmittedDocumentRecord, DatabaseError> {
    Ok(SubmittedDocumentRecord {
        id: parse_uuid(&get_text(row, 0), "submitted_documents.id")?,
        hearing_report_id: parse_uuid(&get_text(row, 1), "submitted_documents.hearing_report_id")?,
        document_name: get_text(row, 2),
        status: get_text(row, 3),
        created_at: parse_ts(&get_text(row, 4))?,
        updated_at: parse_ts(&get_text(row, 5))?,
    })
}

async fn report_documents(
    conn: &libsql::Connection,
    hearing_report_id: Uuid,
) -> Result<Vec<SubmittedDocumentRecord>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM submitted_documents d \
                 WHERE d.hearing_report_id = ?1 ORDER BY d.document_name ASC, d.created_at ASC"
            ),
            params![hearing_report_id.to_string()],
        )
        .await?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(row_to_document_record(&row)?);
    }
    Ok(out)
}

/// Run a report query and attach each report's documents.
async fn query_reports(
    conn: &libsql::Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<HearingReportRecord>, DatabaseError> {
    let mut rows = conn.query(sql, params).await?;
    let mut reports = Vec::new();
    while let Some(row) = rows.next().await? {
        reports.push(row_to_report_record(&row)?);
    }
    for report in &mut reports {
        report.submitted_documents = report_documents(conn, report.id).await?;
    }
    Ok(reports)
}

fn attendees_text(attendees: &serde_json::Value) -> Result<String, DatabaseError> {
    serde_json::to_string(attendees).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

#[async_trait::async_trait]
impl HearingReportStore for LibSqlBackend {
    async fn create_hearing_report(
        &self,
        input: &CreateHearingReportParams,
    ) -> Result<HearingReportRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO hearing_reports (id, case_event_id, attendees, notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.to_string(),
                input.case_event_id.to_string(),
                attendees_text(&input.attendees)?,
                opt_text(input.notes.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_hearing_report(id).await?.ok_or_else(|| {
            DatabaseError::Query("failed to load created hearing report".to_string())
        })
    }

    async fn get_hearing_report(
        &self,
        id: Uuid,
    ) -> Result<Option<HearingReportRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let reports = query_reports(
            &conn,
            &format!("{REPORT_SELECT} WHERE h.id = ?1 LIMIT 1"),
            params![id.to_string()],
        )
        .await?;
        Ok(reports.into_iter().next())
    }

    async fn get_hearing_report_for_event(
        &self,
        case_event_id: Uuid,
    ) -> Result<Option<HearingReportRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let reports = query_reports(
            &conn,
            &format!("{REPORT_SELECT} WHERE h.case_event_id = ?1 LIMIT 1"),
            params![case_event_id.to_string()],
        )
        .await?;
        Ok(reports.into_iter().next())
    }

    async fn list_hearing_reports(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<HearingReportRecord>, DatabaseError> {
        let conn = self.connect().await?;
        query_reports(
            &conn,
            &format!("{REPORT_SELECT} WHERE e.case_id = ?1 ORDER BY e.date_time DESC, h.created_at DESC"),
            params![case_id.to_string()],
        )
        .await
    }

    async fn update_hearing_report(
        &self,
        id: Uuid,
        input: &UpdateHearingReportParams,
    ) -> Result<Option<HearingReportRecord>, DatabaseError> {
        let Some(existing) = self.get_hearing_report(id).await? else {
            return Ok(None);
        };

        let attendees = input.attendees.as_ref().unwrap_or(&existing.attendees);
        let notes = input.notes.clone().unwrap_or(existing.notes);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE hearing_reports SET attendees = ?2, notes = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                attendees_text(attendees)?,
                opt_text(notes.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_hearing_report(id).await
    }

    async fn delete_hearing_report(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM hearing_reports WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn create_submitted_document(
        &self,
        input: &CreateSubmittedDocumentParams,
    ) -> Result<SubmittedDocumentRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        let status = input
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUBMITTED_DOCUMENT_STATUS);
        conn.execute(
            "INSERT INTO submitted_documents (id, hearing_report_id, document_name, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.to_string(),
                input.hearing_report_id.to_string(),
                input.document_name.trim(),
                status,
                now_ts(),
            ],
        )
        .await?;

        self.get_submitted_document(id).await?.ok_or_else(|| {
            DatabaseError::Query("failed to load created submitted document".to_string())
        })
    }

    async fn get_submitted_document(
        &self,
        id: Uuid,
    ) -> Result<Option<SubmittedDocumentRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM submitted_documents d WHERE d.id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_document_record(&row)).transpose()
    }

    async fn list_report_documents(
        &self,
        hearing_report_id: Uuid,
    ) -> Result<Vec<SubmittedDocumentRecord>, DatabaseError> {
        let conn = self.connect().await?;
        report_documents(&conn, hearing_report_id).await
    }

    async fn list_case_documents(
        &self,
        case_id: Uuid,
        filter: &SubmittedDocumentFilter,
    ) -> Result<Vec<SubmittedDocumentRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut clauses = Filter::default();
        clauses.push_eq("e.case_id", libsql::Value::Text(case_id.to_string()));
        if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push_eq("d.status", libsql::Value::Text(status.to_string()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                "d.document_name LIKE ? ESCAPE '\\'",
                vec![libsql::Value::Text(like_pattern(search))],
            );
        }
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM submitted_documents d \
             JOIN hearing_reports h ON h.id = d.hearing_report_id \
             JOIN case_events e ON e.id = h.case_event_id{} \
             ORDER BY e.date_time DESC, d.document_name ASC",
            clauses.where_sql()
        );
        let mut rows = conn.query(&sql, clauses.params()).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_document_record(&row)?);
        }
        Ok(out)
    }

    async fn update_submitted_document(
        &self,
        id: Uuid,
        input: &UpdateSubmittedDocumentParams,
    ) -> Result<Option<SubmittedDocumentRecord>, DatabaseError> {
        let Some(existing) = self.get_submitted_document(id).await? else {
            return Ok(None);
        };

        let name = input
            .document_name
            .as_deref()
            .unwrap_or(existing.document_name.as_str())
            .trim();
        let status = input.status.as_deref().unwrap_or(existing.status.as_str()).trim();

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE submitted_documents SET document_name = ?2, status = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![id.to_string(), name, status, now_ts()],
        )
        .await?;

        self.get_submitted_document(id).await
    }

    async fn delete_submitted_document(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM submitted_documents WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::libsql::test_support::{TestBackend, setup_backend};
    use crate::db::{
        CaseCategoryStore, CaseEventRecord, CaseEventStore, CaseStore, CreateCaseCategoryParams,
        CreateCaseEventParams, CreateCaseParams,
    };

    async fn seed_case(fixture: &TestBackend) -> Uuid {
        let category = fixture
            .backend
            .create_category(&CreateCaseCategoryParams {
                name: "Civil".to_string(),
                parent_category_id: None,
                role_definitions: serde_json::json!({}),
            })
            .await
            .expect("category");
        fixture
            .backend
            .create_case(&CreateCaseParams::new("Sato v. Kato", category.id))
            .await
            .expect("case")
            .id
    }

    async fn hearing(fixture: &TestBackend, case_id: Uuid, days_ago: i64) -> CaseEventRecord {
        fixture
            .backend
            .create_case_event(&CreateCaseEventParams {
                case_id,
                event_type: "hearing".to_string(),
                date_time: Utc::now() - Duration::days(days_ago),
                location: None,
                title: None,
                description: None,
                created_by: None,
            })
            .await
            .expect("event")
    }

    fn report(case_event_id: Uuid) -> CreateHearingReportParams {
        CreateHearingReportParams {
            case_event_id,
            attendees: serde_json::json!(["Judge Mori", "Counsel Ito"]),
            notes: Some("Next date set".to_string()),
        }
    }

    fn document(hearing_report_id: Uuid, name: &str, status: Option<&str>) -> CreateSubmittedDocumentParams {
        CreateSubmittedDocumentParams {
            hearing_report_id,
            document_name: name.to_string(),
            status: status.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn one_report_per_hearing_with_documents_attached() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;
        let event = hearing(&fixture, case_id, 1).await;

        let created = backend
            .create_hearing_report(&report(event.id))
            .await
            .expect("report");
        assert_eq!(created.case_id, case_id);
        assert_eq!(created.attendees, serde_json::json!(["Judge Mori", "Counsel Ito"]));

        let err = backend
            .create_hearing_report(&report(event.id))
            .await
            .expect_err("second report");
        assert!(err.is_unique_violation());

        let err = backend
            .create_hearing_report(&report(Uuid::new_v4()))
            .await
            .expect_err("unknown event");
        assert!(err.is_foreign_key_violation());

        for name in ["Reply brief", "Evidence A-1"] {
            backend
                .create_submitted_document(&document(created.id, name, None))
                .await
                .expect("document");
        }
        let loaded = backend
            .get_hearing_report_for_event(event.id)
            .await
            .expect("get")
            .expect("exists");
        let names: Vec<&str> = loaded
            .submitted_documents
            .iter()
            .map(|d| d.document_name.as_str())
            .collect();
        assert_eq!(names, vec!["Evidence A-1", "Reply brief"]);
        assert!(
            loaded
                .submitted_documents
                .iter()
                .all(|d| d.status == DEFAULT_SUBMITTED_DOCUMENT_STATUS)
        );
    }

    #[tokio::test]
    async fn case_documents_filter_by_status_and_name() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;
        let earlier = backend
            .create_hearing_report(&report(hearing(&fixture, case_id, 30).await.id))
            .await
            .expect("earlier");
        let later = backend
            .create_hearing_report(&report(hearing(&fixture, case_id, 2).await.id))
            .await
            .expect("later");
        backend
            .create_submitted_document(&document(earlier.id, "Complaint", None))
            .await
            .expect("complaint");
        backend
            .create_submitted_document(&document(later.id, "Answer", Some("Pending")))
            .await
            .expect("answer");
        backend
            .create_submitted_document(&document(later.id, "Amended complaint", None))
            .await
            .expect("amended");

        let reports: Vec<Uuid> = backend
            .list_hearing_reports(case_id)
            .await
            .expect("reports")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(reports, vec![later.id, earlier.id]);

        let all: Vec<String> = backend
            .list_case_documents(case_id, &SubmittedDocumentFilter::default())
            .await
            .expect("all")
            .into_iter()
            .map(|d| d.document_name)
            .collect();
        assert_eq!(all, vec!["Amended complaint", "Answer", "Complaint"]);

        let pending = backend
            .list_case_documents(
                case_id,
                &SubmittedDocumentFilter {
                    status: Some("Pending".to_string()),
                    search: None,
                },
            )
            .await
            .expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].document_name, "Answer");

        let complaints = backend
            .list_case_documents(
                case_id,
                &SubmittedDocumentFilter {
                    status: None,
                    search: Some("complaint".to_string()),
                },
            )
            .await
            .expect("search");
        assert_eq!(complaints.len(), 2);
    }

    #[tokio::test]
    async fn updates_merge_and_deletes_cascade() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;
        let event = hearing(&fixture, case_id, 0).await;
        let created = backend
            .create_hearing_report(&report(event.id))
            .await
            .expect("report");
        let doc = backend
            .create_submitted_document(&document(created.id, "Brief", None))
            .await
            .expect("document");

        let updated = backend
            .update_hearing_report(
                created.id,
                &UpdateHearingReportParams {
                    attendees: None,
                    notes: Some(None),
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.notes, None);
        assert_eq!(updated.attendees, created.attendees);

        let renamed = backend
            .update_submitted_document(
                doc.id,
                &UpdateSubmittedDocumentParams {
                    document_name: None,
                    status: Some("Accepted".to_string()),
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(renamed.document_name, "Brief");
        assert_eq!(renamed.status, "Accepted");

        assert!(backend.delete_case_event(case_id, event.id).await.expect("delete"));
        assert!(backend.get_hearing_report(created.id).await.expect("get").is_none());
        assert!(backend.get_submitted_document(doc.id).await.expect("get").is_none());
    }
}
