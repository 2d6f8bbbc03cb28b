use libsql::params;
use uuid::Uuid;

use crate::db::{
    CreateTimesheetEntryParams, PageRequest, Paged, TimesheetEntryDetail, TimesheetEntryRecord,
    TimesheetFilter, TimesheetStore, UpdateTimesheetEntryParams,
};
use crate::error::DatabaseError;
use crate::legal::timesheet::hours_from_millis;

use super::{
    Filter, LibSqlBackend, count_rows, fmt_ts, get_i64, get_opt_text, get_text, now_ts, opt_text,
    opt_uuid, parse_decimal, parse_ts, parse_uuid, parse_uuid_opt,
};

const ENTRY_COLUMNS: &str = "t.id, t.case_id, t.user_id, t.task_id, t.start_time, t.end_time, \
     t.duration_ms, t.hours, t.description, t.created_at, t.updated_at";

fn row_to_entry_record(row: &libsql::Row) -> Result<TimesheetEntryRecord, DatabaseError> {
    Ok(TimesheetEntryRecord {
        id: parse_uuid(&get_text(row, 0), "timesheet_entries.id")?,
        case_id: parse_uuid(&get_text(row, 1), "timesheet_entries.case_id")?,
        user_id: parse_uuid(&get_text(row, 2), "timesheet_entries.user_id")?,
        task_id: parse_uuid_opt(get_opt_text(row, 3), "timesheet_entries.task_id")?,
        start_time: parse_ts(&get_text(row, 4))?,
        end_time: parse_ts(&get_text(row, 5))?,
        duration: get_i64(row, 6),
        hours: parse_decimal(&get_text(row, 7))?,
        description: get_opt_text(row, 8),
        created_at: parse_ts(&get_text(row, 9))?,
        updated_at: parse_ts(&get_text(row, 10))?,
    })
}

fn timesheet_filter(filter: &TimesheetFilter) -> Filter {
    let mut out = Filter::default();
    if let Some(user_id) = filter.user_id {
        out.push_eq("t.user_id", libsql::Value::Text(user_id.to_string()));
    }
    if let Some(case_id) = filter.case_id {
        out.push_eq("t.case_id", libsql::Value::Text(case_id.to_string()));
    }
    if let Some(task_id) = filter.task_id {
        out.push_eq("t.task_id", libsql::Value::Text(task_id.to_string()));
    }
    if let Some(from) = filter.from {
        out.push("t.start_time >= ?", vec![libsql::Value::Text(fmt_ts(&from))]);
    }
    if let Some(to) = filter.to {
        out.push("t.start_time <= ?", vec![libsql::Value::Text(fmt_ts(&to))]);
    }
    out
}

#[async_trait::async_trait]
impl TimesheetStore for LibSqlBackend {
    async fn create_timesheet_entry(
        &self,
        input: &CreateTimesheetEntryParams,
    ) -> Result<TimesheetEntryRecord, DatabaseError> {
        if input.end_time < input.start_time {
            return Err(DatabaseError::Constraint(
                "end time precedes start time".to_string(),
            ));
        }
        let duration = input.duration.max(0);

        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO timesheet_entries (id, case_id, user_id, task_id, start_time, end_time, \
               duration_ms, hours, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id.to_string(),
                input.case_id.to_string(),
                input.user_id.to_string(),
                opt_uuid(input.task_id),
                fmt_ts(&input.start_time),
                fmt_ts(&input.end_time),
                duration,
                hours_from_millis(duration).to_string(),
                opt_text(input.description.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_timesheet_entry(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created timesheet entry".to_string()))
    }

    async fn get_timesheet_entry(
        &self,
        id: Uuid,
    ) -> Result<Option<TimesheetEntryRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM timesheet_entries t WHERE t.id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_entry_record(&row)).transpose()
    }

    async fn list_timesheet_entries(
        &self,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Paged<TimesheetEntryRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let filter = timesheet_filter(filter);
        let total = count_rows(&conn, "timesheet_entries t", &filter).await?;

        let (suffix, params) = filter.paged_params(page);
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM timesheet_entries t{} ORDER BY t.start_time DESC{}",
            filter.where_sql(),
            suffix
        );
        let mut rows = conn.query(&sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_entry_record(&row)?);
        }
        Ok(Paged { items, total })
    }

    async fn update_timesheet_entry(
        &self,
        id: Uuid,
        input: &UpdateTimesheetEntryParams,
    ) -> Result<Option<TimesheetEntryRecord>, DatabaseError> {
        let Some(existing) = self.get_timesheet_entry(id).await? else {
            return Ok(None);
        };

        let merged_task = input.task_id.unwrap_or(existing.task_id);
        let merged_start = input.start_time.unwrap_or(existing.start_time);
        let merged_end = input.end_time.unwrap_or(existing.end_time);
        let merged_description = input.description.clone().unwrap_or(existing.description);
        if merged_end < merged_start {
            return Err(DatabaseError::Constraint(
                "end time precedes start time".to_string(),
            ));
        }

        // Editing the interval replaces any paused-time accounting.
        let duration = if input.start_time.is_some() || input.end_time.is_some() {
            (merged_end - merged_start).num_milliseconds()
        } else {
            existing.duration
        };

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE timesheet_entries SET task_id = ?2, start_time = ?3, end_time = ?4, \
               duration_ms = ?5, hours = ?6, description = ?7, updated_at = ?8 \
             WHERE id = ?1",
            params![
                id.to_string(),
                opt_uuid(merged_task),
                fmt_ts(&merged_start),
                fmt_ts(&merged_end),
                duration,
                hours_from_millis(duration).to_string(),
                opt_text(merged_description.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_timesheet_entry(id).await
    }

    async fn delete_timesheet_entry(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM timesheet_entries WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn timesheet_entries_in_range(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<TimesheetEntryDetail>, DatabaseError> {
        let conn = self.connect().await?;
        let filter = timesheet_filter(filter);
        let sql = format!(
            "SELECT {ENTRY_COLUMNS}, c.name, k.title, u.name FROM timesheet_entries t \
             LEFT JOIN cases c ON c.id = t.case_id \
             LEFT JOIN tasks k ON k.id = t.task_id \
             LEFT JOIN users u ON u.id = t.user_id{} \
             ORDER BY t.start_time ASC",
            filter.where_sql()
        );
        let mut rows = conn.query(&sql, filter.params()).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(TimesheetEntryDetail {
                entry: row_to_entry_record(&row)?,
                case_name: get_opt_text(&row, 11),
                task_title: get_opt_text(&row, 12),
                user_name: get_opt_text(&row, 13),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::libsql::test_support::setup_backend;
    use crate::db::{
        CaseCategoryStore, CaseStore, CreateCaseCategoryParams, CreateCaseParams,
        CreateUserParams, UserRole, UserStore,
    };

    async fn seed(backend: &LibSqlBackend) -> (Uuid, Uuid) {
        let category = backend
            .create_category(&CreateCaseCategoryParams {
                name: "Corporate".to_string(),
                parent_category_id: None,
                role_definitions: serde_json::json!({}),
            })
            .await
            .expect("category");
        let case = backend
            .create_case(&CreateCaseParams::new("Merger review", category.id))
            .await
            .expect("case");
        let user = backend
            .create_user(&CreateUserParams {
                email: "hours@example.com".to_string(),
                name: Some("Rin".to_string()),
                role: UserRole::Lawyer,
                password_hash: "x".to_string(),
            })
            .await
            .expect("user");
        (case.id, user.id)
    }

    #[tokio::test]
    async fn hours_are_derived_from_duration() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let (case_id, user_id) = seed(backend).await;
        let start = Utc::now() - Duration::hours(3);

        let entry = backend
            .create_timesheet_entry(&CreateTimesheetEntryParams {
                case_id,
                user_id,
                task_id: None,
                start_time: start,
                end_time: start + Duration::minutes(100),
                duration: 90 * 60 * 1000,
                description: Some("Drafting".to_string()),
            })
            .await
            .expect("entry");
        assert_eq!(entry.hours, dec!(1.50));
        assert_eq!(entry.duration, 5_400_000);

        let updated = backend
            .update_timesheet_entry(
                entry.id,
                &UpdateTimesheetEntryParams {
                    end_time: Some(start + Duration::minutes(45)),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.duration, 45 * 60 * 1000);
        assert_eq!(updated.hours, dec!(0.75));
    }

    #[tokio::test]
    async fn inverted_interval_is_rejected() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let (case_id, user_id) = seed(backend).await;
        let now = Utc::now();

        let err = backend
            .create_timesheet_entry(&CreateTimesheetEntryParams {
                case_id,
                user_id,
                task_id: None,
                start_time: now,
                end_time: now - Duration::minutes(1),
                duration: 0,
                description: None,
            })
            .await
            .expect_err("inverted");
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn range_query_carries_labels() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let (case_id, user_id) = seed(backend).await;
        let now = Utc::now();

        for days_ago in [1, 10] {
            let start = now - Duration::days(days_ago);
            backend
                .create_timesheet_entry(&CreateTimesheetEntryParams {
                    case_id,
                    user_id,
                    task_id: None,
                    start_time: start,
                    end_time: start + Duration::hours(1),
                    duration: 3_600_000,
                    description: None,
                })
                .await
                .expect("entry");
        }

        let recent = backend
            .timesheet_entries_in_range(&TimesheetFilter {
                user_id: Some(user_id),
                from: Some(now - Duration::days(5)),
                ..Default::default()
            })
            .await
            .expect("range");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].case_name.as_deref(), Some("Merger review"));
        assert_eq!(recent[0].user_name.as_deref(), Some("Rin"));
        assert_eq!(recent[0].task_title, None);

        let paged = backend
            .list_timesheet_entries(
                &TimesheetFilter {
                    case_id: Some(case_id),
                    ..Default::default()
                },
                PageRequest { page: 1, limit: 1 },
            )
            .await
            .expect("paged");
        assert_eq!(paged.total, 2);
        assert_eq!(paged.items.len(), 1);
    }
}
