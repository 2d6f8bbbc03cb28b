use libsql::params;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{
    CaseEventRecord, CaseEventStore, CaseLedgerStore, CaseLedgerTotals, CaseMemoRecord,
    CaseMemoStore, CreateCaseEventParams, CreateLedgerEntryParams, CreateTaskParams, LedgerKind,
    LedgerEntryRecord, TaskRecord, TaskStatus, TaskStore, UpdateTaskParams,
};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, fmt_ts, get_opt_text, get_text, now_ts, opt_text, opt_ts, opt_uuid,
    parse_date, parse_decimal, parse_dt_opt, parse_ts, parse_uuid, parse_uuid_opt,
};

pub(super) const TASK_COLUMNS: &str =
    "id, case_id, title, description, status, due_date, assigned_to, created_at, updated_at";
pub(super) const EVENT_COLUMNS: &str =
    "id, case_id, event_type, date_time, location, title, description, created_by, created_at";
const LEDGER_COLUMNS: &str = "id, case_id, kind, entry_date, amount, description, created_at";

pub(super) fn row_to_task_record(row: &libsql::Row) -> Result<TaskRecord, DatabaseError> {
    let status_raw = get_text(row, 4);
    let status = TaskStatus::from_db_value(&status_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("invalid task status '{status_raw}'"))
    })?;
    Ok(TaskRecord {
        id: parse_uuid(&get_text(row, 0), "tasks.id")?,
        case_id: parse_uuid(&get_text(row, 1), "tasks.case_id")?,
        title: get_text(row, 2),
        description: get_opt_text(row, 3),
        status,
        due_date: parse_dt_opt(get_opt_text(row, 5))?,
        assigned_to: parse_uuid_opt(get_opt_text(row, 6), "tasks.assigned_to")?,
        created_at: parse_ts(&get_text(row, 7))?,
        updated_at: parse_ts(&get_text(row, 8))?,
    })
}

pub(super) fn row_to_event_record(row: &libsql::Row) -> Result<CaseEventRecord, DatabaseError> {
    Ok(CaseEventRecord {
        id: parse_uuid(&get_text(row, 0), "case_events.id")?,
        case_id: parse_uuid(&get_text(row, 1), "case_events.case_id")?,
        event_type: get_text(row, 2),
        date_time: parse_ts(&get_text(row, 3))?,
        location: get_opt_text(row, 4),
        title: get_opt_text(row, 5),
        description: get_opt_text(row, 6),
        created_by: parse_uuid_opt(get_opt_text(row, 7), "case_events.created_by")?,
        created_at: parse_ts(&get_text(row, 8))?,
    })
}

fn row_to_memo_record(row: &libsql::Row) -> Result<CaseMemoRecord, DatabaseError> {
    Ok(CaseMemoRecord {
        id: parse_uuid(&get_text(row, 0), "case_memos.id")?,
        case_id: parse_uuid(&get_text(row, 1), "case_memos.case_id")?,
        author_id: parse_uuid_opt(get_opt_text(row, 2), "case_memos.author_id")?,
        content: get_text(row, 3),
        created_at: parse_ts(&get_text(row, 4))?,
    })
}

fn row_to_ledger_record(row: &libsql::Row) -> Result<LedgerEntryRecord, DatabaseError> {
    let kind_raw = get_text(row, 2);
    let kind = LedgerKind::from_db_value(&kind_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("invalid ledger kind '{kind_raw}'"))
    })?;
    Ok(LedgerEntryRecord {
        id: parse_uuid(&get_text(row, 0), "case_ledger_entries.id")?,
        case_id: parse_uuid(&get_text(row, 1), "case_ledger_entries.case_id")?,
        kind,
        date: parse_date(&get_text(row, 3))?,
        amount: parse_decimal(&get_text(row, 4))?,
        description: get_text(row, 5),
        created_at: parse_ts(&get_text(row, 6))?,
    })
}

/// Insert a task on an already-open connection. Shared with the phase
/// transition so generated tasks join its transaction.
pub(super) async fn insert_task(
    conn: &libsql::Connection,
    input: &CreateTaskParams,
) -> Result<TaskRecord, DatabaseError> {
    let id = Uuid::new_v4();
    let now = now_ts();
    conn.execute(
        "INSERT INTO tasks (id, case_id, title, description, status, due_date, assigned_to, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id.to_string(),
            input.case_id.to_string(),
            input.title.trim(),
            opt_text(input.description.as_deref()),
            input.status.as_str(),
            opt_ts(input.due_date.as_ref()),
            opt_uuid(input.assigned_to),
            now,
        ],
    )
    .await?;

    let row = conn
        .query(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 LIMIT 1"),
            params![id.to_string()],
        )
        .await?
        .next()
        .await?
        .ok_or_else(|| DatabaseError::Query("failed to load created task".to_string()))?;
    row_to_task_record(&row)
}

/// Insert a case event on an already-open connection.
pub(super) async fn insert_case_event(
    conn: &libsql::Connection,
    input: &CreateCaseEventParams,
) -> Result<CaseEventRecord, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO case_events (id, case_id, event_type, date_time, location, title, description, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id.to_string(),
            input.case_id.to_string(),
            input.event_type.as_str(),
            fmt_ts(&input.date_time),
            opt_text(input.location.as_deref()),
            opt_text(input.title.as_deref()),
            opt_text(input.description.as_deref()),
            opt_uuid(input.created_by),
            now_ts(),
        ],
    )
    .await?;

    let row = conn
        .query(
            &format!("SELECT {EVENT_COLUMNS} FROM case_events WHERE id = ?1 LIMIT 1"),
            params![id.to_string()],
        )
        .await?
        .next()
        .await?
        .ok_or_else(|| DatabaseError::Query("failed to load created case event".to_string()))?;
    row_to_event_record(&row)
}

#[async_trait::async_trait]
impl TaskStore for LibSqlBackend {
    async fn create_task(&self, input: &CreateTaskParams) -> Result<TaskRecord, DatabaseError> {
        let conn = self.connect().await?;
        insert_task(&conn, input).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_task_record(&row)).transpose()
    }

    async fn list_tasks_for_case(&self, case_id: Uuid) -> Result<Vec<TaskRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE case_id = ?1 \
                     ORDER BY due_date IS NULL, due_date ASC, created_at ASC"
                ),
                params![case_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_task_record(&row)?);
        }
        Ok(out)
    }

    async fn update_task(
        &self,
        id: Uuid,
        input: &UpdateTaskParams,
    ) -> Result<Option<TaskRecord>, DatabaseError> {
        let Some(existing) = self.get_task(id).await? else {
            return Ok(None);
        };

        let merged_title = input.title.as_deref().unwrap_or(existing.title.as_str()).trim();
        let merged_description = input.description.clone().unwrap_or(existing.description);
        let merged_status = input.status.unwrap_or(existing.status);
        let merged_due = input.due_date.unwrap_or(existing.due_date);
        let merged_assignee = input.assigned_to.unwrap_or(existing.assigned_to);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE tasks SET title = ?2, description = ?3, status = ?4, due_date = ?5, \
               assigned_to = ?6, updated_at = ?7 \
             WHERE id = ?1",
            params![
                id.to_string(),
                merged_title,
                opt_text(merged_description.as_deref()),
                merged_status.as_str(),
                opt_ts(merged_due.as_ref()),
                opt_uuid(merged_assignee),
                now_ts(),
            ],
        )
        .await?;

        self.get_task(id).await
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl CaseEventStore for LibSqlBackend {
    async fn create_case_event(
        &self,
        input: &CreateCaseEventParams,
    ) -> Result<CaseEventRecord, DatabaseError> {
        let conn = self.connect().await?;
        insert_case_event(&conn, input).await
    }

    async fn list_case_events(
        &self,
        case_id: Uuid,
        event_type: Option<&str>,
    ) -> Result<Vec<CaseEventRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = match event_type {
            Some(event_type) => {
                conn.query(
                    &format!(
                        "SELECT {EVENT_COLUMNS} FROM case_events \
                         WHERE case_id = ?1 AND event_type = ?2 \
                         ORDER BY date_time DESC, created_at DESC"
                    ),
                    params![case_id.to_string(), event_type],
                )
                .await?
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {EVENT_COLUMNS} FROM case_events WHERE case_id = ?1 \
                         ORDER BY date_time DESC, created_at DESC"
                    ),
                    params![case_id.to_string()],
                )
                .await?
            }
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_event_record(&row)?);
        }
        Ok(out)
    }

    async fn get_case_event(&self, id: Uuid) -> Result<Option<CaseEventRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM case_events WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_event_record(&row)).transpose()
    }

    async fn delete_case_event(&self, case_id: Uuid, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM case_events WHERE id = ?1 AND case_id = ?2",
                params![id.to_string(), case_id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl CaseMemoStore for LibSqlBackend {
    async fn create_memo(
        &self,
        case_id: Uuid,
        author_id: Option<Uuid>,
        content: &str,
    ) -> Result<CaseMemoRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO case_memos (id, case_id, author_id, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                case_id.to_string(),
                opt_uuid(author_id),
                content,
                now_ts(),
            ],
        )
        .await?;

        let row = conn
            .query(
                "SELECT id, case_id, author_id, content, created_at FROM case_memos WHERE id = ?1",
                params![id.to_string()],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created memo".to_string()))?;
        row_to_memo_record(&row)
    }

    async fn list_memos(&self, case_id: Uuid) -> Result<Vec<CaseMemoRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, case_id, author_id, content, created_at FROM case_memos \
                 WHERE case_id = ?1 ORDER BY created_at DESC",
                params![case_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_memo_record(&row)?);
        }
        Ok(out)
    }

    async fn delete_memo(&self, case_id: Uuid, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM case_memos WHERE id = ?1 AND case_id = ?2",
                params![id.to_string(), case_id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl CaseLedgerStore for LibSqlBackend {
    async fn create_ledger_entry(
        &self,
        input: &CreateLedgerEntryParams,
    ) -> Result<LedgerEntryRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO case_ledger_entries (id, case_id, kind, entry_date, amount, description, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                input.case_id.to_string(),
                input.kind.as_str(),
                input.date.to_string(),
                input.amount.to_string(),
                input.description.as_str(),
                now_ts(),
            ],
        )
        .await?;

        let row = conn
            .query(
                &format!("SELECT {LEDGER_COLUMNS} FROM case_ledger_entries WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created ledger entry".to_string()))?;
        row_to_ledger_record(&row)
    }

    async fn list_ledger_entries(
        &self,
        case_id: Uuid,
        kind: LedgerKind,
    ) -> Result<Vec<LedgerEntryRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {LEDGER_COLUMNS} FROM case_ledger_entries \
                     WHERE case_id = ?1 AND kind = ?2 ORDER BY entry_date DESC, created_at DESC"
                ),
                params![case_id.to_string(), kind.as_str()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_ledger_record(&row)?);
        }
        Ok(out)
    }

    async fn delete_ledger_entry(
        &self,
        case_id: Uuid,
        kind: LedgerKind,
        id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM case_ledger_entries WHERE id = ?1 AND case_id = ?2 AND kind = ?3",
                params![id.to_string(), case_id.to_string(), kind.as_str()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn ledger_totals(&self, case_id: Uuid) -> Result<CaseLedgerTotals, DatabaseError> {
        // Amounts are stored as decimal text; sum in Rust to keep precision.
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT kind, amount FROM case_ledger_entries WHERE case_id = ?1",
                params![case_id.to_string()],
            )
            .await?;
        let mut expenses = Decimal::ZERO;
        let mut deposits = Decimal::ZERO;
        while let Some(row) = rows.next().await? {
            let amount = parse_decimal(&get_text(&row, 1))?;
            match LedgerKind::from_db_value(&get_text(&row, 0)) {
                Some(LedgerKind::Expense) => expenses += amount,
                Some(LedgerKind::Deposit) => deposits += amount,
                None => {}
            }
        }
        Ok(CaseLedgerTotals {
            expenses,
            deposits,
            balance: deposits - expenses,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::libsql::test_support::{TestBackend, setup_backend};
    use crate::db::{CaseCategoryStore, CaseStore, CreateCaseCategoryParams, CreateCaseParams};

    async fn seed_case(fixture: &TestBackend) -> Uuid {
        let category = fixture
            .backend
            .create_category(&CreateCaseCategoryParams {
                name: "Family".to_string(),
                parent_category_id: None,
                role_definitions: serde_json::json!({}),
            })
            .await
            .expect("category");
        fixture
            .backend
            .create_case(&CreateCaseParams::new("Doe divorce", category.id))
            .await
            .expect("case")
            .id
    }

    #[tokio::test]
    async fn tasks_sort_by_due_date_and_update_status() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;
        let now = Utc::now();

        for (title, due) in [
            ("Later", Some(now + Duration::days(10))),
            ("Undated", None),
            ("Sooner", Some(now + Duration::days(2))),
        ] {
            backend
                .create_task(&CreateTaskParams {
                    case_id,
                    title: title.to_string(),
                    description: None,
                    status: TaskStatus::Pending,
                    due_date: due,
                    assigned_to: None,
                })
                .await
                .expect("task");
        }

        let tasks = backend.list_tasks_for_case(case_id).await.expect("list");
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Sooner", "Later", "Undated"]);

        let done = backend
            .update_task(
                tasks[0].id,
                &UpdateTaskParams {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.title, "Sooner");
    }

    #[tokio::test]
    async fn events_filter_by_type_newest_first() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;
        let now = Utc::now();

        for (event_type, offset) in [("hearing", 1), ("hearing", 5), ("deadline", 3)] {
            backend
                .create_case_event(&CreateCaseEventParams {
                    case_id,
                    event_type: event_type.to_string(),
                    date_time: now + Duration::days(offset),
                    location: None,
                    title: Some(format!("{event_type} +{offset}")),
                    description: None,
                    created_by: None,
                })
                .await
                .expect("event");
        }

        let hearings = backend
            .list_case_events(case_id, Some("hearing"))
            .await
            .expect("hearings");
        assert_eq!(hearings.len(), 2);
        assert_eq!(hearings[0].title.as_deref(), Some("hearing +5"));

        let all = backend.list_case_events(case_id, None).await.expect("all");
        assert_eq!(all.len(), 3);

        assert!(
            !backend
                .delete_case_event(Uuid::new_v4(), all[0].id)
                .await
                .expect("wrong case")
        );
        assert!(backend.delete_case_event(case_id, all[0].id).await.expect("delete"));
    }

    #[tokio::test]
    async fn ledger_totals_balance_deposits_against_expenses() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).expect("date");

        for (kind, amount) in [
            (LedgerKind::Deposit, dec!(1000.00)),
            (LedgerKind::Expense, dec!(120.50)),
            (LedgerKind::Expense, dec!(79.50)),
        ] {
            backend
                .create_ledger_entry(&CreateLedgerEntryParams {
                    case_id,
                    kind,
                    date,
                    amount,
                    description: "filing".to_string(),
                })
                .await
                .expect("entry");
        }

        let totals = backend.ledger_totals(case_id).await.expect("totals");
        assert_eq!(totals.expenses, dec!(200.00));
        assert_eq!(totals.deposits, dec!(1000.00));
        assert_eq!(totals.balance, dec!(800.00));

        let expenses = backend
            .list_ledger_entries(case_id, LedgerKind::Expense)
            .await
            .expect("expenses");
        assert_eq!(expenses.len(), 2);
        assert!(
            !backend
                .delete_ledger_entry(case_id, LedgerKind::Deposit, expenses[0].id)
                .await
                .expect("kind mismatch")
        );
    }

    #[tokio::test]
    async fn memos_belong_to_their_case() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let case_id = seed_case(&fixture).await;

        let memo = backend
            .create_memo(case_id, None, "Client called about settlement")
            .await
            .expect("memo");
        assert_eq!(backend.list_memos(case_id).await.expect("list").len(), 1);
        assert!(!backend.delete_memo(Uuid::new_v4(), memo.id).await.expect("wrong case"));
        assert!(backend.delete_memo(case_id, memo.id).await.expect("delete"));
    }
}
