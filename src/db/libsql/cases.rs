use libsql::params;
use uuid::Uuid;

use crate::db::{
    CaseAssignmentRecord, CaseAssignmentStore, CaseFilter, CasePartyRecord, CasePartyStore,
    CaseRecord, CaseStore, CreateCaseParams, PageRequest, Paged, UpdateCaseParams,
};
use crate::error::DatabaseError;

use super::{
    Filter, LibSqlBackend, count_rows, get_bool, get_opt_text, get_text, like_pattern, now_ts,
    opt_decimal, opt_text, opt_ts, opt_uuid, parse_decimal, parse_dt_opt, parse_json, parse_ts,
    parse_uuid, parse_uuid_opt,
};

pub(super) const CASE_COLUMNS: &str = "id, name, case_number, status, trial_level, hourly_rate, \
     first_consultation_date, engagement_date, case_closed_date, judgment_date, \
     has_engagement_letter, remarks, custom_properties, category_id, current_phase_id, \
     court_division_id, created_at, updated_at";

pub(super) fn row_to_case_record(row: &libsql::Row) -> Result<CaseRecord, DatabaseError> {
    Ok(CaseRecord {
        id: parse_uuid(&get_text(row, 0), "cases.id")?,
        name: get_text(row, 1),
        case_number: get_opt_text(row, 2),
        status: get_opt_text(row, 3),
        trial_level: get_opt_text(row, 4),
        hourly_rate: get_opt_text(row, 5)
            .map(|raw| parse_decimal(&raw))
            .transpose()?,
        first_consultation_date: parse_dt_opt(get_opt_text(row, 6))?,
        engagement_date: parse_dt_opt(get_opt_text(row, 7))?,
        case_closed_date: parse_dt_opt(get_opt_text(row, 8))?,
        judgment_date: parse_dt_opt(get_opt_text(row, 9))?,
        has_engagement_letter: get_bool(row, 10),
        remarks: get_opt_text(row, 11),
        custom_properties: parse_json(&get_text(row, 12), serde_json::json!({}))?,
        category_id: parse_uuid(&get_text(row, 13), "cases.category_id")?,
        current_phase_id: parse_uuid_opt(get_opt_text(row, 14), "cases.current_phase_id")?,
        court_division_id: parse_uuid_opt(get_opt_text(row, 15), "cases.court_division_id")?,
        created_at: parse_ts(&get_text(row, 16))?,
        updated_at: parse_ts(&get_text(row, 17))?,
    })
}

fn row_to_case_party_record(row: &libsql::Row) -> Result<CasePartyRecord, DatabaseError> {
    Ok(CasePartyRecord {
        case_id: parse_uuid(&get_text(row, 0), "case_parties.case_id")?,
        party_id: parse_uuid(&get_text(row, 1), "case_parties.party_id")?,
        role: get_text(row, 2),
        created_at: parse_ts(&get_text(row, 3))?,
    })
}

fn row_to_assignment_record(row: &libsql::Row) -> Result<CaseAssignmentRecord, DatabaseError> {
    Ok(CaseAssignmentRecord {
        id: parse_uuid(&get_text(row, 0), "case_assignments.id")?,
        case_id: parse_uuid(&get_text(row, 1), "case_assignments.case_id")?,
        user_id: parse_uuid(&get_text(row, 2), "case_assignments.user_id")?,
        role: get_opt_text(row, 3),
        created_at: parse_ts(&get_text(row, 4))?,
    })
}

fn case_filter(filter: &CaseFilter) -> Filter {
    let mut out = Filter::default();
    if let Some(category_id) = filter.category_id {
        out.push_eq("category_id", libsql::Value::Text(category_id.to_string()));
    }
    if let Some(status) = filter.status.as_deref() {
        out.push_eq("status", libsql::Value::Text(status.to_string()));
    }
    if let Some(name) = filter.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        out.push(
            "name LIKE ? ESCAPE '\\'",
            vec![libsql::Value::Text(like_pattern(name))],
        );
    }
    out
}

#[async_trait::async_trait]
impl CaseStore for LibSqlBackend {
    async fn create_case(&self, input: &CreateCaseParams) -> Result<CaseRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        let now = now_ts();
        conn.execute(
            "INSERT INTO cases (id, name, case_number, status, trial_level, hourly_rate, \
               first_consultation_date, engagement_date, case_closed_date, judgment_date, \
               has_engagement_letter, remarks, custom_properties, category_id, current_phase_id, \
               court_division_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
            params![
                id.to_string(),
                input.name.trim(),
                opt_text(input.case_number.as_deref()),
                opt_text(input.status.as_deref()),
                opt_text(input.trial_level.as_deref()),
                opt_decimal(input.hourly_rate),
                opt_ts(input.first_consultation_date.as_ref()),
                opt_ts(input.engagement_date.as_ref()),
                opt_ts(input.case_closed_date.as_ref()),
                opt_ts(input.judgment_date.as_ref()),
                i64::from(input.has_engagement_letter),
                opt_text(input.remarks.as_deref()),
                input.custom_properties.to_string(),
                input.category_id.to_string(),
                opt_uuid(input.current_phase_id),
                opt_uuid(input.court_division_id),
                now,
            ],
        )
        .await?;

        self.get_case(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created case".to_string()))
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<CaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_case_record(&row)).transpose()
    }

    async fn get_case_by_number(
        &self,
        case_number: &str,
    ) -> Result<Option<CaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_number = ?1 LIMIT 1"),
                params![case_number],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_case_record(&row)).transpose()
    }

    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: PageRequest,
    ) -> Result<Paged<CaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let filter = case_filter(filter);
        let total = count_rows(&conn, "cases", &filter).await?;

        let (suffix, params) = filter.paged_params(page);
        let sql = format!(
            "SELECT {CASE_COLUMNS} FROM cases{} ORDER BY created_at DESC, id ASC{}",
            filter.where_sql(),
            suffix
        );
        let mut rows = conn.query(&sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_case_record(&row)?);
        }
        Ok(Paged { items, total })
    }

    async fn update_case(
        &self,
        id: Uuid,
        input: &UpdateCaseParams,
    ) -> Result<Option<CaseRecord>, DatabaseError> {
        let Some(existing) = self.get_case(id).await? else {
            return Ok(None);
        };

        let merged_name = input.name.as_deref().unwrap_or(existing.name.as_str()).trim();
        let merged_case_number = input.case_number.clone().unwrap_or(existing.case_number);
        let merged_status = input.status.clone().unwrap_or(existing.status);
        let merged_trial_level = input.trial_level.clone().unwrap_or(existing.trial_level);
        let merged_rate = input.hourly_rate.unwrap_or(existing.hourly_rate);
        let merged_consult = input
            .first_consultation_date
            .unwrap_or(existing.first_consultation_date);
        let merged_engagement = input.engagement_date.unwrap_or(existing.engagement_date);
        let merged_closed = input.case_closed_date.unwrap_or(existing.case_closed_date);
        let merged_judgment = input.judgment_date.unwrap_or(existing.judgment_date);
        let merged_letter = input
            .has_engagement_letter
            .unwrap_or(existing.has_engagement_letter);
        let merged_remarks = input.remarks.clone().unwrap_or(existing.remarks);
        let merged_custom = input
            .custom_properties
            .clone()
            .unwrap_or(existing.custom_properties);
        let merged_category = input.category_id.unwrap_or(existing.category_id);
        let merged_phase = input.current_phase_id.unwrap_or(existing.current_phase_id);
        let merged_division = input.court_division_id.unwrap_or(existing.court_division_id);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE cases SET \
               name = ?2, case_number = ?3, status = ?4, trial_level = ?5, hourly_rate = ?6, \
               first_consultation_date = ?7, engagement_date = ?8, case_closed_date = ?9, \
               judgment_date = ?10, has_engagement_letter = ?11, remarks = ?12, \
               custom_properties = ?13, category_id = ?14, current_phase_id = ?15, \
               court_division_id = ?16, updated_at = ?17 \
             WHERE id = ?1",
            params![
                id.to_string(),
                merged_name,
                opt_text(merged_case_number.as_deref()),
                opt_text(merged_status.as_deref()),
                opt_text(merged_trial_level.as_deref()),
                opt_decimal(merged_rate),
                opt_ts(merged_consult.as_ref()),
                opt_ts(merged_engagement.as_ref()),
                opt_ts(merged_closed.as_ref()),
                opt_ts(merged_judgment.as_ref()),
                i64::from(merged_letter),
                opt_text(merged_remarks.as_deref()),
                merged_custom.to_string(),
                merged_category.to_string(),
                opt_uuid(merged_phase),
                opt_uuid(merged_division),
                now_ts(),
            ],
        )
        .await?;

        self.get_case(id).await
    }

    async fn delete_case(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute("DELETE FROM cases WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl CasePartyStore for LibSqlBackend {
    async fn add_case_party(
        &self,
        case_id: Uuid,
        party_id: Uuid,
        role: &str,
    ) -> Result<CasePartyRecord, DatabaseError> {
        let conn = self.connect().await?;
        let now = now_ts();
        conn.execute(
            "INSERT INTO case_parties (case_id, party_id, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![case_id.to_string(), party_id.to_string(), role, now],
        )
        .await?;

        let row = conn
            .query(
                "SELECT case_id, party_id, role, created_at FROM case_parties \
                 WHERE case_id = ?1 AND party_id = ?2 AND role = ?3 LIMIT 1",
                params![case_id.to_string(), party_id.to_string(), role],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created case party".to_string()))?;
        row_to_case_party_record(&row)
    }

    async fn list_case_parties(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<CasePartyRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT case_id, party_id, role, created_at FROM case_parties \
                 WHERE case_id = ?1 ORDER BY created_at ASC, role ASC",
                params![case_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_case_party_record(&row)?);
        }
        Ok(out)
    }

    async fn remove_case_party(
        &self,
        case_id: Uuid,
        party_id: Uuid,
        role: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM case_parties WHERE case_id = ?1 AND party_id = ?2 AND role = ?3",
                params![case_id.to_string(), party_id.to_string(), role],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl CaseAssignmentStore for LibSqlBackend {
    async fn assign_user(
        &self,
        case_id: Uuid,
        user_id: Uuid,
        role: Option<&str>,
    ) -> Result<CaseAssignmentRecord, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO case_assignments (id, case_id, user_id, role, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (case_id, user_id) DO UPDATE SET role = excluded.role",
            params![
                Uuid::new_v4().to_string(),
                case_id.to_string(),
                user_id.to_string(),
                opt_text(role),
                now_ts(),
            ],
        )
        .await?;

        let row = conn
            .query(
                "SELECT id, case_id, user_id, role, created_at FROM case_assignments \
                 WHERE case_id = ?1 AND user_id = ?2 LIMIT 1",
                params![case_id.to_string(), user_id.to_string()],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load case assignment".to_string()))?;
        row_to_assignment_record(&row)
    }

    async fn list_assignments(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<CaseAssignmentRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, case_id, user_id, role, created_at FROM case_assignments \
                 WHERE case_id = ?1 ORDER BY created_at ASC",
                params![case_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_assignment_record(&row)?);
        }
        Ok(out)
    }

    async fn unassign_user(&self, case_id: Uuid, user_id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM case_assignments WHERE case_id = ?1 AND user_id = ?2",
                params![case_id.to_string(), user_id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::libsql::test_support::setup_backend;
    use crate::db::{
        CaseCategoryStore, CreateCaseCategoryParams, CreatePartyParams, PartyStore,
    };

    async fn seed_category(backend: &LibSqlBackend) -> Uuid {
        backend
            .create_category(&CreateCaseCategoryParams {
                name: "Civil".to_string(),
                parent_category_id: None,
                role_definitions: serde_json::json!({}),
            })
            .await
            .expect("category")
            .id
    }

    #[tokio::test]
    async fn create_and_update_case_merges_fields() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let category_id = seed_category(backend).await;

        let mut params = CreateCaseParams::new("Smith v. Jones", category_id);
        params.case_number = Some("2026-WA-101".to_string());
        params.hourly_rate = Some(dec!(350.00));
        let created = backend.create_case(&params).await.expect("create");
        assert_eq!(created.hourly_rate, Some(dec!(350.00)));
        assert!(!created.has_engagement_letter);

        let updated = backend
            .update_case(
                created.id,
                &UpdateCaseParams {
                    status: Some(Some("active".to_string())),
                    hourly_rate: Some(None),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.name, "Smith v. Jones");
        assert_eq!(updated.status.as_deref(), Some("active"));
        assert_eq!(updated.hourly_rate, None);
        assert_eq!(updated.case_number.as_deref(), Some("2026-WA-101"));

        let by_number = backend
            .get_case_by_number("2026-WA-101")
            .await
            .expect("lookup")
            .expect("found");
        assert_eq!(by_number.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_case_number_is_a_constraint_error() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let category_id = seed_category(backend).await;

        let mut params = CreateCaseParams::new("First", category_id);
        params.case_number = Some("DUP-1".to_string());
        backend.create_case(&params).await.expect("first");
        params.name = "Second".to_string();
        let err = backend.create_case(&params).await.expect_err("duplicate");
        assert!(err.is_unique_violation(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn list_cases_pages_and_counts() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let category_id = seed_category(backend).await;

        for idx in 0..15 {
            backend
                .create_case(&CreateCaseParams::new(format!("Case {idx}"), category_id))
                .await
                .expect("create");
        }

        let page = PageRequest { page: 2, limit: 5 };
        let listed = backend
            .list_cases(&CaseFilter::default(), page)
            .await
            .expect("list");
        assert_eq!(listed.items.len(), 5);
        assert_eq!(listed.total, 15);
        assert_eq!(page.pages(listed.total), 3);

        let filtered = backend
            .list_cases(
                &CaseFilter {
                    name: Some("Case 1".to_string()),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .expect("filtered");
        // "Case 1" and "Case 10".."Case 14"
        assert_eq!(filtered.total, 6);
    }

    #[tokio::test]
    async fn case_party_roles_are_unique_per_party() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let category_id = seed_category(backend).await;
        let case = backend
            .create_case(&CreateCaseParams::new("Roles", category_id))
            .await
            .expect("case");
        let party = backend
            .create_party(&CreatePartyParams::default())
            .await
            .expect("party");

        backend
            .add_case_party(case.id, party.party.id, "plaintiff")
            .await
            .expect("first role");
        backend
            .add_case_party(case.id, party.party.id, "witness")
            .await
            .expect("second role for same party");
        let err = backend
            .add_case_party(case.id, party.party.id, "plaintiff")
            .await
            .expect_err("duplicate role");
        assert!(err.is_unique_violation());

        let err = backend
            .add_case_party(case.id, Uuid::new_v4(), "defendant")
            .await
            .expect_err("unknown party");
        assert!(err.is_foreign_key_violation());

        assert_eq!(backend.list_case_parties(case.id).await.expect("list").len(), 2);
        assert!(
            backend
                .remove_case_party(case.id, party.party.id, "witness")
                .await
                .expect("remove")
        );
        assert!(
            !backend
                .remove_case_party(case.id, party.party.id, "witness")
                .await
                .expect("remove again")
        );
    }
}
