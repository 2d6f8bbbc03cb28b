use libsql::params;
use uuid::Uuid;

use crate::db::{
    CaseCategoryRecord, CaseCategoryStore, CasePhaseRecord, CasePhaseStore,
    CreateCaseCategoryParams, CreateCasePhaseParams, UpdateCaseCategoryParams,
    UpdateCasePhaseParams,
};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, get_i64, get_opt_text, get_text, now_ts, opt_uuid, parse_json, parse_ts,
    parse_uuid, parse_uuid_opt,
};

const CATEGORY_COLUMNS: &str =
    "id, name, parent_category_id, role_definitions, created_at, updated_at";
const PHASE_COLUMNS: &str = "id, category_id, name, sort_order, created_at, updated_at";

fn row_to_category_record(row: &libsql::Row) -> Result<CaseCategoryRecord, DatabaseError> {
    Ok(CaseCategoryRecord {
        id: parse_uuid(&get_text(row, 0), "case_categories.id")?,
        name: get_text(row, 1),
        parent_category_id: parse_uuid_opt(
            get_opt_text(row, 2),
            "case_categories.parent_category_id",
        )?,
        role_definitions: parse_json(&get_text(row, 3), serde_json::json!({}))?,
        created_at: parse_ts(&get_text(row, 4))?,
        updated_at: parse_ts(&get_text(row, 5))?,
    })
}

fn row_to_phase_record(row: &libsql::Row) -> Result<CasePhaseRecord, DatabaseError> {
    Ok(CasePhaseRecord {
        id: parse_uuid(&get_text(row, 0), "case_phases.id")?,
        category_id: parse_uuid(&get_text(row, 1), "case_phases.category_id")?,
        name: get_text(row, 2),
        order: get_i64(row, 3),
        created_at: parse_ts(&get_text(row, 4))?,
        updated_at: parse_ts(&get_text(row, 5))?,
    })
}

#[async_trait::async_trait]
impl CaseCategoryStore for LibSqlBackend {
    async fn create_category(
        &self,
        input: &CreateCaseCategoryParams,
    ) -> Result<CaseCategoryRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        let now = now_ts();
        conn.execute(
            "INSERT INTO case_categories (id, name, parent_category_id, role_definitions, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.to_string(),
                input.name.trim(),
                opt_uuid(input.parent_category_id),
                input.role_definitions.to_string(),
                now,
            ],
        )
        .await?;

        self.get_category(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created category".to_string()))
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<CaseCategoryRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {CATEGORY_COLUMNS} FROM case_categories WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_category_record(&row)).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<CaseCategoryRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {CATEGORY_COLUMNS} FROM case_categories ORDER BY name ASC"),
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_category_record(&row)?);
        }
        Ok(out)
    }

    async fn list_child_categories(
        &self,
        parent_id: Uuid,
    ) -> Result<Vec<CaseCategoryRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CATEGORY_COLUMNS} FROM case_categories \
                     WHERE parent_category_id = ?1 ORDER BY name ASC"
                ),
                params![parent_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_category_record(&row)?);
        }
        Ok(out)
    }

    async fn update_category(
        &self,
        id: Uuid,
        input: &UpdateCaseCategoryParams,
    ) -> Result<Option<CaseCategoryRecord>, DatabaseError> {
        let Some(existing) = self.get_category(id).await? else {
            return Ok(None);
        };

        let merged_name = input.name.as_deref().unwrap_or(existing.name.as_str()).trim();
        let merged_parent = input.parent_category_id.unwrap_or(existing.parent_category_id);
        let merged_roles = input
            .role_definitions
            .clone()
            .unwrap_or(existing.role_definitions);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE case_categories SET name = ?2, parent_category_id = ?3, role_definitions = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![
                id.to_string(),
                merged_name,
                opt_uuid(merged_parent),
                merged_roles.to_string(),
                now_ts(),
            ],
        )
        .await?;

        self.get_category(id).await
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM case_categories WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl CasePhaseStore for LibSqlBackend {
    async fn create_phase(
        &self,
        input: &CreateCasePhaseParams,
    ) -> Result<CasePhaseRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        let now = now_ts();
        conn.execute(
            "INSERT INTO case_phases (id, category_id, name, sort_order, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.to_string(),
                input.category_id.to_string(),
                input.name.trim(),
                input.order,
                now,
            ],
        )
        .await?;

        self.get_phase(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created phase".to_string()))
    }

    async fn get_phase(&self, id: Uuid) -> Result<Option<CasePhaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {PHASE_COLUMNS} FROM case_phases WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_phase_record(&row)).transpose()
    }

    async fn list_phases_for_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<CasePhaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PHASE_COLUMNS} FROM case_phases WHERE category_id = ?1 \
                     ORDER BY sort_order ASC, name ASC"
                ),
                params![category_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_phase_record(&row)?);
        }
        Ok(out)
    }

    async fn update_phase(
        &self,
        id: Uuid,
        input: &UpdateCasePhaseParams,
    ) -> Result<Option<CasePhaseRecord>, DatabaseError> {
        let Some(existing) = self.get_phase(id).await? else {
            return Ok(None);
        };

        let merged_name = input.name.as_deref().unwrap_or(existing.name.as_str()).trim();
        let merged_order = input.order.unwrap_or(existing.order);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE case_phases SET name = ?2, sort_order = ?3, updated_at = ?4 WHERE id = ?1",
            params![id.to_string(), merged_name, merged_order, now_ts()],
        )
        .await?;

        self.get_phase(id).await
    }

    async fn delete_phase(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute("DELETE FROM case_phases WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(deleted > 0)
    }
}
