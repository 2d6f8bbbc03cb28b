use libsql::params;
use uuid::Uuid;

use crate::db::{
    CourtDivisionRecord, CourtPersonnelRecord, CourthouseRecord, CourthouseStore,
    CreateCourtDivisionParams, CreateCourtPersonnelParams, CreateCourthouseParams, PageRequest,
    Paged, UpdateCourthouseParams,
};
use crate::error::DatabaseError;

use super::{
    Filter, LibSqlBackend, count_rows, get_opt_text, get_text, like_pattern, now_ts, opt_text,
    opt_uuid, parse_ts, parse_uuid, parse_uuid_opt,
};

const COURTHOUSE_COLUMNS: &str =
    "id, name, postal_code, address1, address2, phone, created_at, updated_at";
const DIVISION_COLUMNS: &str =
    "id, courthouse_id, parent_id, name, division_type, phone, fax, created_at, updated_at";
const PERSONNEL_COLUMNS: &str =
    "p.id, p.court_division_id, p.name, p.role, p.email, p.created_at, p.updated_at";

fn row_to_courthouse_record(row: &libsql::Row) -> Result<CourthouseRecord, DatabaseError> {
    Ok(CourthouseRecord {
        id: parse_uuid(&get_text(row, 0), "courthouses.id")?,
        name: get_text(row, 1),
        postal_code: get_opt_text(row, 2),
        address1: get_opt_text(row, 3),
        address2: get_opt_text(row, 4),
        phone: get_opt_text(row, 5),
        created_at: parse_ts(&get_text(row, 6))?,
        updated_at: parse_ts(&get_text(row, 7))?,
    })
}

fn row_to_division_record(row: &libsql::Row) -> Result<CourtDivisionRecord, DatabaseError> {
    Ok(CourtDivisionRecord {
        id: parse_uuid(&get_text(row, 0), "court_divisions.id")?,
        courthouse_id: parse_uuid(&get_text(row, 1), "court_divisions.courthouse_id")?,
        parent_id: parse_uuid_opt(get_opt_text(row, 2), "court_divisions.parent_id")?,
        name: get_text(row, 3),
        division_type: get_text(row, 4),
        phone: get_opt_text(row, 5),
        fax: get_opt_text(row, 6),
        created_at: parse_ts(&get_text(row, 7))?,
        updated_at: parse_ts(&get_text(row, 8))?,
    })
}

fn row_to_personnel_record(row: &libsql::Row) -> Result<CourtPersonnelRecord, DatabaseError> {
    Ok(CourtPersonnelRecord {
        id: parse_uuid(&get_text(row, 0), "court_personnel.id")?,
        court_division_id: parse_uuid(&get_text(row, 1), "court_personnel.court_division_id")?,
        name: get_text(row, 2),
        role: get_text(row, 3),
        email: get_opt_text(row, 4),
        created_at: parse_ts(&get_text(row, 5))?,
        updated_at: parse_ts(&get_text(row, 6))?,
    })
}

#[async_trait::async_trait]
impl CourthouseStore for LibSqlBackend {
    async fn create_courthouse(
        &self,
        input: &CreateCourthouseParams,
    ) -> Result<CourthouseRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO courthouses (id, name, postal_code, address1, address2, phone, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.to_string(),
                input.name.trim(),
                opt_text(input.postal_code.as_deref()),
                opt_text(input.address1.as_deref()),
                opt_text(input.address2.as_deref()),
                opt_text(input.phone.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_courthouse(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created courthouse".to_string()))
    }

    async fn get_courthouse(&self, id: Uuid) -> Result<Option<CourthouseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {COURTHOUSE_COLUMNS} FROM courthouses WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_courthouse_record(&row)).transpose()
    }

    async fn get_courthouse_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CourthouseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {COURTHOUSE_COLUMNS} FROM courthouses WHERE name = ?1 LIMIT 1"),
                params![name.trim()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_courthouse_record(&row)).transpose()
    }

    async fn list_courthouses(
        &self,
        name: Option<&str>,
        page: PageRequest,
    ) -> Result<Paged<CourthouseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut filter = Filter::default();
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            filter.push(
                "name LIKE ? ESCAPE '\\'",
                vec![libsql::Value::Text(like_pattern(name))],
            );
        }
        let total = count_rows(&conn, "courthouses", &filter).await?;

        let (suffix, params) = filter.paged_params(page);
        let sql = format!(
            "SELECT {COURTHOUSE_COLUMNS} FROM courthouses{} ORDER BY name ASC{}",
            filter.where_sql(),
            suffix
        );
        let mut rows = conn.query(&sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_courthouse_record(&row)?);
        }
        Ok(Paged { items, total })
    }

    async fn update_courthouse(
        &self,
        id: Uuid,
        input: &UpdateCourthouseParams,
    ) -> Result<Option<CourthouseRecord>, DatabaseError> {
        let Some(existing) = self.get_courthouse(id).await? else {
            return Ok(None);
        };

        let merged_name = input.name.as_deref().unwrap_or(existing.name.as_str()).trim();
        let merged_postal = input.postal_code.clone().unwrap_or(existing.postal_code);
        let merged_address1 = input.address1.clone().unwrap_or(existing.address1);
        let merged_address2 = input.address2.clone().unwrap_or(existing.address2);
        let merged_phone = input.phone.clone().unwrap_or(existing.phone);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE courthouses SET name = ?2, postal_code = ?3, address1 = ?4, address2 = ?5, \
               phone = ?6, updated_at = ?7 \
             WHERE id = ?1",
            params![
                id.to_string(),
                merged_name,
                opt_text(merged_postal.as_deref()),
                opt_text(merged_address1.as_deref()),
                opt_text(merged_address2.as_deref()),
                opt_text(merged_phone.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_courthouse(id).await
    }

    async fn delete_courthouse(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM courthouses WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn create_division(
        &self,
        input: &CreateCourtDivisionParams,
    ) -> Result<CourtDivisionRecord, DatabaseError> {
        if let Some(parent_id) = input.parent_id {
            let parent = self.get_division(parent_id).await?;
            if parent.is_some_and(|p| p.courthouse_id != input.courthouse_id) {
                return Err(DatabaseError::Constraint(
                    "parent division belongs to another courthouse".to_string(),
                ));
            }
        }

        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO court_divisions (id, courthouse_id, parent_id, name, division_type, phone, fax, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id.to_string(),
                input.courthouse_id.to_string(),
                opt_uuid(input.parent_id),
                input.name.trim(),
                input.division_type.trim(),
                opt_text(input.phone.as_deref()),
                opt_text(input.fax.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_division(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created division".to_string()))
    }

    async fn get_division(&self, id: Uuid) -> Result<Option<CourtDivisionRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {DIVISION_COLUMNS} FROM court_divisions WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_division_record(&row)).transpose()
    }

    async fn list_divisions(
        &self,
        courthouse_id: Uuid,
    ) -> Result<Vec<CourtDivisionRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {DIVISION_COLUMNS} FROM court_divisions WHERE courthouse_id = ?1 \
                     ORDER BY name ASC"
                ),
                params![courthouse_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_division_record(&row)?);
        }
        Ok(out)
    }

    async fn create_personnel(
        &self,
        input: &CreateCourtPersonnelParams,
    ) -> Result<CourtPersonnelRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO court_personnel (id, court_division_id, name, role, email, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id.to_string(),
                input.court_division_id.to_string(),
                input.name.trim(),
                input.role.trim(),
                opt_text(input.email.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        let row = conn
            .query(
                &format!("SELECT {PERSONNEL_COLUMNS} FROM court_personnel p WHERE p.id = ?1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created personnel".to_string()))?;
        row_to_personnel_record(&row)
    }

    async fn list_personnel(
        &self,
        courthouse_id: Uuid,
    ) -> Result<Vec<CourtPersonnelRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PERSONNEL_COLUMNS} FROM court_personnel p \
                     JOIN court_divisions d ON d.id = p.court_division_id \
                     WHERE d.courthouse_id = ?1 ORDER BY p.name ASC"
                ),
                params![courthouse_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_personnel_record(&row)?);
        }
        Ok(out)
    }
}
