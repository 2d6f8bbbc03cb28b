use libsql::params;
use uuid::Uuid;

use crate::db::{
    CreateLawFirmOfficeParams, CreateLawyerParams, LawFirmOfficeRecord, LawFirmRecord,
    LawFirmStore, LawyerFilter, LawyerRecord, LawyerStore, PageRequest, Paged,
    UpdateLawFirmOfficeParams, UpdateLawyerParams,
};
use crate::error::DatabaseError;

use super::{
    Filter, LibSqlBackend, count_rows, get_bool, get_opt_text, get_text, like_pattern, now_ts,
    opt_text, opt_uuid, parse_ts, parse_uuid, parse_uuid_opt,
};

const FIRM_COLUMNS: &str = "id, name, created_at, updated_at";
const OFFICE_COLUMNS: &str = "id, law_firm_id, is_primary, office_name, postal_code, address1, \
     address2, phone, fax, created_at, updated_at";
const LAWYER_COLUMNS: &str = "id, last_name, first_name, last_name_kana, first_name_kana, \
     registration_number, office_id, phone, remarks, created_at, updated_at";

fn row_to_firm_record(row: &libsql::Row) -> Result<LawFirmRecord, DatabaseError> {
    Ok(LawFirmRecord {
        id: parse_uuid(&get_text(row, 0), "law_firms.id")?,
        name: get_text(row, 1),
        created_at: parse_ts(&get_text(row, 2))?,
        updated_at: parse_ts(&get_text(row, 3))?,
    })
}

fn row_to_office_record(row: &libsql::Row) -> Result<LawFirmOfficeRecord, DatabaseError> {
    Ok(LawFirmOfficeRecord {
        id: parse_uuid(&get_text(row, 0), "law_firm_offices.id")?,
        law_firm_id: parse_uuid(&get_text(row, 1), "law_firm_offices.law_firm_id")?,
        is_primary: get_bool(row, 2),
        office_name: get_opt_text(row, 3),
        postal_code: get_opt_text(row, 4),
        address1: get_opt_text(row, 5),
        address2: get_opt_text(row, 6),
        phone: get_opt_text(row, 7),
        fax: get_opt_text(row, 8),
        created_at: parse_ts(&get_text(row, 9))?,
        updated_at: parse_ts(&get_text(row, 10))?,
    })
}

fn row_to_lawyer_record(row: &libsql::Row) -> Result<LawyerRecord, DatabaseError> {
    Ok(LawyerRecord {
        id: parse_uuid(&get_text(row, 0), "lawyers.id")?,
        last_name: get_opt_text(row, 1),
        first_name: get_opt_text(row, 2),
        last_name_kana: get_opt_text(row, 3),
        first_name_kana: get_opt_text(row, 4),
        registration_number: get_opt_text(row, 5),
        office_id: parse_uuid_opt(get_opt_text(row, 6), "lawyers.office_id")?,
        phone: get_opt_text(row, 7),
        remarks: get_opt_text(row, 8),
        created_at: parse_ts(&get_text(row, 9))?,
        updated_at: parse_ts(&get_text(row, 10))?,
    })
}

/// A firm has at most one primary office.
async fn clear_other_primaries(
    conn: &libsql::Connection,
    law_firm_id: Uuid,
    keep_id: Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE law_firm_offices SET is_primary = 0 WHERE law_firm_id = ?1 AND id != ?2",
        params![law_firm_id.to_string(), keep_id.to_string()],
    )
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl LawFirmStore for LibSqlBackend {
    async fn create_law_firm(&self, name: &str) -> Result<LawFirmRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO law_firms (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id.to_string(), name.trim(), now_ts()],
        )
        .await?;

        self.get_law_firm(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created law firm".to_string()))
    }

    async fn get_law_firm(&self, id: Uuid) -> Result<Option<LawFirmRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {FIRM_COLUMNS} FROM law_firms WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_firm_record(&row)).transpose()
    }

    async fn get_law_firm_by_name(
        &self,
        name: &str,
    ) -> Result<Option<LawFirmRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {FIRM_COLUMNS} FROM law_firms WHERE name = ?1 LIMIT 1"),
                params![name.trim()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_firm_record(&row)).transpose()
    }

    async fn list_law_firms(
        &self,
        name: Option<&str>,
        page: PageRequest,
    ) -> Result<Paged<LawFirmRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut filter = Filter::default();
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            filter.push(
                "name LIKE ? ESCAPE '\\'",
                vec![libsql::Value::Text(like_pattern(name))],
            );
        }
        let total = count_rows(&conn, "law_firms", &filter).await?;

        let (suffix, params) = filter.paged_params(page);
        let sql = format!(
            "SELECT {FIRM_COLUMNS} FROM law_firms{} ORDER BY name ASC{}",
            filter.where_sql(),
            suffix
        );
        let mut rows = conn.query(&sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_firm_record(&row)?);
        }
        Ok(Paged { items, total })
    }

    async fn update_law_firm(
        &self,
        id: Uuid,
        name: &str,
    ) -> Result<Option<LawFirmRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let updated = conn
            .execute(
                "UPDATE law_firms SET name = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), name.trim(), now_ts()],
            )
            .await?;
        if updated == 0 {
            return Ok(None);
        }
        self.get_law_firm(id).await
    }

    async fn delete_law_firm(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute("DELETE FROM law_firms WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(deleted > 0)
    }

    async fn create_office(
        &self,
        law_firm_id: Uuid,
        input: &CreateLawFirmOfficeParams,
    ) -> Result<LawFirmOfficeRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO law_firm_offices (id, law_firm_id, is_primary, office_name, postal_code, \
               address1, address2, phone, fax, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id.to_string(),
                law_firm_id.to_string(),
                i64::from(input.is_primary),
                opt_text(input.office_name.as_deref()),
                opt_text(input.postal_code.as_deref()),
                opt_text(input.address1.as_deref()),
                opt_text(input.address2.as_deref()),
                opt_text(input.phone.as_deref()),
                opt_text(input.fax.as_deref()),
                now_ts(),
            ],
        )
        .await?;
        if input.is_primary {
            clear_other_primaries(&conn, law_firm_id, id).await?;
        }

        self.get_office(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created office".to_string()))
    }

    async fn get_office(&self, id: Uuid) -> Result<Option<LawFirmOfficeRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {OFFICE_COLUMNS} FROM law_firm_offices WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_office_record(&row)).transpose()
    }

    async fn list_offices(
        &self,
        law_firm_id: Uuid,
    ) -> Result<Vec<LawFirmOfficeRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {OFFICE_COLUMNS} FROM law_firm_offices WHERE law_firm_id = ?1 \
                     ORDER BY is_primary DESC, created_at ASC"
                ),
                params![law_firm_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_office_record(&row)?);
        }
        Ok(out)
    }

    async fn update_office(
        &self,
        law_firm_id: Uuid,
        id: Uuid,
        input: &UpdateLawFirmOfficeParams,
    ) -> Result<Option<LawFirmOfficeRecord>, DatabaseError> {
        let Some(existing) = self
            .get_office(id)
            .await?
            .filter(|office| office.law_firm_id == law_firm_id)
        else {
            return Ok(None);
        };

        let merged_primary = input.is_primary.unwrap_or(existing.is_primary);
        let merged_name = input.office_name.clone().unwrap_or(existing.office_name);
        let merged_postal = input.postal_code.clone().unwrap_or(existing.postal_code);
        let merged_address1 = input.address1.clone().unwrap_or(existing.address1);
        let merged_address2 = input.address2.clone().unwrap_or(existing.address2);
        let merged_phone = input.phone.clone().unwrap_or(existing.phone);
        let merged_fax = input.fax.clone().unwrap_or(existing.fax);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE law_firm_offices SET is_primary = ?2, office_name = ?3, postal_code = ?4, \
               address1 = ?5, address2 = ?6, phone = ?7, fax = ?8, updated_at = ?9 \
             WHERE id = ?1",
            params![
                id.to_string(),
                i64::from(merged_primary),
                opt_text(merged_name.as_deref()),
                opt_text(merged_postal.as_deref()),
                opt_text(merged_address1.as_deref()),
                opt_text(merged_address2.as_deref()),
                opt_text(merged_phone.as_deref()),
                opt_text(merged_fax.as_deref()),
                now_ts(),
            ],
        )
        .await?;
        if merged_primary {
            clear_other_primaries(&conn, law_firm_id, id).await?;
        }

        self.get_office(id).await
    }

    async fn delete_office(&self, law_firm_id: Uuid, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM law_firm_offices WHERE id = ?1 AND law_firm_id = ?2",
                params![id.to_string(), law_firm_id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

fn lawyer_filter(filter: &LawyerFilter) -> Filter {
    let mut out = Filter::default();
    if let Some(office_id) = filter.office_id {
        out.push_eq("office_id", libsql::Value::Text(office_id.to_string()));
    }
    if let Some(number) = filter
        .registration_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        out.push_eq("registration_number", libsql::Value::Text(number.to_string()));
    }
    if let Some(name) = filter.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        let pattern = libsql::Value::Text(like_pattern(name));
        out.push(
            "(last_name LIKE ? ESCAPE '\\' OR first_name LIKE ? ESCAPE '\\' \
              OR last_name_kana LIKE ? ESCAPE '\\' OR first_name_kana LIKE ? ESCAPE '\\')",
            vec![pattern; 4],
        );
    }
    out
}

#[async_trait::async_trait]
impl LawyerStore for LibSqlBackend {
    async fn create_lawyer(
        &self,
        input: &CreateLawyerParams,
    ) -> Result<LawyerRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO lawyers (id, last_name, first_name, last_name_kana, first_name_kana, \
               registration_number, office_id, phone, remarks, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id.to_string(),
                opt_text(input.last_name.as_deref()),
                opt_text(input.first_name.as_deref()),
                opt_text(input.last_name_kana.as_deref()),
                opt_text(input.first_name_kana.as_deref()),
                opt_text(input.registration_number.as_deref()),
                opt_uuid(input.office_id),
                opt_text(input.phone.as_deref()),
                opt_text(input.remarks.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_lawyer(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created lawyer".to_string()))
    }

    async fn get_lawyer(&self, id: Uuid) -> Result<Option<LawyerRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {LAWYER_COLUMNS} FROM lawyers WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_lawyer_record(&row)).transpose()
    }

    async fn get_lawyer_by_registration(
        &self,
        registration_number: &str,
    ) -> Result<Option<LawyerRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!(
                    "SELECT {LAWYER_COLUMNS} FROM lawyers WHERE registration_number = ?1 LIMIT 1"
                ),
                params![registration_number.trim()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_lawyer_record(&row)).transpose()
    }

    async fn list_lawyers(
        &self,
        filter: &LawyerFilter,
        page: PageRequest,
    ) -> Result<Paged<LawyerRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let filter = lawyer_filter(filter);
        let total = count_rows(&conn, "lawyers", &filter).await?;

        let (suffix, params) = filter.paged_params(page);
        let sql = format!(
            "SELECT {LAWYER_COLUMNS} FROM lawyers{} ORDER BY last_name ASC, first_name ASC, id ASC{}",
            filter.where_sql(),
            suffix
        );
        let mut rows = conn.query(&sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_lawyer_record(&row)?);
        }
        Ok(Paged { items, total })
    }

    async fn update_lawyer(
        &self,
        id: Uuid,
        input: &UpdateLawyerParams,
    ) -> Result<Option<LawyerRecord>, DatabaseError> {
        let Some(existing) = self.get_lawyer(id).await? else {
            return Ok(None);
        };

        let merged_last = input.last_name.clone().unwrap_or(existing.last_name);
        let merged_first = input.first_name.clone().unwrap_or(existing.first_name);
        let merged_last_kana = input.last_name_kana.clone().unwrap_or(existing.last_name_kana);
        let merged_first_kana = input
            .first_name_kana
            .clone()
            .unwrap_or(existing.first_name_kana);
        let merged_registration = input
            .registration_number
            .clone()
            .unwrap_or(existing.registration_number);
        let merged_office = input.office_id.unwrap_or(existing.office_id);
        let merged_phone = input.phone.clone().unwrap_or(existing.phone);
        let merged_remarks = input.remarks.clone().unwrap_or(existing.remarks);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE lawyers SET last_name = ?2, first_name = ?3, last_name_kana = ?4, \
               first_name_kana = ?5, registration_number = ?6, office_id = ?7, phone = ?8, \
               remarks = ?9, updated_at = ?10 \
             WHERE id = ?1",
            params![
                id.to_string(),
                opt_text(merged_last.as_deref()),
                opt_text(merged_first.as_deref()),
                opt_text(merged_last_kana.as_deref()),
                opt_text(merged_first_kana.as_deref()),
                opt_text(merged_registration.as_deref()),
                opt_uuid(merged_office),
                opt_text(merged_phone.as_deref()),
                opt_text(merged_remarks.as_deref()),
                now_ts(),
            ],
        )
        .await?;

        self.get_lawyer(id).await
    }

    async fn delete_lawyer(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute("DELETE FROM lawyers WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::libsql::test_support::setup_backend;

    #[tokio::test]
    async fn only_one_primary_office_per_firm() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let firm = backend.create_law_firm("Kato & Partners").await.expect("firm");

        let head = backend
            .create_office(
                firm.id,
                &CreateLawFirmOfficeParams {
                    is_primary: true,
                    office_name: Some("Head office".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("head");
        let branch = backend
            .create_office(
                firm.id,
                &CreateLawFirmOfficeParams {
                    is_primary: true,
                    office_name: Some("Branch".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("branch");

        let offices = backend.list_offices(firm.id).await.expect("offices");
        assert_eq!(offices.len(), 2);
        assert_eq!(offices[0].id, branch.id);
        assert!(!offices[1].is_primary);
        assert_eq!(offices[1].id, head.id);

        let other_firm = backend.create_law_firm("Elsewhere LLP").await.expect("other");
        assert!(
            backend
                .update_office(other_firm.id, head.id, &UpdateLawFirmOfficeParams::default())
                .await
                .expect("update")
                .is_none()
        );
    }

    #[tokio::test]
    async fn lawyer_filters_and_office_detach() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let firm = backend.create_law_firm("Mori Law").await.expect("firm");
        let office = backend
            .create_office(firm.id, &CreateLawFirmOfficeParams::default())
            .await
            .expect("office");

        let lawyer = backend
            .create_lawyer(&CreateLawyerParams {
                last_name: Some("Mori".to_string()),
                first_name: Some("Haruto".to_string()),
                registration_number: Some("12345".to_string()),
                office_id: Some(office.id),
                ..Default::default()
            })
            .await
            .expect("lawyer");
        backend
            .create_lawyer(&CreateLawyerParams {
                last_name: Some("Suzuki".to_string()),
                ..Default::default()
            })
            .await
            .expect("second lawyer");

        let by_office = backend
            .list_lawyers(
                &LawyerFilter {
                    office_id: Some(office.id),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .expect("by office");
        assert_eq!(by_office.total, 1);

        let err = backend
            .create_lawyer(&CreateLawyerParams {
                registration_number: Some("12345".to_string()),
                ..Default::default()
            })
            .await
            .expect_err("duplicate registration");
        assert!(err.is_unique_violation());

        assert!(backend.delete_office(firm.id, office.id).await.expect("delete office"));
        let detached = backend
            .get_lawyer(lawyer.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(detached.office_id, None);
    }
}
