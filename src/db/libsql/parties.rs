use libsql::params;
use uuid::Uuid;

use crate::db::{
    CorporateProfileFields, CorporateProfileRecord, CreatePartyParams, IndividualProfileFields,
    IndividualProfileRecord, PageRequest, Paged, PartyFilter, PartyProfileStore, PartyRecord,
    PartyStore, PartyWithProfiles, UpdatePartyParams,
};
use crate::error::DatabaseError;

use super::{
    Filter, LibSqlBackend, count_rows, get_bool, get_opt_text, get_text, like_pattern, now_ts,
    opt_date, opt_text, parse_date_opt, parse_ts, parse_uuid,
};

const PARTY_COLUMNS: &str = "id, is_corporation, is_former_client, created_at, updated_at";
const INDIVIDUAL_COLUMNS: &str = "party_id, last_name, first_name, last_name_kana, \
     first_name_kana, honorific, date_of_birth, email, phone, mobile_phone, postal_code, \
     address1, address2, company_name, remarks, created_at, updated_at";
const CORPORATE_COLUMNS: &str = "party_id, name, name_kana, postal_code, address1, address2, \
     phone, fax, email, website_url, representative_title, representative_name, contact_name, \
     contact_email, remarks, created_at, updated_at";

fn row_to_party_record(row: &libsql::Row) -> Result<PartyRecord, DatabaseError> {
    Ok(PartyRecord {
        id: parse_uuid(&get_text(row, 0), "parties.id")?,
        is_corporation: get_bool(row, 1),
        is_former_client: get_bool(row, 2),
        created_at: parse_ts(&get_text(row, 3))?,
        updated_at: parse_ts(&get_text(row, 4))?,
    })
}

fn row_to_individual_record(row: &libsql::Row) -> Result<IndividualProfileRecord, DatabaseError> {
    Ok(IndividualProfileRecord {
        party_id: parse_uuid(&get_text(row, 0), "individual_profiles.party_id")?,
        fields: IndividualProfileFields {
            last_name: get_opt_text(row, 1),
            first_name: get_opt_text(row, 2),
            last_name_kana: get_opt_text(row, 3),
            first_name_kana: get_opt_text(row, 4),
            honorific: get_opt_text(row, 5),
            date_of_birth: parse_date_opt(get_opt_text(row, 6))?,
            email: get_opt_text(row, 7),
            phone: get_opt_text(row, 8),
            mobile_phone: get_opt_text(row, 9),
            postal_code: get_opt_text(row, 10),
            address1: get_opt_text(row, 11),
            address2: get_opt_text(row, 12),
            company_name: get_opt_text(row, 13),
            remarks: get_opt_text(row, 14),
        },
        created_at: parse_ts(&get_text(row, 15))?,
        updated_at: parse_ts(&get_text(row, 16))?,
    })
}

fn row_to_corporate_record(row: &libsql::Row) -> Result<CorporateProfileRecord, DatabaseError> {
    Ok(CorporateProfileRecord {
        party_id: parse_uuid(&get_text(row, 0), "corporate_profiles.party_id")?,
        fields: CorporateProfileFields {
            name: get_opt_text(row, 1),
            name_kana: get_opt_text(row, 2),
            postal_code: get_opt_text(row, 3),
            address1: get_opt_text(row, 4),
            address2: get_opt_text(row, 5),
            phone: get_opt_text(row, 6),
            fax: get_opt_text(row, 7),
            email: get_opt_text(row, 8),
            website_url: get_opt_text(row, 9),
            representative_title: get_opt_text(row, 10),
            representative_name: get_opt_text(row, 11),
            contact_name: get_opt_text(row, 12),
            contact_email: get_opt_text(row, 13),
            remarks: get_opt_text(row, 14),
        },
        created_at: parse_ts(&get_text(row, 15))?,
        updated_at: parse_ts(&get_text(row, 16))?,
    })
}

async fn upsert_individual(
    conn: &libsql::Connection,
    party_id: Uuid,
    fields: &IndividualProfileFields,
) -> Result<(), DatabaseError> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO individual_profiles (party_id, last_name, first_name, last_name_kana, \
           first_name_kana, honorific, date_of_birth, email, phone, mobile_phone, postal_code, \
           address1, address2, company_name, remarks, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16) \
         ON CONFLICT (party_id) DO UPDATE SET \
           last_name = excluded.last_name, first_name = excluded.first_name, \
           last_name_kana = excluded.last_name_kana, first_name_kana = excluded.first_name_kana, \
           honorific = excluded.honorific, date_of_birth = excluded.date_of_birth, \
           email = excluded.email, phone = excluded.phone, mobile_phone = excluded.mobile_phone, \
           postal_code = excluded.postal_code, address1 = excluded.address1, \
           address2 = excluded.address2, company_name = excluded.company_name, \
           remarks = excluded.remarks, updated_at = excluded.updated_at",
        params![
            party_id.to_string(),
            opt_text(fields.last_name.as_deref()),
            opt_text(fields.first_name.as_deref()),
            opt_text(fields.last_name_kana.as_deref()),
            opt_text(fields.first_name_kana.as_deref()),
            opt_text(fields.honorific.as_deref()),
            opt_date(fields.date_of_birth),
            opt_text(fields.email.as_deref()),
            opt_text(fields.phone.as_deref()),
            opt_text(fields.mobile_phone.as_deref()),
            opt_text(fields.postal_code.as_deref()),
            opt_text(fields.address1.as_deref()),
            opt_text(fields.address2.as_deref()),
            opt_text(fields.company_name.as_deref()),
            opt_text(fields.remarks.as_deref()),
            now,
        ],
    )
    .await?;
    Ok(())
}

async fn upsert_corporate(
    conn: &libsql::Connection,
    party_id: Uuid,
    fields: &CorporateProfileFields,
) -> Result<(), DatabaseError> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO corporate_profiles (party_id, name, name_kana, postal_code, address1, \
           address2, phone, fax, email, website_url, representative_title, representative_name, \
           contact_name, contact_email, remarks, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16) \
         ON CONFLICT (party_id) DO UPDATE SET \
           name = excluded.name, name_kana = excluded.name_kana, \
           postal_code = excluded.postal_code, address1 = excluded.address1, \
           address2 = excluded.address2, phone = excluded.phone, fax = excluded.fax, \
           email = excluded.email, website_url = excluded.website_url, \
           representative_title = excluded.representative_title, \
           representative_name = excluded.representative_name, \
           contact_name = excluded.contact_name, contact_email = excluded.contact_email, \
           remarks = excluded.remarks, updated_at = excluded.updated_at",
        params![
            party_id.to_string(),
            opt_text(fields.name.as_deref()),
            opt_text(fields.name_kana.as_deref()),
            opt_text(fields.postal_code.as_deref()),
            opt_text(fields.address1.as_deref()),
            opt_text(fields.address2.as_deref()),
            opt_text(fields.phone.as_deref()),
            opt_text(fields.fax.as_deref()),
            opt_text(fields.email.as_deref()),
            opt_text(fields.website_url.as_deref()),
            opt_text(fields.representative_title.as_deref()),
            opt_text(fields.representative_name.as_deref()),
            opt_text(fields.contact_name.as_deref()),
            opt_text(fields.contact_email.as_deref()),
            opt_text(fields.remarks.as_deref()),
            now,
        ],
    )
    .await?;
    Ok(())
}

impl LibSqlBackend {
    async fn attach_profiles(
        &self,
        party: PartyRecord,
    ) -> Result<PartyWithProfiles, DatabaseError> {
        let individual_profile = self.get_individual_profile(party.id).await?;
        let corporate_profile = self.get_corporate_profile(party.id).await?;
        Ok(PartyWithProfiles {
            party,
            individual_profile,
            corporate_profile,
        })
    }
}

fn party_filter(filter: &PartyFilter) -> Filter {
    let mut out = Filter::default();
    if let Some(is_corporation) = filter.is_corporation {
        out.push_eq("is_corporation", libsql::Value::Integer(i64::from(is_corporation)));
    }
    if let Some(is_former_client) = filter.is_former_client {
        out.push_eq(
            "is_former_client",
            libsql::Value::Integer(i64::from(is_former_client)),
        );
    }
    if let Some(name) = filter.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        let pattern = libsql::Value::Text(like_pattern(name));
        out.push(
            "(EXISTS (SELECT 1 FROM individual_profiles ip WHERE ip.party_id = parties.id \
               AND (ip.last_name LIKE ? ESCAPE '\\' OR ip.first_name LIKE ? ESCAPE '\\' \
                 OR ip.last_name_kana LIKE ? ESCAPE '\\' OR ip.first_name_kana LIKE ? ESCAPE '\\')) \
              OR EXISTS (SELECT 1 FROM corporate_profiles cp WHERE cp.party_id = parties.id \
               AND (cp.name LIKE ? ESCAPE '\\' OR cp.name_kana LIKE ? ESCAPE '\\')))",
            vec![pattern; 6],
        );
    }
    out
}

#[async_trait::async_trait]
impl PartyStore for LibSqlBackend {
    async fn create_party(
        &self,
        input: &CreatePartyParams,
    ) -> Result<PartyWithProfiles, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();

        conn.execute("BEGIN", ()).await?;
        let result = async {
            conn.execute(
                "INSERT INTO parties (id, is_corporation, is_former_client, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    id.to_string(),
                    i64::from(input.is_corporation),
                    i64::from(input.is_former_client),
                    now_ts(),
                ],
            )
            .await?;
            if let Some(fields) = &input.individual_profile {
                upsert_individual(&conn, id, fields).await?;
            }
            if let Some(fields) = &input.corporate_profile {
                upsert_corporate(&conn, id, fields).await?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ()).await?;
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                return Err(err);
            }
        }

        self.get_party(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created party".to_string()))
    }

    async fn get_party(&self, id: Uuid) -> Result<Option<PartyWithProfiles>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let party = row_to_party_record(&row)?;
        self.attach_profiles(party).await.map(Some)
    }

    async fn list_parties(
        &self,
        filter: &PartyFilter,
        page: PageRequest,
    ) -> Result<Paged<PartyWithProfiles>, DatabaseError> {
        let conn = self.connect().await?;
        let filter = party_filter(filter);
        let total = count_rows(&conn, "parties", &filter).await?;

        let (suffix, params) = filter.paged_params(page);
        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM parties{} ORDER BY created_at DESC, id ASC{}",
            filter.where_sql(),
            suffix
        );
        let mut rows = conn.query(&sql, params).await?;
        let mut parties = Vec::new();
        while let Some(row) = rows.next().await? {
            parties.push(row_to_party_record(&row)?);
        }

        let mut items = Vec::with_capacity(parties.len());
        for party in parties {
            items.push(self.attach_profiles(party).await?);
        }
        Ok(Paged { items, total })
    }

    async fn update_party(
        &self,
        id: Uuid,
        input: &UpdatePartyParams,
    ) -> Result<Option<PartyWithProfiles>, DatabaseError> {
        let Some(existing) = self.get_party(id).await? else {
            return Ok(None);
        };

        let merged_corp = input.is_corporation.unwrap_or(existing.party.is_corporation);
        let merged_former = input
            .is_former_client
            .unwrap_or(existing.party.is_former_client);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE parties SET is_corporation = ?2, is_former_client = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![
                id.to_string(),
                i64::from(merged_corp),
                i64::from(merged_former),
                now_ts(),
            ],
        )
        .await?;

        self.get_party(id).await
    }

    async fn delete_party(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute("DELETE FROM parties WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl PartyProfileStore for LibSqlBackend {
    async fn upsert_individual_profile(
        &self,
        party_id: Uuid,
        fields: &IndividualProfileFields,
    ) -> Result<IndividualProfileRecord, DatabaseError> {
        let conn = self.connect().await?;
        upsert_individual(&conn, party_id, fields).await?;
        self.get_individual_profile(party_id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load individual profile".to_string()))
    }

    async fn get_individual_profile(
        &self,
        party_id: Uuid,
    ) -> Result<Option<IndividualProfileRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!(
                    "SELECT {INDIVIDUAL_COLUMNS} FROM individual_profiles WHERE party_id = ?1"
                ),
                params![party_id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_individual_record(&row)).transpose()
    }

    async fn delete_individual_profile(&self, party_id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM individual_profiles WHERE party_id = ?1",
                params![party_id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn upsert_corporate_profile(
        &self,
        party_id: Uuid,
        fields: &CorporateProfileFields,
    ) -> Result<CorporateProfileRecord, DatabaseError> {
        let conn = self.connect().await?;
        upsert_corporate(&conn, party_id, fields).await?;
        self.get_corporate_profile(party_id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load corporate profile".to_string()))
    }

    async fn get_corporate_profile(
        &self,
        party_id: Uuid,
    ) -> Result<Option<CorporateProfileRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {CORPORATE_COLUMNS} FROM corporate_profiles WHERE party_id = ?1"),
                params![party_id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_corporate_record(&row)).transpose()
    }

    async fn delete_corporate_profile(&self, party_id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM corporate_profiles WHERE party_id = ?1",
                params![party_id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}
