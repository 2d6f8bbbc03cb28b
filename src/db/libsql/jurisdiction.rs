use libsql::params;
use uuid::Uuid;

use crate::db::{
    CreateJurisdictionRuleParams, JurisdictionRuleFilter, JurisdictionRuleRecord,
    JurisdictionRuleStore, UpdateJurisdictionRuleParams,
};
use crate::error::DatabaseError;

use super::{
    Filter, LibSqlBackend, get_opt_text, get_text, now_ts, opt_uuid, parse_ts, parse_uuid,
    parse_uuid_opt,
};

const RULE_SELECT: &str = "SELECT r.id, r.lower_courthouse_id, lo.name, r.superior_courthouse_id, hi.name, \
       r.case_category_id, c.name, r.created_at, r.updated_at \
     FROM jurisdiction_rules r \
     JOIN courthouses lo ON lo.id = r.lower_courthouse_id \
     JOIN courthouses hi ON hi.id = r.superior_courthouse_id \
     LEFT JOIN case_categories c ON c.id = r.case_category_id";

fn row_to_rule_record(row: &libsql::Row) -> Result<JurisdictionRuleRecord, DatabaseError> {
    Ok(JurisdictionRuleRecord {
        id: parse_uuid(&get_text(row, 0), "jurisdiction_rules.id")?,
        lower_courthouse_id: parse_uuid(&get_text(row, 1), "jurisdiction_rules.lower_courthouse_id")?,
        lower_courthouse_name: get_text(row, 2),
        superior_courthouse_id: parse_uuid(
            &get_text(row, 3),
            "jurisdiction_rules.superior_courthouse_id",
        )?,
        superior_courthouse_name: get_text(row, 4),
        case_category_id: parse_uuid_opt(
            get_opt_text(row, 5),
            "jurisdiction_rules.case_category_id",
        )?,
        case_category_name: get_opt_text(row, 6),
        created_at: parse_ts(&get_text(row, 7))?,
        updated_at: parse_ts(&get_text(row, 8))?,
    })
}

fn distinct_courthouses(lower: Uuid, superior: Uuid) -> Result<(), DatabaseError> {
    if lower == superior {
        return Err(DatabaseError::Constraint(
            "lower and superior courthouse must differ".to_string(),
        ));
    }
    Ok(())
}

#[async_trait::async_trait]
impl JurisdictionRuleStore for LibSqlBackend {
    async fn create_jurisdiction_rule(
        &self,
        input: &CreateJurisdictionRuleParams,
    ) -> Result<JurisdictionRuleRecord, DatabaseError> {
        distinct_courthouses(input.lower_courthouse_id, input.superior_courthouse_id)?;
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO jurisdiction_rules (id, lower_courthouse_id, superior_courthouse_id, case_category_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.to_string(),
                input.lower_courthouse_id.to_string(),
                input.superior_courthouse_id.to_string(),
                opt_uuid(input.case_category_id),
                now_ts(),
            ],
        )
        .await?;

        self.get_jurisdiction_rule(id).await?.ok_or_else(|| {
            DatabaseError::Query("failed to load created jurisdiction rule".to_string())
        })
    }

    async fn get_jurisdiction_rule(
        &self,
        id: Uuid,
    ) -> Result<Option<JurisdictionRuleRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("{RULE_SELECT} WHERE r.id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_rule_record(&row)).transpose()
    }

    async fn list_jurisdiction_rules(
        &self,
        filter: &JurisdictionRuleFilter,
    ) -> Result<Vec<JurisdictionRuleRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut clauses = Filter::default();
        if let Some(id) = filter.lower_courthouse_id {
            clauses.push_eq("r.lower_courthouse_id", libsql::Value::Text(id.to_string()));
        }
        if let Some(id) = filter.superior_courthouse_id {
            clauses.push_eq("r.superior_courthouse_id", libsql::Value::Text(id.to_string()));
        }
        if let Some(id) = filter.case_category_id {
            clauses.push_eq("r.case_category_id", libsql::Value::Text(id.to_string()));
        }
        let sql = format!(
            "{RULE_SELECT}{} ORDER BY lo.name ASC, hi.name ASC, r.created_at ASC",
            clauses.where_sql()
        );
        let mut rows = conn.query(&sql, clauses.params()).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_rule_record(&row)?);
        }
        Ok(out)
    }

    async fn update_jurisdiction_rule(
        &self,
        id: Uuid,
        input: &UpdateJurisdictionRuleParams,
    ) -> Result<Option<JurisdictionRuleRecord>, DatabaseError> {
        let Some(existing) = self.get_jurisdiction_rule(id).await? else {
            return Ok(None);
        };

        let lower = input.lower_courthouse_id.unwrap_or(existing.lower_courthouse_id);
        let superior = input
            .superior_courthouse_id
            .unwrap_or(existing.superior_courthouse_id);
        let category = input.case_category_id.unwrap_or(existing.case_category_id);
        distinct_courthouses(lower, superior)?;

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE jurisdiction_rules SET lower_courthouse_id = ?2, superior_courthouse_id = ?3, \
               case_category_id = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![
                id.to_string(),
                lower.to_string(),
                superior.to_string(),
                opt_uuid(category),
                now_ts(),
            ],
        )
        .await?;

        self.get_jurisdiction_rule(id).await
    }

    async fn delete_jurisdiction_rule(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM jurisdiction_rules WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::libsql::test_support::{TestBackend, setup_backend};
    use crate::db::{
        CaseCategoryStore, CourthouseRecord, CourthouseStore, CreateCaseCategoryParams,
        CreateCourthouseParams,
    };

    async fn courthouse(fixture: &TestBackend, name: &str) -> CourthouseRecord {
        fixture
            .backend
            .create_courthouse(&CreateCourthouseParams {
                name: name.to_string(),
                postal_code: None,
                address1: None,
                address2: None,
                phone: None,
            })
            .await
            .expect("courthouse")
    }

    fn rule(lower: Uuid, superior: Uuid) -> CreateJurisdictionRuleParams {
        CreateJurisdictionRuleParams {
            lower_courthouse_id: lower,
            superior_courthouse_id: superior,
            case_category_id: None,
        }
    }

    #[tokio::test]
    async fn rules_carry_courthouse_and_category_names() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let district = courthouse(&fixture, "Tokyo District Court").await;
        let high = courthouse(&fixture, "Tokyo High Court").await;
        let civil = backend
            .create_category(&CreateCaseCategoryParams {
                name: "Civil".to_string(),
                parent_category_id: None,
                role_definitions: serde_json::json!({}),
            })
            .await
            .expect("category");

        let created = backend
            .create_jurisdiction_rule(&CreateJurisdictionRuleParams {
                case_category_id: Some(civil.id),
                ..rule(district.id, high.id)
            })
            .await
            .expect("rule");
        assert_eq!(created.lower_courthouse_name, "Tokyo District Court");
        assert_eq!(created.superior_courthouse_name, "Tokyo High Court");
        assert_eq!(created.case_category_name.as_deref(), Some("Civil"));

        backend.delete_category(civil.id).await.expect("delete category");
        let reloaded = backend
            .get_jurisdiction_rule(created.id)
            .await
            .expect("get")
            .expect("rule survives category removal");
        assert_eq!(reloaded.case_category_id, None);
    }

    #[tokio::test]
    async fn rules_filter_by_either_courthouse() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let osaka = courthouse(&fixture, "Osaka District Court").await;
        let kobe = courthouse(&fixture, "Kobe District Court").await;
        let high = courthouse(&fixture, "Osaka High Court").await;
        for lower in [osaka.id, kobe.id] {
            backend
                .create_jurisdiction_rule(&rule(lower, high.id))
                .await
                .expect("rule");
        }

        let by_superior: Vec<String> = backend
            .list_jurisdiction_rules(&JurisdictionRuleFilter {
                superior_courthouse_id: Some(high.id),
                ..Default::default()
            })
            .await
            .expect("list")
            .into_iter()
            .map(|r| r.lower_courthouse_name)
            .collect();
        assert_eq!(by_superior, vec!["Kobe District Court", "Osaka District Court"]);

        let by_lower = backend
            .list_jurisdiction_rules(&JurisdictionRuleFilter {
                lower_courthouse_id: Some(kobe.id),
                ..Default::default()
            })
            .await
            .expect("list");
        assert_eq!(by_lower.len(), 1);

        backend.delete_courthouse(high.id).await.expect("delete");
        assert!(
            backend
                .list_jurisdiction_rules(&JurisdictionRuleFilter::default())
                .await
                .expect("list")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rules_reject_unknown_or_identical_courthouses() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let district = courthouse(&fixture, "Nagoya District Court").await;

        let err = backend
            .create_jurisdiction_rule(&rule(district.id, Uuid::new_v4()))
            .await
            .expect_err("unknown superior");
        assert!(err.is_foreign_key_violation());

        let err = backend
            .create_jurisdiction_rule(&rule(district.id, district.id))
            .await
            .expect_err("self appeal");
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn update_rule_moves_superior_and_clears_category() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let district = courthouse(&fixture, "Sendai District Court").await;
        let high = courthouse(&fixture, "Sendai High Court").await;
        let supreme = courthouse(&fixture, "Supreme Court").await;
        let created = backend
            .create_jurisdiction_rule(&rule(district.id, high.id))
            .await
            .expect("rule");

        let updated = backend
            .update_jurisdiction_rule(
                created.id,
                &UpdateJurisdictionRuleParams {
                    superior_courthouse_id: Some(supreme.id),
                    case_category_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.superior_courthouse_name, "Supreme Court");
        assert_eq!(updated.lower_courthouse_id, district.id);

        let err = backend
            .update_jurisdiction_rule(
                created.id,
                &UpdateJurisdictionRuleParams {
                    lower_courthouse_id: Some(supreme.id),
                    ..Default::default()
                },
            )
            .await
            .expect_err("same courthouse on both sides");
        assert!(matches!(err, DatabaseError::Constraint(_)));

        assert!(
            backend
                .update_jurisdiction_rule(Uuid::new_v4(), &UpdateJurisdictionRuleParams::default())
                .await
                .expect("update")
                .is_none()
        );
        assert!(backend.delete_jurisdiction_rule(created.id).await.expect("delete"));
        assert!(!backend.delete_jurisdiction_rule(created.id).await.expect("again"));
    }
}
