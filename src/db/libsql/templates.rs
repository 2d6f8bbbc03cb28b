use libsql::params;
use uuid::Uuid;

use crate::db::{
    CreateDocumentTemplateParams, DocumentTemplateRecord, DocumentTemplateStore,
    UpdateDocumentTemplateParams,
};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, get_opt_text, get_text, now_ts, opt_text, parse_json, parse_ts, parse_uuid,
};

const TEMPLATE_COLUMNS: &str =
    "id, name, body, content_type, file_path, placeholders, created_at, updated_at";

fn row_to_document_template(row: &libsql::Row) -> Result<DocumentTemplateRecord, DatabaseError> {
    Ok(DocumentTemplateRecord {
        id: parse_uuid(&get_text(row, 0), "document_templates.id")?,
        name: get_text(row, 1),
        body: get_text(row, 2),
        content_type: get_opt_text(row, 3),
        file_path: get_opt_text(row, 4),
        placeholders: parse_json(&get_text(row, 5), serde_json::json!([]))?,
        created_at: parse_ts(&get_text(row, 6))?,
        updated_at: parse_ts(&get_text(row, 7))?,
    })
}

#[async_trait::async_trait]
impl DocumentTemplateStore for LibSqlBackend {
    async fn create_document_template(
        &self,
        input: &CreateDocumentTemplateParams,
    ) -> Result<DocumentTemplateRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO document_templates (id, name, body, content_type, file_path, placeholders, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.to_string(),
                input.name.trim(),
                input.body.as_str(),
                opt_text(input.content_type.as_deref()),
                opt_text(input.file_path.as_deref()),
                input.placeholders.to_string(),
                now_ts(),
            ],
        )
        .await?;

        self.get_document_template(id).await?.ok_or_else(|| {
            DatabaseError::Query("failed to load created document template".to_string())
        })
    }

    async fn get_document_template(
        &self,
        id: Uuid,
    ) -> Result<Option<DocumentTemplateRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM document_templates WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_document_template(&row)).transpose()
    }

    async fn list_document_templates(&self) -> Result<Vec<DocumentTemplateRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM document_templates ORDER BY name ASC"),
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_document_template(&row)?);
        }
        Ok(out)
    }

    async fn update_document_template(
        &self,
        id: Uuid,
        input: &UpdateDocumentTemplateParams,
    ) -> Result<Option<DocumentTemplateRecord>, DatabaseError> {
        let Some(existing) = self.get_document_template(id).await? else {
            return Ok(None);
        };

        let merged_name = input.name.as_deref().unwrap_or(existing.name.as_str()).trim();
        let merged_body = input.body.as_deref().unwrap_or(existing.body.as_str());
        let merged_content_type = input.content_type.clone().unwrap_or(existing.content_type);
        let merged_file_path = input.file_path.clone().unwrap_or(existing.file_path);
        let merged_placeholders = input
            .placeholders
            .clone()
            .unwrap_or(existing.placeholders);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE document_templates SET name = ?2, body = ?3, content_type = ?4, file_path = ?5, \
               placeholders = ?6, updated_at = ?7 \
             WHERE id = ?1",
            params![
                id.to_string(),
                merged_name,
                merged_body,
                opt_text(merged_content_type.as_deref()),
                opt_text(merged_file_path.as_deref()),
                merged_placeholders.to_string(),
                now_ts(),
            ],
        )
        .await?;

        self.get_document_template(id).await
    }

    async fn delete_document_template(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM document_templates WHERE id = ?1",
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
    use crate::db::libsql::test_support::setup_backend;

    #[tokio::test]
    async fn document_template_lifecycle() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;

        let created = backend
            .create_document_template(&CreateDocumentTemplateParams {
                name: "Engagement letter".to_string(),
                body: "Dear {{ client_name }},".to_string(),
                content_type: None,
                file_path: None,
                placeholders: serde_json::json!(["client_name"]),
            })
            .await
            .expect("create");
        assert_eq!(created.placeholders, serde_json::json!(["client_name"]));

        let err = backend
            .create_document_template(&CreateDocumentTemplateParams {
                name: "Engagement letter".to_string(),
                body: String::new(),
                content_type: None,
                file_path: None,
                placeholders: serde_json::json!([]),
            })
            .await
            .expect_err("duplicate name");
        assert!(err.is_unique_violation());

        let updated = backend
            .update_document_template(
                created.id,
                &UpdateDocumentTemplateParams {
                    content_type: Some(Some("text/markdown".to_string())),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.body, "Dear {{ client_name }},");
        assert_eq!(updated.content_type.as_deref(), Some("text/markdown"));

        assert!(backend.delete_document_template(created.id).await.expect("delete"));
        assert!(backend.list_document_templates().await.expect("list").is_empty());
    }
}
