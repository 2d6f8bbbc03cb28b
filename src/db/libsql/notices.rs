use libsql::params;
use uuid::Uuid;

use crate::db::{NoticeRecord, NotificationLogStore};
use crate::error::DatabaseError;

use super::{LibSqlBackend, get_bool, get_text, now_ts, parse_ts, parse_uuid};

const NOTICE_COLUMNS: &str = "id, user_id, event_type, message, is_read, created_at";

fn row_to_notice_record(row: &libsql::Row) -> Result<NoticeRecord, DatabaseError> {
    Ok(NoticeRecord {
        id: parse_uuid(&get_text(row, 0), "notices.id")?,
        user_id: parse_uuid(&get_text(row, 1), "notices.user_id")?,
        event_type: get_text(row, 2),
        message: get_text(row, 3),
        is_read: get_bool(row, 4),
        created_at: parse_ts(&get_text(row, 5))?,
    })
}

/// Insert a notice on an already-open connection.
pub(super) async fn insert_notice(
    conn: &libsql::Connection,
    user_id: Uuid,
    event_type: &str,
    message: &str,
) -> Result<Uuid, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO notices (id, user_id, event_type, message, is_read, created_at) \
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![id.to_string(), user_id.to_string(), event_type, message, now_ts()],
    )
    .await?;
    Ok(id)
}

impl LibSqlBackend {
    async fn get_notice(&self, user_id: Uuid, id: Uuid) -> Result<Option<NoticeRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = ?1 AND user_id = ?2"),
                params![id.to_string(), user_id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_notice_record(&row)).transpose()
    }
}

#[async_trait::async_trait]
impl NotificationLogStore for LibSqlBackend {
    async fn create_notice(
        &self,
        user_id: Uuid,
        event_type: &str,
        message: &str,
    ) -> Result<NoticeRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = insert_notice(&conn, user_id, event_type, message).await?;
        self.get_notice(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created notice".to_string()))
    }

    async fn list_notices(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<NoticeRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let sql = if unread_only {
            format!(
                "SELECT {NOTICE_COLUMNS} FROM notices WHERE user_id = ?1 AND is_read = 0 \
                 ORDER BY created_at DESC"
            )
        } else {
            format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE user_id = ?1 ORDER BY created_at DESC")
        };
        let mut rows = conn.query(&sql, params![user_id.to_string()]).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_notice_record(&row)?);
        }
        Ok(out)
    }

    async fn mark_notice_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<NoticeRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let updated = conn
            .execute(
                "UPDATE notices SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )
            .await?;
        if updated == 0 {
            return Ok(None);
        }
        self.get_notice(user_id, id).await
    }

    async fn mark_all_notices_read(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let conn = self.connect().await?;
        let updated = conn
            .execute(
                "UPDATE notices SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                params![user_id.to_string()],
            )
            .await?;
        Ok(updated)
    }

    async fn delete_read_notices(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM notices WHERE user_id = ?1 AND is_read = 1",
                params![user_id.to_string()],
            )
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::libsql::test_support::setup_backend;
    use crate::db::{CreateUserParams, UserRole, UserStore};

    #[tokio::test]
    async fn notices_are_scoped_to_their_user() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let user = backend
            .create_user(&CreateUserParams {
                email: "clerk@example.com".to_string(),
                name: None,
                role: UserRole::Staff,
                password_hash: "x".to_string(),
            })
            .await
            .expect("user");

        let first = backend
            .create_notice(user.id, "phase_transition", "Case moved to Trial")
            .await
            .expect("first");
        backend
            .create_notice(user.id, "phase_transition", "Case moved to Appeal")
            .await
            .expect("second");

        assert!(
            backend
                .mark_notice_read(Uuid::new_v4(), first.id)
                .await
                .expect("other user")
                .is_none()
        );
        let read = backend
            .mark_notice_read(user.id, first.id)
            .await
            .expect("mark")
            .expect("exists");
        assert!(read.is_read);

        assert_eq!(backend.list_notices(user.id, true).await.expect("unread").len(), 1);
        assert_eq!(backend.mark_all_notices_read(user.id).await.expect("all"), 1);
        assert_eq!(backend.delete_read_notices(user.id).await.expect("purge"), 2);
        assert!(backend.list_notices(user.id, false).await.expect("all").is_empty());
    }
}
