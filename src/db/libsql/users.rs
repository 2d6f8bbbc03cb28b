use chrono::{DateTime, Utc};
use libsql::params;
use uuid::Uuid;

use crate::db::{CreateUserParams, UserRecord, UserRole, UserStore};
use crate::error::DatabaseError;

use super::{LibSqlBackend, fmt_ts, get_opt_text, get_text, now_ts, opt_text, parse_ts, parse_uuid};

const USER_COLUMNS: &str = "u.id, u.email, u.name, u.role, u.password_hash, u.created_at, u.updated_at";

fn row_to_user_record(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    let role_raw = get_text(row, 3);
    let role = UserRole::from_db_value(&role_raw)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid user role '{role_raw}'")))?;
    Ok(UserRecord {
        id: parse_uuid(&get_text(row, 0), "users.id")?,
        email: get_text(row, 1),
        name: get_opt_text(row, 2),
        role,
        password_hash: get_text(row, 4),
        created_at: parse_ts(&get_text(row, 5))?,
        updated_at: parse_ts(&get_text(row, 6))?,
    })
}

#[async_trait::async_trait]
impl UserStore for LibSqlBackend {
    async fn create_user(&self, input: &CreateUserParams) -> Result<UserRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO users (id, email, name, role, password_hash, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id.to_string(),
                input.email.trim().to_lowercase(),
                opt_text(input.name.as_deref()),
                input.role.as_str(),
                input.password_hash.as_str(),
                now_ts(),
            ],
        )
        .await?;

        self.get_user(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created user".to_string()))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_user_record(&row)).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1 LIMIT 1"),
                params![email.trim().to_lowercase()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_user_record(&row)).transpose()
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id.to_string(), fmt_ts(&expires_at), now_ts()],
        )
        .await?;
        Ok(())
    }

    async fn resolve_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM sessions s JOIN users u ON u.id = s.user_id \
                     WHERE s.token_hash = ?1 AND s.expires_at > ?2 LIMIT 1"
                ),
                params![token_hash, fmt_ts(&now)],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_user_record(&row)).transpose()
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::libsql::test_support::setup_backend;

    fn user(email: &str) -> CreateUserParams {
        CreateUserParams {
            email: email.to_string(),
            name: Some("Aoi".to_string()),
            role: UserRole::Lawyer,
            password_hash: "argon-hash".to_string(),
        }
    }

    #[tokio::test]
    async fn email_is_unique_case_insensitively() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;

        let created = backend.create_user(&user("Aoi@Example.com")).await.expect("create");
        assert_eq!(created.email, "aoi@example.com");
        let err = backend
            .create_user(&user("aoi@example.com"))
            .await
            .expect_err("duplicate");
        assert!(err.is_unique_violation());

        let found = backend
            .get_user_by_email("AOI@example.com")
            .await
            .expect("lookup")
            .expect("found");
        assert_eq!(found.id, created.id);
        assert_eq!(found.password_hash, "argon-hash");
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let created = backend.create_user(&user("s@example.com")).await.expect("user");
        let now = Utc::now();

        backend
            .create_session(created.id, "live", now + Duration::hours(1))
            .await
            .expect("live");
        backend
            .create_session(created.id, "stale", now - Duration::minutes(1))
            .await
            .expect("stale");

        assert!(backend.resolve_session("live", now).await.expect("live").is_some());
        assert!(backend.resolve_session("stale", now).await.expect("stale").is_none());
        assert!(backend.delete_session("live").await.expect("delete"));
        assert!(backend.resolve_session("live", now).await.expect("gone").is_none());
    }
}
