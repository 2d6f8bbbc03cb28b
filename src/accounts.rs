//! User accounts: registration, login and bearer sessions.
//!
//! Passwords are stored as Argon2 PHC strings. Session tokens are random
//! bytes handed to the client once; only their SHA-256 digest is stored.

use std::sync::{Arc, LazyLock};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;
use crate::db::{CreateUserParams, Database, UserRecord, UserRole};
use crate::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_BYTES: usize = 32;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|_| unreachable!("static pattern"))
});

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// New opaque session token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 of a token; the form kept in the sessions table.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: UserRole,
}

/// Result of a successful login. `token` is shown to the client once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserRecord,
}

pub struct AccountService {
    db: Arc<dyn Database>,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(db: Arc<dyn Database>, config: &AuthConfig) -> Self {
        let hours = i64::try_from(config.session_ttl_hours).unwrap_or(i64::MAX / 3_600_000);
        Self {
            db,
            session_ttl: Duration::hours(hours),
        }
    }

    pub async fn register(&self, input: RegisterInput) -> Result<UserRecord, AuthError> {
        let email = input.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.db.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(&input.password)?;
        let user = self
            .db
            .create_user(&CreateUserParams {
                email,
                name: input.name.filter(|n| !n.trim().is_empty()),
                role: input.role,
                password_hash,
            })
            .await
            .map_err(|e| {
                // Lost a race with a concurrent registration.
                if e.is_unique_violation() {
                    AuthError::EmailTaken
                } else {
                    AuthError::Database(e)
                }
            })?;
        tracing::info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user = self
            .db
            .get_user_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.db
            .create_session(user.id, &token_digest(&token), expires_at)
            .await?;
        Ok(Session {
            token,
            expires_at,
            user,
        })
    }

    pub async fn authenticate(&self, token: &str) -> Result<UserRecord, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        self.db
            .resolve_session(&token_digest(token), Utc::now())
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    pub async fn logout(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.db.delete_session(&token_digest(token)).await?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::libsql::test_support::setup_backend;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn tokens_are_url_safe_and_digest_is_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(!token.contains(['+', '/', '=']));
        assert_ne!(token, generate_token());

        let digest = token_digest("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
    }

    fn service(backend: crate::db::libsql::LibSqlBackend) -> AccountService {
        AccountService::new(Arc::new(backend), &AuthConfig::default())
    }

    fn input(email: &str, password: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
            name: Some("Mio".to_string()),
            role: UserRole::Lawyer,
        }
    }

    #[tokio::test]
    async fn register_login_authenticate() {
        let fixture = setup_backend().await;
        let accounts = service(fixture.backend.clone());

        let user = accounts
            .register(input("Mio@Example.com", "hunter2hunter2"))
            .await
            .expect("register");
        assert_eq!(user.email, "mio@example.com");

        assert!(matches!(
            accounts.register(input("mio@example.com", "another-pass")).await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            accounts.login("mio@example.com", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            accounts.login("nobody@example.com", "hunter2hunter2").await,
            Err(AuthError::InvalidCredentials)
        ));

        let session = accounts
            .login("MIO@example.com", "hunter2hunter2")
            .await
            .expect("login");
        let me = accounts.authenticate(&session.token).await.expect("auth");
        assert_eq!(me.id, user.id);

        assert!(accounts.logout(&session.token).await.expect("logout"));
        assert!(matches!(
            accounts.authenticate(&session.token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let fixture = setup_backend().await;
        let accounts = service(fixture.backend.clone());

        assert!(matches!(
            accounts.register(input("not-an-email", "long-enough")).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            accounts.register(input("ok@example.com", "short")).await,
            Err(AuthError::Validation(_))
        ));
    }
}
