//! Bearer-session middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::db::UserRecord;
use crate::web::error::ApiError;
use crate::web::server::AppState;

/// The user behind the request's session token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRecord);

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(&req) else {
        return Err(ApiError::Unauthorized(
            "Missing or invalid Authorization header".into(),
        ));
    };
    let user = state.accounts.authenticate(token).await?;
    tracing::debug!(user_id = %user.id, "authenticated request");
    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/users/me");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[test]
    fn extracts_bearer_tokens_only() {
        assert_eq!(bearer_token(&request(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&request(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&request(Some("Bearer   "))), None);
        assert_eq!(bearer_token(&request(None)), None);
    }
}
