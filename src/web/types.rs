//! Response envelopes, extractors and pagination for the REST API.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{PageRequest, Paged};
use crate::web::error::ApiError;

const MAX_PAGE_LIMIT: u64 = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

/// `{ data, pagination? }` success body.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self {
            data,
            pagination: None,
        })
    }
}

impl<T: Serialize> DataResponse<Vec<T>> {
    pub fn paged(paged: Paged<T>, page: PageRequest) -> Json<Self> {
        Json(Self {
            pagination: Some(Pagination {
                page: page.page,
                limit: page.limit,
                total: paged.total,
                pages: page.pages(paged.total),
            }),
            data: paged.items,
        })
    }
}

/// Raw `page`/`limit` query parameters, validated by `into_request`.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn into_request(self) -> Result<PageRequest, ApiError> {
        let defaults = PageRequest::default();
        let page = parse_page_param(self.page.as_deref(), defaults.page)?;
        let limit = parse_page_param(self.limit.as_deref(), defaults.limit)?;
        if page == 0 || limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(invalid_pagination());
        }
        Ok(PageRequest { page, limit })
    }
}

fn parse_page_param(raw: Option<&str>, default: u64) -> Result<u64, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| invalid_pagination()),
    }
}

fn invalid_pagination() -> ApiError {
    ApiError::bad_request("Invalid pagination parameters")
}

/// JSON body extractor that answers malformed input with a JSON 400.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(ApiError::PayloadTooLarge(rejection.body_text()))
            }
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Query-string extractor with the same JSON 400 on bad input.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Parse a path id. Anything that is not a UUID cannot name a stored row,
/// so it answers with the entity's not-found message.
pub fn parse_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found(not_found))
}

/// Trimmed, non-empty string or `None`.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
