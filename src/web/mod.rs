//! REST API over axum.
//!
//! Case-management resources answer with `{ data, pagination? }` or
//! `{ error }`; the notification service answers with result envelopes.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod types;

pub use self::server::{AppState, router, start_server};
