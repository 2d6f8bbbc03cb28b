//! Case-management service for law firms.
//!
//! Cases move through workflow phases within a category; parties, courts,
//! firms and lawyers hang off them. Time is tracked with timers and
//! timesheet entries, documents are rendered from templates, and a
//! separate single-table store holds notifications.

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod legal;
pub mod notifications;
pub mod settings;
pub mod web;

pub use crate::error::{Error, Result};
