//! Legal domain logic that sits above the stores.

pub mod docgen;
pub mod timesheet;
pub mod workflow;
