//! Notification subsystem on a single-table key-value store.
//!
//! Independent of the relational per-user notices in `db`: different
//! storage, different model, no shared ids.

pub mod keys;
#[cfg(feature = "libsql")]
pub mod libsql_table;
pub mod memory;
pub mod model;
pub mod service;
pub mod table;

pub use self::memory::MemoryTable;
pub use self::service::NotificationService;
pub use self::table::{BatchOutcome, BatchStatus, Item, KeyValueTable};
