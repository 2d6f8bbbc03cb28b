//! Key layout of the single-table notification store.
//!
//! Every item has a primary `PK`/`SK` pair and up to four secondary index
//! pairs (`GSI1`..`GSI4`). Which attribute feeds which index depends on the
//! entity:
//!
//! | entity       | PK = SK  | GSI1           | GSI2        | GSI3            | GSI4               |
//! |--------------|----------|----------------|-------------|-----------------|--------------------|
//! | notification | id       | userId/created | typeId/created | priorityId/created | read status/created |
//! | type         | id       | category/name  |             |                 |                    |
//! | priority     | id       | level/name     |             |                 |                    |
//! | channel      | id       | type/name      |             |                 |                    |
//! | settings     | userId   |                |             |                 |                    |

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const READ: &str = "read";
pub const UNREAD: &str = "unread";

/// Index a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    Primary,
    Gsi1,
    Gsi2,
    Gsi3,
    Gsi4,
}

impl Index {
    pub const SECONDARY: [Index; 4] = [Index::Gsi1, Index::Gsi2, Index::Gsi3, Index::Gsi4];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Gsi1 => "GSI1",
            Self::Gsi2 => "GSI2",
            Self::Gsi3 => "GSI3",
            Self::Gsi4 => "GSI4",
        }
    }

    /// Slot in `Item::gsi`; `None` for the primary index.
    pub(crate) fn slot(self) -> Option<usize> {
        match self {
            Self::Primary => None,
            Self::Gsi1 => Some(0),
            Self::Gsi2 => Some(1),
            Self::Gsi3 => Some(2),
            Self::Gsi4 => Some(3),
        }
    }
}

/// Primary key of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Key for entities stored with `PK == SK`.
    pub fn single(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            pk: id.clone(),
            sk: id,
        }
    }
}

/// Partition/sort pair of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub pk: String,
    pub sk: String,
}

impl IndexKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// Epoch seconds `days` after `now`.
pub fn ttl_after(now: DateTime<Utc>, days: u64) -> i64 {
    let days = i64::try_from(days).unwrap_or(i64::MAX / 86_400);
    (now + Duration::days(days)).timestamp()
}

/// True once `ttl` is at or before `now`.
pub fn is_expired(ttl: Option<i64>, now: DateTime<Utc>) -> bool {
    ttl.is_some_and(|ttl| ttl <= now.timestamp())
}

/// Index sort value for a timestamp: fixed-width RFC 3339 so that string
/// order matches time order.
pub fn sort_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// GSI4 partition value for a read flag.
pub fn read_status_key(is_read: bool) -> &'static str {
    if is_read { READ } else { UNREAD }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_seven_days_of_seconds() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("ts");
        assert_eq!(ttl_after(now, 7), 1_700_000_000 + 7 * 24 * 60 * 60);
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = DateTime::from_timestamp(1_000, 0).expect("ts");
        assert!(is_expired(Some(1_000), now));
        assert!(!is_expired(Some(1_001), now));
        assert!(!is_expired(None, now));
    }

    #[test]
    fn read_status_values() {
        assert_eq!(read_status_key(true), "read");
        assert_eq!(read_status_key(false), "unread");
        assert_eq!(ItemKey::single("a"), ItemKey::new("a", "a"));
    }

    #[test]
    fn sort_timestamps_order_lexically() {
        let early = DateTime::from_timestamp(1_700_000_000, 5_000_000).expect("ts");
        let late = DateTime::from_timestamp(1_700_000_001, 0).expect("ts");
        assert_eq!(sort_timestamp(&early), "2023-11-14T22:13:20.005Z");
        assert!(sort_timestamp(&early) < sort_timestamp(&late));
    }
}
