//! Key-value table abstraction behind the notification service.
//!
//! The trait models a single-table store: items addressed by `PK`/`SK`,
//! four secondary indexes, a numeric TTL, and conditional updates. Items
//! whose TTL has passed are invisible to every read even before they are
//! purged.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NotificationError;
use crate::notifications::keys::{Index, IndexKey, ItemKey, is_expired};

/// One stored item: keys, TTL and a JSON attribute map.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    pub gsi: [Option<IndexKey>; 4],
    pub ttl: Option<i64>,
    pub attrs: Map<String, Value>,
}

impl Item {
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            gsi: Default::default(),
            ttl: None,
            attrs: Map::new(),
        }
    }

    pub fn with_index(mut self, index: Index, key: IndexKey) -> Self {
        self.set_index(index, Some(key));
        self
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Replace the attribute map with the fields of a serializable value.
    pub fn with_attrs<T: Serialize>(mut self, value: &T) -> Result<Self, NotificationError> {
        self.attrs = to_attrs(value)?;
        Ok(self)
    }

    /// Setting the primary index is a no-op; the primary key never changes.
    pub fn set_index(&mut self, index: Index, key: Option<IndexKey>) {
        if let Some(slot) = index.slot() {
            self.gsi[slot] = key;
        }
    }

    /// Update only the partition value of a secondary index, keeping its
    /// sort value.
    pub fn set_index_partition(&mut self, index: Index, pk: impl Into<String>) {
        if let Some(slot) = index.slot() {
            let sk = self.gsi[slot]
                .as_ref()
                .map(|k| k.sk.clone())
                .unwrap_or_default();
            self.gsi[slot] = Some(IndexKey::new(pk, sk));
        }
    }

    /// Update only the sort value of a secondary index.
    pub fn set_index_sort(&mut self, index: Index, sk: impl Into<String>) {
        if let Some(slot) = index.slot() {
            let pk = self.gsi[slot]
                .as_ref()
                .map(|k| k.pk.clone())
                .unwrap_or_default();
            self.gsi[slot] = Some(IndexKey::new(pk, sk));
        }
    }

    /// `(partition, sort)` of this item under `index`.
    pub fn index_key(&self, index: Index) -> Option<(&str, &str)> {
        match index.slot() {
            None => Some((self.key.pk.as_str(), self.key.sk.as_str())),
            Some(slot) => self.gsi[slot]
                .as_ref()
                .map(|k| (k.pk.as_str(), k.sk.as_str())),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    pub fn bool_attr(&self, name: &str) -> Option<bool> {
        self.attrs.get(name).and_then(Value::as_bool)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<Value>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    /// Deserialize the attribute map into a model type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, NotificationError> {
        serde_json::from_value(Value::Object(self.attrs.clone()))
            .map_err(|e| NotificationError::Storage(format!("corrupt item {}: {e}", self.key.pk)))
    }

    fn position(&self, index: Index) -> Option<Position> {
        self.index_key(index).map(|(_, sk)| Position {
            index_sk: sk.to_string(),
            pk: self.key.pk.clone(),
            sk: self.key.sk.clone(),
        })
    }
}

pub fn to_attrs<T: Serialize>(value: &T) -> Result<Map<String, Value>, NotificationError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(NotificationError::Storage(
            "item attributes must serialize to an object".to_string(),
        )),
        Err(e) => Err(NotificationError::Storage(e.to_string())),
    }
}

pub type ItemFilter<'a> = &'a (dyn Fn(&Item) -> bool + Send + Sync);
pub type ItemUpdate<'a> = &'a (dyn Fn(&mut Item) -> Result<(), NotificationError> + Send + Sync);

/// Key-condition query against one index partition.
pub struct QueryRequest<'a> {
    pub index: Index,
    pub partition: String,
    /// Inclusive lower bound on the index sort value.
    pub sort_from: Option<String>,
    /// Inclusive upper bound on the index sort value.
    pub sort_to: Option<String>,
    pub descending: bool,
    pub limit: usize,
    /// `next_token` of a previous page.
    pub start_after: Option<String>,
    /// Applied after the key condition, before the limit.
    pub filter: Option<ItemFilter<'a>>,
}

impl<'a> QueryRequest<'a> {
    pub fn new(index: Index, partition: impl Into<String>, limit: usize) -> Self {
        Self {
            index,
            partition: partition.into(),
            sort_from: None,
            sort_to: None,
            descending: true,
            limit,
            start_after: None,
            filter: None,
        }
    }
}

/// Full-table read in primary key order.
pub struct ScanRequest<'a> {
    pub filter: Option<ItemFilter<'a>>,
    pub limit: usize,
    pub start_after: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// Present when more matching items follow.
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    Updated,
    /// The item exists but did not satisfy the condition.
    Skipped,
    Failed { reason: String },
}

/// Per-item result of a batched write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: BatchStatus,
}

impl BatchOutcome {
    pub fn is_updated(&self) -> bool {
        self.status == BatchStatus::Updated
    }
}

#[async_trait]
pub trait KeyValueTable: Send + Sync {
    /// Insert or replace an item.
    async fn put_item(&self, table: &str, item: Item) -> Result<(), NotificationError>;

    async fn get_item(&self, table: &str, key: &ItemKey)
    -> Result<Option<Item>, NotificationError>;

    /// Apply `update` to an existing item and return the new version.
    /// Returns `None` without writing when the item is absent or expired.
    /// A failing `update` leaves the stored item unchanged.
    async fn update_item(
        &self,
        table: &str,
        key: &ItemKey,
        update: ItemUpdate<'_>,
    ) -> Result<Option<Item>, NotificationError>;

    async fn delete_item(&self, table: &str, key: &ItemKey) -> Result<bool, NotificationError>;

    async fn query(
        &self,
        table: &str,
        request: &QueryRequest<'_>,
    ) -> Result<Page, NotificationError>;

    async fn scan(&self, table: &str, request: &ScanRequest<'_>)
    -> Result<Page, NotificationError>;

    /// Update every item in `keys` satisfying `condition` in one atomic
    /// write. Missing items and items whose `update` fails are reported as
    /// failed, unmatched ones as skipped.
    async fn batch_update(
        &self,
        table: &str,
        keys: &[ItemKey],
        condition: ItemFilter<'_>,
        update: ItemUpdate<'_>,
    ) -> Result<Vec<BatchOutcome>, NotificationError>;

    /// Physically remove items whose TTL is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, NotificationError>;
}

/// Sort position of an item within an index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct Position {
    #[serde(rename = "i")]
    pub(crate) index_sk: String,
    #[serde(rename = "p")]
    pub(crate) pk: String,
    #[serde(rename = "s")]
    pub(crate) sk: String,
}

pub(crate) fn encode_token(position: &Position) -> String {
    // Serializing three strings cannot fail.
    let json = serde_json::to_vec(position).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

pub(crate) fn decode_token(token: &str) -> Result<Position, NotificationError> {
    let invalid = || NotificationError::Validation("Invalid nextToken".to_string());
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    serde_json::from_slice(&bytes).map_err(|_| invalid())
}

/// Apply the key condition, ordering, cursor, filter and limit of a query
/// to candidate items. Expired items are dropped.
pub(crate) fn select_query(
    candidates: impl IntoIterator<Item = Item>,
    request: &QueryRequest<'_>,
    now: DateTime<Utc>,
) -> Result<Page, NotificationError> {
    let mut matching: Vec<(Position, Item)> = candidates
        .into_iter()
        .filter(|item| !is_expired(item.ttl, now))
        .filter_map(|item| {
            let (pk, sk) = item.index_key(request.index)?;
            if pk != request.partition {
                return None;
            }
            if request.sort_from.as_deref().is_some_and(|from| sk < from)
                || request.sort_to.as_deref().is_some_and(|to| sk > to)
            {
                return None;
            }
            let position = item.position(request.index)?;
            Some((position, item))
        })
        .collect();
    matching.sort_by(|a, b| a.0.cmp(&b.0));
    if request.descending {
        matching.reverse();
    }
    paginate(
        matching,
        request.descending,
        request.start_after.as_deref(),
        request.filter,
        request.limit,
    )
}

pub(crate) fn select_scan(
    candidates: impl IntoIterator<Item = Item>,
    request: &ScanRequest<'_>,
    now: DateTime<Utc>,
) -> Result<Page, NotificationError> {
    let mut matching: Vec<(Position, Item)> = candidates
        .into_iter()
        .filter(|item| !is_expired(item.ttl, now))
        .filter_map(|item| item.position(Index::Primary).map(|p| (p, item)))
        .collect();
    matching.sort_by(|a, b| a.0.cmp(&b.0));
    paginate(
        matching,
        false,
        request.start_after.as_deref(),
        request.filter,
        request.limit,
    )
}

fn paginate(
    ordered: Vec<(Position, Item)>,
    descending: bool,
    start_after: Option<&str>,
    filter: Option<ItemFilter<'_>>,
    limit: usize,
) -> Result<Page, NotificationError> {
    let cursor = start_after.map(decode_token).transpose()?;
    let mut rest = ordered
        .into_iter()
        .filter(|(position, _)| match &cursor {
            None => true,
            Some(after) if descending => position < after,
            Some(after) => position > after,
        })
        .filter(|(_, item)| filter.is_none_or(|f| f(item)));

    let limit = limit.max(1);
    let mut items = Vec::with_capacity(limit.min(64));
    let mut last = None;
    for (position, item) in rest.by_ref().take(limit) {
        last = Some(position);
        items.push(item);
    }
    let next_token = match (rest.next(), last) {
        (Some(_), Some(last)) => Some(encode_token(&last)),
        _ => None,
    };
    Ok(Page { items, next_token })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn item(id: &str, user: &str, created: &str) -> Item {
        Item::new(ItemKey::single(id)).with_index(Index::Gsi1, IndexKey::new(user, created))
    }

    #[test]
    fn query_orders_descending_and_pages_with_token() {
        let now = Utc::now();
        let items = vec![
            item("a", "u1", "2026-01-01"),
            item("b", "u1", "2026-01-03"),
            item("c", "u1", "2026-01-02"),
            item("d", "u2", "2026-01-04"),
        ];
        let mut request = QueryRequest::new(Index::Gsi1, "u1", 2);

        let first = select_query(items.clone(), &request, now).expect("page 1");
        let ids: Vec<&str> = first.items.iter().map(|i| i.key.pk.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(first.next_token.is_some());

        request.start_after = first.next_token;
        let second = select_query(items, &request, now).expect("page 2");
        let ids: Vec<&str> = second.items.iter().map(|i| i.key.pk.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(second.next_token, None);
    }

    #[test]
    fn query_honours_sort_range_and_filter() {
        let now = Utc::now();
        let mut archived = item("b", "u1", "2026-01-03");
        archived.set_attr("isArchived", true);
        let items = vec![
            item("a", "u1", "2026-01-01"),
            archived,
            item("c", "u1", "2026-01-05"),
        ];
        let only_archived = |i: &Item| i.bool_attr("isArchived") == Some(true);
        let mut request = QueryRequest::new(Index::Gsi1, "u1", 10);
        request.sort_from = Some("2026-01-02".to_string());
        request.filter = Some(&only_archived);

        let page = select_query(items, &request, now).expect("page");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key.pk, "b");
    }

    #[test]
    fn expired_items_are_invisible() {
        let now = Utc::now();
        let items = vec![
            item("a", "u1", "1").with_ttl(now.timestamp() - 1),
            item("b", "u1", "2").with_ttl(now.timestamp() + 60),
        ];
        let page = select_scan(
            items,
            &ScanRequest {
                filter: None,
                limit: 10,
                start_after: None,
            },
            now,
        )
        .expect("scan");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key.pk, "b");
    }

    #[test]
    fn garbage_token_is_a_validation_error() {
        let err = decode_token("%%%").expect_err("bad token");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn index_partition_update_keeps_sort_value() {
        let mut it = item("a", "u1", "2026-01-01");
        it.set_index_partition(Index::Gsi1, "u9");
        assert_eq!(it.index_key(Index::Gsi1), Some(("u9", "2026-01-01")));
        assert_eq!(it.index_key(Index::Primary), Some(("a", "a")));
        assert_eq!(it.index_key(Index::Gsi2), None);
    }

    #[test]
    fn batch_outcome_serializes_with_status_tag() {
        let outcome = BatchOutcome {
            id: "n1".to_string(),
            status: BatchStatus::Failed {
                reason: "not found".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).expect("json");
        assert_eq!(
            json,
            serde_json::json!({"id": "n1", "status": "failed", "reason": "not found"})
        );
    }
}
