//! In-process key-value table for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::NotificationError;
use crate::notifications::keys::{ItemKey, is_expired};
use crate::notifications::table::{
    BatchOutcome, BatchStatus, Item, ItemFilter, ItemUpdate, KeyValueTable, Page, QueryRequest,
    ScanRequest, select_query, select_scan,
};

type TableKey = (String, ItemKey);

#[derive(Default)]
pub struct MemoryTable {
    items: RwLock<BTreeMap<TableKey, Item>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_key(table: &str, key: &ItemKey) -> TableKey {
        (table.to_string(), key.clone())
    }

    async fn snapshot(&self, table: &str) -> Vec<Item> {
        self.items
            .read()
            .await
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[async_trait]
impl KeyValueTable for MemoryTable {
    async fn put_item(&self, table: &str, item: Item) -> Result<(), NotificationError> {
        let key = Self::table_key(table, &item.key);
        self.items.write().await.insert(key, item);
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: &ItemKey,
    ) -> Result<Option<Item>, NotificationError> {
        let now = Utc::now();
        Ok(self
            .items
            .read()
            .await
            .get(&Self::table_key(table, key))
            .filter(|item| !is_expired(item.ttl, now))
            .cloned())
    }

    async fn update_item(
        &self,
        table: &str,
        key: &ItemKey,
        update: ItemUpdate<'_>,
    ) -> Result<Option<Item>, NotificationError> {
        let now = Utc::now();
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&Self::table_key(table, key)) else {
            return Ok(None);
        };
        if is_expired(item.ttl, now) {
            return Ok(None);
        }
        let mut updated = item.clone();
        update(&mut updated)?;
        updated.key = key.clone();
        *item = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_item(&self, table: &str, key: &ItemKey) -> Result<bool, NotificationError> {
        let now = Utc::now();
        let removed = self.items.write().await.remove(&Self::table_key(table, key));
        Ok(removed.is_some_and(|item| !is_expired(item.ttl, now)))
    }

    async fn query(
        &self,
        table: &str,
        request: &QueryRequest<'_>,
    ) -> Result<Page, NotificationError> {
        select_query(self.snapshot(table).await, request, Utc::now())
    }

    async fn scan(
        &self,
        table: &str,
        request: &ScanRequest<'_>,
    ) -> Result<Page, NotificationError> {
        select_scan(self.snapshot(table).await, request, Utc::now())
    }

    async fn batch_update(
        &self,
        table: &str,
        keys: &[ItemKey],
        condition: ItemFilter<'_>,
        update: ItemUpdate<'_>,
    ) -> Result<Vec<BatchOutcome>, NotificationError> {
        let now = Utc::now();
        // One write guard for the whole batch keeps it atomic.
        let mut items = self.items.write().await;
        let outcomes = keys
            .iter()
            .map(|key| {
                let status = match items.get_mut(&Self::table_key(table, key)) {
                    Some(item) if !is_expired(item.ttl, now) => {
                        if condition(item) {
                            let mut updated = item.clone();
                            match update(&mut updated) {
                                Ok(()) => {
                                    updated.key = key.clone();
                                    *item = updated;
                                    BatchStatus::Updated
                                }
                                Err(err) => BatchStatus::Failed {
                                    reason: err.to_string(),
                                },
                            }
                        } else {
                            BatchStatus::Skipped
                        }
                    }
                    _ => BatchStatus::Failed {
                        reason: "item not found".to_string(),
                    },
                };
                BatchOutcome {
                    id: key.pk.clone(),
                    status,
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, NotificationError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, item| !is_expired(item.ttl, now));
        Ok((before - items.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::notifications::keys::{Index, IndexKey};

    fn notification(id: &str, user: &str) -> Item {
        let mut item = Item::new(ItemKey::single(id))
            .with_index(Index::Gsi1, IndexKey::new(user, format!("2026-01-0{id}")));
        item.set_attr("isRead", false);
        item
    }

    #[tokio::test]
    async fn tables_are_isolated() {
        let store = MemoryTable::new();
        store
            .put_item("a", notification("1", "u"))
            .await
            .expect("put");
        assert!(
            store
                .get_item("b", &ItemKey::single("1"))
                .await
                .expect("get")
                .is_none()
        );
        assert!(
            store
                .get_item("a", &ItemKey::single("1"))
                .await
                .expect("get")
                .is_some()
        );
    }

    #[tokio::test]
    async fn update_missing_item_writes_nothing() {
        let store = MemoryTable::new();
        let updated = store
            .update_item("a", &ItemKey::single("nope"), &|item: &mut Item| {
                item.set_attr("isRead", true);
                Ok(())
            })
            .await
            .expect("update");
        assert_eq!(updated, None);
        assert!(store.snapshot("a").await.is_empty());
    }

    #[tokio::test]
    async fn batch_update_reports_each_item() {
        let store = MemoryTable::new();
        store
            .put_item("n", notification("1", "u"))
            .await
            .expect("put");
        let mut read = notification("2", "u");
        read.set_attr("isRead", true);
        store.put_item("n", read).await.expect("put");

        let keys = vec![
            ItemKey::single("1"),
            ItemKey::single("2"),
            ItemKey::single("3"),
        ];
        let outcomes = store
            .batch_update(
                "n",
                &keys,
                &|item: &Item| item.bool_attr("isRead") == Some(false),
                &|item: &mut Item| {
                    item.set_attr("isRead", true);
                    Ok(())
                },
            )
            .await
            .expect("batch");

        let statuses: Vec<BatchStatus> = outcomes.into_iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                BatchStatus::Updated,
                BatchStatus::Skipped,
                BatchStatus::Failed {
                    reason: "item not found".to_string()
                },
            ]
        );
        let first = store
            .get_item("n", &ItemKey::single("1"))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(first.bool_attr("isRead"), Some(true));
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryTable::new();
        let now = Utc::now();
        store
            .put_item("n", notification("1", "u").with_ttl(now.timestamp() - 5))
            .await
            .expect("put");
        store
            .put_item("n", notification("2", "u").with_ttl(now.timestamp() + 500))
            .await
            .expect("put");

        assert!(
            store
                .get_item("n", &ItemKey::single("1"))
                .await
                .expect("get")
                .is_none()
        );
        assert_eq!(store.purge_expired(now).await.expect("purge"), 1);
        assert_eq!(store.snapshot("n").await.len(), 1);
    }
}
