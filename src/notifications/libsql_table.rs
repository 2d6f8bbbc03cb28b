//! Key-value table stored in the `kv_items` table of the libSQL database.
//!
//! Key conditions and TTL visibility are pushed into SQL; cursor, filter
//! and limit handling is shared with the in-memory table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;

use crate::db::libsql::{LibSqlBackend, get_opt_text, get_text};
use crate::error::{DatabaseError, NotificationError};
use crate::notifications::keys::{Index, IndexKey, ItemKey};
use crate::notifications::table::{
    BatchOutcome, BatchStatus, Item, ItemFilter, ItemUpdate, KeyValueTable, Page, QueryRequest,
    ScanRequest, select_query, select_scan,
};

const COLUMNS: &str = "pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk, gsi3pk, gsi3sk, \
                       gsi4pk, gsi4sk, ttl, attrs";

#[derive(Debug, Clone)]
pub struct LibSqlTable {
    backend: LibSqlBackend,
}

impl LibSqlTable {
    pub fn new(backend: LibSqlBackend) -> Self {
        Self { backend }
    }

    async fn load(
        &self,
        sql: &str,
        values: Vec<libsql::Value>,
    ) -> Result<Vec<Item>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query(sql, libsql::params::Params::Positional(values))
            .await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }

    async fn load_one(
        conn: &libsql::Connection,
        table: &str,
        key: &ItemKey,
        now: i64,
    ) -> Result<Option<Item>, DatabaseError> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM kv_items \
                     WHERE table_name = ?1 AND pk = ?2 AND sk = ?3 AND (ttl IS NULL OR ttl > ?4)"
                ),
                params![table, key.pk.as_str(), key.sk.as_str(), now],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_item(&row).map(Some),
            None => Ok(None),
        }
    }
}

fn index_columns(index: Index) -> (&'static str, &'static str) {
    match index {
        Index::Primary => ("pk", "sk"),
        Index::Gsi1 => ("gsi1pk", "gsi1sk"),
        Index::Gsi2 => ("gsi2pk", "gsi2sk"),
        Index::Gsi3 => ("gsi3pk", "gsi3sk"),
        Index::Gsi4 => ("gsi4pk", "gsi4sk"),
    }
}

fn row_to_item(row: &libsql::Row) -> Result<Item, DatabaseError> {
    let mut item = Item::new(ItemKey::new(get_text(row, 0), get_text(row, 1)));
    for (offset, index) in Index::SECONDARY.into_iter().enumerate() {
        let column = 2 + 2 * offset as i32;
        if let Some(pk) = get_opt_text(row, column) {
            let sk = get_opt_text(row, column + 1).unwrap_or_default();
            item.set_index(index, Some(IndexKey::new(pk, sk)));
        }
    }
    item.ttl = match row.get_value(10) {
        Ok(libsql::Value::Integer(ttl)) => Some(ttl),
        _ => None,
    };
    let raw = get_text(row, 11);
    item.attrs = match serde_json::from_str(&raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Err(DatabaseError::Serialization(format!(
                "kv item {} has non-object attributes",
                item.key.pk
            )));
        }
    };
    Ok(item)
}

fn item_values(table: &str, item: &Item) -> Result<Vec<libsql::Value>, DatabaseError> {
    let attrs = serde_json::to_string(&item.attrs)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let mut values = vec![
        libsql::Value::Text(table.to_string()),
        libsql::Value::Text(item.key.pk.clone()),
        libsql::Value::Text(item.key.sk.clone()),
    ];
    for key in &item.gsi {
        match key {
            Some(key) => {
                values.push(libsql::Value::Text(key.pk.clone()));
                values.push(libsql::Value::Text(key.sk.clone()));
            }
            None => {
                values.push(libsql::Value::Null);
                values.push(libsql::Value::Null);
            }
        }
    }
    values.push(item.ttl.map_or(libsql::Value::Null, libsql::Value::Integer));
    values.push(libsql::Value::Text(attrs));
    Ok(values)
}

async fn write_item(
    conn: &libsql::Connection,
    table: &str,
    item: &Item,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv_items \
         (table_name, pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk, gsi3pk, gsi3sk, gsi4pk, gsi4sk, ttl, attrs) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        libsql::params::Params::Positional(item_values(table, item)?),
    )
    .await?;
    Ok(())
}

#[async_trait]
impl KeyValueTable for LibSqlTable {
    async fn put_item(&self, table: &str, item: Item) -> Result<(), NotificationError> {
        let conn = self.backend.connect().await?;
        write_item(&conn, table, &item).await?;
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: &ItemKey,
    ) -> Result<Option<Item>, NotificationError> {
        let conn = self.backend.connect().await?;
        Ok(Self::load_one(&conn, table, key, Utc::now().timestamp()).await?)
    }

    async fn update_item(
        &self,
        table: &str,
        key: &ItemKey,
        update: ItemUpdate<'_>,
    ) -> Result<Option<Item>, NotificationError> {
        let conn = self.backend.connect().await?;
        let now = Utc::now().timestamp();
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(DatabaseError::from)?;
        let result = async {
            let Some(mut item) = Self::load_one(&conn, table, key, now).await? else {
                return Ok(None);
            };
            update(&mut item)?;
            item.key = key.clone();
            write_item(&conn, table, &item).await?;
            Ok::<_, NotificationError>(Some(item))
        }
        .await;

        match result {
            Ok(item) => {
                conn.execute("COMMIT", ()).await.map_err(DatabaseError::from)?;
                Ok(item)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    async fn delete_item(&self, table: &str, key: &ItemKey) -> Result<bool, NotificationError> {
        let conn = self.backend.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM kv_items WHERE table_name = ?1 AND pk = ?2 AND sk = ?3 \
                 AND (ttl IS NULL OR ttl > ?4)",
                params![table, key.pk.as_str(), key.sk.as_str(), Utc::now().timestamp()],
            )
            .await
            .map_err(DatabaseError::from)?;
        Ok(deleted > 0)
    }

    async fn query(
        &self,
        table: &str,
        request: &QueryRequest<'_>,
    ) -> Result<Page, NotificationError> {
        let now = Utc::now();
        let (pk_col, sk_col) = index_columns(request.index);
        let mut sql = format!(
            "SELECT {COLUMNS} FROM kv_items \
             WHERE table_name = ?1 AND {pk_col} = ?2 AND (ttl IS NULL OR ttl > ?3)"
        );
        let mut values = vec![
            libsql::Value::Text(table.to_string()),
            libsql::Value::Text(request.partition.clone()),
            libsql::Value::Integer(now.timestamp()),
        ];
        if let Some(from) = &request.sort_from {
            values.push(libsql::Value::Text(from.clone()));
            sql.push_str(&format!(" AND {sk_col} >= ?{}", values.len()));
        }
        if let Some(to) = &request.sort_to {
            values.push(libsql::Value::Text(to.clone()));
            sql.push_str(&format!(" AND {sk_col} <= ?{}", values.len()));
        }
        let items = self.load(&sql, values).await?;
        select_query(items, request, now)
    }

    async fn scan(
        &self,
        table: &str,
        request: &ScanRequest<'_>,
    ) -> Result<Page, NotificationError> {
        let now = Utc::now();
        let items = self
            .load(
                &format!(
                    "SELECT {COLUMNS} FROM kv_items \
                     WHERE table_name = ?1 AND (ttl IS NULL OR ttl > ?2)"
                ),
                vec![
                    libsql::Value::Text(table.to_string()),
                    libsql::Value::Integer(now.timestamp()),
                ],
            )
            .await?;
        select_scan(items, request, now)
    }

    async fn batch_update(
        &self,
        table: &str,
        keys: &[ItemKey],
        condition: ItemFilter<'_>,
        update: ItemUpdate<'_>,
    ) -> Result<Vec<BatchOutcome>, NotificationError> {
        let conn = self.backend.connect().await?;
        let now = Utc::now().timestamp();
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(DatabaseError::from)?;
        let result = async {
            let mut outcomes = Vec::with_capacity(keys.len());
            for key in keys {
                let status = match Self::load_one(&conn, table, key, now).await {
                    Ok(Some(mut item)) if condition(&item) => match update(&mut item) {
                        Ok(()) => {
                            item.key = key.clone();
                            write_item(&conn, table, &item).await?;
                            BatchStatus::Updated
                        }
                        Err(err) => BatchStatus::Failed {
                            reason: err.to_string(),
                        },
                    },
                    Ok(Some(_)) => BatchStatus::Skipped,
                    Ok(None) => BatchStatus::Failed {
                        reason: "item not found".to_string(),
                    },
                    Err(DatabaseError::Serialization(reason)) => BatchStatus::Failed { reason },
                    Err(err) => return Err(err),
                };
                outcomes.push(BatchOutcome {
                    id: key.pk.clone(),
                    status,
                });
            }
            Ok::<_, DatabaseError>(outcomes)
        }
        .await;

        match result {
            Ok(outcomes) => {
                conn.execute("COMMIT", ()).await.map_err(DatabaseError::from)?;
                Ok(outcomes)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err.into())
            }
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, NotificationError> {
        let conn = self.backend.connect().await?;
        let purged = conn
            .execute(
                "DELETE FROM kv_items WHERE ttl IS NOT NULL AND ttl <= ?1",
                params![now.timestamp()],
            )
            .await
            .map_err(DatabaseError::from)?;
        tracing::debug!(purged, "purged expired kv items");
        Ok(purged)
    }
}
