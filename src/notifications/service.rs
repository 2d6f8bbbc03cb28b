//! Notification operations over the single-table key-value store.
//!
//! Every mutation is one round trip to the table (a put, a conditional
//! update, or one batched write). The service keeps secondary index keys in
//! step with the attributes they are derived from.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::{NotificationConfig, NotificationTables};
use crate::error::NotificationError;
use crate::notifications::keys::{
    Index, IndexKey, ItemKey, READ, UNREAD, read_status_key, sort_timestamp, ttl_after,
};
use crate::notifications::model::{
    BulkResult, ChannelCount, ChannelFilter, CreateNotificationChannelInput,
    CreateNotificationInput, CreateNotificationPriorityInput, CreateNotificationTypeInput,
    CreateSettingsInput, Listing, Notification, NotificationChannel, NotificationFilter,
    NotificationPriority, NotificationSettings, NotificationStats, NotificationType,
    PriorityCount, PriorityFilter, SettingsPatch, TypeCount, TypeFilter,
    UpdateNotificationChannelInput, UpdateNotificationInput, UpdateNotificationPriorityInput,
    UpdateNotificationTypeInput,
};
use crate::notifications::table::{
    Item, ItemFilter, ItemUpdate, KeyValueTable, Page, QueryRequest, ScanRequest, to_attrs,
};

pub const MAX_PAGE_SIZE: usize = 100;
/// Page size used when draining a whole partition.
const DRAIN_PAGE_SIZE: usize = 100;

pub struct NotificationService {
    table: Arc<dyn KeyValueTable>,
    tables: NotificationTables,
    ttl_days: u64,
    default_page_size: usize,
}

fn required(value: &str, field: &str) -> Result<(), NotificationError> {
    if value.trim().is_empty() {
        Err(NotificationError::Validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

fn not_found(entity: &'static str, id: &str) -> NotificationError {
    NotificationError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn contains_term(haystacks: &[Option<&str>], term: &str) -> bool {
    let term = term.to_lowercase();
    haystacks
        .iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(&term))
}

/// Decode the attributes as `T`, apply `change`, and write them back.
fn rewrite<T>(item: &mut Item, change: impl FnOnce(&mut T)) -> Result<(), NotificationError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = item.decode::<T>()?;
    change(&mut value);
    item.attrs = to_attrs(&value)?;
    Ok(())
}

fn decode_page<T: DeserializeOwned>(page: Page) -> Result<Listing<T>, NotificationError> {
    let items = page
        .items
        .iter()
        .map(Item::decode)
        .collect::<Result<Vec<T>, _>>()?;
    Ok(Listing {
        total_count: items.len(),
        items,
        next_token: page.next_token,
    })
}

fn notification_matches(filter: &NotificationFilter, n: &Notification) -> bool {
    filter.user_id.as_ref().is_none_or(|v| &n.user_id == v)
        && filter.type_id.as_ref().is_none_or(|v| &n.type_id == v)
        && filter.priority_id.as_ref().is_none_or(|v| &n.priority_id == v)
        && filter.is_read.is_none_or(|v| n.is_read == v)
        && filter.is_archived.is_none_or(|v| n.is_archived == v)
        && filter
            .channel
            .as_ref()
            .is_none_or(|v| n.channels.iter().any(|c| c == v))
        && filter.start_date.is_none_or(|from| n.created_at >= from)
        && filter.end_date.is_none_or(|to| n.created_at <= to)
        && filter.search_term.as_deref().is_none_or(|term| {
            contains_term(&[Some(n.title.as_str()), Some(n.message.as_str())], term)
        })
}

fn mark_read_in(item: &mut Item, now: DateTime<Utc>) -> Result<(), NotificationError> {
    rewrite::<Notification>(item, |n| {
        n.is_read = true;
        n.read_at = Some(now);
        n.updated_at = now;
    })?;
    item.set_index_partition(Index::Gsi4, READ);
    Ok(())
}

fn archive_in(item: &mut Item, now: DateTime<Utc>) -> Result<(), NotificationError> {
    rewrite::<Notification>(item, |n| {
        n.is_archived = true;
        n.archived_at = Some(now);
        n.updated_at = now;
    })
}

impl NotificationService {
    pub fn new(table: Arc<dyn KeyValueTable>, config: &NotificationConfig) -> Self {
        Self {
            table,
            tables: config.tables.clone(),
            ttl_days: config.ttl_days,
            default_page_size: usize::try_from(config.default_page_size).unwrap_or(20),
        }
    }

    pub fn table(&self) -> &Arc<dyn KeyValueTable> {
        &self.table
    }

    fn page_size(&self, requested: Option<usize>) -> Result<usize, NotificationError> {
        match requested {
            None => Ok(self.default_page_size),
            Some(limit) if (1..=MAX_PAGE_SIZE).contains(&limit) => Ok(limit),
            Some(_) => Err(NotificationError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            ))),
        }
    }

    fn ttl(&self, now: DateTime<Utc>) -> i64 {
        ttl_after(now, self.ttl_days)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &'static str,
        id: &str,
    ) -> Result<T, NotificationError> {
        self.table
            .get_item(table, &ItemKey::single(id))
            .await?
            .ok_or_else(|| not_found(entity, id))?
            .decode()
    }

    async fn modify<T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &'static str,
        id: &str,
        update: ItemUpdate<'_>,
    ) -> Result<T, NotificationError> {
        self.table
            .update_item(table, &ItemKey::single(id), update)
            .await?
            .ok_or_else(|| not_found(entity, id))?
            .decode()
    }

    async fn remove(
        &self,
        table: &str,
        entity: &'static str,
        id: &str,
    ) -> Result<(), NotificationError> {
        if self.table.delete_item(table, &ItemKey::single(id)).await? {
            tracing::info!(entity, id, "deleted");
            Ok(())
        } else {
            Err(not_found(entity, id))
        }
    }

    /// Every item of one index partition that passes `filter`.
    async fn drain(
        &self,
        table: &str,
        index: Index,
        partition: &str,
        filter: Option<ItemFilter<'_>>,
    ) -> Result<Vec<Item>, NotificationError> {
        let mut request = QueryRequest::new(index, partition, DRAIN_PAGE_SIZE);
        request.filter = filter;
        let mut items = Vec::new();
        loop {
            let page = self.table.query(table, &request).await?;
            items.extend(page.items);
            match page.next_token {
                Some(token) => request.start_after = Some(token),
                None => return Ok(items),
            }
        }
    }

    // ==================== Notifications ====================

    pub async fn create(
        &self,
        input: CreateNotificationInput,
    ) -> Result<Notification, NotificationError> {
        required(&input.user_id, "userId")?;
        required(&input.type_id, "typeId")?;
        required(&input.title, "title")?;
        required(&input.message, "message")?;
        required(&input.priority_id, "priorityId")?;

        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id,
            type_id: input.type_id,
            title: input.title,
            message: input.message,
            data: input.data,
            is_read: false,
            is_archived: false,
            priority_id: input.priority_id,
            channels: input.channels,
            scheduled_at: input.scheduled_at,
            sent_at: None,
            read_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
            ttl: Some(self.ttl(now)),
        };
        let created = sort_timestamp(&now);
        let item = Item::new(ItemKey::single(&notification.id))
            .with_index(
                Index::Gsi1,
                IndexKey::new(&notification.user_id, &created),
            )
            .with_index(
                Index::Gsi2,
                IndexKey::new(&notification.type_id, &created),
            )
            .with_index(
                Index::Gsi3,
                IndexKey::new(&notification.priority_id, &created),
            )
            .with_index(Index::Gsi4, IndexKey::new(UNREAD, &created))
            .with_ttl(self.ttl(now))
            .with_attrs(&notification)?;
        self.table
            .put_item(&self.tables.notifications, item)
            .await?;
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            "created notification"
        );
        Ok(notification)
    }

    pub async fn get(&self, id: &str) -> Result<Notification, NotificationError> {
        self.fetch(&self.tables.notifications, "Notification", id)
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        input: UpdateNotificationInput,
    ) -> Result<Notification, NotificationError> {
        if let Some(title) = &input.title {
            required(title, "title")?;
        }
        if let Some(message) = &input.message {
            required(message, "message")?;
        }
        if let Some(priority) = &input.priority_id {
            required(priority, "priorityId")?;
        }
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<Notification>(item, |n| {
                if let Some(title) = &input.title {
                    n.title = title.clone();
                }
                if let Some(message) = &input.message {
                    n.message = message.clone();
                }
                if let Some(data) = &input.data {
                    n.data = data.clone();
                }
                if let Some(priority) = &input.priority_id {
                    n.priority_id = priority.clone();
                }
                if let Some(channels) = &input.channels {
                    n.channels = channels.clone();
                }
                if let Some(scheduled) = input.scheduled_at {
                    n.scheduled_at = scheduled;
                }
                n.updated_at = now;
            })?;
            if let Some(priority) = &input.priority_id {
                item.set_index_partition(Index::Gsi3, priority.as_str());
            }
            Ok(())
        };
        self.modify(&self.tables.notifications, "Notification", id, &update)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), NotificationError> {
        self.remove(&self.tables.notifications, "Notification", id)
            .await
    }

    pub async fn mark_read(&self, id: &str) -> Result<Notification, NotificationError> {
        let now = Utc::now();
        self.modify(
            &self.tables.notifications,
            "Notification",
            id,
            &|item: &mut Item| mark_read_in(item, now),
        )
        .await
    }

    pub async fn mark_unread(&self, id: &str) -> Result<Notification, NotificationError> {
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<Notification>(item, |n| {
                n.is_read = false;
                n.read_at = None;
                n.updated_at = now;
            })?;
            item.set_index_partition(Index::Gsi4, read_status_key(false));
            Ok(())
        };
        self.modify(&self.tables.notifications, "Notification", id, &update)
            .await
    }

    pub async fn archive(&self, id: &str) -> Result<Notification, NotificationError> {
        let now = Utc::now();
        self.modify(
            &self.tables.notifications,
            "Notification",
            id,
            &|item: &mut Item| archive_in(item, now),
        )
        .await
    }

    pub async fn unarchive(&self, id: &str) -> Result<Notification, NotificationError> {
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<Notification>(item, |n| {
                n.is_archived = false;
                n.archived_at = None;
                n.updated_at = now;
            })?;
            Ok(())
        };
        self.modify(&self.tables.notifications, "Notification", id, &update)
            .await
    }

    /// Mark every unread notification of `user_id` read in one batched
    /// write. Items changed concurrently are reported as skipped.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<BulkResult, NotificationError> {
        required(user_id, "userId")?;
        let user = user_id.to_string();
        let unread = move |item: &Item| {
            item.str_attr("userId") == Some(user.as_str())
                && item.bool_attr("isRead") == Some(false)
        };
        let keys: Vec<ItemKey> = self
            .drain(
                &self.tables.notifications,
                Index::Gsi1,
                user_id,
                Some(&unread),
            )
            .await?
            .into_iter()
            .map(|item| item.key)
            .collect();
        if keys.is_empty() {
            return Ok(BulkResult::default());
        }

        let now = Utc::now();
        let outcomes = self
            .table
            .batch_update(
                &self.tables.notifications,
                &keys,
                &unread,
                &|item: &mut Item| mark_read_in(item, now),
            )
            .await?;
        let result = BulkResult::from_outcomes(outcomes);
        tracing::info!(
            user_id,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            "marked all notifications read"
        );
        Ok(result)
    }

    /// Archive every unarchived notification of `user_id` in one batched
    /// write.
    pub async fn archive_all(&self, user_id: &str) -> Result<BulkResult, NotificationError> {
        required(user_id, "userId")?;
        let user = user_id.to_string();
        let active = move |item: &Item| {
            item.str_attr("userId") == Some(user.as_str())
                && item.bool_attr("isArchived") == Some(false)
        };
        let keys: Vec<ItemKey> = self
            .drain(
                &self.tables.notifications,
                Index::Gsi1,
                user_id,
                Some(&active),
            )
            .await?
            .into_iter()
            .map(|item| item.key)
            .collect();
        if keys.is_empty() {
            return Ok(BulkResult::default());
        }

        let now = Utc::now();
        let outcomes = self
            .table
            .batch_update(
                &self.tables.notifications,
                &keys,
                &active,
                &|item: &mut Item| archive_in(item, now),
            )
            .await?;
        let result = BulkResult::from_outcomes(outcomes);
        tracing::info!(
            user_id,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            "archived all notifications"
        );
        Ok(result)
    }

    /// Create a notification and stamp it as sent.
    pub async fn send(
        &self,
        input: CreateNotificationInput,
    ) -> Result<Notification, NotificationError> {
        let created = self.create(input).await?;
        let now = Utc::now();
        self.modify(
            &self.tables.notifications,
            "Notification",
            &created.id,
            &|item: &mut Item| {
                rewrite::<Notification>(item, |n| {
                    n.sent_at = Some(now);
                    n.updated_at = now;
                })
            },
        )
        .await
    }

    pub async fn schedule(
        &self,
        input: CreateNotificationInput,
    ) -> Result<Notification, NotificationError> {
        if input.scheduled_at.is_none() {
            return Err(NotificationError::Validation(
                "scheduledAt is required".to_string(),
            ));
        }
        self.create(input).await
    }

    /// List notifications. The first of user, type, priority or read flag
    /// picks the index; the remaining filters apply to the results. With
    /// none of them set the table is scanned.
    pub async fn list(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Listing<Notification>, NotificationError> {
        let limit = self.page_size(filter.limit)?;
        let keyed = if let Some(user) = &filter.user_id {
            Some((Index::Gsi1, user.clone()))
        } else if let Some(type_id) = &filter.type_id {
            Some((Index::Gsi2, type_id.clone()))
        } else if let Some(priority) = &filter.priority_id {
            Some((Index::Gsi3, priority.clone()))
        } else {
            filter
                .is_read
                .map(|is_read| (Index::Gsi4, read_status_key(is_read).to_string()))
        };
        let matches = |item: &Item| {
            item.decode::<Notification>()
                .is_ok_and(|n| notification_matches(filter, &n))
        };

        let page = match keyed {
            Some((index, partition)) => {
                tracing::debug!(index = index.as_str(), %partition, "querying notifications");
                let mut request = QueryRequest::new(index, partition, limit);
                request.sort_from = filter.start_date.as_ref().map(sort_timestamp);
                request.sort_to = filter.end_date.as_ref().map(sort_timestamp);
                request.start_after = filter.next_token.clone();
                request.filter = Some(&matches);
                self.table
                    .query(&self.tables.notifications, &request)
                    .await?
            }
            None => {
                tracing::debug!("scanning notifications");
                self.table
                    .scan(
                        &self.tables.notifications,
                        &ScanRequest {
                            filter: Some(&matches),
                            limit,
                            start_after: filter.next_token.clone(),
                        },
                    )
                    .await?
            }
        };
        decode_page(page)
    }

    pub async fn list_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
        next_token: Option<String>,
    ) -> Result<Listing<Notification>, NotificationError> {
        required(user_id, "userId")?;
        self.list(&NotificationFilter {
            user_id: Some(user_id.to_string()),
            limit,
            next_token,
            ..Default::default()
        })
        .await
    }

    pub async fn list_unread(
        &self,
        user_id: &str,
        limit: Option<usize>,
        next_token: Option<String>,
    ) -> Result<Listing<Notification>, NotificationError> {
        required(user_id, "userId")?;
        self.list(&NotificationFilter {
            user_id: Some(user_id.to_string()),
            is_read: Some(false),
            limit,
            next_token,
            ..Default::default()
        })
        .await
    }

    pub async fn list_archived(
        &self,
        user_id: &str,
        limit: Option<usize>,
        next_token: Option<String>,
    ) -> Result<Listing<Notification>, NotificationError> {
        required(user_id, "userId")?;
        self.list(&NotificationFilter {
            user_id: Some(user_id.to_string()),
            is_archived: Some(true),
            limit,
            next_token,
            ..Default::default()
        })
        .await
    }

    /// Case-insensitive substring search over title and message.
    pub async fn search(
        &self,
        term: &str,
        user_id: Option<String>,
        limit: Option<usize>,
        next_token: Option<String>,
    ) -> Result<Listing<Notification>, NotificationError> {
        required(term, "searchTerm")?;
        self.list(&NotificationFilter {
            user_id,
            search_term: Some(term.to_string()),
            limit,
            next_token,
            ..Default::default()
        })
        .await
    }

    pub async fn stats(&self, user_id: &str) -> Result<NotificationStats, NotificationError> {
        required(user_id, "userId")?;
        let items = self
            .drain(&self.tables.notifications, Index::Gsi1, user_id, None)
            .await?;

        let mut stats = NotificationStats::default();
        let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_priority: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_channel: BTreeMap<String, u64> = BTreeMap::new();
        for item in &items {
            let n: Notification = item.decode()?;
            stats.total += 1;
            if n.is_read {
                stats.read += 1;
            } else {
                stats.unread += 1;
            }
            if n.is_archived {
                stats.archived += 1;
            }
            *by_type.entry(n.type_id).or_default() += 1;
            *by_priority.entry(n.priority_id).or_default() += 1;
            for channel in n.channels {
                *by_channel.entry(channel).or_default() += 1;
            }
        }
        stats.by_type = by_type
            .into_iter()
            .map(|(type_id, count)| TypeCount { type_id, count })
            .collect();
        stats.by_priority = by_priority
            .into_iter()
            .map(|(priority_id, count)| PriorityCount { priority_id, count })
            .collect();
        stats.by_channel = by_channel
            .into_iter()
            .map(|(channel, count)| ChannelCount { channel, count })
            .collect();
        Ok(stats)
    }

    // ==================== Types ====================

    pub async fn create_type(
        &self,
        input: CreateNotificationTypeInput,
    ) -> Result<NotificationType, NotificationError> {
        required(&input.name, "name")?;
        required(&input.category, "category")?;
        let now = Utc::now();
        let record = NotificationType {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            category: input.category,
            template: input.template,
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        let item = Item::new(ItemKey::single(&record.id))
            .with_index(Index::Gsi1, IndexKey::new(&record.category, &record.name))
            .with_ttl(self.ttl(now))
            .with_attrs(&record)?;
        self.table.put_item(&self.tables.types, item).await?;
        tracing::info!(type_id = %record.id, name = %record.name, "created notification type");
        Ok(record)
    }

    pub async fn get_type(&self, id: &str) -> Result<NotificationType, NotificationError> {
        self.fetch(&self.tables.types, "NotificationType", id).await
    }

    pub async fn update_type(
        &self,
        id: &str,
        input: UpdateNotificationTypeInput,
    ) -> Result<NotificationType, NotificationError> {
        if let Some(name) = &input.name {
            required(name, "name")?;
        }
        if let Some(category) = &input.category {
            required(category, "category")?;
        }
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<NotificationType>(item, |t| {
                if let Some(name) = &input.name {
                    t.name = name.clone();
                }
                if let Some(description) = &input.description {
                    t.description = description.clone();
                }
                if let Some(category) = &input.category {
                    t.category = category.clone();
                }
                if let Some(template) = &input.template {
                    t.template = template.clone();
                }
                if let Some(active) = input.is_active {
                    t.is_active = active;
                }
                t.updated_at = now;
            })?;
            if let Some(name) = &input.name {
                item.set_index_sort(Index::Gsi1, name.as_str());
            }
            if let Some(category) = &input.category {
                item.set_index_partition(Index::Gsi1, category.as_str());
            }
            Ok(())
        };
        self.modify(&self.tables.types, "NotificationType", id, &update)
            .await
    }

    pub async fn delete_type(&self, id: &str) -> Result<(), NotificationError> {
        self.remove(&self.tables.types, "NotificationType", id)
            .await
    }

    pub async fn activate_type(&self, id: &str) -> Result<NotificationType, NotificationError> {
        self.set_type_active(id, true).await
    }

    pub async fn deactivate_type(&self, id: &str) -> Result<NotificationType, NotificationError> {
        self.set_type_active(id, false).await
    }

    async fn set_type_active(
        &self,
        id: &str,
        active: bool,
    ) -> Result<NotificationType, NotificationError> {
        let now = Utc::now();
        self.modify(
            &self.tables.types,
            "NotificationType",
            id,
            &|item: &mut Item| {
                rewrite::<NotificationType>(item, |t| {
                    t.is_active = active;
                    t.updated_at = now;
                })
            },
        )
        .await
    }

    /// By category through GSI1 (name order), otherwise a filtered scan.
    pub async fn list_types(
        &self,
        filter: &TypeFilter,
    ) -> Result<Listing<NotificationType>, NotificationError> {
        let limit = self.page_size(filter.limit)?;
        let matches = |item: &Item| {
            item.decode::<NotificationType>().is_ok_and(|t| {
                filter.is_active.is_none_or(|v| t.is_active == v)
                    && filter.search_term.as_deref().is_none_or(|term| {
                        contains_term(&[Some(t.name.as_str()), t.description.as_deref()], term)
                    })
            })
        };
        let page = match &filter.category {
            Some(category) => {
                let mut request = QueryRequest::new(Index::Gsi1, category.as_str(), limit);
                request.descending = false;
                request.start_after = filter.next_token.clone();
                request.filter = Some(&matches);
                self.table.query(&self.tables.types, &request).await?
            }
            None => {
                self.table
                    .scan(
                        &self.tables.types,
                        &ScanRequest {
                            filter: Some(&matches),
                            limit,
                            start_after: filter.next_token.clone(),
                        },
                    )
                    .await?
            }
        };
        decode_page(page)
    }

    // ==================== Priorities ====================

    pub async fn create_priority(
        &self,
        input: CreateNotificationPriorityInput,
    ) -> Result<NotificationPriority, NotificationError> {
        required(&input.name, "name")?;
        let now = Utc::now();
        let record = NotificationPriority {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            level: input.level,
            color: input.color,
            created_at: now,
            updated_at: now,
        };
        let item = Item::new(ItemKey::single(&record.id))
            .with_index(
                Index::Gsi1,
                IndexKey::new(record.level.to_string(), &record.name),
            )
            .with_ttl(self.ttl(now))
            .with_attrs(&record)?;
        self.table.put_item(&self.tables.priorities, item).await?;
        tracing::info!(priority_id = %record.id, level = record.level, "created notification priority");
        Ok(record)
    }

    pub async fn get_priority(&self, id: &str) -> Result<NotificationPriority, NotificationError> {
        self.fetch(&self.tables.priorities, "NotificationPriority", id)
            .await
    }

    pub async fn update_priority(
        &self,
        id: &str,
        input: UpdateNotificationPriorityInput,
    ) -> Result<NotificationPriority, NotificationError> {
        if let Some(name) = &input.name {
            required(name, "name")?;
        }
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<NotificationPriority>(item, |p| {
                if let Some(name) = &input.name {
                    p.name = name.clone();
                }
                if let Some(level) = input.level {
                    p.level = level;
                }
                if let Some(color) = &input.color {
                    p.color = color.clone();
                }
                p.updated_at = now;
            })?;
            if let Some(name) = &input.name {
                item.set_index_sort(Index::Gsi1, name.as_str());
            }
            if let Some(level) = input.level {
                item.set_index_partition(Index::Gsi1, level.to_string());
            }
            Ok(())
        };
        self.modify(&self.tables.priorities, "NotificationPriority", id, &update)
            .await
    }

    pub async fn delete_priority(&self, id: &str) -> Result<(), NotificationError> {
        self.remove(&self.tables.priorities, "NotificationPriority", id)
            .await
    }

    pub async fn list_priorities(
        &self,
        filter: &PriorityFilter,
    ) -> Result<Listing<NotificationPriority>, NotificationError> {
        let limit = self.page_size(filter.limit)?;
        let matches = |item: &Item| {
            item.decode::<NotificationPriority>().is_ok_and(|p| {
                filter.search_term.as_deref().is_none_or(|term| {
                    contains_term(&[Some(p.name.as_str()), p.color.as_deref()], term)
                })
            })
        };
        let page = match filter.level {
            Some(level) => {
                let mut request = QueryRequest::new(Index::Gsi1, level.to_string(), limit);
                request.descending = false;
                request.start_after = filter.next_token.clone();
                request.filter = Some(&matches);
                self.table.query(&self.tables.priorities, &request).await?
            }
            None => {
                self.table
                    .scan(
                        &self.tables.priorities,
                        &ScanRequest {
                            filter: Some(&matches),
                            limit,
                            start_after: filter.next_token.clone(),
                        },
                    )
                    .await?
            }
        };
        decode_page(page)
    }

    // ==================== Channels ====================

    pub async fn create_channel(
        &self,
        input: CreateNotificationChannelInput,
    ) -> Result<NotificationChannel, NotificationError> {
        required(&input.name, "name")?;
        required(&input.channel_type, "type")?;
        let now = Utc::now();
        let record = NotificationChannel {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            channel_type: input.channel_type,
            is_enabled: input.is_enabled.unwrap_or(true),
            config: input.config,
            created_at: now,
            updated_at: now,
        };
        let item = Item::new(ItemKey::single(&record.id))
            .with_index(
                Index::Gsi1,
                IndexKey::new(&record.channel_type, &record.name),
            )
            .with_ttl(self.ttl(now))
            .with_attrs(&record)?;
        self.table.put_item(&self.tables.channels, item).await?;
        tracing::info!(channel_id = %record.id, channel_type = %record.channel_type, "created notification channel");
        Ok(record)
    }

    pub async fn get_channel(&self, id: &str) -> Result<NotificationChannel, NotificationError> {
        self.fetch(&self.tables.channels, "NotificationChannel", id)
            .await
    }

    pub async fn update_channel(
        &self,
        id: &str,
        input: UpdateNotificationChannelInput,
    ) -> Result<NotificationChannel, NotificationError> {
        if let Some(name) = &input.name {
            required(name, "name")?;
        }
        if let Some(channel_type) = &input.channel_type {
            required(channel_type, "type")?;
        }
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<NotificationChannel>(item, |c| {
                if let Some(name) = &input.name {
                    c.name = name.clone();
                }
                if let Some(channel_type) = &input.channel_type {
                    c.channel_type = channel_type.clone();
                }
                if let Some(enabled) = input.is_enabled {
                    c.is_enabled = enabled;
                }
                if let Some(config) = &input.config {
                    c.config = config.clone();
                }
                c.updated_at = now;
            })?;
            if let Some(name) = &input.name {
                item.set_index_sort(Index::Gsi1, name.as_str());
            }
            if let Some(channel_type) = &input.channel_type {
                item.set_index_partition(Index::Gsi1, channel_type.as_str());
            }
            Ok(())
        };
        self.modify(&self.tables.channels, "NotificationChannel", id, &update)
            .await
    }

    pub async fn delete_channel(&self, id: &str) -> Result<(), NotificationError> {
        self.remove(&self.tables.channels, "NotificationChannel", id)
            .await
    }

    pub async fn enable_channel(&self, id: &str) -> Result<NotificationChannel, NotificationError> {
        self.set_channel_enabled(id, true).await
    }

    pub async fn disable_channel(
        &self,
        id: &str,
    ) -> Result<NotificationChannel, NotificationError> {
        self.set_channel_enabled(id, false).await
    }

    async fn set_channel_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<NotificationChannel, NotificationError> {
        let now = Utc::now();
        self.modify(
            &self.tables.channels,
            "NotificationChannel",
            id,
            &|item: &mut Item| {
                rewrite::<NotificationChannel>(item, |c| {
                    c.is_enabled = enabled;
                    c.updated_at = now;
                })
            },
        )
        .await
    }

    pub async fn list_channels(
        &self,
        filter: &ChannelFilter,
    ) -> Result<Listing<NotificationChannel>, NotificationError> {
        let limit = self.page_size(filter.limit)?;
        let matches = |item: &Item| {
            item.decode::<NotificationChannel>().is_ok_and(|c| {
                filter.is_enabled.is_none_or(|v| c.is_enabled == v)
                    && filter.search_term.as_deref().is_none_or(|term| {
                        contains_term(&[Some(c.name.as_str()), Some(c.channel_type.as_str())], term)
                    })
            })
        };
        let page = match &filter.channel_type {
            Some(channel_type) => {
                let mut request = QueryRequest::new(Index::Gsi1, channel_type.as_str(), limit);
                request.descending = false;
                request.start_after = filter.next_token.clone();
                request.filter = Some(&matches);
                self.table.query(&self.tables.channels, &request).await?
            }
            None => {
                self.table
                    .scan(
                        &self.tables.channels,
                        &ScanRequest {
                            filter: Some(&matches),
                            limit,
                            start_after: filter.next_token.clone(),
                        },
                    )
                    .await?
            }
        };
        decode_page(page)
    }

    // ==================== Settings ====================

    pub async fn create_settings(
        &self,
        input: CreateSettingsInput,
    ) -> Result<NotificationSettings, NotificationError> {
        required(&input.user_id, "userId")?;
        let key = ItemKey::single(&input.user_id);
        if self
            .table
            .get_item(&self.tables.settings, &key)
            .await?
            .is_some()
        {
            return Err(NotificationError::Validation(
                "Notification settings already exist for this user".to_string(),
            ));
        }
        let now = Utc::now();
        let mut settings =
            NotificationSettings::defaults(Uuid::new_v4().to_string(), input.user_id, now);
        settings.apply(&input.settings);
        let item = Item::new(key)
            .with_ttl(self.ttl(now))
            .with_attrs(&settings)?;
        self.table.put_item(&self.tables.settings, item).await?;
        tracing::info!(user_id = %settings.user_id, "created notification settings");
        Ok(settings)
    }

    pub async fn get_settings(
        &self,
        user_id: &str,
    ) -> Result<NotificationSettings, NotificationError> {
        self.fetch(&self.tables.settings, "NotificationSettings", user_id)
            .await
    }

    pub async fn update_settings(
        &self,
        user_id: &str,
        patch: SettingsPatch,
    ) -> Result<NotificationSettings, NotificationError> {
        let now = Utc::now();
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<NotificationSettings>(item, |s| {
                s.apply(&patch);
                s.updated_at = now;
            })?;
            Ok(())
        };
        self.modify(
            &self.tables.settings,
            "NotificationSettings",
            user_id,
            &update,
        )
        .await
    }

    /// Update a user's settings, creating them with defaults first if the
    /// user has none. Refreshes the item's TTL.
    pub async fn update_settings_for_user(
        &self,
        user_id: &str,
        patch: SettingsPatch,
    ) -> Result<NotificationSettings, NotificationError> {
        required(user_id, "userId")?;
        let now = Utc::now();
        let ttl = self.ttl(now);
        let update = |item: &mut Item| -> Result<(), NotificationError> {
            rewrite::<NotificationSettings>(item, |s| {
                s.apply(&patch);
                s.updated_at = now;
            })?;
            item.ttl = Some(ttl);
            Ok(())
        };
        let key = ItemKey::single(user_id);
        if let Some(item) = self
            .table
            .update_item(&self.tables.settings, &key, &update)
            .await?
        {
            return item.decode();
        }

        let mut settings =
            NotificationSettings::defaults(Uuid::new_v4().to_string(), user_id.to_string(), now);
        settings.apply(&patch);
        let item = Item::new(key).with_ttl(ttl).with_attrs(&settings)?;
        self.table.put_item(&self.tables.settings, item).await?;
        tracing::info!(user_id, "created notification settings on update");
        Ok(settings)
    }

    pub async fn delete_settings(&self, user_id: &str) -> Result<(), NotificationError> {
        self.remove(&self.tables.settings, "NotificationSettings", user_id)
            .await
    }

    pub async fn purge_expired(&self) -> Result<u64, NotificationError> {
        let purged = self.table.purge_expired(Utc::now()).await?;
        tracing::info!(purged, "purged expired notification items");
        Ok(purged)
    }
}
