//! Local stand-ins for the hosted table and queue services.
//!
//! Each table and queue is a [`JsonMapStore`], kept in memory or persisted
//! as `<root>/<name>.json`.
//! Handles are opened lazily and cached for the life of the backend.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use models::ETag;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use crate::errors::StorageError;
use crate::storage::backend::{QueueBackend, StoredEntity, StoredMessage, TableBackend};
use crate::storage::json_map_store::JsonMapStore;

/// Entities returned per continuation step of a query.
const QUERY_PAGE_SIZE: usize = 100;

type TableMap = JsonMapStore<String, StoredEntity>;
type QueueMap = JsonMapStore<String, StoredMessage>;

fn entity_key(partition_key: &str, row_key: &str) -> String {
    format!("{partition_key}\u{1f}{row_key}")
}

async fn open_map<V>(root: &Option<PathBuf>, name: &str) -> Result<(Arc<JsonMapStore<String, V>>, bool), StorageError>
where
    V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync,
{
    match root {
        None => Ok((JsonMapStore::in_memory(), true)),
        Some(root) => {
            let path = root.join(format!("{name}.json"));
            let existed = tokio::fs::try_exists(&path)
                .await
                .map_err(|e| StorageError::io(&format!("stat {}", path.display()), e))?;
            Ok((JsonMapStore::open(path).await?, !existed))
        }
    }
}

/// Maps opened on first use. Concurrent creators of one name share a single
/// opener; a failed open leaves the slot empty for the next attempt.
struct MapRegistry<V> {
    root: Option<PathBuf>,
    maps: DashMap<String, Arc<OnceCell<Arc<JsonMapStore<String, V>>>>>,
}

impl<V> MapRegistry<V>
where
    V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync,
{
    fn new(root: Option<PathBuf>) -> Self {
        Self { root, maps: DashMap::new() }
    }

    /// `true` only for the caller whose open created the map.
    async fn create(&self, name: &str) -> Result<bool, StorageError> {
        let cell = Arc::clone(self.maps.entry(name.to_string()).or_insert_with(Default::default).value());
        let created_here = AtomicBool::new(false);
        cell.get_or_try_init(|| async {
            let (map, created) = open_map(&self.root, name).await?;
            created_here.store(created, Ordering::Relaxed);
            Ok::<_, StorageError>(map)
        })
        .await?;
        Ok(created_here.load(Ordering::Relaxed))
    }

    fn get(&self, kind: &str, name: &str) -> Result<Arc<JsonMapStore<String, V>>, StorageError> {
        self.maps
            .get(name)
            .and_then(|cell| cell.value().get().cloned())
            .ok_or_else(|| StorageError::not_found(&format!("{kind} {name}")))
    }
}

pub struct LocalTableBackend {
    tables: MapRegistry<StoredEntity>,
}

impl Default for LocalTableBackend {
    fn default() -> Self { Self::in_memory() }
}

impl LocalTableBackend {
    pub fn in_memory() -> Self {
        Self { tables: MapRegistry::new(None) }
    }

    pub fn open<P: Into<PathBuf>>(root: P) -> Self {
        Self { tables: MapRegistry::new(Some(root.into())) }
    }

    fn table(&self, name: &str) -> Result<Arc<TableMap>, StorageError> {
        self.tables.get("table", name)
    }
}

#[async_trait]
impl TableBackend for LocalTableBackend {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StorageError> {
        self.tables.create(table).await
    }

    fn query<'a>(
        &'a self,
        table: &'a str,
        partition_key: Option<&'a str>,
    ) -> BoxStream<'a, Result<StoredEntity, StorageError>> {
        stream::unfold(Some(None::<String>), move |cursor| async move {
            let Some(after) = cursor else { return None };
            let store = match self.table(table) {
                Ok(store) => store,
                Err(e) => return Some((vec![Err(e)], None)),
            };
            let page = store
                .scan_after(after.as_ref(), QUERY_PAGE_SIZE, |e| {
                    partition_key.map_or(true, |pk| e.record.partition_key == pk)
                })
                .await;
            let next = if page.len() == QUERY_PAGE_SIZE { page.last().map(|(k, _)| Some(k.clone())) } else { None };
            debug!(%table, entities = page.len(), more = next.is_some(), "query_page");
            let items: Vec<Result<StoredEntity, StorageError>> = page.into_iter().map(|(_, v)| Ok(v)).collect();
            Some((items, next))
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<StoredEntity>, StorageError> {
        Ok(self.table(table)?.get(&entity_key(partition_key, row_key)).await)
    }

    async fn insert(&self, table: &str, mut entity: StoredEntity) -> Result<StoredEntity, StorageError> {
        let store = self.table(table)?;
        let key = entity_key(&entity.record.partition_key, &entity.record.row_key);
        store
            .update_map(|map| {
                if map.contains_key(&key) {
                    return Err(StorageError::Conflict(format!(
                        "{}/{} in table {table}",
                        entity.record.partition_key, entity.record.row_key
                    )));
                }
                let now = Utc::now();
                entity.record.timestamp = Some(now);
                entity.record.etag = Some(ETag::generate(now));
                map.insert(key, entity.clone());
                Ok(entity)
            })
            .await
    }

    async fn replace(&self, table: &str, mut entity: StoredEntity, if_match: &ETag) -> Result<StoredEntity, StorageError> {
        let store = self.table(table)?;
        let key = entity_key(&entity.record.partition_key, &entity.record.row_key);
        store
            .update_map(|map| {
                let current = map.get(&key).ok_or_else(|| {
                    StorageError::not_found(&format!("{}/{}", entity.record.partition_key, entity.record.row_key))
                })?;
                check_version(if_match, current)?;
                let now = Utc::now();
                entity.record.timestamp = Some(now);
                entity.record.etag = Some(ETag::generate(now));
                map.insert(key, entity.clone());
                Ok(entity)
            })
            .await
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str, if_match: &ETag) -> Result<(), StorageError> {
        let store = self.table(table)?;
        let key = entity_key(partition_key, row_key);
        store
            .update_map(|map| {
                let current = map
                    .get(&key)
                    .ok_or_else(|| StorageError::not_found(&format!("{partition_key}/{row_key}")))?;
                check_version(if_match, current)?;
                map.remove(&key);
                Ok(())
            })
            .await
    }
}

fn check_version(if_match: &ETag, current: &StoredEntity) -> Result<(), StorageError> {
    let stored = current.record.etag.clone().unwrap_or_else(|| ETag::new(""));
    if if_match.matches(&stored) {
        Ok(())
    } else {
        Err(StorageError::version_conflict(if_match, &stored))
    }
}

pub struct LocalQueueBackend {
    queues: MapRegistry<StoredMessage>,
}

impl Default for LocalQueueBackend {
    fn default() -> Self { Self::in_memory() }
}

impl LocalQueueBackend {
    pub fn in_memory() -> Self {
        Self { queues: MapRegistry::new(None) }
    }

    pub fn open<P: Into<PathBuf>>(root: P) -> Self {
        Self { queues: MapRegistry::new(Some(root.into())) }
    }

    fn queue(&self, name: &str) -> Result<Arc<QueueMap>, StorageError> {
        self.queues.get("queue", name)
    }
}

#[async_trait]
impl QueueBackend for LocalQueueBackend {
    async fn create_queue_if_not_exists(&self, queue: &str) -> Result<bool, StorageError> {
        self.queues.create(queue).await
    }

    async fn approximate_count(&self, queue: &str) -> Result<u64, StorageError> {
        Ok(self.queue(queue)?.len().await as u64)
    }

    async fn send(&self, queue: &str, text: String) -> Result<StoredMessage, StorageError> {
        let store = self.queue(queue)?;
        store
            .update_map(|map| {
                let sequence = map.values().map(|m| m.sequence).max().map_or(0, |s| s + 1);
                let now = Utc::now();
                let message = StoredMessage {
                    id: Uuid::new_v4().to_string(),
                    sequence,
                    text,
                    inserted_on: now,
                    next_visible_on: now,
                    pop_receipt: None,
                    dequeue_count: 0,
                };
                map.insert(message.id.clone(), message.clone());
                Ok(message)
            })
            .await
    }

    async fn peek(&self, queue: &str, max: usize) -> Result<Vec<StoredMessage>, StorageError> {
        let now = Utc::now();
        let mut visible = self.queue(queue)?.values_where(|m| m.next_visible_on <= now).await;
        visible.sort_by_key(|m| m.sequence);
        visible.truncate(max);
        Ok(visible)
    }

    async fn receive(&self, queue: &str, max: usize, visibility_timeout: Duration) -> Result<Vec<StoredMessage>, StorageError> {
        let lease = chrono::Duration::from_std(visibility_timeout)
            .map_err(|_| StorageError::InvalidArgument("visibility timeout out of range".into()))?;
        let store = self.queue(queue)?;
        store
            .update_map(|map| {
                let now = Utc::now();
                let mut ids: Vec<(u64, String)> = map
                    .values()
                    .filter(|m| m.next_visible_on <= now)
                    .map(|m| (m.sequence, m.id.clone()))
                    .collect();
                ids.sort();
                ids.truncate(max);

                let mut claimed = Vec::with_capacity(ids.len());
                for (_, id) in ids {
                    if let Some(m) = map.get_mut(&id) {
                        m.pop_receipt = Some(Uuid::new_v4().simple().to_string());
                        m.next_visible_on = now + lease;
                        m.dequeue_count += 1;
                        claimed.push(m.clone());
                    }
                }
                Ok(claimed)
            })
            .await
    }

    async fn delete(&self, queue: &str, id: &str, pop_receipt: &str) -> Result<(), StorageError> {
        let store = self.queue(queue)?;
        store
            .update_map(|map| {
                let current = map.get(id).ok_or_else(|| StorageError::not_found(&format!("message {id}")))?;
                if current.pop_receipt.as_deref() != Some(pop_receipt) {
                    return Err(StorageError::NotFound(format!("pop receipt for message {id} is no longer valid")));
                }
                map.remove(id);
                Ok(())
            })
            .await
    }
}
