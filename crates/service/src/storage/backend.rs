use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use models::{ETag, EntityRecord};
use serde::{Deserialize, Serialize};

use crate::errors::StorageError;

/// Entity as the table service holds it: key/version envelope plus an
/// untyped property bag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    #[serde(flatten)]
    pub record: EntityRecord,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Message as the queue service holds it. `text` is the printable transport
/// form of the body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub sequence: u64,
    pub text: String,
    pub inserted_on: DateTime<Utc>,
    pub next_visible_on: DateTime<Utc>,
    #[serde(default)]
    pub pop_receipt: Option<String>,
    #[serde(default)]
    pub dequeue_count: u32,
}

/// Table service seam. Implementations own atomicity: the version compare in
/// `replace` and `delete` must happen in the same critical section as the
/// write, and every successful write assigns a new `ETag` and timestamp.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Returns `true` when the table was created by this call.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StorageError>;

    /// Lazily enumerate a table, optionally restricted to one partition.
    fn query<'a>(
        &'a self,
        table: &'a str,
        partition_key: Option<&'a str>,
    ) -> BoxStream<'a, Result<StoredEntity, StorageError>>;

    async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<StoredEntity>, StorageError>;

    /// Fails with `Conflict` when the key is taken.
    async fn insert(&self, table: &str, entity: StoredEntity) -> Result<StoredEntity, StorageError>;

    /// Replace the whole entity if the stored version satisfies `if_match`.
    async fn replace(&self, table: &str, entity: StoredEntity, if_match: &ETag) -> Result<StoredEntity, StorageError>;

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str, if_match: &ETag) -> Result<(), StorageError>;
}

/// Queue service seam with visibility-timeout leasing.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn create_queue_if_not_exists(&self, queue: &str) -> Result<bool, StorageError>;

    /// Visible and leased messages together.
    async fn approximate_count(&self, queue: &str) -> Result<u64, StorageError>;

    async fn send(&self, queue: &str, text: String) -> Result<StoredMessage, StorageError>;

    /// Oldest visible messages, without touching leases or receipts.
    async fn peek(&self, queue: &str, max: usize) -> Result<Vec<StoredMessage>, StorageError>;

    /// Lease up to `max` visible messages, oldest first, each with a fresh receipt.
    async fn receive(&self, queue: &str, max: usize, visibility_timeout: Duration) -> Result<Vec<StoredMessage>, StorageError>;

    /// `NotFound` when the message is gone or `pop_receipt` is no longer current.
    async fn delete(&self, queue: &str, id: &str, pop_receipt: &str) -> Result<(), StorageError>;
}
