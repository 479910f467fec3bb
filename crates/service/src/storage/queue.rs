use std::{borrow::Cow, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use configs::MAX_QUEUE_BATCH;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::errors::StorageError;
use crate::storage::backend::{QueueBackend, StoredMessage};

/// A leased message. `pop_receipt` is needed to delete it and stops working
/// once another receiver claims the message.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueMessage {
    pub id: String,
    pub pop_receipt: String,
    pub body: Vec<u8>,
    pub inserted_on: DateTime<Utc>,
    pub next_visible_on: DateTime<Utc>,
    pub dequeue_count: u32,
}

impl QueueMessage {
    pub fn body_text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.body) }
}

/// Body bytes of a message text: base64 when it decodes, the raw text otherwise.
pub fn decode_body(text: &str) -> Vec<u8> {
    STANDARD.decode(text).unwrap_or_else(|_| text.as_bytes().to_vec())
}

/// Client for one named queue.
#[derive(Clone)]
pub struct MessageQueue {
    backend: Arc<dyn QueueBackend>,
    name: String,
    ready: Arc<OnceCell<()>>,
}

impl MessageQueue {
    pub fn new(backend: Arc<dyn QueueBackend>, name: &str) -> Self {
        Self::with_ready(backend, name, Arc::new(OnceCell::new()))
    }

    pub(crate) fn with_ready(backend: Arc<dyn QueueBackend>, name: &str, ready: Arc<OnceCell<()>>) -> Self {
        Self { backend, name: name.to_string(), ready }
    }

    pub fn name(&self) -> &str { &self.name }

    pub async fn ensure_queue(&self) -> Result<(), StorageError> {
        self.ready
            .get_or_try_init(|| async {
                if self.backend.create_queue_if_not_exists(&self.name).await? {
                    info!(queue = %self.name, "queue_created");
                }
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    /// Approximate number of messages, leased ones included. `-1` when the
    /// queue cannot be reached.
    pub async fn count(&self) -> i64 {
        match self.approximate_count().await {
            Ok(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Err(e) => {
                error!(queue = %self.name, error = %e, "queue_count_failed");
                -1
            }
        }
    }

    pub async fn approximate_count(&self) -> Result<u64, StorageError> {
        self.ensure_queue().await?;
        self.backend.approximate_count(&self.name).await
    }

    /// Enqueue an opaque payload. Returns the message id.
    pub async fn send(&self, payload: &[u8]) -> Result<String, StorageError> {
        if payload.is_empty() {
            return Err(StorageError::InvalidArgument("message payload is empty".into()));
        }
        self.send_raw(STANDARD.encode(payload)).await
    }

    /// Enqueue `text` verbatim, without the base64 transport encoding.
    pub async fn send_text(&self, text: &str) -> Result<String, StorageError> {
        if text.is_empty() {
            return Err(StorageError::InvalidArgument("message text is empty".into()));
        }
        self.send_raw(text.to_string()).await
    }

    async fn send_raw(&self, text: String) -> Result<String, StorageError> {
        self.ensure_queue().await?;
        let message = self.backend.send(&self.name, text).await?;
        debug!(queue = %self.name, message_id = %message.id, "message_sent");
        Ok(message.id)
    }

    /// Bodies of up to `max` visible messages, oldest first. Nothing about the
    /// messages changes.
    pub async fn peek(&self, max: usize) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.peek_stored(max).await?.iter().map(|m| decode_body(&m.text)).collect())
    }

    /// Peeked bodies as text, JSON pretty-printed.
    pub async fn peek_display(&self, max: usize) -> Result<Vec<String>, StorageError> {
        Ok(self
            .peek(max)
            .await?
            .into_iter()
            .map(|body| {
                let text = String::from_utf8_lossy(&body).into_owned();
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(text),
                    Err(_) => text,
                }
            })
            .collect())
    }

    async fn peek_stored(&self, max: usize) -> Result<Vec<StoredMessage>, StorageError> {
        let max = max.min(MAX_QUEUE_BATCH);
        if max == 0 {
            return Ok(Vec::new());
        }
        self.ensure_queue().await?;
        self.backend.peek(&self.name, max).await
    }

    /// Lease up to `max` visible messages for `visibility_timeout`.
    pub async fn receive(&self, max: usize, visibility_timeout: Duration) -> Result<Vec<QueueMessage>, StorageError> {
        let max = max.min(MAX_QUEUE_BATCH);
        if max == 0 {
            return Ok(Vec::new());
        }
        self.ensure_queue().await?;
        let leased = self.backend.receive(&self.name, max, visibility_timeout).await?;
        if !leased.is_empty() {
            debug!(queue = %self.name, messages = leased.len(), "messages_received");
        }
        leased.into_iter().map(into_message).collect()
    }

    pub async fn delete_message(&self, id: &str, pop_receipt: &str) -> Result<(), StorageError> {
        if id.is_empty() || pop_receipt.is_empty() {
            return Err(StorageError::InvalidArgument("message id and pop receipt are required".into()));
        }
        self.ensure_queue().await?;
        self.backend.delete(&self.name, id, pop_receipt).await?;
        debug!(queue = %self.name, message_id = %id, "message_deleted");
        Ok(())
    }
}

fn into_message(stored: StoredMessage) -> Result<QueueMessage, StorageError> {
    let pop_receipt = stored
        .pop_receipt
        .ok_or_else(|| StorageError::Unavailable(format!("message {} was leased without a pop receipt", stored.id)))?;
    Ok(QueueMessage {
        body: decode_body(&stored.text),
        id: stored.id,
        pop_receipt,
        inserted_on: stored.inserted_on,
        next_visible_on: stored.next_visible_on,
        dequeue_count: stored.dequeue_count,
    })
}
