use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::audit::event::AuditEvent;
use crate::errors::StorageError;
use crate::storage::{FileShare, QueueMessage};

/// Work done for each received message before it is deleted. An error leaves
/// the message on the queue for redelivery.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: &QueueMessage) -> Result<(), StorageError>;
}

/// Writes each message to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProcessor;

#[async_trait]
impl MessageProcessor for TracingProcessor {
    async fn process(&self, message: &QueueMessage) -> Result<(), StorageError> {
        match serde_json::from_slice::<AuditEvent>(&message.body) {
            Ok(event) => info!(
                message_id = %message.id,
                dequeue_count = message.dequeue_count,
                operation = %event.operation,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                details = ?event.details,
                "audit_event_processed"
            ),
            Err(_) => info!(
                message_id = %message.id,
                dequeue_count = message.dequeue_count,
                body = %message.body_text(),
                "queue_message_processed"
            ),
        }
        Ok(())
    }
}

/// Copies message text into a file share, one file per message.
#[derive(Clone, Debug)]
pub struct FileShareMirror {
    share: FileShare,
    queue_name: String,
}

impl FileShareMirror {
    pub fn new(share: FileShare, queue_name: &str) -> Self {
        Self { share, queue_name: queue_name.to_string() }
    }
}

#[async_trait]
impl MessageProcessor for FileShareMirror {
    async fn process(&self, message: &QueueMessage) -> Result<(), StorageError> {
        self.share.save_queue_message(&message.body_text(), &self.queue_name).await?;
        Ok(())
    }
}

/// Runs processors in order, stopping at the first failure.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn MessageProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn len(&self) -> usize { self.processors.len() }

    pub fn is_empty(&self) -> bool { self.processors.is_empty() }
}

#[async_trait]
impl MessageProcessor for ProcessorChain {
    async fn process(&self, message: &QueueMessage) -> Result<(), StorageError> {
        for processor in &self.processors {
            processor.process(message).await?;
        }
        Ok(())
    }
}
