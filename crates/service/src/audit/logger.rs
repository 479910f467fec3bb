use tracing::{error, info};

use crate::audit::event::AuditEvent;
use crate::errors::StorageError;
use crate::observability::{AUDIT_ENQUEUE_FAILURES_TOTAL, AUDIT_EVENTS_ENQUEUED_TOTAL};
use crate::storage::MessageQueue;

/// Producer side of the audit trail.
#[derive(Clone)]
pub struct AuditLogger {
    queue: MessageQueue,
}

impl AuditLogger {
    pub fn new(queue: MessageQueue) -> Self { Self { queue } }

    pub fn queue(&self) -> &MessageQueue { &self.queue }

    /// Enqueue an audit event. Failures are logged and counted, never returned,
    /// so auditing cannot fail the operation being audited.
    pub async fn log_operation(&self, operation: &str, entity_type: &str, entity_id: &str, details: Option<&str>) {
        let event = AuditEvent::new(operation, entity_type, entity_id, details);
        match self.enqueue(&event).await {
            Ok(message_id) => {
                AUDIT_EVENTS_ENQUEUED_TOTAL.inc();
                info!(queue = %self.queue.name(), %operation, %entity_type, %entity_id, %message_id, "operation_logged");
            }
            Err(e) => {
                AUDIT_ENQUEUE_FAILURES_TOTAL.inc();
                error!(queue = %self.queue.name(), %operation, %entity_type, %entity_id, error = %e, "operation_log_failed");
            }
        }
    }

    async fn enqueue(&self, event: &AuditEvent) -> Result<String, StorageError> {
        let payload = serde_json::to_vec(event)?;
        self.queue.send(&payload).await
    }
}
