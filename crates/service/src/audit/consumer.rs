use std::{sync::Arc, time::Duration};

use configs::{AuditConfig, MAX_QUEUE_BATCH};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::processor::MessageProcessor;
use crate::observability::{AUDIT_MESSAGES_PROCESSED_TOTAL, AUDIT_PROCESSING_FAILURES_TOTAL, QUEUE_RECEIVE_ERRORS_TOTAL};
use crate::storage::{MessageQueue, QueueMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Receiving,
    Processing,
    Deleting,
    BackingOff,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub backoff: Duration,
    pub poll_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            backoff: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&AuditConfig> for ConsumerSettings {
    fn from(cfg: &AuditConfig) -> Self {
        Self {
            batch_size: cfg.batch_size.clamp(1, MAX_QUEUE_BATCH),
            visibility_timeout: cfg.visibility_timeout(),
            backoff: cfg.backoff(),
            poll_interval: cfg.poll_interval(),
        }
    }
}

/// Background loop that drains the audit queue.
///
/// Each received message goes through the processor and is deleted only when
/// processing succeeds; anything else reappears after the visibility timeout.
pub struct AuditConsumer {
    queue: MessageQueue,
    processor: Arc<dyn MessageProcessor>,
    settings: ConsumerSettings,
    state: watch::Sender<ConsumerState>,
}

impl AuditConsumer {
    pub fn new(queue: MessageQueue, processor: Arc<dyn MessageProcessor>, settings: ConsumerSettings) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self { queue, processor, settings, state }
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> { self.state.subscribe() }

    /// Run on a new task with its own cancellation token.
    pub fn spawn(self) -> AuditConsumerHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    /// Run on a new task, stopping when `token` is cancelled.
    pub fn spawn_with_token(self, token: CancellationToken) -> AuditConsumerHandle {
        let state = self.state();
        let task = tokio::spawn(self.run(token.clone()));
        AuditConsumerHandle { token, task, state }
    }

    /// Loop until `cancel` fires. A batch already received is finished first.
    pub async fn run(self, cancel: CancellationToken) {
        info!(queue = %self.queue.name(), batch_size = self.settings.batch_size, "audit_consumer_started");
        loop {
            self.set_state(ConsumerState::Idle);
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(ConsumerState::Receiving);
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.queue.receive(self.settings.batch_size, self.settings.visibility_timeout) => r,
            };

            match received {
                Ok(batch) if batch.is_empty() => {
                    self.set_state(ConsumerState::Idle);
                    if !pause(&cancel, self.settings.poll_interval).await {
                        break;
                    }
                }
                Ok(batch) => self.process_batch(batch).await,
                Err(e) => {
                    QUEUE_RECEIVE_ERRORS_TOTAL.inc();
                    error!(queue = %self.queue.name(), error = %e, backoff_secs = self.settings.backoff.as_secs_f64(), "queue_receive_failed");
                    self.set_state(ConsumerState::BackingOff);
                    if !pause(&cancel, self.settings.backoff).await {
                        break;
                    }
                }
            }
        }
        self.set_state(ConsumerState::Stopped);
        info!(queue = %self.queue.name(), "audit_consumer_stopped");
    }

    async fn process_batch(&self, batch: Vec<QueueMessage>) {
        debug!(queue = %self.queue.name(), messages = batch.len(), "audit_batch_received");
        for message in batch {
            self.set_state(ConsumerState::Processing);
            if let Err(e) = self.processor.process(&message).await {
                AUDIT_PROCESSING_FAILURES_TOTAL.inc();
                error!(
                    queue = %self.queue.name(),
                    message_id = %message.id,
                    dequeue_count = message.dequeue_count,
                    error = %e,
                    "audit_message_failed"
                );
                continue;
            }

            self.set_state(ConsumerState::Deleting);
            match self.queue.delete_message(&message.id, &message.pop_receipt).await {
                Ok(()) => AUDIT_MESSAGES_PROCESSED_TOTAL.inc(),
                // Lease expired and someone else holds the message now.
                Err(e) => warn!(queue = %self.queue.name(), message_id = %message.id, error = %e, "audit_message_delete_failed"),
            }
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}

/// `false` when cancelled before `duration` elapsed.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct AuditConsumerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    state: watch::Receiver<ConsumerState>,
}

impl AuditConsumerHandle {
    pub fn token(&self) -> &CancellationToken { &self.token }

    pub fn state(&self) -> ConsumerState { *self.state.borrow() }

    pub fn is_finished(&self) -> bool { self.task.is_finished() }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "audit_consumer_join_failed");
        }
    }
}
