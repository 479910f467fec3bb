//! Queue-backed audit trail
//!
//! Producers call [`AuditLogger::log_operation`]; an [`AuditConsumer`] task
//! drains the queue independently and hands each message to a
//! [`MessageProcessor`].

pub mod consumer;
pub mod event;
pub mod logger;
pub mod processor;

pub use consumer::{AuditConsumer, AuditConsumerHandle, ConsumerSettings, ConsumerState};
pub use event::{AuditEvent, AuditOperation};
pub use logger::AuditLogger;
pub use processor::{FileShareMirror, MessageProcessor, ProcessorChain, TracingProcessor};
