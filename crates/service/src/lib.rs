//! Storage layer for the retail system.
//! - `storage`: storage account, typed entity store with optimistic
//!   concurrency, visibility-timeout message queue, file share.
//! - `audit`: queue-backed audit producer and background consumer.
//! - `audited`: entity writes that emit audit events.

pub mod errors;
pub mod observability;
pub mod storage;
pub mod audit;
pub mod audited;

pub use errors::StorageError;
