//! Storage clients for the service layer
//!
//! `backend` defines the table and queue service seams, `local` implements
//! them over file-backed JSON maps, and `table`/`queue`/`file_share` are the
//! typed clients handed out by [`StorageAccount`].

pub mod account;
pub mod backend;
pub mod file_share;
pub mod json_map_store;
pub mod local;
pub mod queue;
pub mod table;

pub use account::StorageAccount;
pub use file_share::FileShare;
pub use queue::{MessageQueue, QueueMessage};
pub use table::EntityStore;
