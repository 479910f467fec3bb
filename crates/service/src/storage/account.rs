use std::{path::PathBuf, sync::Arc};

use configs::{FailurePolicy, StorageConfig};
use dashmap::DashMap;
use models::TableEntity;
use tokio::sync::OnceCell;
use tracing::info;

use crate::errors::StorageError;
use crate::storage::backend::{QueueBackend, TableBackend};
use crate::storage::file_share::FileShare;
use crate::storage::local::{LocalQueueBackend, LocalTableBackend};
use crate::storage::queue::MessageQueue;
use crate::storage::table::EntityStore;

/// Entry point to the table, queue and file services.
///
/// Construct once at startup and share by `Arc`. Handles for the same table
/// or queue share one creation latch, so creation runs once per name.
pub struct StorageAccount {
    tables: Arc<dyn TableBackend>,
    queues: Arc<dyn QueueBackend>,
    share_root: Option<PathBuf>,
    policy: FailurePolicy,
    tables_ready: DashMap<String, Arc<OnceCell<()>>>,
    queues_ready: DashMap<String, Arc<OnceCell<()>>>,
}

impl StorageAccount {
    /// Everything in memory; file shares are unavailable.
    pub fn in_memory() -> Self {
        Self::with_backends(Arc::new(LocalTableBackend::in_memory()), Arc::new(LocalQueueBackend::in_memory()))
    }

    /// JSON files under `root/tables` and `root/queues`, shares under `root/shares`.
    pub fn local<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let mut account = Self::with_backends(
            Arc::new(LocalTableBackend::open(root.join("tables"))),
            Arc::new(LocalQueueBackend::open(root.join("queues"))),
        );
        account.share_root = Some(root.join("shares"));
        account
    }

    pub fn with_backends(tables: Arc<dyn TableBackend>, queues: Arc<dyn QueueBackend>) -> Self {
        Self {
            tables,
            queues,
            share_root: None,
            policy: FailurePolicy::default(),
            tables_ready: DashMap::new(),
            queues_ready: DashMap::new(),
        }
    }

    pub fn from_config(cfg: &StorageConfig) -> Self {
        let account = match &cfg.data_dir {
            Some(dir) => Self::local(dir),
            None => Self::in_memory(),
        };
        info!(
            data_dir = ?cfg.data_dir,
            table = %cfg.table_name,
            queue = %cfg.queue_name,
            share = %cfg.share_name,
            list_policy = ?cfg.list_policy,
            "storage_account_opened"
        );
        account.with_policy(cfg.list_policy)
    }

    /// Failure policy handed to every entity store created afterwards.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy { self.policy }

    fn table_latch(&self, name: &str) -> Arc<OnceCell<()>> {
        Arc::clone(self.tables_ready.entry(name.to_string()).or_insert_with(Default::default).value())
    }

    pub fn table<T: TableEntity>(&self, name: &str) -> EntityStore<T> {
        EntityStore::with_ready(Arc::clone(&self.tables), name, self.policy, self.table_latch(name))
    }

    /// Create a table before any typed handle needs it. Shares the latch of
    /// [`StorageAccount::table`] handles, so they skip creation afterwards.
    pub async fn ensure_table(&self, name: &str) -> Result<(), StorageError> {
        self.table_latch(name)
            .get_or_try_init(|| async {
                if self.tables.create_table_if_not_exists(name).await? {
                    info!(table = %name, "table_created");
                }
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    pub fn queue(&self, name: &str) -> MessageQueue {
        let ready = Arc::clone(self.queues_ready.entry(name.to_string()).or_insert_with(Default::default).value());
        MessageQueue::with_ready(Arc::clone(&self.queues), name, ready)
    }

    /// `InvalidArgument` for accounts without a data directory.
    pub fn file_share(&self, name: &str) -> Result<FileShare, StorageError> {
        let root = self
            .share_root
            .as_ref()
            .ok_or_else(|| StorageError::InvalidArgument("file shares need a storage data directory".into()))?;
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StorageError::InvalidArgument(format!("invalid share name {name:?}")));
        }
        Ok(FileShare::new(root.join(name), name))
    }
}
