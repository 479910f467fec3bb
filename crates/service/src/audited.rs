//! Entity writes that leave an audit trail.

use models::{ETag, HasKey, TableEntity};

use crate::audit::{AuditLogger, AuditOperation};
use crate::errors::StorageError;
use crate::storage::EntityStore;

/// Wraps an [`EntityStore`] so every successful write is followed by an
/// audit event. Reads go straight to [`store`](Self::store).
#[derive(Clone)]
pub struct AuditedStore<T> {
    store: EntityStore<T>,
    audit: AuditLogger,
    entity_type: &'static str,
}

impl<T: TableEntity> AuditedStore<T> {
    pub fn new(store: EntityStore<T>, audit: AuditLogger) -> Self {
        Self { store, audit, entity_type: short_type_name::<T>() }
    }

    pub fn store(&self) -> &EntityStore<T> { &self.store }

    pub fn entity_type(&self) -> &'static str { self.entity_type }

    pub async fn create(&self, entity: T) -> Result<T, StorageError> {
        let saved = self.store.add(entity).await?;
        self.record(AuditOperation::Create, saved.row_key()).await;
        Ok(saved)
    }

    pub async fn update(&self, entity: T, expected: Option<&ETag>) -> Result<T, StorageError> {
        let saved = self.store.update(entity, expected).await?;
        self.record(AuditOperation::Update, saved.row_key()).await;
        Ok(saved)
    }

    pub async fn delete(&self, partition_key: &str, row_key: &str, expected: Option<&ETag>) -> Result<(), StorageError> {
        self.store.delete(partition_key, row_key, expected).await?;
        self.record(AuditOperation::Delete, row_key).await;
        Ok(())
    }

    async fn record(&self, operation: AuditOperation, row_key: &str) {
        let details = format!("{operation} {} {row_key}", self.entity_type);
        self.audit
            .log_operation(operation.as_str(), self.entity_type, row_key, Some(&details))
            .await;
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageAccount;
    use models::Order;

    #[test]
    fn type_name_drops_module_path() {
        assert_eq!(short_type_name::<Order>(), "Order");
    }

    #[tokio::test]
    async fn failed_writes_are_not_audited() -> Result<(), anyhow::Error> {
        let account = StorageAccount::in_memory();
        let queue = account.queue("audit-test");
        let orders = AuditedStore::new(account.table::<Order>("abcretail"), AuditLogger::new(queue.clone()));

        let placed = orders.create(Order::new("c-1", "p-1", 2)).await?;
        assert!(orders.create(placed.clone()).await.is_err());
        assert!(orders.delete("ORDER", "missing", None).await.is_err());
        assert_eq!(queue.count().await, 1);

        orders.delete("ORDER", placed.row_key(), None).await?;
        assert_eq!(queue.count().await, 2);
        Ok(())
    }
}
