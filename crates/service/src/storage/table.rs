use std::{marker::PhantomData, sync::Arc};

use configs::FailurePolicy;
use futures::StreamExt;
use models::{ETag, EntityRecord, HasKey, HasVersion, TableEntity};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::StorageError;
use crate::observability::VERSION_CONFLICTS_TOTAL;
use crate::storage::backend::{StoredEntity, TableBackend};

const RECORD_FIELDS: [&str; 4] = ["PartitionKey", "RowKey", "Timestamp", "ETag"];

/// Typed view over one table of a storage account.
///
/// The store holds no locks of its own. Version checks are delegated to the
/// backend, which compares and writes in one step.
pub struct EntityStore<T> {
    backend: Arc<dyn TableBackend>,
    table: String,
    ready: Arc<OnceCell<()>>,
    policy: FailurePolicy,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            table: self.table.clone(),
            ready: Arc::clone(&self.ready),
            policy: self.policy,
            _entity: PhantomData,
        }
    }
}

impl<T: TableEntity> EntityStore<T> {
    pub fn new(backend: Arc<dyn TableBackend>, table: &str, policy: FailurePolicy) -> Self {
        Self::with_ready(backend, table, policy, Arc::new(OnceCell::new()))
    }

    /// Store sharing its creation latch with other handles on the same table.
    pub(crate) fn with_ready(
        backend: Arc<dyn TableBackend>,
        table: &str,
        policy: FailurePolicy,
        ready: Arc<OnceCell<()>>,
    ) -> Self {
        Self { backend, table: table.to_string(), ready, policy, _entity: PhantomData }
    }

    pub fn table_name(&self) -> &str { &self.table }

    pub fn policy(&self) -> FailurePolicy { self.policy }

    /// Create the table if needed. Runs once per handle; later calls are free.
    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        self.ready
            .get_or_try_init(|| async {
                if self.backend.create_table_if_not_exists(&self.table).await? {
                    info!(table = %self.table, "table_created");
                }
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    /// All entities, optionally restricted to one partition.
    ///
    /// Under [`FailurePolicy::BestEffort`] a backend failure is logged and
    /// whatever was read before it is returned.
    pub async fn list(&self, partition_key: Option<&str>) -> Result<Vec<T>, StorageError> {
        self.list_where(partition_key, |_| true).await
    }

    /// Like [`list`](Self::list) but always surfaces backend failures.
    pub async fn try_list(&self, partition_key: Option<&str>) -> Result<Vec<T>, StorageError> {
        let (items, failure) = self.collect(partition_key, |_: &T| true).await;
        match failure {
            Some(e) => Err(e),
            None => Ok(items),
        }
    }

    /// Entities for which `predicate` holds, honoring the store's failure policy.
    pub async fn list_where<F>(&self, partition_key: Option<&str>, predicate: F) -> Result<Vec<T>, StorageError>
    where
        F: Fn(&T) -> bool,
    {
        let (items, failure) = self.collect(partition_key, predicate).await;
        match (failure, self.policy) {
            (None, _) => Ok(items),
            (Some(e), FailurePolicy::Strict) => Err(e),
            (Some(e), FailurePolicy::BestEffort) => {
                error!(table = %self.table, partition_key = ?partition_key, returned = items.len(), error = %e, "list_failed");
                Ok(items)
            }
        }
    }

    async fn collect<F>(&self, partition_key: Option<&str>, predicate: F) -> (Vec<T>, Option<StorageError>)
    where
        F: Fn(&T) -> bool,
    {
        let mut items = Vec::new();
        if let Err(e) = self.ensure_table().await {
            return (items, Some(e));
        }
        let mut rows = self.backend.query(&self.table, partition_key);
        while let Some(row) = rows.next().await {
            match row {
                Ok(stored) => {
                    let (pk, rk) = (stored.record.partition_key.clone(), stored.record.row_key.clone());
                    match from_stored::<T>(stored) {
                        Ok(entity) if predicate(&entity) => items.push(entity),
                        Ok(_) => {}
                        // Tables may hold several entity kinds.
                        Err(e) => debug!(table = %self.table, partition_key = %pk, row_key = %rk, error = %e, "entity_skipped"),
                    }
                }
                Err(e) => return (items, Some(e)),
            }
        }
        (items, None)
    }

    /// `Ok(None)` when no entity has this key.
    pub async fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<T>, StorageError> {
        check_keys(partition_key, row_key)?;
        self.ensure_table().await?;
        match self.backend.get(&self.table, partition_key, row_key).await {
            Ok(Some(stored)) => Ok(Some(from_stored(stored)?)),
            Ok(None) | Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Insert a new entity and return it as stored, with its first version.
    ///
    /// Empty keys are filled in: the partition with `T::PARTITION` and the row
    /// key with a fresh UUID.
    pub async fn add(&self, mut entity: T) -> Result<T, StorageError> {
        entity.validate()?;
        if entity.partition_key().is_empty() {
            entity.set_partition_key(T::PARTITION.to_string());
        }
        if entity.row_key().is_empty() {
            entity.set_row_key(Uuid::new_v4().to_string());
        }
        check_keys(entity.partition_key(), entity.row_key())?;
        entity.set_etag(None);
        entity.set_timestamp(None);

        self.ensure_table().await?;
        let stored = self.backend.insert(&self.table, to_stored(&entity)?).await?;
        info!(table = %self.table, partition_key = %stored.record.partition_key, row_key = %stored.record.row_key, "entity_added");
        from_stored(stored)
    }

    /// Replace an existing entity if its stored version satisfies `expected`.
    ///
    /// `None` checks against the version the entity carries; pass
    /// [`ETag::any`] to overwrite unconditionally.
    pub async fn update(&self, entity: T, expected: Option<&ETag>) -> Result<T, StorageError> {
        entity.validate()?;
        check_keys(entity.partition_key(), entity.row_key())?;
        let if_match = match expected {
            Some(etag) => etag.clone(),
            None => entity.etag().cloned().ok_or_else(|| {
                StorageError::InvalidArgument("entity carries no version; pass an expected ETag".into())
            })?,
        };

        self.ensure_table().await?;
        let result = self.backend.replace(&self.table, to_stored(&entity)?, &if_match).await;
        let stored = self.observe_write(result, entity.partition_key(), entity.row_key())?;
        info!(table = %self.table, partition_key = %stored.record.partition_key, row_key = %stored.record.row_key, "entity_updated");
        from_stored(stored)
    }

    /// Unconditional update.
    pub async fn replace(&self, entity: T) -> Result<T, StorageError> {
        self.update(entity, Some(&ETag::any())).await
    }

    /// Remove an entity. `None` deletes whatever version is stored.
    pub async fn delete(&self, partition_key: &str, row_key: &str, expected: Option<&ETag>) -> Result<(), StorageError> {
        check_keys(partition_key, row_key)?;
        let if_match = expected.cloned().unwrap_or_else(ETag::any);

        self.ensure_table().await?;
        let result = self.backend.delete(&self.table, partition_key, row_key, &if_match).await;
        self.observe_write(result, partition_key, row_key)?;
        info!(table = %self.table, partition_key = %partition_key, row_key = %row_key, "entity_deleted");
        Ok(())
    }

    fn observe_write<R>(&self, result: Result<R, StorageError>, partition_key: &str, row_key: &str) -> Result<R, StorageError> {
        if let Err(e @ StorageError::VersionConflict { .. }) = &result {
            VERSION_CONFLICTS_TOTAL.inc();
            warn!(table = %self.table, partition_key = %partition_key, row_key = %row_key, error = %e, "version_conflict");
        }
        result
    }
}

/// Keys must be non-empty and free of the characters the hosted table
/// service rejects.
fn check_keys(partition_key: &str, row_key: &str) -> Result<(), StorageError> {
    for (name, value) in [("partition key", partition_key), ("row key", row_key)] {
        if value.is_empty() {
            return Err(StorageError::InvalidArgument(format!("{name} is required")));
        }
        if value.chars().any(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control()) {
            return Err(StorageError::InvalidArgument(format!("{name} contains a disallowed character: {value:?}")));
        }
    }
    Ok(())
}

fn to_stored<T: TableEntity>(entity: &T) -> Result<StoredEntity, StorageError> {
    let mut properties = match serde_json::to_value(entity)? {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::Serialization(format!("entity must serialize to an object, got {other}")));
        }
    };
    for field in RECORD_FIELDS {
        properties.remove(field);
    }
    let record = EntityRecord {
        partition_key: entity.partition_key().to_string(),
        row_key: entity.row_key().to_string(),
        timestamp: entity.timestamp(),
        etag: entity.etag().cloned(),
    };
    Ok(StoredEntity { record, properties })
}

fn from_stored<T: TableEntity>(stored: StoredEntity) -> Result<T, StorageError> {
    let mut object = stored.properties;
    if let Value::Object(envelope) = serde_json::to_value(&stored.record)? {
        object.extend(envelope);
    }
    Ok(serde_json::from_value(Value::Object(object))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::LocalTableBackend;
    use models::{Customer, Product};

    fn store<T: TableEntity>() -> EntityStore<T> {
        EntityStore::new(Arc::new(LocalTableBackend::in_memory()), "abcretail", FailurePolicy::BestEffort)
    }

    #[test]
    fn stored_form_splits_envelope_from_properties() -> Result<(), anyhow::Error> {
        let mut customer = Customer::new("Ann", "Lee", "ann@example.com");
        customer.record.etag = Some(ETag::new("W/\"1\""));
        let stored = to_stored(&customer)?;
        assert_eq!(stored.record.partition_key, "CUSTOMER");
        assert_eq!(stored.properties["FirstName"], "Ann");
        assert!(!stored.properties.contains_key("PartitionKey"));
        assert!(!stored.properties.contains_key("ETag"));

        let back: Customer = from_stored(stored)?;
        assert_eq!(back, customer);
        Ok(())
    }

    #[tokio::test]
    async fn add_fills_missing_keys() -> Result<(), anyhow::Error> {
        let store = store::<Customer>();
        let mut customer = Customer::new("Ann", "Lee", "ann@example.com");
        customer.record.partition_key.clear();
        customer.record.row_key.clear();

        let saved = store.add(customer).await?;
        assert_eq!(saved.record.partition_key, "CUSTOMER");
        assert!(Uuid::parse_str(&saved.record.row_key).is_ok());
        assert!(saved.record.etag.is_some());
        assert!(saved.record.timestamp.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_entities_never_reach_the_backend() -> Result<(), anyhow::Error> {
        let store = store::<Customer>();
        let bad = Customer::new("", "Lee", "ann@example.com");
        assert!(matches!(store.add(bad).await, Err(StorageError::InvalidArgument(_))));
        assert!(store.try_list(None).await?.is_empty());

        let mut slashed = Customer::new("Ann", "Lee", "ann@example.com");
        slashed.record.row_key = "a/b".into();
        assert!(matches!(store.add(slashed).await, Err(StorageError::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn update_without_version_is_rejected() -> Result<(), anyhow::Error> {
        let store = store::<Customer>();
        let saved = store.add(Customer::new("Ann", "Lee", "ann@example.com")).await?;
        let mut unversioned = saved.clone();
        unversioned.record.etag = None;
        assert!(matches!(store.update(unversioned, None).await, Err(StorageError::InvalidArgument(_))));

        let renamed = Customer { first_name: "Anne".into(), ..saved };
        let updated = store.update(renamed, None).await?;
        assert_eq!(updated.first_name, "Anne");
        Ok(())
    }

    #[tokio::test]
    async fn list_skips_other_entity_kinds() -> Result<(), anyhow::Error> {
        let backend: Arc<dyn TableBackend> = Arc::new(LocalTableBackend::in_memory());
        let customers = EntityStore::<Customer>::new(Arc::clone(&backend), "abcretail", FailurePolicy::Strict);
        let products = EntityStore::<Product>::new(backend, "abcretail", FailurePolicy::Strict);

        customers.add(Customer::new("Ann", "Lee", "ann@example.com")).await?;
        products
            .add(Product {
                record: EntityRecord::new(Product::PARTITION),
                product_name: "Trail Shoe".into(),
                price: 79.5,
                stock_quantity: 4,
                image_url: None,
                brand: "Peak".into(),
                colour: "Red".into(),
                size: "42".into(),
            })
            .await?;

        assert_eq!(customers.list(None).await?.len(), 1);
        assert_eq!(products.list(Some("PRODUCT")).await?.len(), 1);
        assert!(products.list(Some("CUSTOMER")).await?.is_empty());
        let cheap = products.list_where(None, |p| p.price < 50.0).await?;
        assert!(cheap.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() -> Result<(), anyhow::Error> {
        let store = store::<Customer>();
        assert!(matches!(store.delete("CUSTOMER", "nope", None).await, Err(StorageError::NotFound(_))));
        assert!(store.get("CUSTOMER", "nope").await?.is_none());
        Ok(())
    }
}
