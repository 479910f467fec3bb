use std::sync::Arc;

use async_trait::async_trait;
use configs::FailurePolicy;
use futures::stream::{self, BoxStream, StreamExt};
use models::{Customer, ETag, HasVersion};
use service::storage::backend::{StoredEntity, TableBackend};
use service::storage::local::{LocalQueueBackend, LocalTableBackend};
use service::storage::{EntityStore, StorageAccount};
use service::StorageError;

const TABLE: &str = "abcretail";

fn ann() -> Customer { Customer::new("Ann", "Lee", "ann@example.com") }

/// Table backend whose queries break after `fail_after` rows.
struct FlakyTableBackend {
    inner: LocalTableBackend,
    fail_after: usize,
}

#[async_trait]
impl TableBackend for FlakyTableBackend {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StorageError> {
        self.inner.create_table_if_not_exists(table).await
    }

    fn query<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> BoxStream<'a, Result<StoredEntity, StorageError>> {
        self.inner
            .query(table, partition_key)
            .take(self.fail_after)
            .chain(stream::once(async { Err(StorageError::Unavailable("connection reset".into())) }))
            .boxed()
    }

    async fn get(&self, table: &str, pk: &str, rk: &str) -> Result<Option<StoredEntity>, StorageError> {
        self.inner.get(table, pk, rk).await
    }

    async fn insert(&self, table: &str, entity: StoredEntity) -> Result<StoredEntity, StorageError> {
        self.inner.insert(table, entity).await
    }

    async fn replace(&self, table: &str, entity: StoredEntity, if_match: &ETag) -> Result<StoredEntity, StorageError> {
        self.inner.replace(table, entity, if_match).await
    }

    async fn delete(&self, table: &str, pk: &str, rk: &str, if_match: &ETag) -> Result<(), StorageError> {
        self.inner.delete(table, pk, rk, if_match).await
    }
}

fn flaky_account(fail_after: usize) -> StorageAccount {
    StorageAccount::with_backends(
        Arc::new(FlakyTableBackend { inner: LocalTableBackend::in_memory(), fail_after }),
        Arc::new(LocalQueueBackend::in_memory()),
    )
}

#[tokio::test]
async fn customer_lifecycle_with_concurrent_updates() -> Result<(), anyhow::Error> {
    let account = StorageAccount::in_memory();
    let customers = account.table::<Customer>(TABLE);

    let saved = customers.add(ann()).await?;
    let v1 = saved.etag().cloned().expect("version assigned on insert");
    let fetched = customers.get("CUSTOMER", &saved.record.row_key).await?.expect("customer present");
    assert_eq!(fetched.full_name(), "Ann Lee");

    let phone = Customer { phone_number: Some("555-0100".into()), ..saved.clone() };
    let address = Customer { address: Some("1 Main St".into()), ..saved.clone() };
    let (a, b) = tokio::join!(customers.update(phone, Some(&v1)), customers.update(address, Some(&v1)));

    let (winner, loser) = match (a, b) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        other => panic!("exactly one update must win: {other:?}"),
    };
    assert!(matches!(loser, StorageError::VersionConflict { .. }));
    let v2 = winner.etag().cloned().expect("new version");
    assert_ne!(v2, v1);

    // stale version on delete is refused, current one succeeds
    let stale = customers.delete("CUSTOMER", &saved.record.row_key, Some(&v1)).await;
    assert!(matches!(stale, Err(StorageError::VersionConflict { .. })));
    customers.delete("CUSTOMER", &saved.record.row_key, Some(&v2)).await?;
    assert!(customers.get("CUSTOMER", &saved.record.row_key).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn duplicate_key_is_a_conflict() -> Result<(), anyhow::Error> {
    let customers = StorageAccount::in_memory().table::<Customer>(TABLE);
    let saved = customers.add(ann()).await?;
    let again = customers.add(saved.clone()).await;
    assert!(matches!(again, Err(StorageError::Conflict(_))));
    assert_eq!(customers.list(Some("CUSTOMER")).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn racing_adds_of_one_key_admit_exactly_one() -> Result<(), anyhow::Error> {
    let customers = StorageAccount::in_memory().table::<Customer>(TABLE);
    let customer = ann();
    let (a, b) = tokio::join!(customers.add(customer.clone()), customers.add(customer.clone()));

    match (a, b) {
        (Ok(_), Err(StorageError::Conflict(_))) | (Err(StorageError::Conflict(_)), Ok(_)) => {}
        other => panic!("exactly one add must win: {other:?}"),
    }
    let stored = customers.list(Some("CUSTOMER")).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.row_key, customer.record.row_key);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_handles_on_one_backend_start_together() -> Result<(), anyhow::Error> {
    let root = std::env::temp_dir().join(format!("scenario_tables_{}", uuid::Uuid::new_v4()));
    let backend: Arc<dyn TableBackend> = Arc::new(LocalTableBackend::open(&root));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = EntityStore::<Customer>::new(Arc::clone(&backend), TABLE, FailurePolicy::Strict);
        tasks.push(tokio::spawn(async move {
            store.ensure_table().await?;
            store.add(ann()).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let reader = EntityStore::<Customer>::new(Arc::new(LocalTableBackend::open(&root)), TABLE, FailurePolicy::Strict);
    assert_eq!(reader.list(Some("CUSTOMER")).await?.len(), 8);
    let _ = tokio::fs::remove_dir_all(&root).await;
    Ok(())
}

#[tokio::test]
async fn wildcard_bypasses_version_check() -> Result<(), anyhow::Error> {
    let customers = StorageAccount::in_memory().table::<Customer>(TABLE);
    let saved = customers.add(ann()).await?;
    customers.update(Customer { first_name: "Anna".into(), ..saved.clone() }, None).await?;

    // saved still carries the first version
    let forced = customers.replace(Customer { last_name: "Li".into(), ..saved.clone() }).await?;
    assert_eq!(forced.full_name(), "Ann Li");

    let mut ghost = ann();
    ghost.record.row_key = "ghost".into();
    assert!(matches!(customers.replace(ghost).await, Err(StorageError::NotFound(_))));
    customers.delete("CUSTOMER", &saved.record.row_key, Some(&ETag::any())).await?;
    Ok(())
}

#[tokio::test]
async fn every_write_changes_version_and_timestamp() -> Result<(), anyhow::Error> {
    let customers = StorageAccount::in_memory().table::<Customer>(TABLE);
    let mut current = customers.add(ann()).await?;
    let mut seen = vec![current.etag().cloned().expect("version")];
    for i in 0..5 {
        let before = current.timestamp().expect("timestamp");
        current = customers.update(Customer { phone_number: Some(format!("555-010{i}")), ..current }, None).await?;
        assert!(current.timestamp().expect("timestamp") >= before);
        let etag = current.etag().cloned().expect("version");
        assert!(!seen.contains(&etag));
        seen.push(etag);
    }
    Ok(())
}

#[tokio::test]
async fn best_effort_list_returns_partial_results() -> Result<(), anyhow::Error> {
    let customers = flaky_account(2).table::<Customer>(TABLE);
    for _ in 0..4 {
        customers.add(ann()).await?;
    }
    assert_eq!(customers.list(None).await?.len(), 2);
    assert!(matches!(customers.try_list(None).await, Err(StorageError::Unavailable(_))));
    Ok(())
}

#[tokio::test]
async fn strict_list_propagates_failures() -> Result<(), anyhow::Error> {
    let customers = flaky_account(0).with_policy(FailurePolicy::Strict).table::<Customer>(TABLE);
    customers.add(ann()).await?;
    assert!(matches!(customers.list(None).await, Err(StorageError::Unavailable(_))));
    assert!(matches!(customers.list_where(None, |_| true).await, Err(StorageError::Unavailable(_))));
    Ok(())
}

#[tokio::test]
async fn local_account_survives_restart() -> Result<(), anyhow::Error> {
    let root = std::env::temp_dir().join(format!("entity_store_{}", uuid::Uuid::new_v4()));
    let saved = StorageAccount::local(&root).table::<Customer>(TABLE).add(ann()).await?;

    let reopened = StorageAccount::local(&root).table::<Customer>(TABLE);
    let fetched = reopened.get("CUSTOMER", &saved.record.row_key).await?.expect("persisted");
    assert_eq!(fetched, saved);
    let _ = tokio::fs::remove_dir_all(&root).await;
    Ok(())
}
