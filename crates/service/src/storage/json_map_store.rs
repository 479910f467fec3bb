use std::{collections::BTreeMap, ops::Bound, path::{Path, PathBuf}, sync::Arc};
use tokio::{fs, sync::RwLock};
use uuid::Uuid;

use crate::errors::StorageError;

/// Ordered key-value map, optionally persisted to a JSON file.
///
/// Every mutation runs under the write lock: the closure works on a copy of
/// the map, the copy is written to disk, and only then does it replace the
/// live map. A failed write leaves the previous state untouched.
pub struct JsonMapStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
    file_path: Option<PathBuf>,
}

impl<K, V> JsonMapStore<K, V>
where
    K: Ord + serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync,
    V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync,
{
    /// Map that lives only as long as the process.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self { inner: RwLock::new(BTreeMap::new()), file_path: None })
    }

    /// Initialize the store from a path. Creates the file with an empty map if missing.
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Arc<Self>, StorageError> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(&format!("create {}", parent.display()), e))?;
        }

        let map: BTreeMap<K, V> = match fs::read(&file_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty: BTreeMap<K, V> = BTreeMap::new();
                write_atomic(&file_path, &serde_json::to_vec(&empty)?).await?;
                empty
            }
            Err(e) => return Err(StorageError::io(&format!("read {}", file_path.display()), e)),
        };

        Ok(Arc::new(Self { inner: RwLock::new(map), file_path: Some(file_path) }))
    }

    async fn save(&self, map: &BTreeMap<K, V>) -> Result<(), StorageError> {
        let Some(path) = &self.file_path else { return Ok(()) };
        let data = serde_json::to_vec(map)?;
        write_atomic(path, &data).await
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Get value by key.
    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().await;
        map.get(key).cloned()
    }

    /// Up to `limit` entries strictly after `after` (from the start when `None`)
    /// whose value satisfies `filter`, in key order.
    pub async fn scan_after<F>(&self, after: Option<&K>, limit: usize, filter: F) -> Vec<(K, V)>
    where
        F: Fn(&V) -> bool,
    {
        let map = self.inner.read().await;
        let lower = match after {
            Some(k) => Bound::Excluded(k),
            None => Bound::Unbounded,
        };
        map.range((lower, Bound::Unbounded))
            .filter(|(_, v)| filter(v))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// All values satisfying `filter`, in key order.
    pub async fn values_where<F>(&self, filter: F) -> Vec<V>
    where
        F: Fn(&V) -> bool,
    {
        let map = self.inner.read().await;
        map.values().filter(|v| filter(v)).cloned().collect()
    }

    /// Apply a mutation to the underlying map and persist atomically.
    /// Nothing changes when `f` returns an error.
    pub async fn update_map<F, R>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut BTreeMap<K, V>) -> Result<R, StorageError>,
    {
        let mut map = self.inner.write().await;
        let mut next = map.clone();
        let out = f(&mut next)?;
        self.save(&next).await?;
        *map = next;
        Ok(out)
    }
}

/// Each writer stages into its own temp file so overlapping saves never
/// rename each other's staging file away.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    fs::write(&tmp, data)
        .await
        .map_err(|e| StorageError::io(&format!("write {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(&format!("rename {}", path.display()), e))
}
