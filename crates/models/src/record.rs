use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ModelError;

const ANY_ETAG: &str = "*";

/// Opaque version token assigned by the store on every successful write.
///
/// The wildcard `*` matches any stored version and turns a conditional
/// update/delete into an unconditional one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Wildcard that bypasses the version check.
    pub fn any() -> Self { Self(ANY_ETAG.to_string()) }

    /// Fresh weak validator tied to the write time. Never reused: the random
    /// suffix differs even for writes within the same instant.
    pub fn generate(at: DateTime<Utc>) -> Self {
        Self(format!(
            "W/\"datetime'{}'-{}\"",
            at.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            Uuid::new_v4().simple()
        ))
    }

    pub fn is_any(&self) -> bool { self.0 == ANY_ETAG }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Whether a stored version satisfies this precondition.
    pub fn matches(&self, stored: &ETag) -> bool { self.is_any() || self == stored }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Key and version envelope shared by every stored entity.
///
/// Field names follow the hosted table convention so that payloads look the
/// same regardless of which backend holds them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityRecord {
    #[serde(default)]
    pub partition_key: String,
    #[serde(default)]
    pub row_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
}

impl EntityRecord {
    /// Record in `partition` with a freshly generated row key and no version yet.
    pub fn new(partition: &str) -> Self {
        Self {
            partition_key: partition.to_string(),
            row_key: Uuid::new_v4().to_string(),
            timestamp: None,
            etag: None,
        }
    }

    pub fn with_keys(partition: &str, row_key: &str) -> Self {
        Self { partition_key: partition.to_string(), row_key: row_key.to_string(), timestamp: None, etag: None }
    }
}

/// Access to the composite `(PartitionKey, RowKey)` identity.
pub trait HasKey {
    fn partition_key(&self) -> &str;
    fn row_key(&self) -> &str;
    fn set_partition_key(&mut self, partition_key: String);
    fn set_row_key(&mut self, row_key: String);
}

/// Access to the store-managed version token and modification time.
pub trait HasVersion {
    fn etag(&self) -> Option<&ETag>;
    fn set_etag(&mut self, etag: Option<ETag>);
    fn timestamp(&self) -> Option<DateTime<Utc>>;
    fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>);
}

impl HasKey for EntityRecord {
    fn partition_key(&self) -> &str { &self.partition_key }
    fn row_key(&self) -> &str { &self.row_key }
    fn set_partition_key(&mut self, partition_key: String) { self.partition_key = partition_key; }
    fn set_row_key(&mut self, row_key: String) { self.row_key = row_key; }
}

impl HasVersion for EntityRecord {
    fn etag(&self) -> Option<&ETag> { self.etag.as_ref() }
    fn set_etag(&mut self, etag: Option<ETag>) { self.etag = etag; }
    fn timestamp(&self) -> Option<DateTime<Utc>> { self.timestamp }
    fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) { self.timestamp = timestamp; }
}

/// Anything the entity store can persist.
///
/// `PARTITION` is the fixed uppercase tag used when the caller leaves the
/// partition key empty.
pub trait TableEntity:
    HasKey + HasVersion + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    const PARTITION: &'static str;

    /// Field-level validation run before any I/O.
    fn validate(&self) -> Result<(), ModelError> { Ok(()) }
}

/// Implement [`HasKey`] and [`HasVersion`] for a type that embeds an
/// [`EntityRecord`] in the named field.
#[macro_export]
macro_rules! impl_record_traits {
    ($ty:ty, $field:ident) => {
        impl $crate::record::HasKey for $ty {
            fn partition_key(&self) -> &str { &self.$field.partition_key }
            fn row_key(&self) -> &str { &self.$field.row_key }
            fn set_partition_key(&mut self, partition_key: String) { self.$field.partition_key = partition_key; }
            fn set_row_key(&mut self, row_key: String) { self.$field.row_key = row_key; }
        }

        impl $crate::record::HasVersion for $ty {
            fn etag(&self) -> Option<&$crate::record::ETag> { self.$field.etag.as_ref() }
            fn set_etag(&mut self, etag: Option<$crate::record::ETag>) { self.$field.etag = etag; }
            fn timestamp(&self) -> Option<::chrono::DateTime<::chrono::Utc>> { self.$field.timestamp }
            fn set_timestamp(&mut self, timestamp: Option<::chrono::DateTime<::chrono::Utc>>) {
                self.$field.timestamp = timestamp;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        let stored = ETag::generate(Utc::now());
        assert!(ETag::any().matches(&stored));
        assert!(stored.matches(&stored));
        assert!(!ETag::new("W/\"other\"").matches(&stored));
    }

    #[test]
    fn generated_etags_are_unique() {
        let now = Utc::now();
        assert_ne!(ETag::generate(now), ETag::generate(now));
        assert!(!ETag::generate(now).is_any());
    }

    #[test]
    fn record_serializes_with_table_field_names() {
        let mut record = EntityRecord::with_keys("CUSTOMER", "c-1");
        record.etag = Some(ETag::new("W/\"1\""));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["PartitionKey"], "CUSTOMER");
        assert_eq!(json["RowKey"], "c-1");
        assert_eq!(json["ETag"], "W/\"1\"");
        assert!(json.get("Timestamp").is_none());
    }

    #[test]
    fn new_record_gets_row_key() {
        let record = EntityRecord::new("PRODUCT");
        assert_eq!(record.partition_key(), "PRODUCT");
        assert!(uuid::Uuid::parse_str(record.row_key()).is_ok());
        assert!(record.etag().is_none());
    }
}
