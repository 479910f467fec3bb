use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Write operations recorded by audited stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOperation::Create => "Create",
            AuditOperation::Update => "Update",
            AuditOperation::Delete => "Delete",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Queue payload describing one business operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(operation: &str, entity_type: &str, entity_id: &str, details: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details: details.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_pascal_case_and_null_details() -> Result<(), anyhow::Error> {
        let event = AuditEvent::new(AuditOperation::Create.as_str(), "Product", "P1", None);
        let json = serde_json::to_value(&event)?;
        assert_eq!(json["Operation"], "Create");
        assert_eq!(json["EntityType"], "Product");
        assert_eq!(json["EntityId"], "P1");
        assert!(json["Details"].is_null());
        assert!(json["Timestamp"].is_string());
        Ok(())
    }
}
