use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::impl_record_traits;
use crate::record::{EntityRecord, TableEntity};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Customer {
    #[serde(flatten)]
    pub record: EntityRecord,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Customer {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            record: EntityRecord::new(Self::PARTITION),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            phone_number: None,
            address: None,
        }
    }

    pub fn full_name(&self) -> String { format!("{} {}", self.first_name, self.last_name) }
}

impl_record_traits!(Customer, record);

impl TableEntity for Customer {
    const PARTITION: &'static str = "CUSTOMER";

    fn validate(&self) -> Result<(), ModelError> {
        if self.first_name.trim().is_empty() { return Err(ModelError::required("first name")); }
        if self.last_name.trim().is_empty() { return Err(ModelError::required("last name")); }
        if !self.email.contains('@') { return Err(ModelError::Validation("invalid email address".into())); }
        Ok(())
    }
}
