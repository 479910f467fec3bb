use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::impl_record_traits;
use crate::record::{EntityRecord, TableEntity};

pub const STATUS_PENDING: &str = "Pending";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Order {
    #[serde(flatten)]
    pub record: EntityRecord,
    pub customer_row_key: String,
    pub product_row_key: String,
    pub quantity: i32,
    #[serde(default = "default_status")]
    pub status: String,
    /// Unit price captured when the order was placed.
    #[serde(default)]
    pub product_price: Option<f64>,
}

fn default_status() -> String { STATUS_PENDING.to_string() }

impl Default for Order {
    fn default() -> Self {
        Self {
            record: EntityRecord::default(),
            customer_row_key: String::new(),
            product_row_key: String::new(),
            quantity: 1,
            status: default_status(),
            product_price: None,
        }
    }
}

impl Order {
    pub fn new(customer_row_key: &str, product_row_key: &str, quantity: i32) -> Self {
        Self {
            record: EntityRecord::new(Self::PARTITION),
            customer_row_key: customer_row_key.to_string(),
            product_row_key: product_row_key.to_string(),
            quantity,
            ..Self::default()
        }
    }

    pub fn total_price(&self) -> Option<f64> { self.product_price.map(|p| p * f64::from(self.quantity)) }
}

impl_record_traits!(Order, record);

impl TableEntity for Order {
    const PARTITION: &'static str = "ORDER";

    fn validate(&self) -> Result<(), ModelError> {
        if self.customer_row_key.trim().is_empty() { return Err(ModelError::required("customer")); }
        if self.product_row_key.trim().is_empty() { return Err(ModelError::required("product")); }
        if self.quantity < 1 { return Err(ModelError::Validation("quantity must be at least 1".into())); }
        Ok(())
    }
}
