use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::impl_record_traits;
use crate::record::{EntityRecord, TableEntity};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    #[serde(flatten)]
    pub record: EntityRecord,
    pub product_name: String,
    pub price: f64,
    pub stock_quantity: i32,
    /// Blob URL of the product image, if one was uploaded.
    #[serde(default)]
    pub image_url: Option<String>,
    pub brand: String,
    pub colour: String,
    pub size: String,
}

impl_record_traits!(Product, record);

impl TableEntity for Product {
    const PARTITION: &'static str = "PRODUCT";

    fn validate(&self) -> Result<(), ModelError> {
        if self.product_name.trim().is_empty() { return Err(ModelError::required("product name")); }
        if !(self.price > 0.0) { return Err(ModelError::Validation("price must be greater than 0".into())); }
        if self.stock_quantity < 0 { return Err(ModelError::Validation("stock quantity cannot be negative".into())); }
        if self.brand.trim().is_empty() { return Err(ModelError::required("brand")); }
        if self.colour.trim().is_empty() { return Err(ModelError::required("colour")); }
        if self.size.trim().is_empty() { return Err(ModelError::required("size")); }
        Ok(())
    }
}
