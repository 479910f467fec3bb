//! Record shapes persisted by the entity store.
//! - `record` holds the key/version envelope every stored entity carries.
//! - `customer`, `product` and `order` are the domain payloads, each bound to
//!   a fixed partition tag.

pub mod errors;
pub mod record;
pub mod customer;
pub mod product;
pub mod order;

pub use errors::ModelError;
pub use record::{EntityRecord, ETag, HasKey, HasVersion, TableEntity};
pub use customer::Customer;
pub use product::Product;
pub use order::Order;
