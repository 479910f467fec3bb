//! Ambient helpers shared by the storage crates and the worker binary:
//! tracing setup, startup environment checks and the admin endpoint.

pub mod utils;
pub mod env;
pub mod admin_http;
