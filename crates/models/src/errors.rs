use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("validation error: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn required(field: &str) -> Self { Self::Validation(format!("{field} is required")) }
}
