use thiserror::Error;
use validator::ValidationErrors;

use crate::db::StoreError;
use crate::services::stripe::GatewayError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LifecycleError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LifecycleError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<ValidationErrors> for LifecycleError {
    fn from(errors: ValidationErrors) -> Self {
        let (field, message) = crate::utils::first_field_error(&errors);
        LifecycleError::Validation { field, message }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
