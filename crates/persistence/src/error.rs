use domain::services::PrecisionError;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to callers of the sync operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller input rejected before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation not allowed from the entity's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn not_found(what: &str, id: &str) -> Self {
        SyncError::NotFound(format!("{} {}", what, id))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}

/// One field-level validation failure.
#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl From<validator::ValidationErrors> for SyncError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e.message.clone().map(|m| m.to_string()).unwrap_or_default(),
                })
            })
            .collect();

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            details
                .iter()
                .map(|d| format!("{}: {}", d.field, d.message))
                .collect::<Vec<_>>()
                .join("; ")
        };

        SyncError::Validation(message)
    }
}

impl From<PrecisionError> for SyncError {
    fn from(err: PrecisionError) -> Self {
        SyncError::Validation(err.to_string())
    }
}
