//! Error types for batch recovery.
//!

use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),
    #[error("Entity for flow {flow} not found: {key}")]
    EntityNotFound { flow: String, key: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl BatchError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors that mean the caller asked for something this deployment cannot do,
    /// as opposed to a problem with a single job's data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BatchError::UnknownFlow(_) | BatchError::ConfigurationError(_)
        )
    }

    /// Problems confined to one output row's data. Anything else from a flow
    /// write (storage outage, timeout) aborts the whole application.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            BatchError::NotFound { .. }
                | BatchError::EntityNotFound { .. }
                | BatchError::ValidationError(_)
        )
    }
}

impl From<sqlx::Error> for BatchError {
    fn from(err: sqlx::Error) -> Self {
        BatchError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for BatchError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        BatchError::DatabaseError(format!("Migration failed: {err}"))
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(error: serde_json::Error) -> Self {
        BatchError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for BatchError {
    fn from(error: config::ConfigError) -> Self {
        BatchError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
