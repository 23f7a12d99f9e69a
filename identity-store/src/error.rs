//! Error taxonomy for identity-store.

use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An underlying failure with the operation and id that produced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("unit of work did not finish within {0:?}")]
    Timeout(Duration),

    /// The unit of work failed and so did the rollback that followed.
    #[error("tx err: {original}, rb err: {rollback}")]
    Rollback {
        #[source]
        original: Box<StoreError>,
        rollback: Box<StoreError>,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Wrap this error with a description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        StoreError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through `Context` wrapping.
    pub fn root(&self) -> &StoreError {
        match self {
            StoreError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), StoreError::Conflict(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.root(), StoreError::InvalidArgument(_))
    }

    /// Label used by the error counter.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            StoreError::InvalidArgument(_) => "validation_error",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::Database(_) => "db_error",
            StoreError::Timeout(_) => "timeout",
            StoreError::Rollback { .. } => "rollback_error",
            StoreError::Context { .. } => "internal",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if err.is_invalid_argument() {
            AppError::BadRequest(anyhow::Error::new(err))
        } else if err.is_not_found() {
            AppError::NotFound(anyhow::Error::new(err))
        } else if err.is_conflict() {
            AppError::Conflict(anyhow::Error::new(err))
        } else if matches!(err.root(), StoreError::Timeout(_)) {
            AppError::ServiceUnavailable
        } else {
            AppError::DatabaseError(anyhow::Error::new(err))
        }
    }
}
