use std::sync::Arc;
use strand_core::{Interrupted, MissingContextValue};

/// Database-related errors.
///
/// Driver errors are shared behind `Arc` so a failure recorded on a
/// transaction slot can be reported again by every later operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] Arc<sqlx::Error>),

    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] Arc<sqlx::Error>),

    #[error("Query failed: {0}")]
    Query(#[source] Arc<sqlx::Error>),

    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] Arc<sqlx::Error>),

    #[error("Failed to rollback transaction: {0}")]
    Rollback(#[source] Arc<sqlx::Error>),

    #[error("Transaction already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    Missing(#[from] MissingContextValue),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    pub(crate) fn connect(err: sqlx::Error) -> Self {
        DbError::Connect(Arc::new(err))
    }

    pub(crate) fn begin(err: sqlx::Error) -> Self {
        DbError::Begin(Arc::new(err))
    }

    pub(crate) fn query(err: sqlx::Error) -> Self {
        DbError::Query(Arc::new(err))
    }

    pub(crate) fn commit(err: sqlx::Error) -> Self {
        DbError::Commit(Arc::new(err))
    }

    pub(crate) fn rollback(err: sqlx::Error) -> Self {
        DbError::Rollback(Arc::new(err))
    }

    /// The driver error behind this failure, if any.
    pub fn database_error(&self) -> Option<&sqlx::Error> {
        match self {
            DbError::Connect(e)
            | DbError::Begin(e)
            | DbError::Query(e)
            | DbError::Commit(e)
            | DbError::Rollback(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<DbError> for strand_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Missing(missing) => strand_core::Error::MissingContext(missing),
            other => strand_core::Error::Other(anyhow::Error::new(other)),
        }
    }
}
