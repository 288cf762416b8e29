//! Failure taxonomy for one identifier's trip through the pipeline.

use labelscope_db::{DbError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Retries exhausted, or a non-retryable transport failure.
    #[error("fetch failed after {attempts} attempt(s): {message}")]
    Fetch { attempts: u32, message: String },

    /// The payload could not be turned into lines at all.
    #[error("could not read document: {0}")]
    Linearize(String),

    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    /// The natural key already exists in the store.
    #[error("label already ingested: {0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(#[source] DbError),
}

impl From<DbError> for IngestError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(key) => IngestError::Duplicate(key),
            other => IngestError::Storage(other),
        }
    }
}

impl IngestError {
    /// Known-error class for this failure. `None` for duplicates, which are
    /// not failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            IngestError::Fetch { .. } => Some(ErrorKind::FetchFailed),
            IngestError::Linearize(_) | IngestError::Segmentation(_) => Some(ErrorKind::ParsingError),
            IngestError::MissingField(_) => Some(ErrorKind::MissingField),
            IngestError::Storage(_) => Some(ErrorKind::StorageError),
            IngestError::Duplicate(_) => None,
        }
    }
}
