use cas::BatchError;
use chartfmt::ConvertError;
use thiserror::Error;

use crate::changes::ChangeSetError;
use crate::metadata::MetadataError;
use crate::validate::ValidationError;
use crate::worker::WorkerError;

/// Why an upload or edit failed.
///
/// Validation, format and conversion errors are raised before any store is
/// touched. Storage and metadata errors are terminal; nothing retries inline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Conversion(String),

    #[error("Chart not found.")]
    NotFound,

    #[error("Chart belongs to another owner.")]
    Forbidden,

    #[error("failed to store assets: {0}")]
    Storage(#[from] BatchError),

    #[error("failed to read chart metadata: {0}")]
    MetadataRead(#[source] MetadataError),

    #[error("failed to commit chart metadata: {0}")]
    MetadataCommit(#[source] MetadataError),

    #[error("jacket rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),
}

impl From<ConvertError> for IngestError {
    fn from(e: ConvertError) -> Self {
        if e.is_unsupported() {
            IngestError::UnsupportedFormat(e.to_string())
        } else {
            IngestError::Conversion(e.to_string())
        }
    }
}

impl IngestError {
    /// Whether the caller is at fault (bad input, wrong chart, stale edit).
    pub fn is_client_error(&self) -> bool {
        match self {
            IngestError::Validation(_)
            | IngestError::UnsupportedFormat(_)
            | IngestError::Conversion(_)
            | IngestError::NotFound
            | IngestError::Forbidden => true,
            IngestError::MetadataCommit(MetadataError::Conflict { .. }) => true,
            _ => false,
        }
    }

    /// HTTP status an API layer would answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::Validation(ValidationError::FileTooLarge { .. }) => 413,
            IngestError::Validation(_)
            | IngestError::UnsupportedFormat(_)
            | IngestError::Conversion(_) => 400,
            IngestError::Forbidden => 403,
            IngestError::NotFound => 404,
            IngestError::MetadataCommit(MetadataError::Conflict { .. }) => 409,
            _ => 500,
        }
    }
}
