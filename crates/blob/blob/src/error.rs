use thiserror::Error;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The path is empty or contains an illegal segment.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    /// The store could not be reached.
    #[error("blob transport error: {0}")]
    Transport(String),

    /// A storage backend error occurred.
    #[error("blob storage error: {0}")]
    Storage(String),
}

impl BlobError {
    /// Returns `true` for [`BlobError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
