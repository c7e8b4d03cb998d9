use thiserror::Error;

/// Errors from persistence gateway operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("record already exists: {collection}/{id}")]
    Conflict { collection: String, id: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl PersistenceError {
    /// Returns `true` for [`PersistenceError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
