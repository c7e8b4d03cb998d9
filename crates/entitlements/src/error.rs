use atrium_blob::BlobError;
use atrium_core::InvalidTransition;
use atrium_persistence::PersistenceError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Coarse classification of an [`EntitlementError`], used to decide how the
/// caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before any remote call. Never retried automatically.
    Validation,
    /// The user is out of storage or no longer subscribed. Surface an
    /// upgrade prompt.
    QuotaExceeded,
    /// A remote call failed. The whole flow may be retried.
    Transport,
    /// A multi-step operation stopped half way. Prompt the user to retry.
    PartialFailure,
}

/// Errors produced by entitlement, quota and upload operations.
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// The request is malformed (empty ids, path separators in names, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// A single file exceeds the per-file limit.
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// The plan table has no plan with this id.
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// The engine was misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An upload state machine was driven along an illegal edge.
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    /// Admitting the file would exceed the aggregate storage limit.
    #[error("storage quota exceeded: {used} bytes used + {requested} requested > {limit} limit")]
    QuotaExceeded { used: u64, requested: u64, limit: u64 },

    /// The subscription was canceled and its paid period is over.
    #[error("subscription lapsed (ended at {ended_at:?})")]
    SubscriptionLapsed { ended_at: Option<DateTime<Utc>> },

    /// An error from the persistence gateway.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// An error from the blob store.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    /// A multi-step operation partially succeeded.
    ///
    /// `compensated` reports whether the best-effort rollback succeeded.
    #[error("{operation} partially failed (compensated: {compensated}): {detail}")]
    PartialFailure {
        operation: &'static str,
        detail: String,
        compensated: bool,
    },
}

impl EntitlementError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::FileTooLarge { .. }
            | Self::PlanNotFound(_)
            | Self::Configuration(_)
            | Self::InvalidState(_) => ErrorKind::Validation,
            Self::QuotaExceeded { .. } | Self::SubscriptionLapsed { .. } => {
                ErrorKind::QuotaExceeded
            }
            Self::Persistence(_) | Self::Blob(_) => ErrorKind::Transport,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
        }
    }

    /// Returns `true` if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::PartialFailure
        )
    }

    /// A message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) | Self::InvalidState(_) => {
                "This request could not be processed. Please check the file and try again."
                    .to_owned()
            }
            Self::FileTooLarge { limit, .. } => format!(
                "This file is too large. The maximum file size on your plan is {}.",
                format_bytes(*limit)
            ),
            Self::PlanNotFound(plan) => format!("The plan \"{plan}\" is not available."),
            Self::Configuration(_) => "The service is not configured correctly.".to_owned(),
            Self::QuotaExceeded { used, limit, .. } => format!(
                "You have used {} of your {} storage. Upgrade your plan for more space.",
                format_bytes(*used),
                format_bytes(*limit)
            ),
            Self::SubscriptionLapsed { .. } => {
                "Your subscription has ended. Renew or upgrade your plan to upload files."
                    .to_owned()
            }
            Self::Persistence(_) | Self::Blob(_) => {
                "We could not reach the server. Please try again.".to_owned()
            }
            Self::PartialFailure { .. } => {
                "The operation did not complete. Please try again.".to_owned()
            }
        }
    }
}

/// Render a byte count with a binary unit, e.g. `"5.0 MB"`.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
