use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of one upload attempt in the admission pipeline.
///
/// ```text
/// Pending -> SizeChecked -> QuotaChecked -> Transferring -> Attached -> Complete
///    \____________\______________\______________\_____________\-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    SizeChecked,
    QuotaChecked,
    Transferring,
    Attached,
    Complete,
    Failed,
}

/// Attempted to move an upload along an edge the pipeline does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid upload transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: UploadState,
    pub to: UploadState,
}

impl UploadState {
    /// Returns `true` for `Complete` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// The next state on the success path, if any.
    #[must_use]
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::SizeChecked),
            Self::SizeChecked => Some(Self::QuotaChecked),
            Self::QuotaChecked => Some(Self::Transferring),
            Self::Transferring => Some(Self::Attached),
            Self::Attached => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    /// Validate and perform a transition.
    pub fn transition(self, to: Self) -> Result<Self, InvalidTransition> {
        let allowed = if to == Self::Failed {
            !self.is_terminal()
        } else {
            self.successor() == Some(to)
        };
        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::SizeChecked => "size_checked",
            Self::QuotaChecked => "quota_checked",
            Self::Transferring => "transferring",
            Self::Attached => "attached",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path_walks_every_state() {
        let mut state = UploadState::Pending;
        let mut seen = vec![state];
        while let Some(next) = state.successor() {
            state = state.transition(next).unwrap();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                UploadState::Pending,
                UploadState::SizeChecked,
                UploadState::QuotaChecked,
                UploadState::Transferring,
                UploadState::Attached,
                UploadState::Complete,
            ]
        );
    }

    #[test]
    fn failed_reachable_from_every_non_terminal_state() {
        for s in [
            UploadState::Pending,
            UploadState::SizeChecked,
            UploadState::QuotaChecked,
            UploadState::Transferring,
            UploadState::Attached,
        ] {
            assert_eq!(s.transition(UploadState::Failed), Ok(UploadState::Failed));
        }
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(UploadState::Complete.transition(UploadState::Failed).is_err());
        assert!(UploadState::Failed.transition(UploadState::Pending).is_err());
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        let err = UploadState::Pending
            .transition(UploadState::Transferring)
            .unwrap_err();
        assert_eq!(err.from, UploadState::Pending);
        assert_eq!(err.to, UploadState::Transferring);
    }
}
