use std::collections::VecDeque;
use std::sync::Arc;

use atrium_blob::BlobStore;
use atrium_core::{PlanLimits, Subscription, UserId, user_namespace};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::clock::Clock;
use crate::error::EntitlementError;
use crate::evaluator::EntitlementEvaluator;

/// Why an upload was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    /// The file alone exceeds the per-file limit.
    FileTooLarge { size: u64, limit: u64 },
    /// The file would push total usage past the storage limit.
    QuotaExceeded { used: u64, requested: u64, limit: u64 },
    /// The subscription was canceled and no longer confers its limits.
    SubscriptionLapsed { ended_at: Option<DateTime<Utc>> },
}

impl From<DenialReason> for EntitlementError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::FileTooLarge { size, limit } => Self::FileTooLarge { size, limit },
            DenialReason::QuotaExceeded {
                used,
                requested,
                limit,
            } => Self::QuotaExceeded {
                used,
                requested,
                limit,
            },
            DenialReason::SubscriptionLapsed { ended_at } => Self::SubscriptionLapsed { ended_at },
        }
    }
}

/// Result of [`StorageAccountant::can_admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    Admitted {
        current_usage: u64,
        /// Space left after the candidate is stored.
        remaining_bytes: u64,
    },
    Denied { reason: DenialReason },
}

impl AdmissionDecision {
    /// Apply `limits` to a candidate of `candidate_size` bytes given `used`
    /// bytes already stored. The per-file limit is checked first; both are
    /// inclusive.
    pub fn decide(limits: &PlanLimits, used: u64, candidate_size: u64) -> Self {
        if !limits.can_upload_file(candidate_size) {
            return Self::Denied {
                reason: DenialReason::FileTooLarge {
                    size: candidate_size,
                    limit: limits.max_file_size_bytes,
                },
            };
        }
        if !limits.can_add_storage(used, candidate_size) {
            return Self::Denied {
                reason: DenialReason::QuotaExceeded {
                    used,
                    requested: candidate_size,
                    limit: limits.max_storage_bytes,
                },
            };
        }
        Self::Admitted {
            current_usage: used,
            remaining_bytes: limits.max_storage_bytes - used - candidate_size,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Storage consumption of one user against their limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub remaining_bytes: u64,
    /// `used / limit * 100`, may exceed 100 after a limit decrease.
    pub percent_used: f64,
}

impl StorageUsage {
    #[allow(clippy::cast_precision_loss)]
    pub fn new(used_bytes: u64, limit_bytes: u64) -> Self {
        let percent_used = if limit_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 / limit_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            limit_bytes,
            remaining_bytes: limit_bytes.saturating_sub(used_bytes),
            percent_used,
        }
    }
}

/// Sums a user's blob usage and decides whether new uploads fit.
///
/// Usage is recomputed from the blob store on every call; nothing is
/// cached, so concurrent uploads may both pass the check.
pub struct StorageAccountant {
    blobs: Arc<dyn BlobStore>,
    evaluator: Arc<EntitlementEvaluator>,
    clock: Arc<dyn Clock>,
    storage_root: String,
}

impl StorageAccountant {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        evaluator: Arc<EntitlementEvaluator>,
        clock: Arc<dyn Clock>,
        storage_root: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            evaluator,
            clock,
            storage_root: storage_root.into(),
        }
    }

    /// Denial for a subscription that has lapsed by now.
    ///
    /// A canceled subscription keeps its quota until `end_date`. One with no
    /// end date lapses as soon as it is canceled.
    pub fn lapse_denial(&self, sub: Option<&Subscription>) -> Option<DenialReason> {
        let now = self.clock.now();
        sub.filter(|s| s.is_lapsed_at(now))
            .map(|s| DenialReason::SubscriptionLapsed { ended_at: s.end_date })
    }

    /// Total bytes stored under the user's namespace.
    ///
    /// Walks every subfolder breadth-first. A user with no folder has zero
    /// usage.
    #[instrument(name = "accountant.current_usage", skip_all, fields(user_id = %user_id))]
    pub async fn current_usage(&self, user_id: &UserId) -> Result<u64, EntitlementError> {
        let mut pending = VecDeque::from([user_namespace(&self.storage_root, user_id)]);
        let mut total: u64 = 0;
        let mut folders = 0usize;
        while let Some(prefix) = pending.pop_front() {
            let listing = self.blobs.list(&prefix).await?;
            total = total.saturating_add(listing.item_bytes());
            pending.extend(listing.subfolders);
            folders += 1;
        }
        debug!(total_bytes = total, folders, "usage computed");
        Ok(total)
    }

    /// Decide whether `candidate_size` bytes may be stored for the user.
    ///
    /// A lapsed subscription is refused outright. The per-file check runs
    /// next and avoids listing the namespace. Both limits are inclusive.
    #[instrument(
        name = "accountant.can_admit",
        skip_all,
        fields(user_id = %user_id, size_bytes = candidate_size)
    )]
    pub async fn can_admit(
        &self,
        user_id: &UserId,
        candidate_size: u64,
        sub: Option<&Subscription>,
    ) -> Result<AdmissionDecision, EntitlementError> {
        if let Some(reason) = self.lapse_denial(sub) {
            debug!(?reason, "subscription lapsed");
            return Ok(AdmissionDecision::Denied { reason });
        }
        let limits = self.evaluator.limits(sub);
        if !limits.can_upload_file(candidate_size) {
            return Ok(AdmissionDecision::decide(limits, 0, candidate_size));
        }

        let used = self.current_usage(user_id).await?;
        let decision = AdmissionDecision::decide(limits, used, candidate_size);
        if !decision.is_admitted() {
            debug!(used, limit = limits.max_storage_bytes, "quota exceeded");
        }
        Ok(decision)
    }

    /// Current usage measured against the subscription's storage limit.
    pub async fn usage_report(
        &self,
        user_id: &UserId,
        sub: Option<&Subscription>,
    ) -> Result<StorageUsage, EntitlementError> {
        let used = self.current_usage(user_id).await?;
        Ok(StorageUsage::new(used, self.evaluator.max_storage_bytes(sub)))
    }
}
