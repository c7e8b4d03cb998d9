use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking admission and lifecycle outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct EntitlementMetrics {
    /// Upload attempts started.
    pub uploads_started: AtomicU64,
    /// Uploads that ended attached to their entity.
    pub uploads_completed: AtomicU64,
    /// Uploads rejected by the per-file limit.
    pub rejected_file_too_large: AtomicU64,
    /// Uploads rejected by the aggregate storage limit.
    pub rejected_quota: AtomicU64,
    /// Uploads rejected because the subscription had lapsed.
    pub rejected_lapsed: AtomicU64,
    /// Uploads that failed for any other reason.
    pub uploads_failed: AtomicU64,
    /// Compensating blob deletes that succeeded.
    pub compensations: AtomicU64,
    /// Compensating blob deletes that failed.
    pub compensation_failures: AtomicU64,
    /// Attachments deleted.
    pub deletions: AtomicU64,
    /// Operations that returned a partial failure.
    pub partial_failures: AtomicU64,
    pub upgrades: AtomicU64,
    pub cancellations: AtomicU64,
    /// Lapsed subscriptions moved back to the default plan.
    pub expirations: AtomicU64,
}

impl EntitlementMetrics {
    pub fn increment_uploads_started(&self) {
        self.uploads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_uploads_completed(&self) {
        self.uploads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_file_too_large(&self) {
        self.rejected_file_too_large.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_quota(&self) {
        self.rejected_quota.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_lapsed(&self) {
        self.rejected_lapsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_uploads_failed(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compensations(&self) {
        self.compensations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compensation_failures(&self) {
        self.compensation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletions(&self) {
        self.deletions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partial_failures(&self) {
        self.partial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_upgrades(&self) {
        self.upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_expirations(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_started: self.uploads_started.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            rejected_file_too_large: self.rejected_file_too_large.load(Ordering::Relaxed),
            rejected_quota: self.rejected_quota.load(Ordering::Relaxed),
            rejected_lapsed: self.rejected_lapsed.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            compensations: self.compensations.load(Ordering::Relaxed),
            compensation_failures: self.compensation_failures.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
            upgrades: self.upgrades.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data copy of [`EntitlementMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads_started: u64,
    pub uploads_completed: u64,
    pub rejected_file_too_large: u64,
    pub rejected_quota: u64,
    pub rejected_lapsed: u64,
    pub uploads_failed: u64,
    pub compensations: u64,
    pub compensation_failures: u64,
    pub deletions: u64,
    pub partial_failures: u64,
    pub upgrades: u64,
    pub cancellations: u64,
    pub expirations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = EntitlementMetrics::default();
        metrics.increment_uploads_started();
        metrics.increment_uploads_started();
        metrics.increment_rejected_quota();
        metrics.increment_cancellations();
        let snap = metrics.snapshot();
        assert_eq!(snap.uploads_started, 2);
        assert_eq!(snap.rejected_quota, 1);
        assert_eq!(snap.cancellations, 1);
        assert_eq!(snap.uploads_completed, 0);
    }
}
