use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{Plan, PlanLimits};
use crate::types::{PlanId, UserId};

/// Billing period granted by an upgrade, in days.
pub const DEFAULT_BILLING_PERIOD_DAYS: u32 = 30;

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Canceled,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Canceled => f.write_str("canceled"),
        }
    }
}

/// A user's subscription record.
///
/// `features` and `limits` are snapshots copied from the [`Plan`] at grant
/// time. They are intentionally not refreshed when the plan table changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub features: Vec<String>,
    pub limits: PlanLimits,
    pub start_date: DateTime<Utc>,
    /// End of the paid period. `None` for plans that never expire.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Snapshot `plan` into a new active subscription starting at `now`.
    ///
    /// When `period` is `Some`, the subscription ends `period` after `now`.
    #[must_use]
    pub fn grant(
        user_id: impl Into<UserId>,
        plan: &Plan,
        now: DateTime<Utc>,
        period: Option<Duration>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            plan_id: plan.id.clone(),
            status: SubscriptionStatus::Active,
            features: plan.features.clone(),
            limits: plan.limits.clone(),
            start_date: now,
            end_date: period.map(|p| now + p),
            cancellation_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if this subscription is on the plan `plan_id`.
    #[must_use]
    pub fn is_on_plan(&self, plan_id: &str) -> bool {
        self.plan_id.as_str() == plan_id
    }

    /// Returns `true` if the subscription still confers its entitlements at
    /// `now`.
    ///
    /// Active subscriptions are always in good standing. Canceled ones keep
    /// their benefits until `end_date`; a canceled subscription with no end
    /// date has nothing left to honour.
    #[must_use]
    pub fn in_good_standing_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Canceled => self.end_date.is_some_and(|end| now < end),
        }
    }

    /// Inverse of [`in_good_standing_at`](Self::in_good_standing_at).
    #[must_use]
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        !self.in_good_standing_at(now)
    }

    #[must_use]
    pub fn has_feature(&self, tag: &str) -> bool {
        self.features.iter().any(|f| f == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{FREE_PLAN_ID, PRO_PLAN_ID};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn grant_copies_plan_snapshot() {
        let plan = Plan::pro();
        let now = at(1_700_000_000);
        let sub = Subscription::grant("u1", &plan, now, Some(Duration::days(30)));
        assert_eq!(sub.plan_id.as_str(), PRO_PLAN_ID);
        assert_eq!(sub.features, plan.features);
        assert_eq!(sub.limits, plan.limits);
        assert_eq!(sub.end_date, Some(now + Duration::days(30)));
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.cancellation_date.is_none());
    }

    #[test]
    fn free_grant_has_no_end_date() {
        let sub = Subscription::grant("u1", &Plan::free(), at(0), None);
        assert!(sub.is_on_plan(FREE_PLAN_ID));
        assert!(sub.end_date.is_none());
        assert!(sub.in_good_standing_at(at(10_000_000_000)));
    }

    #[test]
    fn canceled_keeps_standing_until_end_date() {
        let start = at(1_000);
        let mut sub = Subscription::grant("u1", &Plan::pro(), start, Some(Duration::days(30)));
        sub.status = SubscriptionStatus::Canceled;
        let end = start + Duration::days(30);

        assert!(sub.in_good_standing_at(start + Duration::days(1)));
        assert!(sub.in_good_standing_at(end - Duration::seconds(1)));
        assert!(sub.is_lapsed_at(end));
    }

    #[test]
    fn canceled_without_end_date_is_lapsed() {
        let mut sub = Subscription::grant("u1", &Plan::free(), at(0), None);
        sub.status = SubscriptionStatus::Canceled;
        assert!(sub.is_lapsed_at(at(1)));
    }

    #[test]
    fn document_shape_is_camel_case() {
        let sub = Subscription::grant("u1", &Plan::free(), at(0), None);
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["planId"], "free");
        assert_eq!(json["status"], "active");
        assert!(json["cancellationDate"].is_null());
        assert_eq!(json["limits"]["maxFileSizeBytes"], 5 * 1024 * 1024);
    }
}
