use atrium_core::{AiModel, PRO_PLAN_ID, PlanLimits, Subscription};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::PlanRegistry;

/// Feature tag that unlocks every model in the catalogue.
pub const ALL_AI_MODELS: &str = "all_ai_models";

/// Limits applied to users who have no subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementDefaults {
    pub limits: PlanLimits,
}

impl EntitlementDefaults {
    /// Defaults taken from the registry's free plan, so the two can never
    /// drift apart.
    pub fn from_registry(registry: &PlanRegistry) -> Self {
        Self {
            limits: registry.free_plan().limits.clone(),
        }
    }
}

impl Default for EntitlementDefaults {
    fn default() -> Self {
        Self {
            limits: PlanLimits::free(),
        }
    }
}

/// Outcome of a daily message allowance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageAllowance {
    /// The user may send another message. `remaining` is `None` when the
    /// plan is unlimited.
    Allowed { remaining: Option<u32> },
    /// The daily limit has been reached.
    Exhausted { limit: u32, used: u32 },
}

impl MessageAllowance {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Pure decisions over a subscription snapshot.
///
/// Nothing here performs I/O or consults the live plan table: a
/// subscription's features and limits are the ones copied when it was
/// granted. An absent subscription is a normal state and yields the
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct EntitlementEvaluator {
    defaults: EntitlementDefaults,
}

impl EntitlementEvaluator {
    pub fn new(defaults: EntitlementDefaults) -> Self {
        Self { defaults }
    }

    pub fn from_registry(registry: &PlanRegistry) -> Self {
        Self::new(EntitlementDefaults::from_registry(registry))
    }

    pub fn defaults(&self) -> &EntitlementDefaults {
        &self.defaults
    }

    /// Returns `true` if the subscription carries `tag`.
    pub fn has_feature(&self, sub: Option<&Subscription>, tag: &str) -> bool {
        sub.is_some_and(|s| s.has_feature(tag))
    }

    /// Returns `true` if the subscription is on the pro plan and in good
    /// standing at `now`. A canceled subscription stays Pro until its end
    /// date.
    pub fn is_pro_at(&self, sub: Option<&Subscription>, now: DateTime<Utc>) -> bool {
        sub.is_some_and(|s| s.is_on_plan(PRO_PLAN_ID) && s.in_good_standing_at(now))
    }

    /// Gate for Pro features: the tag itself, or Pro status at `now`.
    pub fn can_access(&self, sub: Option<&Subscription>, tag: &str, now: DateTime<Utc>) -> bool {
        self.has_feature(sub, tag) || self.is_pro_at(sub, now)
    }

    /// The limit set that applies to `sub`.
    pub fn limits<'a>(&'a self, sub: Option<&'a Subscription>) -> &'a PlanLimits {
        sub.map_or(&self.defaults.limits, |s| &s.limits)
    }

    pub fn max_file_size_bytes(&self, sub: Option<&Subscription>) -> u64 {
        self.limits(sub).max_file_size_bytes
    }

    pub fn max_storage_bytes(&self, sub: Option<&Subscription>) -> u64 {
        self.limits(sub).max_storage_bytes
    }

    /// Daily message limit; `None` is unlimited.
    pub fn max_messages_per_day(&self, sub: Option<&Subscription>) -> Option<u32> {
        self.limits(sub).max_messages_per_day
    }

    /// Returns `true` if the user may select `model` at `now`.
    pub fn model_allowed(
        &self,
        sub: Option<&Subscription>,
        model: &AiModel,
        now: DateTime<Utc>,
    ) -> bool {
        !model.requires_pro || self.is_pro_at(sub, now) || self.has_feature(sub, ALL_AI_MODELS)
    }

    /// The subset of `catalogue` the user may select, in catalogue order.
    pub fn available_models<'a>(
        &self,
        sub: Option<&Subscription>,
        catalogue: &'a [AiModel],
        now: DateTime<Utc>,
    ) -> Vec<&'a AiModel> {
        catalogue
            .iter()
            .filter(|m| self.model_allowed(sub, m, now))
            .collect()
    }

    /// Returns `true` if `model_id` is in the catalogue and available.
    pub fn can_use_model(
        &self,
        sub: Option<&Subscription>,
        catalogue: &[AiModel],
        model_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        catalogue
            .iter()
            .find(|m| m.id == model_id)
            .is_some_and(|m| self.model_allowed(sub, m, now))
    }

    /// Decide whether one more message may be sent given `sent_today`.
    pub fn check_message_allowance(
        &self,
        sub: Option<&Subscription>,
        sent_today: u32,
    ) -> MessageAllowance {
        match self.max_messages_per_day(sub) {
            None => MessageAllowance::Allowed { remaining: None },
            Some(limit) if sent_today < limit => MessageAllowance::Allowed {
                remaining: Some(limit - sent_today),
            },
            Some(limit) => MessageAllowance::Exhausted {
                limit,
                used: sent_today,
            },
        }
    }
}
