use serde::{Deserialize, Serialize};

use crate::types::PlanId;

/// Identifier of the plan every user starts on.
pub const FREE_PLAN_ID: &str = "free";

/// Identifier of the paid tier checked by `is_pro`.
pub const PRO_PLAN_ID: &str = "pro";

/// One binary megabyte.
pub const MB: u64 = 1024 * 1024;

/// One binary gigabyte.
pub const GB: u64 = 1024 * MB;

/// Numeric ceilings attached to a plan.
///
/// A subscription carries a copy of these taken when the plan was granted,
/// so later edits to the plan table do not affect existing subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    /// Chat messages a user may send per UTC day. `None` means unlimited.
    #[serde(default)]
    pub max_messages_per_day: Option<u32>,
    /// Aggregate attachment storage in bytes.
    pub max_storage_bytes: u64,
    /// Largest single attachment in bytes.
    pub max_file_size_bytes: u64,
}

impl PlanLimits {
    /// Limits of the built-in free plan: 20 messages/day, 100 MB storage,
    /// 5 MB per file.
    #[must_use]
    pub fn free() -> Self {
        Self {
            max_messages_per_day: Some(20),
            max_storage_bytes: 100 * MB,
            max_file_size_bytes: 5 * MB,
        }
    }

    /// Limits of the built-in pro plan.
    #[must_use]
    pub fn pro() -> Self {
        Self {
            max_messages_per_day: None,
            max_storage_bytes: 5 * GB,
            max_file_size_bytes: 50 * MB,
        }
    }

    /// Returns `true` if adding `bytes_to_add` to `current_bytes` stays within
    /// the storage ceiling (inclusive).
    #[must_use]
    pub fn can_add_storage(&self, current_bytes: u64, bytes_to_add: u64) -> bool {
        current_bytes
            .checked_add(bytes_to_add)
            .is_some_and(|total| total <= self.max_storage_bytes)
    }

    /// Returns `true` if a single file of `size` bytes is within the per-file
    /// ceiling (inclusive).
    #[must_use]
    pub fn can_upload_file(&self, size: u64) -> bool {
        size <= self.max_file_size_bytes
    }
}

/// A subscription plan: a feature set plus limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    /// Human-readable name shown on the pricing page.
    #[serde(default)]
    pub name: String,
    /// Feature tags, in display order.
    #[serde(default)]
    pub features: Vec<String>,
    pub limits: PlanLimits,
}

impl Plan {
    /// The built-in free plan.
    #[must_use]
    pub fn free() -> Self {
        Self {
            id: PlanId::new(FREE_PLAN_ID),
            name: "Free".to_owned(),
            features: vec!["basic_ai_access".to_owned(), "limited_storage".to_owned()],
            limits: PlanLimits::free(),
        }
    }

    /// The built-in pro plan.
    #[must_use]
    pub fn pro() -> Self {
        Self {
            id: PlanId::new(PRO_PLAN_ID),
            name: "Pro".to_owned(),
            features: [
                "basic_ai_access",
                "all_ai_models",
                "unlimited_messages",
                "advanced_notes",
                "priority_tasks",
                "expanded_storage",
                "priority_support",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            limits: PlanLimits::pro(),
        }
    }

    /// The plan table used when no configuration overrides it.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![Self::free(), Self::pro()]
    }

    /// Returns `true` if `tag` is one of this plan's features.
    #[must_use]
    pub fn has_feature(&self, tag: &str) -> bool {
        self.features.iter().any(|f| f == tag)
    }
}
