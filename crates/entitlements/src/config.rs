use std::path::Path;

use atrium_core::{
    AiModel, DEFAULT_BILLING_PERIOD_DAYS, DEFAULT_STORAGE_ROOT, FREE_PLAN_ID, Plan,
    is_valid_path_segment,
};
use serde::{Deserialize, Serialize};

use crate::error::EntitlementError;

/// Engine configuration, loaded from a TOML file.
///
/// Every section is optional; an empty file yields the built-in plan table
/// and model catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementsConfig {
    /// Plan table. Defaults to the built-in free and pro plans.
    #[serde(default = "Plan::builtin")]
    pub plans: Vec<Plan>,
    /// Plan granted to users who have no subscription yet.
    #[serde(default = "default_plan")]
    pub default_plan: String,
    /// Length of a paid billing period.
    #[serde(default = "default_billing_period_days")]
    pub billing_period_days: u32,
    /// Root folder of all user blobs.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    /// AI model catalogue.
    #[serde(default = "AiModel::builtin")]
    pub models: Vec<AiModel>,
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            plans: Plan::builtin(),
            default_plan: default_plan(),
            billing_period_days: default_billing_period_days(),
            storage_root: default_storage_root(),
            models: AiModel::builtin(),
        }
    }
}

fn default_plan() -> String {
    FREE_PLAN_ID.to_owned()
}

fn default_billing_period_days() -> u32 {
    DEFAULT_BILLING_PERIOD_DAYS
}

fn default_storage_root() -> String {
    DEFAULT_STORAGE_ROOT.to_owned()
}

impl EntitlementsConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, EntitlementError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| EntitlementError::Configuration(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EntitlementError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EntitlementError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the fields that the plan registry does not.
    pub fn validate(&self) -> Result<(), EntitlementError> {
        if self.billing_period_days == 0 {
            return Err(EntitlementError::Configuration(
                "billing_period_days must be at least 1".into(),
            ));
        }
        if self.storage_root.is_empty() || !self.storage_root.split('/').all(is_valid_path_segment)
        {
            return Err(EntitlementError::Configuration(format!(
                "invalid storage_root: {:?}",
                self.storage_root
            )));
        }
        let mut model_ids: Vec<&str> = self.models.iter().map(|m| m.id.as_str()).collect();
        model_ids.sort_unstable();
        if let Some(dup) = model_ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(EntitlementError::Configuration(format!(
                "duplicate model id: {}",
                dup[0]
            )));
        }
        Ok(())
    }

    /// The billing period as a duration.
    pub fn billing_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.billing_period_days))
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::{MB, PRO_PLAN_ID};

    use super::*;

    #[test]
    fn empty_config_uses_builtins() {
        let config = EntitlementsConfig::from_toml_str("").unwrap();
        assert_eq!(config, EntitlementsConfig::default());
        assert_eq!(config.plans.len(), 2);
        assert_eq!(config.billing_period_days, 30);
        assert_eq!(config.storage_root, "users");
        assert_eq!(config.models.len(), 4);
    }

    #[test]
    fn parse_custom_plans() {
        let text = r#"
            default_plan = "starter"
            billing_period_days = 14

            [[plans]]
            id = "starter"
            name = "Starter"
            features = ["basic_ai_access"]
            [plans.limits]
            maxMessagesPerDay = 5
            maxStorageBytes = 10485760
            maxFileSizeBytes = 1048576

            [[plans]]
            id = "pro"
            features = ["all_ai_models"]
            [plans.limits]
            maxStorageBytes = 1073741824
            maxFileSizeBytes = 52428800
        "#;
        let config = EntitlementsConfig::from_toml_str(text).unwrap();
        assert_eq!(config.default_plan, "starter");
        assert_eq!(config.billing_period(), chrono::Duration::days(14));
        assert_eq!(config.plans[0].limits.max_storage_bytes, 10 * MB);
        assert_eq!(config.plans[0].limits.max_messages_per_day, Some(5));
        assert_eq!(config.plans[1].id.as_str(), PRO_PLAN_ID);
        assert_eq!(config.plans[1].limits.max_messages_per_day, None);
    }

    #[test]
    fn rejects_zero_billing_period() {
        let err = EntitlementsConfig::from_toml_str("billing_period_days = 0").unwrap_err();
        assert!(matches!(err, EntitlementError::Configuration(_)));
    }

    #[test]
    fn rejects_bad_storage_root() {
        for root in ["", "a//b", "../escape"] {
            let config = EntitlementsConfig {
                storage_root: root.into(),
                ..EntitlementsConfig::default()
            };
            assert!(config.validate().is_err(), "{root:?} should be rejected");
        }
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = EntitlementsConfig::from_toml_str("plans = 3").unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }
}
