use std::collections::HashMap;

use atrium_core::{FREE_PLAN_ID, Plan, PlanId};

use crate::error::EntitlementError;

/// Read-only table of the plans users can hold.
///
/// Built from explicit configuration at construction; there is no global
/// instance.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    plans: Vec<Plan>,
    index: HashMap<PlanId, usize>,
    default_plan: usize,
}

impl PlanRegistry {
    /// Build a registry from `plans`, granting `default_plan` to new users.
    ///
    /// Fails if the table is empty, an id is repeated, or `default_plan` is
    /// not in the table.
    pub fn new(plans: Vec<Plan>, default_plan: &str) -> Result<Self, EntitlementError> {
        if plans.is_empty() {
            return Err(EntitlementError::Configuration(
                "plan table must not be empty".into(),
            ));
        }
        let mut index = HashMap::with_capacity(plans.len());
        for (i, plan) in plans.iter().enumerate() {
            if plan.id.is_empty() {
                return Err(EntitlementError::Configuration(
                    "plan id must not be empty".into(),
                ));
            }
            if index.insert(plan.id.clone(), i).is_some() {
                return Err(EntitlementError::Configuration(format!(
                    "duplicate plan id: {}",
                    plan.id
                )));
            }
        }
        let default_plan = *index.get(default_plan).ok_or_else(|| {
            EntitlementError::Configuration(format!("default plan not in table: {default_plan}"))
        })?;
        Ok(Self {
            plans,
            index,
            default_plan,
        })
    }

    /// The built-in free and pro plans, defaulting to free.
    pub fn builtin() -> Self {
        let plans = Plan::builtin();
        let index = plans
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        Self {
            plans,
            index,
            default_plan: 0,
        }
    }

    /// Look up a plan by id.
    pub fn get(&self, plan_id: &str) -> Result<&Plan, EntitlementError> {
        self.index
            .get(plan_id)
            .map(|&i| &self.plans[i])
            .ok_or_else(|| EntitlementError::PlanNotFound(plan_id.to_owned()))
    }

    pub fn contains(&self, plan_id: &str) -> bool {
        self.index.contains_key(plan_id)
    }

    /// The plan granted to users without a subscription.
    pub fn default_plan(&self) -> &Plan {
        &self.plans[self.default_plan]
    }

    /// The `"free"` plan if configured, otherwise the default plan.
    pub fn free_plan(&self) -> &Plan {
        self.get(FREE_PLAN_ID)
            .unwrap_or_else(|_| self.default_plan())
    }

    /// All plans in configuration order.
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}
