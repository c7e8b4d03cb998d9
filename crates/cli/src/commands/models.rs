use atrium_core::Subscription;
use atrium_entitlements::{Clock, EntitlementEvaluator, EntitlementsConfig, SystemClock};
use clap::Args;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Only show the models available on this plan.
    #[arg(long)]
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModelRow<'a> {
    id: &'a str,
    name: &'a str,
    requires_pro: bool,
    plans: Vec<&'a str>,
}

pub fn run(config: &EntitlementsConfig, args: &ModelsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = super::registry(config)?;
    let evaluator = EntitlementEvaluator::from_registry(&registry);
    let now = SystemClock.now();

    let plans: Vec<_> = match &args.plan {
        Some(id) => vec![registry.get(id)?],
        None => registry.plans().iter().collect(),
    };
    let snapshots: Vec<Subscription> = plans
        .iter()
        .map(|plan| Subscription::grant("cli", plan, now, None))
        .collect();

    let rows: Vec<ModelRow<'_>> = config
        .models
        .iter()
        .map(|model| ModelRow {
            id: &model.id,
            name: &model.name,
            requires_pro: model.requires_pro,
            plans: snapshots
                .iter()
                .filter(|sub| evaluator.model_allowed(Some(sub), model, now))
                .map(|sub| sub.plan_id.as_str())
                .collect(),
        })
        .filter(|row| args.plan.is_none() || !row.plans.is_empty())
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            println!("{} models:", rows.len());
            for row in &rows {
                let tier = if row.requires_pro { "PRO " } else { "FREE" };
                println!(
                    "  [{tier}] {id} ({name}) | plans: {plans}",
                    id = row.id,
                    name = row.name,
                    plans = row.plans.join(", "),
                );
            }
        }
    }
    Ok(())
}
