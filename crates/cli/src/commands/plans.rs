use atrium_entitlements::{EntitlementsConfig, format_bytes};

use crate::OutputFormat;

pub fn run(config: &EntitlementsConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = super::registry(config)?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(registry.plans())?);
        }
        OutputFormat::Text => {
            let default_id = &registry.default_plan().id;
            println!("{} plans:", registry.plans().len());
            for plan in registry.plans() {
                let marker = if plan.id == *default_id { "*" } else { " " };
                let messages = plan
                    .limits
                    .max_messages_per_day
                    .map_or_else(|| "unlimited".to_owned(), |n| n.to_string());
                println!(
                    " {marker} {id} ({name}) | storage {storage} | file {file} | messages/day {messages}",
                    id = plan.id,
                    name = plan.name,
                    storage = format_bytes(plan.limits.max_storage_bytes),
                    file = format_bytes(plan.limits.max_file_size_bytes),
                );
                if !plan.features.is_empty() {
                    println!("     features: {}", plan.features.join(", "));
                }
            }
            println!(
                "Billing period: {} days, storage root: {}",
                config.billing_period_days, config.storage_root
            );
        }
    }
    Ok(())
}
