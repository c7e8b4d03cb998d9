use atrium_entitlements::{AdmissionDecision, EntitlementError, EntitlementsConfig, format_bytes};
use clap::Args;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Size of the candidate file (e.g. `3MB`).
    #[arg(value_parser = super::parse_size)]
    pub size: u64,

    /// Bytes the user already stores.
    #[arg(long, default_value = "0", value_parser = super::parse_size)]
    pub used: u64,

    /// Plan to evaluate against. Defaults to the configured default plan.
    #[arg(long)]
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    plan: &'a str,
    used_bytes: u64,
    size_bytes: u64,
    #[serde(flatten)]
    decision: AdmissionDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub fn run(config: &EntitlementsConfig, args: &CheckArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = super::registry(config)?;
    let plan = match &args.plan {
        Some(id) => registry.get(id)?,
        None => registry.default_plan(),
    };
    let decision = AdmissionDecision::decide(&plan.limits, args.used, args.size);
    let message = match decision {
        AdmissionDecision::Admitted { .. } => None,
        AdmissionDecision::Denied { reason } => {
            Some(EntitlementError::from(reason).user_message())
        }
    };

    match format {
        OutputFormat::Json => {
            let output = CheckOutput {
                plan: &plan.id,
                used_bytes: args.used,
                size_bytes: args.size,
                decision,
                message,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => match decision {
            AdmissionDecision::Admitted {
                remaining_bytes, ..
            } => {
                println!(
                    "ADMITTED: {} on plan '{}' ({} left afterwards)",
                    format_bytes(args.size),
                    plan.id,
                    format_bytes(remaining_bytes)
                );
            }
            AdmissionDecision::Denied { .. } => {
                println!(
                    "DENIED: {}",
                    message.as_deref().unwrap_or("upload not admitted")
                );
            }
        },
    }
    Ok(())
}
