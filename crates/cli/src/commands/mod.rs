pub mod check;
pub mod models;
pub mod plans;
pub mod simulate;

use atrium_core::{GB, MB};
use atrium_entitlements::{EntitlementsConfig, PlanRegistry};

/// Build the plan registry described by `config`.
pub fn registry(config: &EntitlementsConfig) -> anyhow::Result<PlanRegistry> {
    Ok(PlanRegistry::new(config.plans.clone(), &config.default_plan)?)
}

/// Parse a byte count such as `1500`, `512K`, `5MB` or `2GiB`.
///
/// Units are binary: `1MB == 1MiB == 1048576`.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {input:?}"))?;
    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => MB,
        "g" | "gb" | "gib" => GB,
        other => return Err(format!("unknown size unit: {other:?}")),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {input:?}"))
}
