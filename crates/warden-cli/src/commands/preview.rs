//! Single-caller previews: the search filter and a one-record check.

use anyhow::Result;
use warden::{AccessDecisionEngine, CallerProfile, RecordPermission, WardenConfig};

use super::{instant, read_json};

/// Print the OpenSearch filter built for a caller.
pub fn filter(config: WardenConfig, profile: &str, at: Option<&str>) -> Result<()> {
    let profile: CallerProfile = read_json(profile)?;
    let now = instant(at)?;
    let engine = AccessDecisionEngine::builder(config).build();

    let runtime = tokio::runtime::Runtime::new()?;
    let filter = runtime.block_on(engine.filter_for(&profile, now))?;
    println!("{}", serde_json::to_string_pretty(&filter.to_json())?);
    Ok(())
}

/// Print the decision for one record.
pub fn check(config: WardenConfig, profile: &str, record: &str, at: Option<&str>) -> Result<()> {
    let profile: CallerProfile = read_json(profile)?;
    let record: RecordPermission = read_json(record)?;
    let now = instant(at)?;
    let engine = AccessDecisionEngine::builder(config).build();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(engine.check_record(&profile, &record, now));
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
