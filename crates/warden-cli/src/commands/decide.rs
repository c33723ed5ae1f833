//! Full decision against local fixtures.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use warden::{
    AccessDecisionEngine, DecisionRequest, GeoLocation, InMemorySearchBackend, IpRange, SearchHit,
    StaticGeoLocator, WardenConfig,
};

use super::{instant, read_json};

/// One row of the `--locations` table.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationEntry {
    range: String,
    #[serde(flatten)]
    location: GeoLocation,
}

fn locator(path: Option<&str>) -> Result<StaticGeoLocator> {
    let Some(path) = path else {
        return Ok(StaticGeoLocator::new());
    };
    let entries: Vec<LocationEntry> = read_json(path)?;
    entries.into_iter().try_fold(StaticGeoLocator::new(), |locator, entry| -> Result<StaticGeoLocator> {
        let range: IpRange = entry
            .range
            .parse()
            .with_context(|| format!("Invalid range {:?} in {path}", entry.range))?;
        Ok(locator.with_range(range, entry.location))
    })
}

/// Decide a request and print the response, the visible ids and the state trace.
pub fn run(
    config: WardenConfig,
    request: &str,
    records: &str,
    locations: Option<&str>,
    at: Option<&str>,
) -> Result<()> {
    let request: DecisionRequest = read_json(request)?;
    let hits: Vec<SearchHit> = read_json(records)?;
    let now = instant(at)?;

    let engine = AccessDecisionEngine::builder(config)
        .with_geo_locator(Arc::new(locator(locations)?))
        .with_search_backend(Arc::new(InMemorySearchBackend::new(hits)))
        .build();

    let runtime = tokio::runtime::Runtime::new()?;
    let decision = runtime.block_on(engine.authorize_at(request, now));

    let visible: Vec<&str> = decision.results.iter().map(SearchHit::record_id).collect();
    let output = json!({
        "response": decision.response,
        "visible": visible,
        "states": decision.states,
        "requireAdditionalAuth": decision.require_additional_auth,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
