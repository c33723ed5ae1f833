//! CLI command implementations.

pub mod config;
pub mod decide;
pub mod preview;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

/// Reads and parses a JSON fixture.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let text = std::fs::read_to_string(Path::new(path)).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {path}"))
}

/// Parses `--at`, defaulting to the current instant.
pub fn instant(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(text) => Ok(DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid timestamp {text:?}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
