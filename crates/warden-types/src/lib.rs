//! # warden-types: Core types for the Warden access-control engine
//!
//! Shared vocabulary used by every other Warden crate:
//!
//! - [`RoleLevel`] and [`Classification`]: closed hierarchies with fixed
//!   lookup tables (see [`hierarchy`])
//! - [`CallerProfile`]: who is asking
//! - [`RecordPermission`]: what a record demands
//! - [`GeoLocation`]: where a request originates

pub mod hierarchy;
pub mod profile;
pub mod record;

use serde::{Deserialize, Serialize};

pub use hierarchy::{Classification, LevelParseError, RoleLevel};
pub use profile::CallerProfile;
pub use record::{RecordPermission, TimeWindow, WILDCARD_MARKERS, department_key, list_admits};

/// Resolved location of a network origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: String,
    /// Region or prefecture name.
    pub region: String,
    /// City, when the lookup provides one.
    #[serde(default)]
    pub city: Option<String>,
    /// Which lookup produced this record (e.g. `"api"`, `"static"`).
    #[serde(default)]
    pub source: String,
}

impl GeoLocation {
    /// Creates a location with a country and region.
    pub fn new(country_code: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            region: region.into(),
            city: None,
            source: String::new(),
        }
    }

    /// Tags the location with the lookup that produced it.
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}
