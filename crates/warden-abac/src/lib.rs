//! # warden-abac: Contextual restrictions for Warden
//!
//! Evaluators for the request context rather than the record:
//!
//! - [`TimeRestrictionEvaluator`]: business hours, holidays, emergency and
//!   after-hours exemptions, evaluated in the configured IANA timezone
//! - [`GeographicRestrictionEvaluator`]: origin lookup, VPN detection,
//!   country/region/IP-range allowlists and location risk
//!
//! Both evaluators fail closed: any lookup failure or unusable input denies.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use warden_abac::TimeRestrictionEvaluator;
//! use warden_config::TimeRestrictionConfig;
//! use warden_types::RoleLevel;
//!
//! let evaluator = TimeRestrictionEvaluator::new(TimeRestrictionConfig::default());
//!
//! // Tuesday 10:00 in Tokyo.
//! let now = Utc.with_ymd_and_hms(2025, 6, 10, 1, 0, 0).unwrap();
//! assert!(evaluator.evaluate("u-1", RoleLevel::User, now).allowed);
//!
//! // Tuesday 20:00 in Tokyo.
//! let late = Utc.with_ymd_and_hms(2025, 6, 10, 11, 0, 0).unwrap();
//! assert!(!evaluator.evaluate("u-1", RoleLevel::User, late).allowed);
//! ```

pub mod cidr;
pub mod geo;
pub mod lookup;
pub mod risk;
pub mod time;

pub use cidr::{IpRange, RangeParseError};
pub use geo::{GeoAccessType, GeoDecision, GeographicRestrictionEvaluator};
pub use lookup::{
    AccessHistory, CachingGeoLocator, GeoLocator, LookupError, NoHistory, PrivateRangeHeuristic,
    StaticGeoLocator, VpnDetector, with_timeout,
};
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
pub use time::{TimeAccessType, TimeDecision, TimeRestrictionEvaluator, window_admits};
