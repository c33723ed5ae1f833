//! # warden-rbac: Record-level access rules for Warden
//!
//! Two views of the same nine rules:
//!
//! - [`build_filter`]: a coarse boolean filter handed to the search
//!   collaborator so it returns fewer candidates
//! - [`check_access`]: the authoritative check of a single record, with a
//!   trace of which rules passed
//!
//! Both operate on a [`Subject`], the caller's profile merged with its
//! dynamically resolved grants.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use warden_config::WardenConfig;
//! use warden_rbac::{CheckContext, Subject, build_filter, check_access};
//! use warden_types::{CallerProfile, Classification, RecordPermission, RoleLevel};
//!
//! let config = WardenConfig::default();
//! let subject = Subject::from(&CallerProfile::new("u-1", "acme", RoleLevel::User, Classification::Internal));
//! let now = Utc::now();
//!
//! let record = RecordPermission::public("handbook");
//! let filter = build_filter(&subject, &config, now).unwrap();
//! assert!(filter.matches(&record));
//!
//! let result = check_access(&record, &subject, &config.engine, &CheckContext::new(now, chrono_tz::UTC));
//! assert!(result.allowed);
//! assert_eq!(result.applied_rules.len(), 9);
//! ```

pub mod enforcement;
pub mod filter;
pub mod subject;

pub use enforcement::{
    AccessDecisionResult, CheckContext, Predicate, RULE_ADMIN_BYPASS, RULE_DISABLED, check_access,
};
pub use filter::{FilterError, FilterExpr, build_filter, fields};
pub use subject::Subject;
