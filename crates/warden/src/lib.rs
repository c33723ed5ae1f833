//! # Warden
//!
//! Access control decision engine for search.
//!
//! Warden sits between a caller and a search index. For every request it
//! decides whether the caller may search at all, tells the index which
//! records are worth returning, and re-checks each returned record before it
//! is shown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                                Warden                                │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────┐   ┌───────┐ │
//! │  │   Time   │ → │   Geo    │ → │ Dynamic  │ → │ Filter │ → │ Check │ │
//! │  │ (hours)  │   │ (origin) │   │ (grants) │   │ (DSL)  │   │(rules)│ │
//! │  └──────────┘   └──────────┘   └──────────┘   └────────┘   └───────┘ │
//! │                             ↓ every step ↓                           │
//! │                            ┌────────────────┐                        │
//! │                            │   Audit log    │                        │
//! │                            └────────────────┘                        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::{TimeZone, Utc};
//! use serde_json::json;
//! use warden::{
//!     AccessDecisionEngine, CallerProfile, Classification, DecisionRequest, GeoLocation,
//!     InMemorySearchBackend, RecordPermission, RoleLevel, SearchHit, StaticGeoLocator,
//!     WardenConfig,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = AccessDecisionEngine::builder(WardenConfig::default())
//!     .with_geo_locator(Arc::new(StaticGeoLocator::new().with_range(
//!         "203.0.113.0/24".parse().unwrap(),
//!         GeoLocation::new("JP", "Tokyo"),
//!     )))
//!     .with_search_backend(Arc::new(InMemorySearchBackend::new(vec![SearchHit::new(
//!         RecordPermission::public("handbook"),
//!         json!({ "title": "Employee Handbook" }),
//!     )])))
//!     .build();
//!
//! let caller = CallerProfile::new("u-1", "acme", RoleLevel::User, Classification::Internal);
//! let request = DecisionRequest::new(caller, "handbook", "203.0.113.10", "s-1");
//!
//! // Tuesday 10:00 in Tokyo.
//! let now = Utc.with_ymd_and_hms(2025, 6, 10, 1, 0, 0).unwrap();
//! let decision = engine.authorize_at(request, now).await;
//! assert!(decision.allowed());
//! assert_eq!(decision.results.len(), 1);
//! # });
//! ```
//!
//! # Crates
//!
//! - **Foundation**: `warden-types`, `warden-config`
//! - **Context**: `warden-abac` (time and geographic gates)
//! - **Grants**: `warden-dynamic` (membership, hierarchy, temporary access)
//! - **Records**: `warden-rbac` (pre-filter and per-record check)
//! - **Trail**: `warden-audit`

mod engine;
mod error;
mod history;
mod pipeline;
mod request;
mod search;

// Engine
pub use engine::{AccessDecisionEngine, EngineBuilder, REQUEST_RESOURCE, TEMPORARY_ACCESS_RESOURCE};
pub use error::{DecisionError, Result};
pub use history::AuditAccessHistory;
pub use pipeline::{PipelineState, StateTrace};
pub use request::{Decision, DecisionRequest, DecisionResponse};
pub use search::{InMemorySearchBackend, SearchBackend, SearchError, SearchHit};

// Re-export core types
pub use warden_types::{
    CallerProfile, Classification, GeoLocation, RecordPermission, RoleLevel, TimeWindow,
};

// Re-export configuration
pub use warden_config::{ConfigLoader, Environment, WardenConfig};

// Re-export context evaluation
pub use warden_abac::{
    GeoDecision, GeoLocator, IpRange, LookupError, StaticGeoLocator, TimeDecision, VpnDetector,
};

// Re-export dynamic permissions
pub use warden_dynamic::{
    DynamicPermissionResolver, GrantSource, InvalidationEvent, RefreshHandle, ResolvedGrants,
    TemporaryAccessError, TemporaryAccessOutcome, TemporaryAccessRequest, TemporaryGrant,
};

// Re-export record rules
pub use warden_rbac::{AccessDecisionResult, FilterExpr, Subject};

// Re-export audit
pub use warden_audit::{AuditAction, AuditLogger, AuditQuery, AuditRecord, AuditResult, AuditStore};
