//! # warden-dynamic: Dynamic permission resolution
//!
//! Grants that change independently of a caller's static profile:
//!
//! - **Project membership**: projects map to the classifications their
//!   members may read
//! - **Organization hierarchy**: a caller's department plus everything below
//!   it, to a bounded depth
//! - **Temporary access**: time-boxed elevation, auto-approved within limits
//!
//! Results are cached per caller behind the [`PermissionCache`] trait and
//! refreshed on a timer by [`spawn_refresh`]. Upstream lookups are retried
//! with backoff; when they keep failing the configured fallback decides
//! between denying, allowing on the static profile, or serving the last known
//! grants.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use chrono::Utc;
//! use warden_config::WardenConfig;
//! use warden_dynamic::{DynamicPermissionResolver, GrantSource, StaticMembershipDirectory};
//! use warden_types::Classification;
//!
//! let config = WardenConfig::default();
//! let resolver = DynamicPermissionResolver::new(&config).with_membership_directory(Arc::new(
//!     StaticMembershipDirectory::new().with_member("alice", &["project_beta"], &["acme"]),
//! ));
//!
//! let resolution = resolver.resolve("alice", Utc::now()).await.unwrap();
//! assert_eq!(resolution.source, GrantSource::Fresh);
//! assert_eq!(resolution.grants.max_classification(), Some(Classification::Internal));
//! # });
//! ```

pub mod cache;
pub mod directory;
pub mod grants;
pub mod refresh;
pub mod resolver;
pub mod retry;
pub mod temporary;

pub use cache::{CachedPermissionEntry, DYNAMIC_PERMISSIONS_RESOURCE, InMemoryPermissionCache, PermissionCache};
pub use directory::{
    InMemoryGrantStore, Membership, MembershipDirectory, OrgDirectory, OrgPlacement, StaticMembershipDirectory,
    StaticOrgDirectory, TemporaryGrantStore,
};
pub use grants::{ResolvedGrants, TemporaryGrant};
pub use refresh::{RefreshHandle, spawn_refresh};
pub use resolver::{
    DynamicPermissionResolver, GrantSource, InvalidationEvent, RefreshSummary, Resolution, ResolveError,
    descendant_departments,
};
pub use retry::RetryPolicy;
pub use temporary::{AUTO_APPROVER, TemporaryAccessError, TemporaryAccessOutcome, TemporaryAccessRequest};
