//! Upstream directories the resolver consults.
//!
//! Production deployments back these with membership and HR services; the
//! static implementations serve tests, the CLI and single-node setups.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_abac::LookupError;
use warden_types::Classification;

use crate::grants::TemporaryGrant;

/// Projects and organizations a caller belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub projects: BTreeSet<String>,
    pub organizations: BTreeSet<String>,
}

/// Where a caller sits in the organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgPlacement {
    pub department: String,
    pub classification: Classification,
}

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn memberships(&self, caller_id: &str) -> Result<Membership, LookupError>;
}

#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// `None` when the caller has no recorded placement.
    async fn placement(&self, caller_id: &str) -> Result<Option<OrgPlacement>, LookupError>;
}

/// Persistence for temporary grants.
#[async_trait]
pub trait TemporaryGrantStore: Send + Sync {
    async fn save(&self, grant: TemporaryGrant) -> Result<(), LookupError>;

    /// Grants for `caller_id` still active at `now`.
    async fn active_grants(&self, caller_id: &str, now: DateTime<Utc>) -> Result<Vec<TemporaryGrant>, LookupError>;
}

// ============================================================================
// Static implementations
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct StaticMembershipDirectory {
    members: HashMap<String, Membership>,
}

impl StaticMembershipDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, caller_id: impl Into<String>, projects: &[&str], organizations: &[&str]) -> Self {
        self.members.insert(
            caller_id.into(),
            Membership {
                projects: projects.iter().map(ToString::to_string).collect(),
                organizations: organizations.iter().map(ToString::to_string).collect(),
            },
        );
        self
    }
}

#[async_trait]
impl MembershipDirectory for StaticMembershipDirectory {
    async fn memberships(&self, caller_id: &str) -> Result<Membership, LookupError> {
        Ok(self.members.get(caller_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticOrgDirectory {
    placements: HashMap<String, OrgPlacement>,
}

impl StaticOrgDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placement(
        mut self,
        caller_id: impl Into<String>,
        department: impl Into<String>,
        classification: Classification,
    ) -> Self {
        self.placements.insert(
            caller_id.into(),
            OrgPlacement {
                department: department.into(),
                classification,
            },
        );
        self
    }
}

#[async_trait]
impl OrgDirectory for StaticOrgDirectory {
    async fn placement(&self, caller_id: &str) -> Result<Option<OrgPlacement>, LookupError> {
        Ok(self.placements.get(caller_id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<Vec<TemporaryGrant>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemporaryGrantStore for InMemoryGrantStore {
    async fn save(&self, grant: TemporaryGrant) -> Result<(), LookupError> {
        self.grants
            .write()
            .map_err(|_| LookupError::failed("grant store", "lock poisoned"))?
            .push(grant);
        Ok(())
    }

    async fn active_grants(&self, caller_id: &str, now: DateTime<Utc>) -> Result<Vec<TemporaryGrant>, LookupError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| LookupError::failed("grant store", "lock poisoned"))?;
        Ok(grants
            .iter()
            .filter(|g| g.caller_id == caller_id && g.is_active(now))
            .cloned()
            .collect())
    }
}
