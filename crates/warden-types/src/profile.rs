//! Caller permission profiles.
//!
//! A profile is supplied by the identity collaborator once per request and is
//! never mutated while a decision is being made.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hierarchy::{Classification, RoleLevel};

/// Permission profile of the caller making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerProfile {
    /// Stable caller identity.
    pub caller_id: String,
    /// Organization the caller belongs to.
    pub organization: String,
    /// Department within the organization, if any.
    #[serde(default)]
    pub department: Option<String>,
    /// Privilege level.
    pub role: RoleLevel,
    /// Highest data classification the caller is cleared for.
    #[serde(alias = "dataClassification")]
    pub classification: Classification,
    /// Tags the caller may read.
    #[serde(default)]
    pub accessible_tags: BTreeSet<String>,
    /// Projects the caller may read.
    #[serde(default)]
    pub accessible_projects: BTreeSet<String>,
    /// Geographic restriction entries. `None` means unrestricted.
    #[serde(default)]
    pub geo_restrictions: Option<Vec<String>>,
    /// Instant after which the profile must no longer be honoured.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CallerProfile {
    /// Creates a profile with required fields and empty grants.
    pub fn new(
        caller_id: impl Into<String>,
        organization: impl Into<String>,
        role: RoleLevel,
        classification: Classification,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            organization: organization.into(),
            department: None,
            role,
            classification,
            accessible_tags: BTreeSet::new(),
            accessible_projects: BTreeSet::new(),
            geo_restrictions: None,
            expires_at: None,
        }
    }

    /// Sets the department.
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Adds an accessible tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.accessible_tags.insert(tag.into());
        self
    }

    /// Adds an accessible project.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.accessible_projects.insert(project.into());
        self
    }

    /// Sets the geographic restriction entries.
    pub fn with_geo_restrictions(mut self, entries: Vec<String>) -> Self {
        self.geo_restrictions = Some(entries);
        self
    }

    /// Sets the profile expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns whether the profile has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Returns whether the caller is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == RoleLevel::Admin
    }
}
