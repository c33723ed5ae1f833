//! The effective permissions a decision is made against.

use std::collections::BTreeSet;

use serde::Serialize;
use warden_dynamic::ResolvedGrants;
use warden_types::{CallerProfile, Classification, RoleLevel, department_key};

/// A caller profile merged with its dynamic grants.
///
/// Organizations, departments and projects are unions of the static profile
/// and the resolved grants. Clearance is the higher of the profile's
/// classification and the highest dynamically granted one. Department names
/// are held in [`department_key`] form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub caller_id: String,
    pub role: RoleLevel,
    pub clearance: Classification,
    pub organizations: BTreeSet<String>,
    pub departments: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub projects: BTreeSet<String>,
    pub geo_restrictions: Option<Vec<String>>,
}

impl Subject {
    pub fn with_grants(mut self, grants: &ResolvedGrants) -> Self {
        self.organizations.extend(grants.organizations.iter().cloned());
        self.departments
            .extend(grants.departments.iter().map(|d| department_key(d)));
        self.projects.extend(grants.projects.iter().cloned());
        if let Some(granted) = grants.max_classification() {
            self.clearance = self.clearance.max(granted);
        }
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == RoleLevel::Admin
    }
}

impl From<&CallerProfile> for Subject {
    fn from(profile: &CallerProfile) -> Self {
        Self {
            caller_id: profile.caller_id.clone(),
            role: profile.role,
            clearance: profile.classification,
            organizations: BTreeSet::from([profile.organization.clone()]),
            departments: profile.department.iter().map(|d| department_key(d)).collect(),
            tags: profile.accessible_tags.clone(),
            projects: profile.accessible_projects.clone(),
            geo_restrictions: profile.geo_restrictions.clone(),
        }
    }
}
