//! Resolved grant sets and temporary grants.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_types::Classification;

/// Access elevated for a limited period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryGrant {
    pub grant_id: Uuid,
    pub caller_id: String,
    /// Project or record identifier the grant was requested for.
    pub resource: String,
    pub classification: Classification,
    pub granted_by: String,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
}

impl TemporaryGrant {
    /// Grants are active strictly before their expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Effective dynamic grants for one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGrants {
    pub projects: BTreeSet<String>,
    pub organizations: BTreeSet<String>,
    pub departments: BTreeSet<String>,
    pub classifications: BTreeSet<Classification>,
    pub temporary_grants: Vec<TemporaryGrant>,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedGrants {
    pub fn empty(resolved_at: DateTime<Utc>) -> Self {
        Self {
            projects: BTreeSet::new(),
            organizations: BTreeSet::new(),
            departments: BTreeSet::new(),
            classifications: BTreeSet::new(),
            temporary_grants: Vec::new(),
            resolved_at,
        }
    }

    /// Sorts temporary grants by id and drops duplicates.
    ///
    /// The set-backed fields are already ordered and unique.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.temporary_grants.sort_by_key(|g| g.grant_id);
        self.temporary_grants.dedup_by_key(|g| g.grant_id);
        self
    }

    /// Highest classification granted dynamically, if any.
    pub fn max_classification(&self) -> Option<Classification> {
        self.classifications.iter().max().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
            && self.organizations.is_empty()
            && self.departments.is_empty()
            && self.classifications.is_empty()
            && self.temporary_grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 3, 0, 0).unwrap()
    }

    fn grant(id: u128, class: Classification) -> TemporaryGrant {
        TemporaryGrant {
            grant_id: Uuid::from_u128(id),
            caller_id: "u-1".to_string(),
            resource: "project_alpha".to_string(),
            classification: class,
            granted_by: "auto".to_string(),
            reason: "incident".to_string(),
            expires_at: at() + Duration::minutes(30),
        }
    }

    #[test]
    fn test_grant_expiry_is_exclusive() {
        let g = grant(1, Classification::Internal);
        assert!(g.is_active(at()));
        assert!(!g.is_active(g.expires_at));
    }

    #[test]
    fn test_max_classification() {
        let mut grants = ResolvedGrants::empty(at());
        assert_eq!(grants.max_classification(), None);
        grants.classifications.insert(Classification::Internal);
        grants.classifications.insert(Classification::Confidential);
        assert_eq!(grants.max_classification(), Some(Classification::Confidential));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ResolvedGrants::empty(at())).unwrap();
        assert!(json.get("temporaryGrants").is_some());
        assert!(json.get("resolvedAt").is_some());
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            ids in prop::collection::vec(0u128..8, 0..16),
            projects in prop::collection::vec("[a-d]{1,2}", 0..12),
        ) {
            let mut grants = ResolvedGrants::empty(at());
            grants.projects.extend(projects);
            grants.temporary_grants = ids
                .iter()
                .map(|id| grant(*id, Classification::Internal))
                .collect();

            let once = grants.normalize();
            let twice = once.clone().normalize();
            prop_assert_eq!(&once, &twice);

            let unique: BTreeSet<_> = once.temporary_grants.iter().map(|g| g.grant_id).collect();
            prop_assert_eq!(unique.len(), once.temporary_grants.len());
            prop_assert!(once.temporary_grants.windows(2).all(|w| w[0].grant_id < w[1].grant_id));
        }
    }
}
