//! Permission metadata attached to each searchable record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hierarchy::{Classification, RoleLevel};

/// Markers that open an allow-list to every caller.
pub const WILDCARD_MARKERS: [&str; 2] = ["public", "all"];

/// Canonical form of a department name. Departments compare
/// case-insensitively everywhere, so both sides go through this.
pub fn department_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Returns whether an allow-list contains `value` or a wildcard marker.
pub fn list_admits(list: &[String], value: &str) -> bool {
    list.iter()
        .any(|entry| entry == value || WILDCARD_MARKERS.contains(&entry.as_str()))
}

/// Validity window of a record.
///
/// Hours and weekdays are evaluated in the deployment's configured timezone.
/// Weekdays use 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeWindow {
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub allowed_hours: Option<Vec<u8>>,
    pub allowed_days: Option<Vec<u8>>,
}

impl TimeWindow {
    /// Creates a window bounded by two instants.
    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            valid_from: Some(from),
            valid_until: Some(until),
            ..Self::default()
        }
    }

    /// Returns whether `now` lies inside `[valid_from, valid_until]`.
    ///
    /// Missing bounds are open.
    pub fn contains_instant(&self, now: DateTime<Utc>) -> bool {
        if self.valid_from.is_some_and(|from| from > now) {
            return false;
        }
        if self.valid_until.is_some_and(|until| until < now) {
            return false;
        }
        true
    }
}

/// Access metadata of a single searchable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPermission {
    pub record_id: String,
    pub owner: Option<String>,
    pub allowed_users: Vec<String>,
    pub allowed_organizations: Vec<String>,
    pub allowed_departments: Vec<String>,
    pub required_role: RoleLevel,
    pub classification: Classification,
    pub tags: Vec<String>,
    pub projects: Vec<String>,
    pub geo_restrictions: Vec<String>,
    pub time_window: Option<TimeWindow>,
}

impl Default for RecordPermission {
    fn default() -> Self {
        Self {
            record_id: String::new(),
            owner: None,
            allowed_users: Vec::new(),
            allowed_organizations: Vec::new(),
            allowed_departments: Vec::new(),
            required_role: RoleLevel::Guest,
            classification: Classification::Public,
            tags: Vec::new(),
            projects: Vec::new(),
            geo_restrictions: Vec::new(),
            time_window: None,
        }
    }
}

impl RecordPermission {
    /// Creates a record readable by everyone at the public level.
    pub fn public(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            allowed_users: vec!["public".to_string()],
            allowed_organizations: vec!["public".to_string()],
            allowed_departments: vec!["public".to_string()],
            ..Self::default()
        }
    }

    /// Sets the owner.
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the required role.
    pub fn requiring_role(mut self, role: RoleLevel) -> Self {
        self.required_role = role;
        self
    }

    /// Sets the data classification.
    pub fn classified(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Replaces the allowed users.
    pub fn for_users(mut self, users: &[&str]) -> Self {
        self.allowed_users = users.iter().map(ToString::to_string).collect();
        self
    }

    /// Replaces the allowed organizations.
    pub fn for_organizations(mut self, orgs: &[&str]) -> Self {
        self.allowed_organizations = orgs.iter().map(ToString::to_string).collect();
        self
    }

    /// Replaces the allowed departments.
    pub fn for_departments(mut self, departments: &[&str]) -> Self {
        self.allowed_departments = departments.iter().map(ToString::to_string).collect();
        self
    }

    /// Replaces the tags.
    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(ToString::to_string).collect();
        self
    }

    /// Replaces the projects.
    pub fn in_projects(mut self, projects: &[&str]) -> Self {
        self.projects = projects.iter().map(ToString::to_string).collect();
        self
    }

    /// Replaces the geographic restrictions.
    pub fn restricted_to(mut self, regions: &[&str]) -> Self {
        self.geo_restrictions = regions.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the validity window.
    pub fn valid_during(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }
}
