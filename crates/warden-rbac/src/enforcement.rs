//! Per-record access checks.
//!
//! Every record returned by the search collaborator is re-checked against all
//! registered [`Predicate`]s. In default-deny mode a record is allowed only
//! when every predicate passes; in permissive mode one passing predicate is
//! enough.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;
use warden_abac::window_admits;
use warden_config::EngineConfig;
use warden_types::{RecordPermission, WILDCARD_MARKERS, department_key, list_admits};

use crate::subject::Subject;

pub const RULE_DISABLED: &str = "disabled";
pub const RULE_ADMIN_BYPASS: &str = "admin_bypass";

/// Outcome of an access check, with the rule trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecisionResult {
    pub allowed: bool,
    pub reason: String,
    /// Rule ids that passed, in evaluation order.
    pub applied_rules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_count: Option<usize>,
}

impl AccessDecisionResult {
    pub fn allow(reason: impl Into<String>, applied_rules: Vec<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            applied_rules,
            filtered_count: None,
        }
    }

    pub fn deny(reason: impl Into<String>, applied_rules: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            applied_rules,
            filtered_count: None,
        }
    }

    pub fn with_filtered_count(mut self, count: usize) -> Self {
        self.filtered_count = Some(count);
        self
    }
}

/// Evaluation instant and the timezone record windows are read in.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext {
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

impl CheckContext {
    pub fn new(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self { now, timezone }
    }
}

// ============================================================================
// Predicates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Caller owns the record or is on its user list.
    Identity,
    Organization,
    Department,
    Role,
    Classification,
    Tags,
    Projects,
    Geographic,
    TimeWindow,
}

impl Predicate {
    /// The registry. Default-deny requires all of these.
    pub const ALL: [Predicate; 9] = [
        Predicate::Identity,
        Predicate::Organization,
        Predicate::Department,
        Predicate::Role,
        Predicate::Classification,
        Predicate::Tags,
        Predicate::Projects,
        Predicate::Geographic,
        Predicate::TimeWindow,
    ];

    pub fn rule_id(self) -> &'static str {
        match self {
            Predicate::Identity => "user_direct",
            Predicate::Organization => "organization",
            Predicate::Department => "department",
            Predicate::Role => "role_level",
            Predicate::Classification => "data_classification",
            Predicate::Tags => "tags",
            Predicate::Projects => "projects",
            Predicate::Geographic => "geographic",
            Predicate::TimeWindow => "time_restrictions",
        }
    }

    /// `Err` carries the failure reason.
    pub fn evaluate(self, record: &RecordPermission, subject: &Subject, ctx: &CheckContext) -> Result<(), String> {
        let pass = match self {
            Predicate::Identity => {
                record.owner.as_deref() == Some(subject.caller_id.as_str())
                    || list_admits(&record.allowed_users, &subject.caller_id)
            }
            Predicate::Organization => admits_any(&record.allowed_organizations, subject.organizations.iter()),
            Predicate::Department => {
                let allowed: Vec<String> = record.allowed_departments.iter().map(|d| department_key(d)).collect();
                admits_any(&allowed, subject.departments.iter())
            }
            Predicate::Role => subject.role.satisfies(record.required_role),
            Predicate::Classification => subject.clearance.permits(record.classification),
            Predicate::Tags => record.tags.is_empty() || record.tags.iter().any(|t| subject.tags.contains(t)),
            Predicate::Projects => {
                record.projects.is_empty() || record.projects.iter().any(|p| subject.projects.contains(p))
            }
            Predicate::Geographic => match &subject.geo_restrictions {
                None => true,
                Some(allowed) => {
                    record.geo_restrictions.is_empty() || record.geo_restrictions.iter().any(|g| allowed.contains(g))
                }
            },
            Predicate::TimeWindow => record
                .time_window
                .as_ref()
                .is_none_or(|window| window_admits(window, ctx.now, ctx.timezone)),
        };

        if pass {
            return Ok(());
        }
        Err(match self {
            Predicate::Identity => "caller not in allowed users".to_string(),
            Predicate::Organization => "organization not allowed".to_string(),
            Predicate::Department => "department not allowed".to_string(),
            Predicate::Role => format!(
                "insufficient role level: required {}, caller has {}",
                record.required_role, subject.role
            ),
            Predicate::Classification => format!(
                "insufficient classification clearance: record is {}",
                record.classification
            ),
            Predicate::Tags => "no matching tags".to_string(),
            Predicate::Projects => "no matching projects".to_string(),
            Predicate::Geographic => "geographic restrictions not met".to_string(),
            Predicate::TimeWindow => "outside record validity window".to_string(),
        })
    }
}

/// Wildcards always admit, even a caller with no values.
fn admits_any<'a>(list: &[String], mut values: impl Iterator<Item = &'a String>) -> bool {
    list.iter().any(|e| WILDCARD_MARKERS.contains(&e.as_str())) || values.any(|v| list_admits(list, v))
}

/// Checks one record.
pub fn check_access(
    record: &RecordPermission,
    subject: &Subject,
    engine: &EngineConfig,
    ctx: &CheckContext,
) -> AccessDecisionResult {
    if !engine.enabled {
        return AccessDecisionResult::allow("permission checking disabled", vec![RULE_DISABLED.to_string()]);
    }
    if engine.admin_bypass && subject.is_admin() {
        return AccessDecisionResult::allow("admin bypass", vec![RULE_ADMIN_BYPASS.to_string()]);
    }

    let mut applied = Vec::with_capacity(Predicate::ALL.len());
    let mut failures = Vec::new();
    for predicate in Predicate::ALL {
        match predicate.evaluate(record, subject, ctx) {
            Ok(()) => applied.push(predicate.rule_id().to_string()),
            Err(reason) => failures.push(reason),
        }
    }

    let allowed = if engine.default_deny {
        applied.len() == Predicate::ALL.len()
    } else {
        !applied.is_empty()
    };

    if allowed {
        AccessDecisionResult::allow("access granted", applied)
    } else {
        debug!(
            record_id = %record.record_id,
            caller_id = %subject.caller_id,
            failed = failures.len(),
            "record denied"
        );
        AccessDecisionResult::deny(failures.join("; "), applied)
    }
}
