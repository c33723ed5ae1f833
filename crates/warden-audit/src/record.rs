//! Audit record types and risk scoring.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the audited step was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A caller asked for a filtered search.
    PermissionFilterRequest,
    /// The filtered search completed and results were re-checked.
    SearchExecuted,
    /// One record was re-checked against the caller's profile.
    RecordChecked,
    /// The pipeline failed and the request was denied.
    PermissionFilterError,
    /// A temporary access grant was requested.
    TemporaryAccessRequested,
    /// A temporary access grant was approved.
    TemporaryAccessGranted,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::PermissionFilterRequest => "permission_filter_request",
            AuditAction::SearchExecuted => "search_executed",
            AuditAction::RecordChecked => "record_checked",
            AuditAction::PermissionFilterError => "permission_filter_error",
            AuditAction::TemporaryAccessRequested => "temporary_access_requested",
            AuditAction::TemporaryAccessGranted => "temporary_access_granted",
        }
    }

    /// Actions that widen a caller's access or indicate a failure.
    pub fn is_high_risk(self) -> bool {
        matches!(
            self,
            AuditAction::PermissionFilterError
                | AuditAction::TemporaryAccessRequested
                | AuditAction::TemporaryAccessGranted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Allow,
    Deny,
    Error,
}

/// Computes the 0-10 risk score of an audited step.
///
/// Denials and errors start at 5, allows at 1. High-risk actions add 2 and a
/// suspicious origin adds 3.
pub fn risk_score(result: AuditResult, action: AuditAction, suspicious_location: bool) -> u8 {
    let mut score: u8 = match result {
        AuditResult::Allow => 1,
        AuditResult::Deny | AuditResult::Error => 5,
    };
    if action.is_high_risk() {
        score += 2;
    }
    if suspicious_location {
        score += 3;
    }
    score.min(10)
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Retention deadline in epoch seconds.
    pub ttl: i64,
    pub caller_id: String,
    pub session_id: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// ISO country code of the origin, when it was resolved.
    pub source_country: Option<String>,
    pub action: AuditAction,
    pub resource: String,
    pub result: AuditResult,
    pub applied_rules: Vec<String>,
    pub reason: Option<String>,
    pub risk_score: Option<u8>,
    pub filtered_count: Option<usize>,
}

impl AuditRecord {
    /// Creates a record stamped at `now` that expires after `retention_days`.
    pub fn new(
        caller_id: impl Into<String>,
        action: AuditAction,
        resource: impl Into<String>,
        result: AuditResult,
        now: DateTime<Utc>,
        retention_days: u32,
    ) -> Self {
        let expiry = now + Duration::days(i64::from(retention_days));
        Self {
            id: Uuid::new_v4(),
            timestamp: now,
            ttl: expiry.timestamp(),
            caller_id: caller_id.into(),
            session_id: None,
            origin: None,
            user_agent: None,
            source_country: None,
            action,
            resource: resource.into(),
            result,
            applied_rules: Vec::new(),
            reason: None,
            risk_score: None,
            filtered_count: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_source_country(mut self, country: impl Into<String>) -> Self {
        self.source_country = Some(country.into());
        self
    }

    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.applied_rules = rules;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_filtered_count(mut self, count: usize) -> Self {
        self.filtered_count = Some(count);
        self
    }

    /// Scores the record from its result and action.
    pub fn scored(mut self, suspicious_location: bool) -> Self {
        self.risk_score = Some(risk_score(self.result, self.action, suspicious_location));
        self
    }

    /// Returns whether the record's retention has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl <= now.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case(AuditResult::Allow, AuditAction::SearchExecuted, false, 1)]
    #[test_case(AuditResult::Deny, AuditAction::SearchExecuted, false, 5)]
    #[test_case(AuditResult::Allow, AuditAction::TemporaryAccessGranted, false, 3)]
    #[test_case(AuditResult::Deny, AuditAction::SearchExecuted, true, 8)]
    #[test_case(AuditResult::Error, AuditAction::PermissionFilterError, true, 10)]
    fn test_risk_score(result: AuditResult, action: AuditAction, suspicious: bool, expected: u8) {
        assert_eq!(risk_score(result, action, suspicious), expected);
    }

    #[test]
    fn test_ttl_follows_retention() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let record = AuditRecord::new(
            "u-1",
            AuditAction::SearchExecuted,
            "search_results",
            AuditResult::Allow,
            now,
            90,
        );

        assert_eq!(record.ttl - now.timestamp(), 90 * 24 * 60 * 60);
        assert!(!record.is_expired(now + Duration::days(89)));
        assert!(record.is_expired(now + Duration::days(90)));
    }

    #[test]
    fn test_action_wire_names() {
        let json = serde_json::to_string(&AuditAction::PermissionFilterRequest).unwrap();
        assert_eq!(json, "\"permission_filter_request\"");
        assert_eq!(
            AuditAction::TemporaryAccessGranted.as_str(),
            "temporary_access_granted"
        );
    }
}
