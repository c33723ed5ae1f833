//! Temporary access requests.
//!
//! A request names only what is wanted. Who is asking, and at what role,
//! comes from the caller's authenticated profile.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use warden_abac::LookupError;
use warden_config::TemporaryAccessConfig;
use warden_types::{CallerProfile, Classification};

use crate::grants::TemporaryGrant;

/// Recorded as `granted_by` on auto-approved grants.
pub const AUTO_APPROVER: &str = "auto-approval";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryAccessRequest {
    /// Project the elevated access applies to.
    pub resource: String,
    pub classification: Classification,
    /// Falls back to the configured default duration.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub reason: String,
}

impl TemporaryAccessRequest {
    pub fn new(resource: impl Into<String>, classification: Classification) -> Self {
        Self {
            resource: resource.into(),
            classification,
            duration_seconds: None,
            reason: String::new(),
        }
    }

    pub fn for_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn effective_duration(&self, config: &TemporaryAccessConfig) -> u64 {
        self.duration_seconds
            .unwrap_or(config.default_duration_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporaryAccessOutcome {
    AutoApproved(TemporaryGrant),
    PendingApproval { request_id: Uuid, approvers: Vec<String> },
}

impl TemporaryAccessOutcome {
    pub fn is_auto_approved(&self) -> bool {
        matches!(self, TemporaryAccessOutcome::AutoApproved(_))
    }
}

#[derive(Debug, Error)]
pub enum TemporaryAccessError {
    #[error("temporary access is disabled")]
    Disabled,

    #[error("requested duration {requested}s is outside 1..={max}s")]
    InvalidDuration { requested: u64, max: u64 },

    #[error("grant of {seconds}s from {from} is past the representable time range")]
    ExpiryOutOfRange { seconds: u64, from: DateTime<Utc> },

    #[error("no pending request {0}")]
    UnknownRequest(Uuid),

    #[error("{0} is not a configured approver")]
    NotAnApprover(String),

    #[error("grant store error: {0}")]
    Store(#[from] LookupError),
}

/// Checks the duration bounds and returns the effective duration.
pub fn validate_duration(
    request: &TemporaryAccessRequest,
    config: &TemporaryAccessConfig,
) -> Result<u64, TemporaryAccessError> {
    let requested = request.effective_duration(config);
    if requested == 0 || requested > config.max_duration_seconds {
        return Err(TemporaryAccessError::InvalidDuration {
            requested,
            max: config.max_duration_seconds,
        });
    }
    Ok(requested)
}

/// Expiry of a grant of `seconds` starting at `from`.
pub fn grant_expiry(from: DateTime<Utc>, seconds: u64) -> Result<DateTime<Utc>, TemporaryAccessError> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| from.checked_add_signed(delta))
        .ok_or(TemporaryAccessError::ExpiryOutOfRange { seconds, from })
}

/// Whether `caller` may receive `request` for a valid `duration` without a
/// human approver.
pub fn auto_approves(
    caller: &CallerProfile,
    request: &TemporaryAccessRequest,
    duration: u64,
    config: &TemporaryAccessConfig,
) -> bool {
    let rules = &config.auto_approval;
    duration <= rules.max_duration_seconds
        && rules.allowed_roles.contains(&caller.role)
        && rules.allowed_classifications.contains(&request.classification)
}
