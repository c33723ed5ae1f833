//! Error types for the decision pipeline.

use thiserror::Error;
use warden_abac::{GeoAccessType, TimeAccessType};
use warden_dynamic::ResolveError;
use warden_rbac::FilterError;

use crate::search::SearchError;

/// Why a request was not allowed.
///
/// Every variant ends the pipeline in a deny; none reaches the caller as a
/// raw error.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("caller profile expired")]
    ProfileExpired,

    #[error("time restriction: {reason}")]
    TimeRestricted {
        access_type: TimeAccessType,
        reason: String,
    },

    #[error("geographic restriction: {reason}")]
    GeoRestricted {
        access_type: GeoAccessType,
        reason: String,
        require_additional_auth: bool,
    },

    #[error("permission resolution failed: {0}")]
    Permissions(#[from] ResolveError),

    #[error("filter construction failed: {0}")]
    Filter(#[from] FilterError),

    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    #[error("decision timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A collaborator panicked while the request was evaluated.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DecisionError {
    /// Rule id reported in the trace for this failure.
    pub fn rule_id(&self) -> &'static str {
        match self {
            DecisionError::ProfileExpired => "profile_expiry",
            DecisionError::TimeRestricted { .. } => "time_restriction",
            DecisionError::GeoRestricted { .. } => "geographic_restriction",
            DecisionError::Permissions(_) => "dynamic_permissions",
            DecisionError::Filter(_) => "search_filter",
            DecisionError::Search(_) => "search",
            DecisionError::Timeout { .. } => "timeout",
            DecisionError::Internal { .. } => "internal_error",
        }
    }

    /// Policy denials as opposed to failures while evaluating.
    pub fn is_policy_denial(&self) -> bool {
        matches!(
            self,
            DecisionError::ProfileExpired
                | DecisionError::TimeRestricted { .. }
                | DecisionError::GeoRestricted { .. }
        )
    }
}

impl DecisionError {
    /// Converts a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        DecisionError::Internal { message }
    }
}

pub type Result<T> = std::result::Result<T, DecisionError>;
