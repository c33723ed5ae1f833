//! Decision request and response types.

use serde::{Deserialize, Serialize};
use warden_dynamic::GrantSource;
use warden_rbac::AccessDecisionResult;
use warden_types::CallerProfile;

use crate::pipeline::PipelineState;
use crate::search::SearchHit;

/// A search request to authorize.
///
/// The caller profile fields sit at the top level of the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[serde(flatten)]
    pub profile: CallerProfile,
    pub query: String,
    pub network_origin: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl DecisionRequest {
    pub fn new(
        profile: CallerProfile,
        query: impl Into<String>,
        network_origin: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            profile,
            query: query.into(),
            network_origin: network_origin.into(),
            session_id: session_id.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn caller_id(&self) -> &str {
        &self.profile.caller_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub allowed: bool,
    pub reason: String,
    pub applied_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_result_count: Option<usize>,
}

/// Full outcome of [`authorize`](crate::AccessDecisionEngine::authorize).
#[derive(Debug, Clone)]
pub struct Decision {
    pub response: DecisionResponse,
    /// Records the caller may see.
    pub results: Vec<SearchHit>,
    /// One entry per candidate record, in search order.
    pub record_checks: Vec<AccessDecisionResult>,
    /// Request-level gates that passed.
    pub context_rules: Vec<String>,
    pub states: Vec<PipelineState>,
    pub grant_source: Option<GrantSource>,
    pub require_additional_auth: bool,
}

impl Decision {
    pub fn allowed(&self) -> bool {
        self.response.allowed
    }
}
