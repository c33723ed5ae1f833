//! The access decision engine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{error, info, warn};
use warden_abac::{
    CachingGeoLocator, GeoDecision, GeoLocator, GeographicRestrictionEvaluator, StaticGeoLocator,
    TimeRestrictionEvaluator, VpnDetector,
};
use warden_audit::{AuditAction, AuditLogger, AuditRecord, AuditResult, AuditStore, InMemoryAuditStore};
use warden_config::WardenConfig;
use warden_dynamic::{
    DynamicPermissionResolver, GrantSource, RefreshHandle, TemporaryAccessError, TemporaryAccessOutcome,
    TemporaryAccessRequest, TemporaryGrant, spawn_refresh,
};
use warden_rbac::{
    AccessDecisionResult, CheckContext, FilterExpr, Predicate, RULE_ADMIN_BYPASS, RULE_DISABLED, Subject, build_filter,
    check_access,
};
use warden_types::{CallerProfile, RecordPermission};

use crate::error::{DecisionError, Result};
use crate::history::AuditAccessHistory;
use crate::pipeline::{PipelineState, StateTrace};
use crate::request::{Decision, DecisionRequest, DecisionResponse};
use crate::search::{InMemorySearchBackend, SearchBackend, SearchHit};

/// Audit resource of request-level entries.
pub const REQUEST_RESOURCE: &str = "permission_filter";

/// Audit resource of temporary access entries.
pub const TEMPORARY_ACCESS_RESOURCE: &str = "temporary_access";

// ============================================================================
// Builder
// ============================================================================

pub struct EngineBuilder {
    config: WardenConfig,
    search: Option<Arc<dyn SearchBackend>>,
    locator: Option<Arc<dyn GeoLocator>>,
    vpn_detector: Option<Arc<dyn VpnDetector>>,
    audit_store: Option<Arc<dyn AuditStore>>,
    resolver: Option<Arc<DynamicPermissionResolver>>,
}

impl EngineBuilder {
    pub fn with_search_backend(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_geo_locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_vpn_detector(mut self, detector: Arc<dyn VpnDetector>) -> Self {
        self.vpn_detector = Some(detector);
        self
    }

    pub fn with_audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit_store = Some(store);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<DynamicPermissionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> AccessDecisionEngine {
        let config = self.config;

        let store = self
            .audit_store
            .unwrap_or_else(|| Arc::new(InMemoryAuditStore::new()));
        let audit = Arc::new(if config.engine.audit_logging {
            AuditLogger::new(store, config.audit.retention_days)
        } else {
            AuditLogger::disabled(store)
        });

        let mut locator = self
            .locator
            .unwrap_or_else(|| Arc::new(StaticGeoLocator::new()));
        if config.cache.enabled {
            let ttl = match config.cache.hierarchical.geolocation {
                0 => config.cache.ttl_seconds,
                seconds => seconds,
            };
            locator = Arc::new(CachingGeoLocator::new(locator, Duration::from_secs(ttl)));
        }
        let mut geo = GeographicRestrictionEvaluator::new(config.geographic_restriction.clone(), locator)
            .with_history(Arc::new(AuditAccessHistory::new(Arc::clone(&audit))));
        if let Some(detector) = self.vpn_detector {
            geo = geo.with_vpn_detector(detector);
        }

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(DynamicPermissionResolver::new(&config)));
        let search = self
            .search
            .unwrap_or_else(|| Arc::new(InMemorySearchBackend::default()));

        AccessDecisionEngine {
            time: TimeRestrictionEvaluator::new(config.time_restriction.clone()),
            geo,
            resolver,
            search,
            audit,
            config,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Per-request state threaded through the pipeline.
struct Evaluation {
    trace: StateTrace,
    context_rules: Vec<String>,
    geo: Option<GeoDecision>,
    grant_source: Option<GrantSource>,
    results: Vec<SearchHit>,
    record_checks: Vec<AccessDecisionResult>,
}

impl Evaluation {
    fn new() -> Self {
        Self {
            trace: StateTrace::new(),
            context_rules: Vec::new(),
            geo: None,
            grant_source: None,
            results: Vec::new(),
            record_checks: Vec::new(),
        }
    }

    fn passed(&mut self, rule: &str, state: PipelineState) {
        self.context_rules.push(rule.to_string());
        self.trace.advance(state);
    }

    fn suspicious(&self) -> bool {
        self.geo.as_ref().is_some_and(GeoDecision::is_suspicious)
    }

    /// Rules passed by at least one visible record, in registry order.
    fn applied_rules(&self) -> Vec<String> {
        let allowed: Vec<&AccessDecisionResult> = self.record_checks.iter().filter(|c| c.allowed).collect();
        [RULE_DISABLED, RULE_ADMIN_BYPASS]
            .into_iter()
            .chain(Predicate::ALL.into_iter().map(Predicate::rule_id))
            .filter(|rule| allowed.iter().any(|c| c.applied_rules.iter().any(|r| r == rule)))
            .map(ToString::to_string)
            .collect()
    }
}

/// Authorizes search requests.
///
/// Each request passes the time and geographic gates, has its dynamic grants
/// resolved, gets a pre-filter for the search collaborator and finally has
/// every returned record re-checked. The whole request is bounded by
/// `performance.timeout_ms`; any failure ends in a deny.
pub struct AccessDecisionEngine {
    config: WardenConfig,
    time: TimeRestrictionEvaluator,
    geo: GeographicRestrictionEvaluator,
    resolver: Arc<DynamicPermissionResolver>,
    search: Arc<dyn SearchBackend>,
    audit: Arc<AuditLogger>,
}

impl AccessDecisionEngine {
    pub fn builder(config: WardenConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            search: None,
            locator: None,
            vpn_detector: None,
            audit_store: None,
            resolver: None,
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn resolver(&self) -> &Arc<DynamicPermissionResolver> {
        &self.resolver
    }

    /// Starts background refresh of dynamic permissions.
    pub fn spawn_refresh(&self) -> RefreshHandle {
        spawn_refresh(Arc::clone(&self.resolver))
    }

    fn check_context(&self, now: DateTime<Utc>) -> CheckContext {
        CheckContext::new(now, self.time.timezone().unwrap_or(chrono_tz::UTC))
    }

    pub async fn authorize(&self, request: DecisionRequest) -> Decision {
        self.authorize_at(request, Utc::now()).await
    }

    /// Authorizes `request` as of `now`.
    pub async fn authorize_at(&self, request: DecisionRequest, now: DateTime<Utc>) -> Decision {
        let timeout_ms = self.config.performance.timeout_ms;
        let mut eval = Evaluation::new();

        let evaluation = AssertUnwindSafe(self.evaluate(&request, now, &mut eval)).catch_unwind();
        let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), evaluation).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let e = DecisionError::from_panic(panic.as_ref());
                error!(caller_id = %request.caller_id(), error = %e, "evaluation panicked");
                Err(e)
            }
            Err(_) => Err(DecisionError::Timeout { timeout_ms }),
        };

        let mut require_additional_auth = false;
        let response = match &outcome {
            Ok(()) => {
                eval.trace.advance(PipelineState::Allowed);
                let visible = eval.results.len();
                info!(
                    caller_id = %request.caller_id(),
                    candidates = eval.record_checks.len(),
                    visible,
                    "search authorized"
                );
                DecisionResponse {
                    allowed: true,
                    reason: format!("{visible} of {} results visible", eval.record_checks.len()),
                    applied_rules: eval.applied_rules(),
                    filtered_result_count: Some(visible),
                }
            }
            Err(e) => {
                eval.trace.advance(PipelineState::Denied);
                if let DecisionError::GeoRestricted {
                    require_additional_auth: step_up,
                    ..
                } = e
                {
                    require_additional_auth = *step_up;
                }
                warn!(caller_id = %request.caller_id(), rule = e.rule_id(), error = %e, "search denied");
                DecisionResponse {
                    allowed: false,
                    reason: e.to_string(),
                    applied_rules: eval.context_rules.clone(),
                    filtered_result_count: None,
                }
            }
        };

        self.log_request(&request, &eval, &response, outcome.as_ref().err(), now);
        eval.trace.advance(PipelineState::Logged);

        Decision {
            response,
            results: eval.results,
            record_checks: eval.record_checks,
            context_rules: eval.context_rules,
            states: eval.trace.into_states(),
            grant_source: eval.grant_source,
            require_additional_auth,
        }
    }

    async fn evaluate(&self, request: &DecisionRequest, now: DateTime<Utc>, eval: &mut Evaluation) -> Result<()> {
        let profile = &request.profile;
        if profile.is_expired(now) {
            return Err(DecisionError::ProfileExpired);
        }

        let time = self.time.evaluate(&profile.caller_id, profile.role, now);
        if !time.allowed {
            return Err(DecisionError::TimeRestricted {
                access_type: time.access_type,
                reason: time.reason,
            });
        }
        eval.passed("time_restriction", PipelineState::TimeChecked);

        let geo = self
            .geo
            .evaluate(&profile.caller_id, &request.network_origin)
            .await;
        let geo_allowed = geo.allowed;
        let denial = (!geo_allowed).then(|| DecisionError::GeoRestricted {
            access_type: geo.access_type,
            reason: geo.reason.clone(),
            require_additional_auth: geo.require_additional_auth,
        });
        eval.geo = Some(geo);
        if let Some(denial) = denial {
            return Err(denial);
        }
        eval.passed("geographic_restriction", PipelineState::GeoChecked);

        let resolution = self.resolver.resolve(&profile.caller_id, now).await?;
        eval.grant_source = Some(resolution.source);
        let subject = Subject::from(profile).with_grants(&resolution.grants);
        eval.passed("dynamic_permissions", PipelineState::PermissionsResolved);

        let filter = build_filter(&subject, &self.config, now)?;
        eval.trace.advance(PipelineState::FilterBuilt);

        let hits = self.search.search(&request.query, &filter).await?;
        self.check_hits(hits, &subject, request, now, eval).await;
        eval.trace.advance(PipelineState::ResultsChecked);

        Ok(())
    }

    /// Re-checks hits in batches of `performance.batch_size`, yielding between
    /// batches.
    async fn check_hits(
        &self,
        hits: Vec<SearchHit>,
        subject: &Subject,
        request: &DecisionRequest,
        now: DateTime<Utc>,
        eval: &mut Evaluation,
    ) {
        let ctx = self.check_context(now);
        let batch_size = self.config.performance.batch_size.max(1);
        let record_level = self.config.audit.record_level;

        let mut hits = hits.into_iter().peekable();
        while hits.peek().is_some() {
            for hit in hits.by_ref().take(batch_size) {
                let check = check_access(&hit.permission, subject, &self.config.engine, &ctx);
                if record_level {
                    let result = if check.allowed {
                        AuditResult::Allow
                    } else {
                        AuditResult::Deny
                    };
                    let record = self
                        .audit
                        .entry(&subject.caller_id, AuditAction::RecordChecked, hit.record_id(), result, now)
                        .with_session(&request.session_id)
                        .with_rules(check.applied_rules.clone())
                        .with_reason(&check.reason);
                    self.audit.log(record);
                }
                if check.allowed {
                    eval.results.push(hit);
                }
                eval.record_checks.push(check);
            }
            tokio::task::yield_now().await;
        }
    }

    fn log_request(
        &self,
        request: &DecisionRequest,
        eval: &Evaluation,
        response: &DecisionResponse,
        failure: Option<&DecisionError>,
        now: DateTime<Utc>,
    ) {
        let (action, result) = match failure {
            None => (AuditAction::PermissionFilterRequest, AuditResult::Allow),
            Some(e) if e.is_policy_denial() => (AuditAction::PermissionFilterRequest, AuditResult::Deny),
            Some(_) => (AuditAction::PermissionFilterError, AuditResult::Error),
        };

        let mut record = self
            .audit
            .entry(request.caller_id(), action, REQUEST_RESOURCE, result, now)
            .with_session(&request.session_id)
            .with_origin(&request.network_origin)
            .with_rules(response.applied_rules.clone())
            .with_reason(&response.reason);
        if let Some(agent) = &request.user_agent {
            record = record.with_user_agent(agent);
        }
        if let Some(location) = eval.geo.as_ref().and_then(|g| g.location.as_ref()) {
            record = record.with_source_country(&location.country_code);
        }
        if let Some(count) = response.filtered_result_count {
            record = record.with_filtered_count(count);
        }
        self.audit.log(record.scored(eval.suspicious()));

        if failure.is_none() {
            let search = self
                .audit
                .entry(request.caller_id(), AuditAction::SearchExecuted, &request.query, AuditResult::Allow, now)
                .with_session(&request.session_id)
                .with_filtered_count(eval.results.len());
            self.audit.log(search);
        }
    }

    // ------------------------------------------------------------------------
    // Single-record and filter entry points
    // ------------------------------------------------------------------------

    /// Subject for `profile` with its dynamic grants applied.
    pub async fn subject_for(&self, profile: &CallerProfile, now: DateTime<Utc>) -> Result<Subject> {
        let resolution = self.resolver.resolve(&profile.caller_id, now).await?;
        Ok(Subject::from(profile).with_grants(&resolution.grants))
    }

    /// The pre-filter the engine would hand to the search collaborator.
    pub async fn filter_for(&self, profile: &CallerProfile, now: DateTime<Utc>) -> Result<FilterExpr> {
        let subject = self.subject_for(profile, now).await?;
        Ok(build_filter(&subject, &self.config, now)?)
    }

    /// Checks one record without the request-level gates.
    pub async fn check_record(
        &self,
        profile: &CallerProfile,
        record: &RecordPermission,
        now: DateTime<Utc>,
    ) -> AccessDecisionResult {
        if profile.is_expired(now) {
            return AccessDecisionResult::deny(DecisionError::ProfileExpired.to_string(), Vec::new());
        }
        match self.subject_for(profile, now).await {
            Ok(subject) => check_access(record, &subject, &self.config.engine, &self.check_context(now)),
            Err(e) => {
                warn!(caller_id = %profile.caller_id, error = %e, "record check denied");
                AccessDecisionResult::deny(e.to_string(), Vec::new())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Temporary access
    // ------------------------------------------------------------------------

    /// Requests elevated access for `caller`. Auto-approval is judged on the
    /// profile's role, never on anything in the request.
    pub async fn request_temporary_access(
        &self,
        caller: &CallerProfile,
        request: TemporaryAccessRequest,
        now: DateTime<Utc>,
    ) -> std::result::Result<TemporaryAccessOutcome, TemporaryAccessError> {
        let outcome = self.resolver.request_temporary_access(caller, request, now).await;

        let (result, reason) = match &outcome {
            Ok(TemporaryAccessOutcome::AutoApproved(_)) => (AuditResult::Allow, "auto-approved".to_string()),
            Ok(TemporaryAccessOutcome::PendingApproval { request_id, .. }) => {
                (AuditResult::Allow, format!("pending approval as {request_id}"))
            }
            Err(e) => (AuditResult::Deny, e.to_string()),
        };
        let record = self
            .audit
            .entry(
                &caller.caller_id,
                AuditAction::TemporaryAccessRequested,
                TEMPORARY_ACCESS_RESOURCE,
                result,
                now,
            )
            .with_reason(reason)
            .scored(false);
        self.audit.log(record);

        if let Ok(TemporaryAccessOutcome::AutoApproved(grant)) = &outcome {
            self.audit.log(grant_record(&self.audit, grant, now));
        }
        outcome
    }

    pub async fn approve_temporary_access(
        &self,
        request_id: uuid::Uuid,
        approver: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<TemporaryGrant, TemporaryAccessError> {
        let grant = self.resolver.approve_pending(request_id, approver, now).await?;
        self.audit.log(grant_record(&self.audit, &grant, now));
        Ok(grant)
    }
}

fn grant_record(audit: &AuditLogger, grant: &TemporaryGrant, now: DateTime<Utc>) -> AuditRecord {
    audit
        .entry(
            &grant.caller_id,
            AuditAction::TemporaryAccessGranted,
            &grant.resource,
            AuditResult::Allow,
            now,
        )
        .with_reason(format!(
            "{} access until {} granted by {}",
            grant.classification,
            grant.expires_at.to_rfc3339(),
            grant.granted_by
        ))
        .scored(false)
}
