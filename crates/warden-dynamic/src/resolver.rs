//! The dynamic permission resolver.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_abac::LookupError;
use warden_config::{CacheConfig, DynamicPermissionConfig, FallbackBehavior, WardenConfig};
use warden_types::{CallerProfile, department_key};

use crate::cache::{CachedPermissionEntry, DYNAMIC_PERMISSIONS_RESOURCE, InMemoryPermissionCache, PermissionCache};
use crate::directory::{
    InMemoryGrantStore, MembershipDirectory, OrgDirectory, StaticMembershipDirectory, StaticOrgDirectory,
    TemporaryGrantStore,
};
use crate::grants::{ResolvedGrants, TemporaryGrant};
use crate::retry::RetryPolicy;
use crate::temporary::{
    AUTO_APPROVER, TemporaryAccessError, TemporaryAccessOutcome, TemporaryAccessRequest, auto_approves,
    grant_expiry, validate_duration,
};

// ============================================================================
// Outcomes
// ============================================================================

/// Where a resolved grant set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    /// Dynamic permissions are switched off.
    Disabled,
    Cache,
    Fresh,
    /// Lookups failed and the fallback allows the static profile alone.
    FallbackAllow,
    /// Lookups failed and a stale cache entry was used.
    LastKnown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub grants: ResolvedGrants,
    pub source: GrantSource,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dynamic permission lookup failed: {0}")]
    LookupFailed(#[source] LookupError),

    #[error("no last known permissions for {caller_id}: {source}")]
    NoLastKnown {
        caller_id: String,
        #[source]
        source: LookupError,
    },
}

/// Triggers for dropping cached grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    RoleChanged { caller_id: String },
    MembershipChanged { caller_id: String },
    /// Clears every cached entry.
    PolicyUpdated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    /// Callers dropped because their cache entry was gone.
    pub untracked: usize,
}

// ============================================================================
// Organization walk
// ============================================================================

/// Departments reachable downward from `root` within `max_depth` edges,
/// including `root`, in [`department_key`] form.
///
/// Hierarchy keys and children are normalized too; keys differing only in
/// case are merged.
pub fn descendant_departments(
    hierarchy: &BTreeMap<String, Vec<String>>,
    root: &str,
    max_depth: u32,
) -> BTreeSet<String> {
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for (parent, children) in hierarchy {
        edges
            .entry(department_key(parent))
            .or_default()
            .extend(children.iter().map(|c| department_key(c)));
    }

    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::new();
    let root = department_key(root);
    seen.insert(root.clone());
    queue.push_back((root, 0u32));

    while let Some((department, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(children) = edges.get(&department) else {
            continue;
        };
        for child in children {
            if seen.insert(child.clone()) {
                queue.push_back((child.clone(), depth + 1));
            }
        }
    }

    seen
}

// ============================================================================
// Tracked callers
// ============================================================================

/// Callers the background refresh keeps warm, bounded to the cache size.
///
/// When full, the least recently resolved caller is dropped.
#[derive(Debug)]
struct TrackedCallers {
    last_seen: HashMap<String, u64>,
    sequence: u64,
    limit: usize,
}

impl TrackedCallers {
    fn new(limit: usize) -> Self {
        Self {
            last_seen: HashMap::new(),
            sequence: 0,
            limit: limit.max(1),
        }
    }

    fn touch(&mut self, caller_id: &str) {
        self.sequence += 1;
        self.last_seen.insert(caller_id.to_string(), self.sequence);
        if self.last_seen.len() > self.limit {
            let oldest = self
                .last_seen
                .iter()
                .min_by_key(|(_, seen)| **seen)
                .map(|(caller, _)| caller.clone());
            if let Some(oldest) = oldest {
                self.last_seen.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, caller_id: &str) {
        self.last_seen.remove(caller_id);
    }

    fn callers(&self) -> Vec<String> {
        let mut callers: Vec<String> = self.last_seen.keys().cloned().collect();
        callers.sort();
        callers
    }
}

/// A request parked until an approver acts on it.
#[derive(Debug, Clone)]
struct PendingRequest {
    caller_id: String,
    request: TemporaryAccessRequest,
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves project, organizational and temporary grants for callers.
///
/// Results are cached per caller for `refresh_interval_seconds`. Every
/// upstream lookup runs under the retry policy; when retries are exhausted the
/// configured fallback decides the outcome.
pub struct DynamicPermissionResolver {
    config: DynamicPermissionConfig,
    cache_config: CacheConfig,
    fallback: FallbackBehavior,
    retry: RetryPolicy,
    cache: Arc<dyn PermissionCache>,
    membership: Arc<dyn MembershipDirectory>,
    org: Arc<dyn OrgDirectory>,
    grant_store: Arc<dyn TemporaryGrantStore>,
    pending: RwLock<HashMap<Uuid, PendingRequest>>,
    tracked: RwLock<TrackedCallers>,
}

impl std::fmt::Debug for DynamicPermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPermissionResolver")
            .field("config", &self.config)
            .field("fallback", &self.fallback)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl DynamicPermissionResolver {
    /// Resolver with in-memory stores and empty directories.
    pub fn new(config: &WardenConfig) -> Self {
        let attempt_timeout = Duration::from_millis(
            config
                .dynamic_permissions
                .project_access
                .membership_api
                .timeout_ms,
        );
        Self {
            config: config.dynamic_permissions.clone(),
            cache_config: config.cache.clone(),
            fallback: config.error_handling.fallback_behavior,
            retry: RetryPolicy::new(&config.error_handling.retry, attempt_timeout),
            cache: Arc::new(InMemoryPermissionCache::new(config.cache.max_entries)),
            membership: Arc::new(StaticMembershipDirectory::new()),
            org: Arc::new(StaticOrgDirectory::new()),
            grant_store: Arc::new(InMemoryGrantStore::new()),
            pending: RwLock::new(HashMap::new()),
            tracked: RwLock::new(TrackedCallers::new(config.cache.max_entries)),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_membership_directory(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.membership = directory;
        self
    }

    pub fn with_org_directory(mut self, directory: Arc<dyn OrgDirectory>) -> Self {
        self.org = directory;
        self
    }

    pub fn with_grant_store(mut self, store: Arc<dyn TemporaryGrantStore>) -> Self {
        self.grant_store = store;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &DynamicPermissionConfig {
        &self.config
    }

    pub fn fallback(&self) -> FallbackBehavior {
        self.fallback
    }

    /// Recently resolved callers the background task refreshes, sorted.
    pub fn tracked_callers(&self) -> Vec<String> {
        self.tracked
            .read()
            .map(|t| t.callers())
            .unwrap_or_default()
    }

    fn untrack(&self, caller_id: &str) {
        if let Ok(mut tracked) = self.tracked.write() {
            tracked.forget(caller_id);
        }
    }

    /// Current grants for `caller_id`, from cache when fresh.
    pub async fn resolve(&self, caller_id: &str, now: DateTime<Utc>) -> Result<Resolution, ResolveError> {
        if !self.config.enabled {
            return Ok(Resolution {
                grants: ResolvedGrants::empty(now),
                source: GrantSource::Disabled,
            });
        }

        let cached = self.cached_entry(caller_id).await;
        if let Some(entry) = &cached
            && entry.is_fresh(now.timestamp())
        {
            debug!(caller_id, "dynamic permissions served from cache");
            return Ok(Resolution {
                grants: entry.grants.clone(),
                source: GrantSource::Cache,
            });
        }

        match self.refresh(caller_id, now).await {
            Ok(grants) => Ok(Resolution {
                grants,
                source: GrantSource::Fresh,
            }),
            Err(e) => self.apply_fallback(caller_id, cached, e, now),
        }
    }

    /// Re-resolves `caller_id` from upstream, bypassing the cache read.
    pub async fn refresh(&self, caller_id: &str, now: DateTime<Utc>) -> Result<ResolvedGrants, LookupError> {
        let grants = self.fetch(caller_id, now).await?.normalize();

        if self.cache_config.enabled {
            let expires_at = now.timestamp() + self.config.refresh_interval_seconds as i64;
            let entry = CachedPermissionEntry::new(caller_id, grants.clone(), expires_at);
            if let Err(e) = self.cache.put(entry).await {
                warn!(caller_id, error = %e, "failed to cache dynamic permissions");
            }
        }
        if let Ok(mut tracked) = self.tracked.write() {
            tracked.touch(caller_id);
        }

        info!(
            caller_id,
            projects = grants.projects.len(),
            departments = grants.departments.len(),
            classifications = grants.classifications.len(),
            temporary_grants = grants.temporary_grants.len(),
            "resolved dynamic permissions"
        );
        Ok(grants)
    }

    /// Refreshes every tracked caller. Failures keep the previous entry.
    ///
    /// Callers whose entry has left the cache are untracked instead.
    pub async fn refresh_tracked(&self, now: DateTime<Utc>) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        for caller_id in self.tracked_callers() {
            if self.cache_config.enabled && self.cached_entry(&caller_id).await.is_none() {
                debug!(caller_id = %caller_id, "no cached entry, untracking");
                self.untrack(&caller_id);
                summary.untracked += 1;
                continue;
            }
            match self.refresh(&caller_id, now).await {
                Ok(_) => summary.refreshed += 1,
                Err(e) => {
                    warn!(caller_id = %caller_id, error = %e, "scheduled refresh failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Applies an invalidation event if its rule is enabled. Returns the
    /// number of entries removed.
    pub async fn handle_event(&self, event: &InvalidationEvent) -> usize {
        let rules = &self.cache_config.invalidation;
        let result = match event {
            InvalidationEvent::RoleChanged { caller_id } if rules.on_role_change => {
                self.untrack(caller_id);
                self.cache.invalidate(caller_id).await
            }
            InvalidationEvent::MembershipChanged { caller_id } if rules.on_membership_change => {
                self.untrack(caller_id);
                self.cache.invalidate(caller_id).await
            }
            InvalidationEvent::PolicyUpdated if rules.on_policy_update => {
                if let Ok(mut tracked) = self.tracked.write() {
                    tracked.last_seen.clear();
                }
                self.cache.clear().await
            }
            _ => {
                debug!(?event, "invalidation rule disabled, ignoring event");
                return 0;
            }
        };

        match result {
            Ok(removed) => {
                info!(?event, removed, "invalidated cached permissions");
                removed
            }
            Err(e) => {
                error!(?event, error = %e, "cache invalidation failed");
                0
            }
        }
    }

    // ------------------------------------------------------------------------
    // Temporary access
    // ------------------------------------------------------------------------

    /// Auto-approves within the configured limits, otherwise parks the
    /// request for an approver. Identity and role come from `caller`.
    pub async fn request_temporary_access(
        &self,
        caller: &CallerProfile,
        request: TemporaryAccessRequest,
        now: DateTime<Utc>,
    ) -> Result<TemporaryAccessOutcome, TemporaryAccessError> {
        let config = &self.config.temporary_access;
        if !config.enabled {
            return Err(TemporaryAccessError::Disabled);
        }
        let duration = validate_duration(&request, config)?;

        if auto_approves(caller, &request, duration, config) {
            let grant = self
                .grant(&caller.caller_id, &request, duration, AUTO_APPROVER, now)
                .await?;
            info!(
                caller_id = %grant.caller_id,
                resource = %grant.resource,
                classification = %grant.classification,
                duration_seconds = duration,
                "temporary access auto-approved"
            );
            return Ok(TemporaryAccessOutcome::AutoApproved(grant));
        }

        let request_id = Uuid::new_v4();
        info!(
            caller_id = %caller.caller_id,
            role = %caller.role,
            %request_id,
            duration_seconds = duration,
            "temporary access pending approval"
        );
        self.pending
            .write()
            .map_err(|_| LookupError::failed("pending requests", "lock poisoned"))?
            .insert(
                request_id,
                PendingRequest {
                    caller_id: caller.caller_id.clone(),
                    request,
                },
            );
        Ok(TemporaryAccessOutcome::PendingApproval {
            request_id,
            approvers: config.approvers.clone(),
        })
    }

    /// Approves a pending request. The grant runs from approval time.
    pub async fn approve_pending(
        &self,
        request_id: Uuid,
        approver: &str,
        now: DateTime<Utc>,
    ) -> Result<TemporaryGrant, TemporaryAccessError> {
        let config = &self.config.temporary_access;
        if !config.approvers.iter().any(|a| a == approver) {
            warn!(approver, %request_id, "approval attempted by non-approver");
            return Err(TemporaryAccessError::NotAnApprover(approver.to_string()));
        }

        let pending = self
            .pending
            .write()
            .map_err(|_| LookupError::failed("pending requests", "lock poisoned"))?
            .remove(&request_id)
            .ok_or(TemporaryAccessError::UnknownRequest(request_id))?;

        let duration = validate_duration(&pending.request, config)?;
        let grant = self
            .grant(&pending.caller_id, &pending.request, duration, approver, now)
            .await?;
        info!(caller_id = %grant.caller_id, approver, %request_id, "temporary access approved");
        Ok(grant)
    }

    async fn grant(
        &self,
        caller_id: &str,
        request: &TemporaryAccessRequest,
        duration: u64,
        granted_by: &str,
        now: DateTime<Utc>,
    ) -> Result<TemporaryGrant, TemporaryAccessError> {
        let grant = TemporaryGrant {
            grant_id: Uuid::new_v4(),
            caller_id: caller_id.to_string(),
            resource: request.resource.clone(),
            classification: request.classification,
            granted_by: granted_by.to_string(),
            reason: request.reason.clone(),
            expires_at: grant_expiry(now, duration)?,
        };
        self.grant_store.save(grant.clone()).await?;

        if let Err(e) = self.cache.invalidate(&grant.caller_id).await {
            warn!(caller_id = %grant.caller_id, error = %e, "failed to invalidate after grant");
        }
        Ok(grant)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn cached_entry(&self, caller_id: &str) -> Option<CachedPermissionEntry> {
        if !self.cache_config.enabled {
            return None;
        }
        match self.cache.get(caller_id, DYNAMIC_PERMISSIONS_RESOURCE).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(caller_id, error = %e, "permission cache read failed");
                None
            }
        }
    }

    async fn fetch(&self, caller_id: &str, now: DateTime<Utc>) -> Result<ResolvedGrants, LookupError> {
        let mut grants = ResolvedGrants::empty(now);

        let projects = &self.config.project_access;
        if projects.enabled {
            let membership = self
                .retry
                .run("project membership", || self.membership.memberships(caller_id))
                .await?;
            if self.config.inheritance.project && projects.auto_grant {
                for project in &membership.projects {
                    if let Some(levels) = projects.project_permissions.get(project) {
                        grants.classifications.extend(levels.iter().copied());
                    }
                }
            }
            grants.projects = membership.projects;
            grants.organizations = membership.organizations;
        }

        let org = &self.config.org_hierarchy;
        if org.enabled && self.config.inheritance.department {
            let placement = self
                .retry
                .run("org directory", || self.org.placement(caller_id))
                .await?;
            if let Some(placement) = placement {
                grants.departments = descendant_departments(&org.hierarchy, &placement.department, org.max_depth);
                if org.inherited_permissions {
                    grants
                        .classifications
                        .extend(placement.classification.accessible_levels().iter().copied());
                } else {
                    grants.classifications.insert(placement.classification);
                }
            }
        }

        if self.config.temporary_access.enabled {
            let active = self
                .retry
                .run("grant store", || self.grant_store.active_grants(caller_id, now))
                .await?;
            for grant in active.into_iter().filter(|g| g.is_active(now)) {
                grants.classifications.insert(grant.classification);
                grants.projects.insert(grant.resource.clone());
                grants.temporary_grants.push(grant);
            }
        }

        Ok(grants)
    }

    fn apply_fallback(
        &self,
        caller_id: &str,
        cached: Option<CachedPermissionEntry>,
        failure: LookupError,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ResolveError> {
        warn!(caller_id, error = %failure, fallback = ?self.fallback, "dynamic permission lookup exhausted retries");
        match self.fallback {
            FallbackBehavior::Deny => Err(ResolveError::LookupFailed(failure)),
            FallbackBehavior::Allow => Ok(Resolution {
                grants: ResolvedGrants::empty(now),
                source: GrantSource::FallbackAllow,
            }),
            FallbackBehavior::CacheLastKnown => match cached {
                Some(entry) => Ok(Resolution {
                    grants: entry.grants,
                    source: GrantSource::LastKnown,
                }),
                None => Err(ResolveError::NoLastKnown {
                    caller_id: caller_id.to_string(),
                    source: failure,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use warden_types::{Classification, RoleLevel};

    use super::*;
    use crate::directory::Membership;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 3, 0, 0).unwrap()
    }

    fn resolver(config: &WardenConfig) -> DynamicPermissionResolver {
        DynamicPermissionResolver::new(config)
            .with_membership_directory(Arc::new(
                StaticMembershipDirectory::new().with_member("u-1", &["project_alpha", "project_x"], &["acme"]),
            ))
            .with_org_directory(Arc::new(StaticOrgDirectory::new().with_placement(
                "u-1",
                "Technology",
                Classification::Internal,
            )))
            .with_retry_policy(RetryPolicy::once(Duration::from_millis(100)))
    }

    /// Fails every call and counts them.
    #[derive(Default)]
    struct DownDirectory {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MembershipDirectory for DownDirectory {
        async fn memberships(&self, _caller_id: &str) -> Result<Membership, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LookupError::failed("project membership", "connection refused"))
        }
    }

    fn caller(role: RoleLevel) -> CallerProfile {
        CallerProfile::new("u-1", "acme", role, Classification::Internal)
    }

    fn config_with_fallback(fallback: FallbackBehavior) -> WardenConfig {
        let mut config = WardenConfig::default();
        config.error_handling.fallback_behavior = fallback;
        config
    }

    #[test]
    fn test_department_walk_respects_depth() {
        let hierarchy = WardenConfig::default().dynamic_permissions.org_hierarchy.hierarchy;

        let one = descendant_departments(&hierarchy, "technology", 1);
        assert_eq!(
            one,
            BTreeSet::from(["technology", "engineering", "it"].map(String::from))
        );

        let two = descendant_departments(&hierarchy, "Technology", 2);
        assert!(two.contains("platform"));
        assert!(two.contains("security"));
        assert!(!two.contains("finance"));

        assert_eq!(descendant_departments(&hierarchy, "recruiting", 5).len(), 1);
        assert_eq!(descendant_departments(&hierarchy, "executive", 0).len(), 1);
    }

    #[test]
    fn test_department_walk_survives_cycles() {
        let hierarchy = BTreeMap::from([
            ("a".to_string(), vec!["b".to_string()]),
            ("b".to_string(), vec!["a".to_string(), "c".to_string()]),
        ]);
        assert_eq!(descendant_departments(&hierarchy, "a", 10).len(), 3);
    }

    #[test]
    fn test_department_walk_normalizes_keys() {
        let hierarchy = BTreeMap::from([
            ("Sales".to_string(), vec!["EMEA Sales".to_string()]),
            ("sales".to_string(), vec!["Inside-Sales".to_string()]),
        ]);
        assert_eq!(
            descendant_departments(&hierarchy, "SALES", 1),
            BTreeSet::from(["sales", "emea sales", "inside-sales"].map(String::from))
        );
    }

    #[tokio::test]
    async fn test_fresh_resolution_unions_sources() {
        let config = WardenConfig::default();
        let resolution = resolver(&config).resolve("u-1", now()).await.unwrap();
        assert_eq!(resolution.source, GrantSource::Fresh);

        let grants = resolution.grants;
        assert!(grants.projects.contains("project_alpha"));
        assert!(grants.organizations.contains("acme"));
        assert!(grants.departments.contains("engineering"));
        assert!(grants.departments.contains("security"));
        // project_alpha grants confidential; unknown projects add nothing.
        assert_eq!(grants.max_classification(), Some(Classification::Confidential));
        assert!(grants.classifications.contains(&Classification::Public));
    }

    #[tokio::test]
    async fn test_second_resolution_hits_cache_until_expiry() {
        let config = WardenConfig::default();
        let resolver = resolver(&config);
        resolver.resolve("u-1", now()).await.unwrap();

        let cached = resolver.resolve("u-1", now() + chrono::Duration::seconds(299)).await.unwrap();
        assert_eq!(cached.source, GrantSource::Cache);

        let expired = resolver.resolve("u-1", now() + chrono::Duration::seconds(300)).await.unwrap();
        assert_eq!(expired.source, GrantSource::Fresh);
        assert_eq!(resolver.tracked_callers(), vec!["u-1".to_string()]);
    }

    #[tokio::test]
    async fn test_project_inheritance_toggle() {
        let mut config = WardenConfig::default();
        config.dynamic_permissions.inheritance.project = false;
        config.dynamic_permissions.org_hierarchy.enabled = false;

        let grants = resolver(&config).resolve("u-1", now()).await.unwrap().grants;
        assert!(grants.projects.contains("project_alpha"));
        assert!(grants.classifications.is_empty());
        assert!(grants.departments.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_resolves_empty() {
        let mut config = WardenConfig::default();
        config.dynamic_permissions.enabled = false;
        let resolution = resolver(&config).resolve("u-1", now()).await.unwrap();
        assert_eq!(resolution.source, GrantSource::Disabled);
        assert!(resolution.grants.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_before_fallback_deny() {
        let config = config_with_fallback(FallbackBehavior::Deny);
        let down = Arc::new(DownDirectory::default());
        let resolver = DynamicPermissionResolver::new(&config).with_membership_directory(down.clone());

        let err = resolver.resolve("u-1", now()).await.unwrap_err();
        assert!(matches!(err, ResolveError::LookupFailed(_)));
        assert_eq!(down.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fallback_allow_uses_profile_only() {
        let config = config_with_fallback(FallbackBehavior::Allow);
        let resolver = DynamicPermissionResolver::new(&config)
            .with_membership_directory(Arc::new(DownDirectory::default()))
            .with_retry_policy(RetryPolicy::once(Duration::from_millis(100)));

        let resolution = resolver.resolve("u-1", now()).await.unwrap();
        assert_eq!(resolution.source, GrantSource::FallbackAllow);
        assert!(resolution.grants.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_last_known() {
        let config = config_with_fallback(FallbackBehavior::CacheLastKnown);
        let cache: Arc<dyn PermissionCache> = Arc::new(InMemoryPermissionCache::default());

        let healthy = resolver(&config).with_cache(Arc::clone(&cache));
        let first = healthy.resolve("u-1", now()).await.unwrap();

        let broken = DynamicPermissionResolver::new(&config)
            .with_cache(Arc::clone(&cache))
            .with_membership_directory(Arc::new(DownDirectory::default()))
            .with_retry_policy(RetryPolicy::once(Duration::from_millis(100)));

        let later = now() + chrono::Duration::hours(1);
        let stale = broken.resolve("u-1", later).await.unwrap();
        assert_eq!(stale.source, GrantSource::LastKnown);
        assert_eq!(stale.grants, first.grants);

        assert!(matches!(
            broken.resolve("u-2", later).await.unwrap_err(),
            ResolveError::NoLastKnown { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalidation_rules_gate_events() {
        let mut config = WardenConfig::default();
        config.cache.invalidation.on_role_change = false;
        let resolver = resolver(&config);
        resolver.resolve("u-1", now()).await.unwrap();

        let role = InvalidationEvent::RoleChanged {
            caller_id: "u-1".to_string(),
        };
        assert_eq!(resolver.handle_event(&role).await, 0);

        let membership = InvalidationEvent::MembershipChanged {
            caller_id: "u-1".to_string(),
        };
        assert_eq!(resolver.handle_event(&membership).await, 1);

        resolver.resolve("u-1", now()).await.unwrap();
        assert_eq!(resolver.handle_event(&InvalidationEvent::PolicyUpdated).await, 1);
    }

    #[tokio::test]
    async fn test_manager_half_hour_internal_is_auto_approved() {
        let mut config = WardenConfig::default();
        let rules = &mut config.dynamic_permissions.temporary_access.auto_approval;
        rules.max_duration_seconds = 1800;
        rules.allowed_roles = vec![RoleLevel::Manager, RoleLevel::Admin];
        rules.allowed_classifications = vec![Classification::Public, Classification::Internal];
        let resolver = resolver(&config);

        let request = TemporaryAccessRequest::new("project_beta", Classification::Internal)
            .for_seconds(1800)
            .because("quarterly report");
        let outcome = resolver
            .request_temporary_access(&caller(RoleLevel::Manager), request, now())
            .await
            .unwrap();

        let TemporaryAccessOutcome::AutoApproved(grant) = outcome else {
            panic!("expected auto-approval, got {outcome:?}");
        };
        assert_eq!(grant.granted_by, AUTO_APPROVER);
        assert_eq!(grant.expires_at, now() + chrono::Duration::minutes(30));

        let grants = resolver.resolve("u-1", now()).await.unwrap().grants;
        assert_eq!(grants.temporary_grants.len(), 1);
        assert!(grants.projects.contains("project_beta"));

        // Expired grants are simply absent.
        let after = resolver.resolve("u-1", now() + chrono::Duration::minutes(31)).await.unwrap();
        assert!(after.grants.temporary_grants.is_empty());
    }

    #[tokio::test]
    async fn test_pending_request_needs_configured_approver() {
        let config = WardenConfig::default();
        let resolver = resolver(&config);

        let request = TemporaryAccessRequest::new("project_gamma", Classification::Restricted).for_seconds(600);
        let outcome = resolver
            .request_temporary_access(&caller(RoleLevel::User), request, now())
            .await
            .unwrap();
        let TemporaryAccessOutcome::PendingApproval { request_id, approvers } = outcome else {
            panic!("expected pending approval");
        };
        assert!(approvers.contains(&"security_admin".to_string()));

        assert!(matches!(
            resolver.approve_pending(request_id, "mallory", now()).await,
            Err(TemporaryAccessError::NotAnApprover(_))
        ));

        let grant = resolver
            .approve_pending(request_id, "security_admin", now())
            .await
            .unwrap();
        assert_eq!(grant.granted_by, "security_admin");
        assert_eq!(grant.caller_id, "u-1");
        assert_eq!(grant.classification, Classification::Restricted);

        assert!(matches!(
            resolver.approve_pending(request_id, "security_admin", now()).await,
            Err(TemporaryAccessError::UnknownRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_temporary_access_rejects_bad_duration_and_disabled() {
        let mut config = WardenConfig::default();
        let resolver_on = resolver(&config);
        let too_long = TemporaryAccessRequest::new("p", Classification::Public).for_seconds(86_401);
        assert!(matches!(
            resolver_on
                .request_temporary_access(&caller(RoleLevel::Admin), too_long, now())
                .await,
            Err(TemporaryAccessError::InvalidDuration { .. })
        ));

        config.dynamic_permissions.temporary_access.enabled = false;
        let request = TemporaryAccessRequest::new("p", Classification::Public);
        assert!(matches!(
            resolver(&config)
                .request_temporary_access(&caller(RoleLevel::Admin), request, now())
                .await,
            Err(TemporaryAccessError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_auto_approval_uses_profile_role() {
        let config = WardenConfig::default();
        let resolver = resolver(&config);

        // A payload claiming a higher role does not change the caller's role.
        let payload = r#"{ "resource": "project_beta", "classification": "internal", "durationSeconds": 600, "role": "manager" }"#;
        let request: TemporaryAccessRequest = serde_json::from_str(payload).unwrap();
        let outcome = resolver
            .request_temporary_access(&caller(RoleLevel::User), request, now())
            .await
            .unwrap();
        assert!(matches!(outcome, TemporaryAccessOutcome::PendingApproval { .. }));
        assert!(resolver.resolve("u-1", now()).await.unwrap().grants.temporary_grants.is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_is_rejected() {
        let mut config = WardenConfig::default();
        config.dynamic_permissions.temporary_access.max_duration_seconds = u64::MAX;
        let resolver = resolver(&config);

        let request = TemporaryAccessRequest::new("project_gamma", Classification::Restricted).for_seconds(1 << 62);
        let TemporaryAccessOutcome::PendingApproval { request_id, .. } = resolver
            .request_temporary_access(&caller(RoleLevel::User), request, now())
            .await
            .unwrap()
        else {
            panic!("expected pending approval");
        };

        assert!(matches!(
            resolver.approve_pending(request_id, "security_admin", now()).await,
            Err(TemporaryAccessError::ExpiryOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_tracked_callers_bounded_by_cache_size() {
        let mut config = WardenConfig::default();
        config.cache.max_entries = 2;
        let resolver = resolver(&config);

        for i in 0..50 {
            let at = now() + chrono::Duration::seconds(i);
            resolver.resolve(&format!("caller-{i:02}"), at).await.unwrap();
        }
        assert_eq!(
            resolver.tracked_callers(),
            vec!["caller-48".to_string(), "caller-49".to_string()]
        );

        let summary = resolver.refresh_tracked(now()).await;
        assert_eq!(summary.refreshed, 2);
        assert_eq!(summary.untracked, 0);
    }

    #[tokio::test]
    async fn test_invalidation_untracks_caller() {
        let config = WardenConfig::default();
        let resolver = resolver(&config);
        resolver.resolve("u-1", now()).await.unwrap();
        resolver.resolve("u-2", now()).await.unwrap();

        let event = InvalidationEvent::MembershipChanged {
            caller_id: "u-1".to_string(),
        };
        resolver.handle_event(&event).await;
        assert_eq!(resolver.tracked_callers(), vec!["u-2".to_string()]);

        resolver.handle_event(&InvalidationEvent::PolicyUpdated).await;
        assert!(resolver.tracked_callers().is_empty());
        assert_eq!(resolver.refresh_tracked(now()).await, RefreshSummary::default());
    }

    #[tokio::test]
    async fn test_evicted_callers_are_untracked_on_refresh() {
        let config = WardenConfig::default();
        let cache = Arc::new(InMemoryPermissionCache::default());
        let resolver = resolver(&config).with_cache(cache.clone());
        resolver.resolve("u-1", now()).await.unwrap();

        // Drop the entry behind the resolver's back, as an external cache would.
        cache.invalidate("u-1").await.unwrap();

        let summary = resolver.refresh_tracked(now()).await;
        assert_eq!(summary.untracked, 1);
        assert_eq!(summary.refreshed, 0);
        assert!(resolver.tracked_callers().is_empty());
    }
}
