//! Permission cache abstraction.
//!
//! Entries are keyed by caller id plus a resource discriminator and carry an
//! absolute expiry in epoch seconds. Writes are upserts; concurrent refreshes
//! for the same caller are last-writer-wins.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_abac::LookupError;

use crate::grants::ResolvedGrants;

/// Discriminator for resolved dynamic grants.
pub const DYNAMIC_PERMISSIONS_RESOURCE: &str = "dynamic_permissions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPermissionEntry {
    pub caller_id: String,
    pub resource: String,
    pub grants: ResolvedGrants,
    /// Epoch seconds.
    pub expires_at: i64,
}

impl CachedPermissionEntry {
    pub fn new(caller_id: impl Into<String>, grants: ResolvedGrants, expires_at: i64) -> Self {
        Self {
            caller_id: caller_id.into(),
            resource: DYNAMIC_PERMISSIONS_RESOURCE.to_string(),
            grants,
            expires_at,
        }
    }

    pub fn is_fresh(&self, now_epoch: i64) -> bool {
        now_epoch < self.expires_at
    }
}

/// Shared store of resolved grants.
///
/// `get` returns entries regardless of expiry so callers can fall back to the
/// last known value.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    async fn get(&self, caller_id: &str, resource: &str) -> Result<Option<CachedPermissionEntry>, LookupError>;

    async fn put(&self, entry: CachedPermissionEntry) -> Result<(), LookupError>;

    /// Drops every entry for `caller_id`. Returns how many were removed.
    async fn invalidate(&self, caller_id: &str) -> Result<usize, LookupError>;

    async fn clear(&self) -> Result<usize, LookupError>;
}

type CacheKey = (String, String);

/// Bounded in-process cache.
///
/// When full, the entry closest to expiry is evicted to make room.
#[derive(Debug)]
pub struct InMemoryPermissionCache {
    entries: RwLock<HashMap<CacheKey, CachedPermissionEntry>>,
    max_entries: usize,
}

impl InMemoryPermissionCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPermissionCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn poisoned() -> LookupError {
    LookupError::failed("permission cache", "lock poisoned")
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get(&self, caller_id: &str, resource: &str) -> Result<Option<CachedPermissionEntry>, LookupError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(&(caller_id.to_string(), resource.to_string()))
            .cloned())
    }

    async fn put(&self, entry: CachedPermissionEntry) -> Result<(), LookupError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let key = (entry.caller_id.clone(), entry.resource.clone());

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
            }
        }

        entries.insert(key, entry);
        Ok(())
    }

    async fn invalidate(&self, caller_id: &str) -> Result<usize, LookupError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|(caller, _), _| caller != caller_id);
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<usize, LookupError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn entry(caller: &str, expires_at: i64) -> CachedPermissionEntry {
        let at = Utc.with_ymd_and_hms(2025, 6, 10, 3, 0, 0).unwrap();
        CachedPermissionEntry::new(caller, ResolvedGrants::empty(at), expires_at)
    }

    #[tokio::test]
    async fn test_put_get_upsert() {
        let cache = InMemoryPermissionCache::default();
        cache.put(entry("u-1", 100)).await.unwrap();
        cache.put(entry("u-1", 200)).await.unwrap();

        let got = cache
            .get("u-1", DYNAMIC_PERMISSIONS_RESOURCE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.expires_at, 200);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("u-2", DYNAMIC_PERMISSIONS_RESOURCE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_returns_expired_entries() {
        let cache = InMemoryPermissionCache::default();
        cache.put(entry("u-1", 100)).await.unwrap();
        let got = cache.get("u-1", DYNAMIC_PERMISSIONS_RESOURCE).await.unwrap().unwrap();
        assert!(!got.is_fresh(100));
        assert!(got.is_fresh(99));
    }

    #[tokio::test]
    async fn test_eviction_prefers_soonest_expiry() {
        let cache = InMemoryPermissionCache::new(2);
        cache.put(entry("u-1", 300)).await.unwrap();
        cache.put(entry("u-2", 100)).await.unwrap();
        cache.put(entry("u-3", 200)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("u-2", DYNAMIC_PERMISSIONS_RESOURCE).await.unwrap().is_none());
        assert!(cache.get("u-1", DYNAMIC_PERMISSIONS_RESOURCE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = InMemoryPermissionCache::default();
        cache.put(entry("u-1", 100)).await.unwrap();
        cache.put(entry("u-2", 100)).await.unwrap();

        assert_eq!(cache.invalidate("u-1").await.unwrap(), 1);
        assert_eq!(cache.invalidate("u-1").await.unwrap(), 0);
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(entry("u-1", 42)).unwrap();
        assert_eq!(json["callerId"], "u-1");
        assert_eq!(json["resource"], DYNAMIC_PERMISSIONS_RESOURCE);
        assert_eq!(json["expiresAt"], 42);
    }
}
