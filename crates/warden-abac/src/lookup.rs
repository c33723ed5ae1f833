//! External lookups consulted by the geographic evaluator.
//!
//! Real deployments back these with network services. The implementations
//! here are local: a static prefix table, the private-range VPN heuristic and
//! an empty history.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use thiserror::Error;
use warden_types::GeoLocation;

use crate::cidr::IpRange;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("{service} lookup failed: {message}")]
    Failed {
        service: &'static str,
        message: String,
    },

    #[error("{service} lookup timed out after {timeout_ms}ms")]
    Timeout { service: &'static str, timeout_ms: u64 },
}

impl LookupError {
    pub fn failed(service: &'static str, message: impl Into<String>) -> Self {
        LookupError::Failed {
            service,
            message: message.into(),
        }
    }
}

/// Runs a lookup under a deadline, mapping expiry to [`LookupError::Timeout`].
pub async fn with_timeout<T, F>(service: &'static str, timeout: Duration, lookup: F) -> Result<T, LookupError>
where
    F: Future<Output = Result<T, LookupError>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(result) => result,
        Err(_) => Err(LookupError::Timeout {
            service,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Resolves a network origin to a location.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, origin: &str) -> Result<GeoLocation, LookupError>;
}

/// Classifies a network origin as VPN or not.
#[async_trait]
pub trait VpnDetector: Send + Sync {
    async fn is_vpn(&self, origin: &str) -> Result<bool, LookupError>;
}

/// Country codes of a caller's recent accesses, newest first.
#[async_trait]
pub trait AccessHistory: Send + Sync {
    async fn recent_countries(&self, caller_id: &str, limit: usize) -> Result<Vec<String>, LookupError>;
}

// ============================================================================
// Local implementations
// ============================================================================

/// Address prefixes the heuristic treats as tunnelled.
pub const VPN_HEURISTIC_PREFIXES: [&str; 4] = ["10.", "172.16.", "192.168.", "127.0.0.1"];

/// Treats private and loopback origins as VPN egress.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateRangeHeuristic;

#[async_trait]
impl VpnDetector for PrivateRangeHeuristic {
    async fn is_vpn(&self, origin: &str) -> Result<bool, LookupError> {
        let origin = origin.trim();
        Ok(VPN_HEURISTIC_PREFIXES
            .iter()
            .any(|prefix| origin.starts_with(prefix)))
    }
}

/// Resolves origins from a fixed range table.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLocator {
    entries: Vec<(IpRange, GeoLocation)>,
}

impl StaticGeoLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range. Earlier entries win.
    pub fn with_range(mut self, range: IpRange, location: GeoLocation) -> Self {
        self.entries.push((range, location.from_source("static")));
        self
    }
}

#[async_trait]
impl GeoLocator for StaticGeoLocator {
    async fn locate(&self, origin: &str) -> Result<GeoLocation, LookupError> {
        let addr = origin
            .trim()
            .parse()
            .map_err(|_| LookupError::failed("geolocation", format!("invalid origin {origin:?}")))?;
        self.entries
            .iter()
            .find(|(range, _)| range.contains(addr))
            .map(|(_, location)| location.clone())
            .ok_or_else(|| LookupError::failed("geolocation", format!("no location for {origin}")))
    }
}

/// Remembers successful lookups for a fixed lifetime.
///
/// Failures are never cached.
pub struct CachingGeoLocator {
    inner: Arc<dyn GeoLocator>,
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, GeoLocation)>>,
}

impl CachingGeoLocator {
    pub fn new(inner: Arc<dyn GeoLocator>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, origin: &str) -> Option<GeoLocation> {
        let entries = self.entries.read().ok()?;
        entries
            .get(origin)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, location)| location.clone())
    }
}

#[async_trait]
impl GeoLocator for CachingGeoLocator {
    async fn locate(&self, origin: &str) -> Result<GeoLocation, LookupError> {
        let origin = origin.trim();
        if let Some(location) = self.cached(origin) {
            return Ok(location);
        }

        let location = self.inner.locate(origin).await?;
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
            entries.insert(origin.to_string(), (Instant::now(), location.clone()));
        }
        Ok(location)
    }
}

/// History source with no records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl AccessHistory for NoHistory {
    async fn recent_countries(&self, _caller_id: &str, _limit: usize) -> Result<Vec<String>, LookupError> {
        Ok(Vec::new())
    }
}
