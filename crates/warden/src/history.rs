//! Access history backed by the audit log.

use std::sync::Arc;

use async_trait::async_trait;
use warden_abac::{AccessHistory, LookupError};
use warden_audit::{AuditAction, AuditLogger, AuditQuery, AuditResult};

/// Countries of a caller's recent allowed requests, read from the audit log.
///
/// Only allowed requests count, so repeated denied attempts from a new country
/// never make it look familiar.
pub struct AuditAccessHistory {
    logger: Arc<AuditLogger>,
}

impl AuditAccessHistory {
    pub fn new(logger: Arc<AuditLogger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl AccessHistory for AuditAccessHistory {
    async fn recent_countries(&self, caller_id: &str, limit: usize) -> Result<Vec<String>, LookupError> {
        let query = AuditQuery::default()
            .with_caller(caller_id)
            .with_action(AuditAction::PermissionFilterRequest)
            .with_result(AuditResult::Allow)
            .newest_first();

        let records = self
            .logger
            .query(&query)
            .await
            .map_err(|e| LookupError::failed("access history", e.to_string()))?;

        Ok(records
            .into_iter()
            .filter_map(|r| r.source_country)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use warden_audit::InMemoryAuditStore;

    use super::*;

    #[tokio::test]
    async fn test_newest_allowed_countries_first() {
        let logger = Arc::new(AuditLogger::new(Arc::new(InMemoryAuditStore::new()), 90));
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap();

        for (i, (country, result)) in [
            ("JP", AuditResult::Allow),
            ("SG", AuditResult::Allow),
            ("CN", AuditResult::Deny),
            ("US", AuditResult::Allow),
        ]
        .into_iter()
        .enumerate()
        {
            let record = logger
                .entry(
                    "u-1",
                    AuditAction::PermissionFilterRequest,
                    "permission_filter",
                    result,
                    start + Duration::minutes(i as i64),
                )
                .with_source_country(country);
            logger.log(record);
        }
        logger.flush().await;

        let history = AuditAccessHistory::new(Arc::clone(&logger));
        assert_eq!(history.recent_countries("u-1", 2).await.unwrap(), vec!["US", "SG"]);
        assert!(history.recent_countries("u-2", 10).await.unwrap().is_empty());
    }
}
