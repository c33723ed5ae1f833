//! Audit storage.
//!
//! Stores are append-only: the only removal path is [`AuditStore::purge_expired`],
//! which drops records whose retention has lapsed.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::record::{AuditAction, AuditRecord, AuditResult};
use crate::{AuditError, Result};

/// Query filter for the audit trail.
///
/// All fields are optional and combined with AND logic.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub caller_id: Option<String>,
    pub action: Option<AuditAction>,
    pub resource: Option<String>,
    pub result: Option<AuditResult>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn with_caller(mut self, caller_id: &str) -> Self {
        self.caller_id = Some(caller_id.to_string());
        self
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn with_result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Filter to records within a time range (inclusive).
    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.time_from = Some(from);
        self.time_to = Some(to);
        self
    }

    /// Return the most recent records first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if self
            .caller_id
            .as_ref()
            .is_some_and(|caller| &record.caller_id != caller)
        {
            return false;
        }
        if self.action.is_some_and(|action| record.action != action) {
            return false;
        }
        if self
            .resource
            .as_ref()
            .is_some_and(|resource| &record.resource != resource)
        {
            return false;
        }
        if self.result.is_some_and(|result| record.result != result) {
            return false;
        }
        if self.time_from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.time_to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        true
    }

    /// Applies the filter, ordering, and limit to records in insertion order.
    pub fn apply<'a>(
        &self,
        records: impl DoubleEndedIterator<Item = &'a AuditRecord>,
    ) -> Vec<AuditRecord> {
        let limit = self.limit.unwrap_or(usize::MAX);
        if self.newest_first {
            records
                .rev()
                .filter(|r| self.matches(r))
                .take(limit)
                .cloned()
                .collect()
        } else {
            records
                .filter(|r| self.matches(r))
                .take(limit)
                .cloned()
                .collect()
        }
    }
}

/// Backend holding audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one record.
    async fn append(&self, record: AuditRecord) -> Result<()>;

    /// Returns records matching `query`.
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>>;

    /// Drops records whose retention lapsed at `now`, returning how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Process-local store, suitable for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records held.
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| AuditError::LockPoisoned)?;
        records.push(record);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(query.apply(records.iter()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().map_err(|_| AuditError::LockPoisoned)?;
        let before = records.len();
        records.retain(|record| !record.is_expired(now));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(caller: &str, action: AuditAction, at: DateTime<Utc>) -> AuditRecord {
        AuditRecord::new(caller, action, "search_results", AuditResult::Allow, at, 90)
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_query_by_caller_and_action() {
        let store = InMemoryAuditStore::new();
        store
            .append(record("alice", AuditAction::SearchExecuted, base()))
            .await
            .unwrap();
        store
            .append(record("bob", AuditAction::SearchExecuted, base()))
            .await
            .unwrap();
        store
            .append(record("alice", AuditAction::RecordChecked, base()))
            .await
            .unwrap();

        let alice = store
            .query(&AuditQuery::default().with_caller("alice"))
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);

        let searches = store
            .query(
                &AuditQuery::default()
                    .with_caller("alice")
                    .with_action(AuditAction::SearchExecuted),
            )
            .await
            .unwrap();
        assert_eq!(searches.len(), 1);
    }

    #[tokio::test]
    async fn test_newest_first_with_limit() {
        let store = InMemoryAuditStore::new();
        for minutes in 0..5 {
            store
                .append(record(
                    "alice",
                    AuditAction::SearchExecuted,
                    base() + Duration::minutes(minutes),
                ))
                .await
                .unwrap();
        }

        let latest = store
            .query(&AuditQuery::default().newest_first().with_limit(2))
            .await
            .unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].timestamp, base() + Duration::minutes(4));
        assert_eq!(latest[1].timestamp, base() + Duration::minutes(3));
    }

    #[tokio::test]
    async fn test_time_range_is_inclusive() {
        let store = InMemoryAuditStore::new();
        for hours in 0..4 {
            store
                .append(record(
                    "alice",
                    AuditAction::SearchExecuted,
                    base() + Duration::hours(hours),
                ))
                .await
                .unwrap();
        }

        let window = AuditQuery::default()
            .with_time_range(base() + Duration::hours(1), base() + Duration::hours(2));
        assert_eq!(store.query(&window).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryAuditStore::new();
        store
            .append(record("alice", AuditAction::SearchExecuted, base()))
            .await
            .unwrap();
        store
            .append(record(
                "alice",
                AuditAction::SearchExecuted,
                base() + Duration::days(30),
            ))
            .await
            .unwrap();

        let purged = store.purge_expired(base() + Duration::days(91)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
    }
}
