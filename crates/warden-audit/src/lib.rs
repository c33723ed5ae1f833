//! # warden-audit: Audit trail for Warden decisions
//!
//! Every authorization decision produces an [`AuditRecord`]. Records are
//! append-only and carry a retention deadline (`ttl`, epoch seconds);
//! [`AuditStore::purge_expired`] is the only removal path.
//!
//! The [`AuditLogger`] sits on the decision path and must never change or
//! delay a decision: records are handed to a background writer, and store
//! failures are logged and counted instead of returned.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use warden_audit::{AuditAction, AuditLogger, AuditQuery, AuditResult, InMemoryAuditStore};
//!
//! # let runtime = tokio::runtime::Runtime::new().unwrap();
//! # runtime.block_on(async {
//! let logger = AuditLogger::new(Arc::new(InMemoryAuditStore::new()), 90);
//! let record = logger.entry(
//!     "alice",
//!     AuditAction::SearchExecuted,
//!     "search_results",
//!     AuditResult::Allow,
//!     Utc::now(),
//! );
//! logger.log(record);
//! logger.flush().await;
//!
//! let found = logger.query(&AuditQuery::default().with_caller("alice")).await.unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! ```

use thiserror::Error;

pub mod logger;
pub mod record;
pub mod store;

pub use logger::{AuditLogger, DEFAULT_QUEUE_CAPACITY, DEFAULT_WRITE_TIMEOUT};
pub use record::{AuditAction, AuditRecord, AuditResult, risk_score};
pub use store::{AuditQuery, AuditStore, InMemoryAuditStore};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit store error: {0}")]
    Store(String),

    #[error("audit store lock poisoned")]
    LockPoisoned,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
