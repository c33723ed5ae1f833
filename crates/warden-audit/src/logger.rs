//! Decision-path audit logger.
//!
//! [`AuditLogger::log`] only enqueues. A writer task spawned on first use
//! appends records to the store in order, so a slow or failing store never
//! holds up a decision. Store failures, write timeouts and records dropped
//! on a full queue are logged with `tracing::error!` and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::record::{AuditAction, AuditRecord, AuditResult};
use crate::store::{AuditQuery, AuditStore};
use crate::{AuditError, Result};

/// Default bound on one store write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of records buffered ahead of the writer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Command {
    Write(AuditRecord),
    Flush(oneshot::Sender<()>),
}

pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    enabled: bool,
    retention_days: u32,
    write_timeout: Duration,
    queue_capacity: usize,
    queue: OnceLock<mpsc::Sender<Command>>,
    failures: Arc<AtomicU64>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, retention_days: u32) -> Self {
        Self {
            store,
            enabled: true,
            retention_days,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue: OnceLock::new(),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A logger that drops every record.
    pub fn disabled(store: Arc<dyn AuditStore>) -> Self {
        Self {
            enabled: false,
            ..Self::new(store, 0)
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Number of records that failed, timed out or were dropped since creation.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Starts a record carrying this logger's retention.
    pub fn entry(
        &self,
        caller_id: &str,
        action: AuditAction,
        resource: &str,
        result: AuditResult,
        now: DateTime<Utc>,
    ) -> AuditRecord {
        AuditRecord::new(caller_id, action, resource, result, now, self.retention_days)
    }

    /// Queues a record for the writer. Never waits on the store.
    ///
    /// Must be called inside a tokio runtime; outside one the record is
    /// counted as a failure.
    pub fn log(&self, record: AuditRecord) {
        if !self.enabled {
            return;
        }

        let Some(queue) = self.queue() else {
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            error!(id = %record.id, failures, "no runtime for audit writer, record dropped");
            return;
        };

        if let Err(e) = queue.try_send(Command::Write(record)) {
            let (reason, record) = match e {
                mpsc::error::TrySendError::Full(command) => ("queue full", command),
                mpsc::error::TrySendError::Closed(command) => ("writer stopped", command),
            };
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            if let Command::Write(record) = record {
                error!(
                    id = %record.id,
                    action = record.action.as_str(),
                    caller_id = %record.caller_id,
                    reason,
                    failures,
                    "audit record dropped"
                );
            }
        }
    }

    /// Waits until every record queued so far has been handled.
    pub async fn flush(&self) {
        let Some(queue) = self.queue.get() else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if queue.send(Command::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        self.store.query(query).await
    }

    /// Export matching records as a JSON array string.
    pub async fn export_json(&self, query: &AuditQuery) -> Result<String> {
        let records = self.store.query(query).await?;
        serde_json::to_string_pretty(&records).map_err(AuditError::from)
    }

    /// Drops expired records. Failures are absorbed and reported as zero.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        match self.store.purge_expired(now).await {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, "purged expired audit records");
                }
                purged
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "audit purge failed");
                0
            }
        }
    }

    /// The writer queue, spawning the writer on first use.
    fn queue(&self) -> Option<&mpsc::Sender<Command>> {
        if let Some(queue) = self.queue.get() {
            return Some(queue);
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        Some(self.queue.get_or_init(|| {
            let (tx, rx) = mpsc::channel(self.queue_capacity);
            let writer = Writer {
                store: Arc::clone(&self.store),
                write_timeout: self.write_timeout,
                failures: Arc::clone(&self.failures),
            };
            runtime.spawn(writer.run(rx));
            tx
        }))
    }
}

/// Drains the queue into the store. Exits when the logger is dropped.
struct Writer {
    store: Arc<dyn AuditStore>,
    write_timeout: Duration,
    failures: Arc<AtomicU64>,
}

impl Writer {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Write(record) => self.write(record).await,
                Command::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("audit writer stopped");
    }

    async fn write(&self, record: AuditRecord) {
        let id = record.id;
        let action = record.action.as_str();
        let caller_id = record.caller_id.clone();

        match tokio::time::timeout(self.write_timeout, self.store.append(record)).await {
            Ok(Ok(())) => {
                debug!(%id, action, caller_id = %caller_id, "audit record written");
            }
            Ok(Err(e)) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(%id, action, caller_id = %caller_id, error = %e, failures, "audit write failed");
            }
            Err(_) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    %id,
                    action,
                    caller_id = %caller_id,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    failures,
                    "audit write timed out"
                );
            }
        }
    }
}
