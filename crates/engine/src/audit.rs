//! Structured audit entries for failed transactions.
//!
//! Every caught deployment or rollback failure is logged through `tracing`
//! at error level and, when a sink is configured, handed to an
//! [`AuditSink`] as an [`AuditEntry`] carrying the full cause chain and a
//! captured backtrace.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub severity: Severity,
    /// Failing stage, e.g. `Permission copying`.
    pub operation: String,
    pub message: String,
    /// `Display` of the error and each of its sources, outermost first.
    pub error_chain: Vec<String>,
    pub backtrace: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn error(operation: &str, err: &(dyn StdError + 'static)) -> Self {
        let mut error_chain = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = current {
            error_chain.push(e.to_string());
            current = e.source();
        }

        Self {
            severity: Severity::Error,
            operation: operation.to_owned(),
            message: format!("{operation} failed: {err}"),
            error_chain,
            backtrace: Backtrace::force_capture().to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Receiver of audit entries.  Must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Keeps every entry in memory; used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }
}

/// Log `cause` as a failure of `stage` and wrap it into
/// [`EngineError::Transaction`].
pub(crate) fn transaction_failure(
    sink: Option<&dyn AuditSink>,
    stage: &'static str,
    cause: EngineError,
) -> EngineError {
    let entry = AuditEntry::error(stage, &cause);
    error!(
        stage,
        error = %cause,
        error_chain = ?entry.error_chain,
        backtrace = %entry.backtrace,
        "{} failed",
        stage
    );

    if let Some(sink) = sink {
        sink.record(entry);
    }

    EngineError::Transaction { stage, source: Box::new(cause) }
}
