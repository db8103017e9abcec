//! Audit trail - structured records for every attempted action.
//!
//! The router emits one record per order outcome (accepted, rejected, or
//! failed), per cancel, and per halt transition. Sinks are external
//! collaborators; the tracing-backed sink is the default and an in-memory
//! sink backs tests and embedding applications that persist elsewhere.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

/// Actions recorded for traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderPlaced,
    OrderRejected,
    OrderFailed,
    OrderCancelled,
    CancelRejected,
    HaltActivated,
    HaltDeactivated,
    AccountRegistered,
    AccountRemoved,
    PaperReset,
}

/// One immutable audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub outcome: String,
    pub details: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        outcome: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            outcome: outcome.into(),
            details,
        }
    }
}

/// Destination for audit records. Implementations must not fail the
/// caller: an order outcome is never dropped because a sink hiccuped.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Default sink: structured events on the `audit` target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "audit",
            actor = %record.actor,
            action = ?record.action,
            outcome = %record.outcome,
            details = %record.details,
            "audit"
        );
    }
}

/// Keeps records in memory; used by tests and by embedders that flush
/// records to their own store.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn count_action(&self, action: AuditAction) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.action == action)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.write().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_sink_accumulates_records() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditRecord::new(
            "operator",
            AuditAction::HaltActivated,
            "ok",
            json!({ "reason": "drill" }),
        ));
        sink.record(AuditRecord::new(
            "system",
            AuditAction::OrderRejected,
            "risk rejected",
            json!({ "symbol": "TCS" }),
        ));

        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.count_action(AuditAction::HaltActivated), 1);
        assert_eq!(sink.count_action(AuditAction::OrderPlaced), 0);
    }
}
