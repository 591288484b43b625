//! Audit trail types and the fire-and-forget sink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: AuditOperation,
    /// Requesting organization, when known.
    pub actor: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditEntry {
    pub fn new(operation: AuditOperation, actor: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation,
            actor: actor.map(str::to_string),
            metadata: HashMap::new(),
        }
    }
}

/// Operations worth an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditOperation {
    ObjectsAdded {
        collection_id: String,
        success_count: usize,
        failure_count: usize,
    },
    ObjectsServed {
        collection_id: String,
        result_count: usize,
        anonymized: bool,
    },
    ObjectServed {
        collection_id: String,
        object_id: String,
        anonymized: bool,
    },
    ManifestServed {
        collection_id: String,
        result_count: usize,
    },
    AccessDenied {
        collection_id: String,
        reason: String,
    },
}

/// Fire-and-forget audit sink. Implementations must never fail the
/// operation that produced the entry.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Sink that drops every entry.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

/// In-memory sink for tests and local deployments.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
