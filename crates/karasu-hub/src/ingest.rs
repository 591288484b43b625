//! Ingestion pipeline: detect, convert, validate
//!
//! Per-object failures are collected into a partial-success report instead
//! of aborting the batch.

use karasu_core::StixObject;
use karasu_validate::ObjectValidator;
use karasu_version::{VersionConverter, VersionDetector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one `add_objects` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub success_count: usize,
    pub failures: Vec<IngestFailure>,
    /// Always 0 in the synchronous pipeline, carried for the wire contract.
    pub pending_count: usize,
}

impl IngestReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    /// The inbound object's id when one was present.
    pub object: String,
    pub message: String,
}

/// Run one inbound value through the version pipeline and the validator.
/// A bundle value contributes each of its members.
pub fn normalize(value: &Value) -> Result<Vec<StixObject>, String> {
    let detector = VersionDetector::new();
    let converter = VersionConverter::new();
    let validator = ObjectValidator::new();

    let detected = detector.detect_value(value);
    let converted = converter
        .convert_value(value, detected)
        .map_err(|e| e.to_string())?;

    let objects = converted.into_objects();
    let mut normalized = Vec::with_capacity(objects.len());
    for object in objects {
        let report = validator.validate_object(&object);
        if !report.valid {
            return Err(report.errors.join("; "));
        }
        normalized.push(object);
    }
    Ok(normalized)
}

/// Best-effort identifier for failure reporting.
pub(crate) fn describe(value: &Value) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "<no id>".to_string())
}
