//! # Karasu Hub
//!
//! The collection service: composes the version pipeline, validator, trust
//! policy engine, anonymization engine, store, directory and audit sink into
//! the trust-gated serving and ingestion operations the protocol layer
//! exposes.

pub mod ingest;
pub mod service;

pub use ingest::{normalize, IngestFailure, IngestReport};
pub use service::{CollectionService, Envelope, Manifest, ManifestEntry};

use thiserror::Error;

/// Service-level error taxonomy. Responses built from these never leak
/// internal detail beyond the kind and a reason string.
#[derive(Debug, Error)]
pub enum HubError {
    /// Missing, or access-denied disguised as missing for read paths.
    #[error("not found: {0}")]
    NotFound(String),

    /// Explicit denial where confirming existence is acceptable.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}
