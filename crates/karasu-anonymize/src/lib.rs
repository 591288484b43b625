//! # Karasu Anonymize
//!
//! Strategy-driven anonymization of canonical objects. A resolved
//! anonymization level controls how much of each field is obscured before an
//! object leaves its owning organization.
//!
//! All substitution is consistent within one [`AnonymizationContext`] (same
//! input, same output) and contexts are scoped to a single request or bundle.
//! Sharing one across requests leaks value correlations between tenants.

pub mod context;
pub mod engine;
pub mod level;
pub mod pseudonym;
pub mod strategy;
pub mod text;

pub use context::AnonymizationContext;
pub use engine::{AnonymizationEngine, AnonymizeOptions};
pub use level::AnonymizationLevel;
pub use pseudonym::Pseudonymizer;
pub use strategy::{detect_semantic_type, AnonymizationStrategy, SemanticType};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnonymizeError {
    #[error("no strategy registered for semantic type {0:?} and no default set")]
    StrategyNotFound(SemanticType),

    #[error("input exceeds the {max} byte anonymization cap ({len} bytes)")]
    InputTooLarge { len: usize, max: usize },

    #[error("object shape error: {0}")]
    BadObject(String),
}
