//! Validation report types

use karasu_core::SpecVersion;
use serde::{Deserialize, Serialize};

/// Outcome of validating one canonical object.
///
/// Warnings never flip `valid`; errors always do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.valid = false;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Report from the multi-version entry point, tagged with what detection and
/// conversion did before validation ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiVersionReport {
    pub detected_version: SpecVersion,
    pub converted: bool,
    #[serde(flatten)]
    pub report: ValidationReport,
}
