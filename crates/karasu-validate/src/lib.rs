//! # Karasu Validate
//!
//! Structural validation of canonical objects: required fields, identifier
//! shape, type-specific rules and embedded pattern-grammar syntax.
//!
//! Validation never throws: every entry point returns a report so batch
//! callers can continue past individual failures.

pub mod pattern;
pub mod report;
pub mod validator;

pub use report::{MultiVersionReport, ValidationReport};
pub use validator::ObjectValidator;
