//! # Karasu Version
//!
//! Multi-version normalization: classify an inbound payload into one of the
//! supported wire versions and convert it into the canonical version.
//!
//! Detection is total (never errors, unrecognized input is `Unknown`);
//! conversion is fallible and atomic per payload.

pub mod converter;
pub mod detector;
mod markup;

pub use converter::{ConversionError, Converted, VersionConverter};
pub use detector::VersionDetector;
