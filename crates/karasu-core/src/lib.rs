//! # Karasu Core
//!
//! Canonical STIX object and bundle data model shared by every Karasu crate.
//! Inbound payloads of any supported wire version are normalized into these
//! types before storage or serving.

pub mod model;

pub use model::*;
