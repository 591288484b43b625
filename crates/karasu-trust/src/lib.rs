//! # Karasu Trust
//!
//! Trust levels, directed trust relationships and trust groups between
//! organizations, plus the policy engine that resolves the effective
//! (trust-level, access-level, anonymization-level) triple for an ordered
//! pair of organizations.
//!
//! Relationships follow a bilateral-approval state machine: created pending,
//! approved independently by each endpoint, active only once both sides have
//! approved and the validity window holds. Revoked and expired are terminal.

pub mod engine;
pub mod model;

pub use engine::{AccessDecision, CreateOptions, ResolvedTrust, TrustPolicyEngine};
pub use model::{
    is_valid_org_id, AccessLevel, MemoryEventSink, NullEventSink, RelationshipKind,
    RelationshipStatus, TrustError, TrustEvent, TrustEventSink, TrustGroup, TrustLevel,
    TrustRelationship,
};
