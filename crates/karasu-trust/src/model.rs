//! Trust data model

use chrono::{DateTime, Utc};
use karasu_anonymize::AnonymizationLevel;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

lazy_static! {
    static ref ORG_ID: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").unwrap();
}

/// Organization identifiers are short opaque handles, not free text.
pub fn is_valid_org_id(org: &str) -> bool {
    ORG_ID.is_match(org)
}

#[derive(Debug, Error)]
pub enum TrustError {
    /// All problems with the attempted change, never a partial list.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

/// Ordered access scale used by access checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    None,
    Read,
    Subscribe,
    Contribute,
    Full,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Read => "read",
            AccessLevel::Subscribe => "subscribe",
            AccessLevel::Contribute => "contribute",
            AccessLevel::Full => "full",
        }
    }
}

/// Named trust tier with a unique numeric rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLevel {
    pub name: String,
    /// 0..=100, unique across registered levels.
    pub rank: u8,
    pub anonymization: AnonymizationLevel,
    pub access: AccessLevel,
    pub active: bool,
}

impl TrustLevel {
    pub fn new(
        name: &str,
        rank: u8,
        anonymization: AnonymizationLevel,
        access: AccessLevel,
    ) -> Self {
        Self {
            name: name.to_string(),
            rank,
            anonymization,
            access,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Bilateral,
    Community,
    Hierarchical,
    Federation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Pending,
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl RelationshipStatus {
    /// Revoked and expired admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelationshipStatus::Revoked | RelationshipStatus::Expired)
    }
}

/// A directed trust edge from `source_org` to `target_org`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRelationship {
    pub id: Uuid,
    pub source_org: String,
    pub target_org: String,
    pub trust_level: String,
    pub kind: RelationshipKind,
    pub approved_by_source: bool,
    pub approved_by_target: bool,
    /// Acting user handles recorded with each side's approval.
    pub source_approver: Option<String>,
    pub target_approver: Option<String>,
    pub status: RelationshipStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Effective levels, defaulted from the trust level, overridable.
    pub anonymization: AnonymizationLevel,
    pub access: AccessLevel,
    /// Set on group-derived community edges only.
    pub group: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revoking_org: Option<String>,
    /// The user handle that performed the revocation.
    pub revoked_by: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}

impl TrustRelationship {
    pub fn involves(&self, org: &str) -> bool {
        self.source_org == org || self.target_org == org
    }

    /// Derived, never stored: active, fully approved and inside the
    /// validity window at `now`.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.status == RelationshipStatus::Active
            && self.approved_by_source
            && self.approved_by_target
            && self.valid_from <= now
            && self.valid_until.map_or(true, |until| now < until)
    }
}

/// Named community. Membership implies community trust edges between every
/// member pair at the group's default level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustGroup {
    pub name: String,
    pub description: String,
    pub default_trust_level: String,
    pub members: Vec<String>,
    pub admins: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl TrustGroup {
    pub fn is_member(&self, org: &str) -> bool {
        self.members.iter().any(|m| m == org)
    }

    pub fn is_admin(&self, org: &str) -> bool {
        self.admins.iter().any(|a| a == org)
    }
}

/// Typed trust event handed to the dispatcher on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrustEvent {
    RelationshipCreated {
        id: Uuid,
        source_org: String,
        target_org: String,
    },
    Approved {
        id: Uuid,
        org: String,
    },
    Activated {
        id: Uuid,
    },
    Suspended {
        id: Uuid,
        org: String,
    },
    Reinstated {
        id: Uuid,
        org: String,
    },
    Revoked {
        id: Uuid,
        org: String,
        reason: String,
    },
    Expired {
        id: Uuid,
    },
    GroupJoined {
        group: String,
        org: String,
    },
    GroupLeft {
        group: String,
        org: String,
    },
}

/// Event dispatch seam. Dispatch is fire-and-forget: implementations must
/// not fail the triggering operation.
pub trait TrustEventSink: Send + Sync {
    fn dispatch(&self, event: &TrustEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl TrustEventSink for NullEventSink {
    fn dispatch(&self, _event: &TrustEvent) {}
}

/// In-memory sink, mainly for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<TrustEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrustEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TrustEventSink for MemoryEventSink {
    fn dispatch(&self, event: &TrustEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
