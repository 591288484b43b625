//! Canonical object, bundle and identifier types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The wire version every stored object is normalized to.
pub const CANONICAL_VERSION: &str = "2.1";

/// Suffixes marking a field as a reference to another object.
pub const REF_SUFFIX: &str = "_ref";
pub const REFS_SUFFIX: &str = "_refs";

/// Prefix marking a custom / extension field.
pub const CUSTOM_PREFIX: &str = "x_";

/// Media type served for canonical objects.
pub const STIX_MEDIA_TYPE: &str = "application/stix+json;version=2.1";

/// Protocol wire versions the platform can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecVersion {
    V1_0,
    V1_1,
    V1_2,
    V2_0,
    V2_1,
    Unknown,
}

impl SpecVersion {
    pub const CANONICAL: SpecVersion = SpecVersion::V2_1;

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecVersion::V1_0 => "1.0",
            SpecVersion::V1_1 => "1.1",
            SpecVersion::V1_2 => "1.2",
            SpecVersion::V2_0 => "2.0",
            SpecVersion::V2_1 => "2.1",
            SpecVersion::Unknown => "unknown",
        }
    }

    /// Map a `spec_version` tag to a version, if recognized.
    pub fn from_tag(tag: &str) -> SpecVersion {
        match tag.trim() {
            "1.0" => SpecVersion::V1_0,
            "1.1" => SpecVersion::V1_1,
            "1.2" => SpecVersion::V1_2,
            "2.0" => SpecVersion::V2_0,
            "2.1" => SpecVersion::V2_1,
            _ => SpecVersion::Unknown,
        }
    }

    pub fn is_markup_tier(&self) -> bool {
        matches!(
            self,
            SpecVersion::V1_0 | SpecVersion::V1_1 | SpecVersion::V1_2
        )
    }
}

impl std::fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Object types the platform accepts as domain objects.
pub const SUPPORTED_TYPES: &[&str] = &[
    "indicator",
    "malware",
    "attack-pattern",
    "threat-actor",
    "identity",
    "relationship",
    "observed-data",
    "report",
    "campaign",
    "course-of-action",
    "intrusion-set",
    "tool",
    "vulnerability",
    "sighting",
    "grouping",
    "infrastructure",
    "location",
    "malware-analysis",
    "note",
    "opinion",
];

/// Cyber-observable types, anonymized field-by-field rather than as free text.
pub const OBSERVABLE_TYPES: &[&str] = &[
    "ipv4-addr",
    "ipv6-addr",
    "domain-name",
    "email-addr",
    "url",
    "file",
    "user-account",
    "process",
    "network-traffic",
    "email-message",
];

pub fn is_supported_type(object_type: &str) -> bool {
    SUPPORTED_TYPES.contains(&object_type) || OBSERVABLE_TYPES.contains(&object_type)
}

pub fn is_observable_type(object_type: &str) -> bool {
    OBSERVABLE_TYPES.contains(&object_type)
}

/// Identifier errors
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("identifier has no '--' separator: {0}")]
    MissingSeparator(String),

    #[error("identifier UUID part is malformed: {0}")]
    BadUuid(String),

    #[error("identifier type prefix is empty")]
    EmptyPrefix,
}

/// Split a `"<type>--<uuid>"` identifier into its parts.
pub fn parse_stix_id(id: &str) -> Result<(&str, Uuid), IdError> {
    let (prefix, rest) = id
        .split_once("--")
        .ok_or_else(|| IdError::MissingSeparator(id.to_string()))?;
    if prefix.is_empty() {
        return Err(IdError::EmptyPrefix);
    }
    let uuid = Uuid::parse_str(rest).map_err(|_| IdError::BadUuid(rest.to_string()))?;
    Ok((prefix, uuid))
}

/// Mint a fresh identifier for the given object type.
pub fn mint_id(object_type: &str) -> String {
    format!("{}--{}", object_type, Uuid::new_v4())
}

/// One canonical threat-intelligence object.
///
/// Type-specific fields (pattern, hashes, labels, references...) live in
/// `extra` so arbitrary content survives a round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StixObject {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StixObject {
    /// Create a new canonical object with a minted id and current timestamps.
    pub fn new(object_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: mint_id(object_type),
            object_type: object_type.to_string(),
            spec_version: Some(CANONICAL_VERSION.to_string()),
            created: Some(now),
            modified: Some(now),
            extra: Map::new(),
        }
    }

    /// The type prefix of the object's id, if well-formed.
    pub fn id_type_prefix(&self) -> Option<&str> {
        self.id.split_once("--").map(|(prefix, _)| prefix)
    }

    /// Id prefix matches the declared type and timestamps are ordered.
    pub fn invariants_hold(&self) -> bool {
        let prefix_ok = self.id_type_prefix() == Some(self.object_type.as_str());
        let times_ok = match (self.created, self.modified) {
            (Some(c), Some(m)) => m >= c,
            _ => true,
        };
        prefix_ok && times_ok
    }

    /// Builder-style setter for a type-specific field.
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// An ordered batch of canonical objects exchanged as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub objects: Vec<StixObject>,
}

impl Bundle {
    pub fn new(objects: Vec<StixObject>) -> Self {
        Self {
            id: mint_id("bundle"),
            object_type: "bundle".to_string(),
            objects,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
