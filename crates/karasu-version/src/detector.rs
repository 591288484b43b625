//! Wire-format version detection

use karasu_core::SpecVersion;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    /// Ordered version tokens scanned for in markup payloads. First hit wins.
    static ref MARKUP_VERSION_TOKENS: Vec<(Regex, SpecVersion)> = vec![
        (Regex::new(r#"version\s*=\s*"1\.2(\.\d+)?""#).unwrap(), SpecVersion::V1_2),
        (Regex::new(r#"version\s*=\s*"1\.1(\.\d+)?""#).unwrap(), SpecVersion::V1_1),
        (Regex::new(r#"version\s*=\s*"1\.0(\.\d+)?""#).unwrap(), SpecVersion::V1_0),
        (Regex::new(r"stix-1\.2").unwrap(), SpecVersion::V1_2),
        (Regex::new(r"stix-1\.1").unwrap(), SpecVersion::V1_1),
        (Regex::new(r"stix-1\.0").unwrap(), SpecVersion::V1_0),
    ];
}

/// Classifies a raw payload into one of the supported wire versions.
///
/// Total over arbitrary input: anything unrecognized yields
/// [`SpecVersion::Unknown`], never an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionDetector;

impl VersionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the version of a textual payload.
    pub fn detect(&self, payload: &str) -> SpecVersion {
        let trimmed = payload.trim_start();
        if trimmed.is_empty() {
            return SpecVersion::Unknown;
        }
        if Self::looks_like_markup(trimmed) {
            return self.detect_markup(trimmed);
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => self.detect_value(&value),
            Err(_) => SpecVersion::Unknown,
        }
    }

    /// Detect the version of a raw byte payload (lossy UTF-8).
    pub fn detect_bytes(&self, payload: &[u8]) -> SpecVersion {
        self.detect(&String::from_utf8_lossy(payload))
    }

    /// Detect the version of an already-structured payload.
    ///
    /// A bundle with no version anywhere but with `type` + `id` present on
    /// its root or members defaults to the newest 2.x tier.
    pub fn detect_value(&self, value: &Value) -> SpecVersion {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return SpecVersion::Unknown,
        };

        if let Some(tag) = obj.get("spec_version").and_then(Value::as_str) {
            let version = SpecVersion::from_tag(tag);
            if version != SpecVersion::Unknown {
                return version;
            }
        }

        if obj.get("type").and_then(Value::as_str) == Some("bundle") {
            return self.detect_bundle(value);
        }

        // A bare object with type + id but no version tag is treated as the
        // newest 2.x tier.
        if obj.get("type").and_then(Value::as_str).is_some() && obj.contains_key("id") {
            return SpecVersion::V2_1;
        }

        SpecVersion::Unknown
    }

    /// Bundle detection inspects member objects even when the bundle root
    /// lacks a version field.
    fn detect_bundle(&self, bundle: &Value) -> SpecVersion {
        let members = bundle
            .get("objects")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for member in members {
            if let Some(tag) = member.get("spec_version").and_then(Value::as_str) {
                let version = SpecVersion::from_tag(tag);
                if version != SpecVersion::Unknown {
                    return version;
                }
            }
        }

        let members_shaped = members
            .iter()
            .any(|m| m.get("type").is_some() && m.get("id").is_some());
        if members_shaped || bundle.get("id").is_some() {
            return SpecVersion::V2_1;
        }

        SpecVersion::Unknown
    }

    fn detect_markup(&self, payload: &str) -> SpecVersion {
        // The XML prolog carries its own version="1.0"; scan past it.
        let body = match payload.strip_prefix("<?xml") {
            Some(rest) => rest.split_once("?>").map(|(_, body)| body).unwrap_or(rest),
            None => payload,
        };
        for (token, version) in MARKUP_VERSION_TOKENS.iter() {
            if token.is_match(body) {
                return *version;
            }
        }
        // Markup detected but no explicit version token: newest 1.x tier.
        SpecVersion::V1_2
    }

    fn looks_like_markup(trimmed: &str) -> bool {
        trimmed.starts_with("<?xml") || trimmed.starts_with('<')
    }
}
