//! Conversion of detected payloads into the canonical version

use crate::markup::{self, XmlNode};
use chrono::Utc;
use karasu_core::{Bundle, SpecVersion, StixObject, CANONICAL_VERSION};
use serde_json::{json, Value};

/// Conversion failures. Detection never errors; conversion does.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("cannot convert a payload of unknown version")]
    UnknownVersion,

    #[error("payload parse failed: {0}")]
    Parse(String),

    #[error("markup payload is empty")]
    EmptyMarkup,
}

/// Result of a conversion: the caller's shape is preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    Bundle(Bundle),
    Object(Box<StixObject>),
}

impl Converted {
    /// Flatten into the contained objects, consuming the conversion result.
    pub fn into_objects(self) -> Vec<StixObject> {
        match self {
            Converted::Bundle(bundle) => bundle.objects,
            Converted::Object(object) => vec![*object],
        }
    }

    pub fn object_count(&self) -> usize {
        match self {
            Converted::Bundle(bundle) => bundle.objects.len(),
            Converted::Object(_) => 1,
        }
    }
}

/// Maps a payload of a detected version into the canonical version's shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionConverter;

impl VersionConverter {
    pub fn new() -> Self {
        Self
    }

    /// Convert a textual payload of the given detected version.
    pub fn convert_to_canonical(
        &self,
        payload: &str,
        detected: SpecVersion,
    ) -> Result<Converted, ConversionError> {
        match detected {
            SpecVersion::Unknown => Err(ConversionError::UnknownVersion),
            v if v.is_markup_tier() => self.convert_markup(payload),
            _ => {
                let value: Value = serde_json::from_str(payload)
                    .map_err(|e| ConversionError::Parse(e.to_string()))?;
                self.convert_value(&value, detected)
            }
        }
    }

    /// Convert an already-structured payload of the given detected version.
    ///
    /// Canonical input passes through unchanged in content, but is always
    /// re-built; the result never aliases the caller's data.
    pub fn convert_value(
        &self,
        value: &Value,
        detected: SpecVersion,
    ) -> Result<Converted, ConversionError> {
        match detected {
            SpecVersion::Unknown => Err(ConversionError::UnknownVersion),
            v if v.is_markup_tier() => Err(ConversionError::Parse(
                "markup-tier payloads must be converted from text".to_string(),
            )),
            _ => {
                if value.get("type").and_then(Value::as_str) == Some("bundle") {
                    let mut bundle: Bundle = serde_json::from_value(value.clone())
                        .map_err(|e| ConversionError::Parse(e.to_string()))?;
                    for object in &mut bundle.objects {
                        upgrade_object(object);
                    }
                    Ok(Converted::Bundle(bundle))
                } else {
                    let mut object: StixObject = serde_json::from_value(value.clone())
                        .map_err(|e| ConversionError::Parse(e.to_string()))?;
                    upgrade_object(&mut object);
                    Ok(Converted::Object(Box::new(object)))
                }
            }
        }
    }

    /// 1.x markup → canonical bundle.
    ///
    /// Walks the three known substructures (indicators, TTPs, threat actors)
    /// and drops anything unmappable. Zero convertible members yields an
    /// empty bundle, not an error.
    fn convert_markup(&self, payload: &str) -> Result<Converted, ConversionError> {
        if payload.trim().is_empty() {
            return Err(ConversionError::EmptyMarkup);
        }
        let root = markup::parse(payload).map_err(ConversionError::Parse)?;

        let mut objects = Vec::new();

        let mut indicators = Vec::new();
        root.find_all("Indicator", &mut indicators);
        for node in indicators {
            objects.push(convert_indicator(node));
        }

        let mut ttps = Vec::new();
        root.find_all("TTP", &mut ttps);
        for node in ttps {
            objects.push(convert_ttp(node));
        }

        let mut actors = Vec::new();
        root.find_all("Threat_Actor", &mut actors);
        for node in actors {
            objects.push(convert_threat_actor(node));
        }

        Ok(Converted::Bundle(Bundle::new(objects)))
    }
}

/// In-place 2.0 → 2.1 upgrade of a single object; canonical objects only get
/// their version tag confirmed.
fn upgrade_object(object: &mut StixObject) {
    object.spec_version = Some(CANONICAL_VERSION.to_string());

    match object.object_type.as_str() {
        "malware" => {
            // 2.0 malware had no family flag.
            object
                .extra
                .entry("is_family".to_string())
                .or_insert(Value::Bool(true));
        }
        "indicator" => {
            object
                .extra
                .entry("pattern_type".to_string())
                .or_insert_with(|| Value::String("stix".to_string()));
        }
        _ => {}
    }
}

/// 1.x indicator → canonical `indicator`.
///
/// The content pattern is derived from the first recognized embedded
/// observable; a file hash wins priority. When nothing is recognized the
/// pattern degrades to a generic `[file:name = 'unknown']` rather than
/// failing the whole conversion.
fn convert_indicator(node: &XmlNode) -> StixObject {
    let mut object = StixObject::new("indicator");
    if let Some(title) = node.text_of("Title") {
        object.extra.insert("name".to_string(), Value::String(title));
    }
    if let Some(description) = node.text_of("Description") {
        object
            .extra
            .insert("description".to_string(), Value::String(description));
    }
    object
        .extra
        .insert("pattern".to_string(), Value::String(derive_pattern(node)));
    object
        .extra
        .insert("pattern_type".to_string(), Value::String("stix".to_string()));
    object.extra.insert(
        "valid_from".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    object
}

/// Priority order for recognized hash observables, weakest first.
const HASH_PRIORITY: &[(&str, &str)] = &[("MD5", "MD5"), ("SHA1", "SHA-1"), ("SHA256", "SHA-256")];

fn derive_pattern(node: &XmlNode) -> String {
    // File-hash observable wins priority.
    let mut hashes = Vec::new();
    node.find_all("Hash", &mut hashes);
    let mut best: Option<(usize, String, String)> = None;
    for hash in hashes {
        let kind = hash
            .text_of("Type")
            .unwrap_or_default()
            .replace('-', "")
            .to_uppercase();
        let value = match hash.text_of("Simple_Hash_Value") {
            Some(v) => v,
            None => continue,
        };
        if let Some(rank) = HASH_PRIORITY.iter().position(|(k, _)| *k == kind) {
            if best.as_ref().map(|(r, _, _)| rank > *r).unwrap_or(true) {
                let canonical = HASH_PRIORITY[rank].1.to_string();
                best = Some((rank, canonical, value));
            }
        }
    }
    if let Some((_, algo, value)) = best {
        return format!("[file:hashes.'{algo}' = '{value}']");
    }

    if let Some(address) = node.text_of("Address_Value") {
        let object_type = if address.contains(':') {
            "ipv6-addr"
        } else {
            "ipv4-addr"
        };
        return format!("[{object_type}:value = '{address}']");
    }

    if let Some(domain) = node
        .find_first("Domain_Name")
        .and_then(|n| n.text_of("Value"))
    {
        return format!("[domain-name:value = '{domain}']");
    }

    // Degrade gracefully when no observable is recognized.
    "[file:name = 'unknown']".to_string()
}

/// 1.x tactic/technique → canonical `attack-pattern`.
fn convert_ttp(node: &XmlNode) -> StixObject {
    let mut object = StixObject::new("attack-pattern");
    let name = node
        .text_of("Title")
        .unwrap_or_else(|| "unnamed-attack-pattern".to_string());
    object.extra.insert("name".to_string(), Value::String(name));
    if let Some(description) = node.text_of("Description") {
        object
            .extra
            .insert("description".to_string(), Value::String(description));
    }
    object
}

/// 1.x threat actor → canonical `threat-actor`.
fn convert_threat_actor(node: &XmlNode) -> StixObject {
    let mut object = StixObject::new("threat-actor");
    let name = node
        .text_of("Title")
        .or_else(|| node.text_of("Name"))
        .unwrap_or_else(|| "unnamed-threat-actor".to_string());
    object.extra.insert("name".to_string(), Value::String(name));
    if let Some(description) = node.text_of("Description") {
        object
            .extra
            .insert("description".to_string(), Value::String(description));
    }
    object
        .extra
        .insert("threat_actor_types".to_string(), json!(["unknown"]));
    object
}
