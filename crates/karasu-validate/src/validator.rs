//! Canonical object validation

use crate::pattern::check_pattern;
use crate::report::{MultiVersionReport, ValidationReport};
use karasu_core::{
    is_supported_type, parse_stix_id, SpecVersion, StixObject, CANONICAL_VERSION, REFS_SUFFIX,
    REF_SUFFIX,
};
use karasu_version::{Converted, VersionConverter, VersionDetector};
use serde_json::Value;

/// Structural validator for canonical objects.
///
/// Pure: no side effects, never panics on arbitrary object shapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectValidator;

impl ObjectValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one canonical object given as raw JSON.
    pub fn validate(&self, object: &Value) -> ValidationReport {
        let mut report = ValidationReport::ok();

        let map = match object.as_object() {
            Some(map) => map,
            None => {
                report.error("object is not a JSON object");
                return report;
            }
        };

        // Required top-level fields; missing ones short-circuit the rest.
        let object_type = map.get("type").and_then(Value::as_str);
        let id = map.get("id").and_then(Value::as_str);
        let spec_version = map.get("spec_version").and_then(Value::as_str);
        if object_type.is_none() {
            report.error("missing required field 'type'");
        }
        if id.is_none() {
            report.error("missing required field 'id'");
        }
        if spec_version.is_none() {
            report.error("missing required field 'spec_version'");
        }
        let (object_type, id, spec_version) = match (object_type, id, spec_version) {
            (Some(t), Some(i), Some(s)) => (t, i, s),
            _ => return report,
        };

        if !is_supported_type(object_type) {
            report.error(format!("unsupported object type '{object_type}'"));
        }

        match parse_stix_id(id) {
            Ok((prefix, _)) => {
                if prefix != object_type {
                    report.error(format!(
                        "id prefix '{prefix}' does not match type '{object_type}'"
                    ));
                }
            }
            Err(e) => report.error(format!("malformed id '{id}': {e}")),
        }

        // A non-canonical tag is recoverable, so it only warns.
        if spec_version != CANONICAL_VERSION {
            report.warn(format!(
                "spec_version '{spec_version}' is not the canonical '{CANONICAL_VERSION}'"
            ));
        }

        self.check_type_rules(object_type, map, &mut report);
        self.check_reference_fields(map, &mut report);

        report
    }

    /// Validate a typed canonical object.
    pub fn validate_object(&self, object: &StixObject) -> ValidationReport {
        self.validate(&object.to_value())
    }

    /// Multi-version entry point: detect, convert if needed, then validate
    /// every resulting object. Failures are reported, never thrown.
    pub fn validate_any(&self, payload: &str) -> MultiVersionReport {
        let detector = VersionDetector::new();
        let converter = VersionConverter::new();

        let detected = detector.detect(payload);
        let converted = detected != SpecVersion::Unknown && detected != SpecVersion::CANONICAL;

        let mut report = ValidationReport::ok();
        match converter.convert_to_canonical(payload, detected) {
            Ok(Converted::Bundle(bundle)) => {
                for object in &bundle.objects {
                    let object_report = self.validate_object(object);
                    report.errors.extend(object_report.errors);
                    report.warnings.extend(object_report.warnings);
                }
                report.valid = report.errors.is_empty();
            }
            Ok(Converted::Object(object)) => {
                report = self.validate_object(&object);
            }
            Err(e) => {
                report.error(e.to_string());
            }
        }

        MultiVersionReport {
            detected_version: detected,
            converted,
            report,
        }
    }

    fn check_type_rules(
        &self,
        object_type: &str,
        map: &serde_json::Map<String, Value>,
        report: &mut ValidationReport,
    ) {
        match object_type {
            "indicator" => {
                match map.get("pattern").and_then(Value::as_str) {
                    Some(pattern) => {
                        let is_stix_grammar = map
                            .get("pattern_type")
                            .and_then(Value::as_str)
                            .map(|t| t == "stix")
                            .unwrap_or(true);
                        if is_stix_grammar {
                            for grammar_error in check_pattern(pattern) {
                                report.error(format!("pattern grammar: {grammar_error}"));
                            }
                        }
                    }
                    None => report.error("indicator requires a 'pattern'"),
                }
                if map.get("valid_from").is_none() {
                    report.error("indicator requires 'valid_from'");
                }
            }
            "malware" => {
                if !map.get("is_family").map(Value::is_boolean).unwrap_or(false) {
                    report.error("malware requires a boolean 'is_family'");
                }
            }
            "relationship" => {
                if map.get("relationship_type").and_then(Value::as_str).is_none() {
                    report.error("relationship requires 'relationship_type'");
                }
                for key in ["source_ref", "target_ref"] {
                    match map.get(key).and_then(Value::as_str) {
                        Some(reference) if parse_stix_id(reference).is_ok() => {}
                        Some(reference) => {
                            report.error(format!("relationship {key} '{reference}' is malformed"))
                        }
                        None => report.error(format!("relationship requires '{key}'")),
                    }
                }
            }
            "identity" => {
                if map.get("name").and_then(Value::as_str).is_none() {
                    report.error("identity requires 'name'");
                }
                if map.get("identity_class").and_then(Value::as_str).is_none() {
                    report.error("identity requires 'identity_class'");
                }
            }
            _ => {}
        }
    }

    /// Reference-shaped fields are warned, not failed, when malformed.
    /// `source_ref`/`target_ref` on relationships are hard-checked above.
    fn check_reference_fields(
        &self,
        map: &serde_json::Map<String, Value>,
        report: &mut ValidationReport,
    ) {
        for (key, value) in map {
            if key == "source_ref" || key == "target_ref" {
                continue;
            }
            if key.ends_with(REF_SUFFIX) {
                if let Some(reference) = value.as_str() {
                    if parse_stix_id(reference).is_err() {
                        report.warn(format!("reference field '{key}' holds malformed id '{reference}'"));
                    }
                }
            } else if key.ends_with(REFS_SUFFIX) {
                if let Some(references) = value.as_array() {
                    for reference in references.iter().filter_map(Value::as_str) {
                        if parse_stix_id(reference).is_err() {
                            report.warn(format!(
                                "reference list '{key}' holds malformed id '{reference}'"
                            ));
                        }
                    }
                }
            }
        }
    }
}
