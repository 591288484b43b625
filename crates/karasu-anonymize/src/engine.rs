//! The anonymization engine
//!
//! Dispatches field-, text- and object-level anonymization through the
//! registered strategies. One engine (with its pseudonym key) lives for the
//! process; one [`AnonymizationContext`] lives per request or bundle.

use crate::context::AnonymizationContext;
use crate::level::AnonymizationLevel;
use crate::pseudonym::Pseudonymizer;
use crate::strategy::{
    detect_semantic_type, AnonymizationStrategy, DomainStrategy, EmailStrategy, IpStrategy,
    PseudonymStrategy, SemanticType, UrlStrategy,
};
use crate::text;
use crate::AnonymizeError;
use chrono::{DateTime, Duration, Utc};
use karasu_core::{is_observable_type, StixObject, CUSTOM_PREFIX, REFS_SUFFIX, REF_SUFFIX};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

lazy_static! {
    /// One `[type:property <op> 'literal']` comparison clause.
    static ref CLAUSE_RE: Regex = Regex::new(
        r"^\[\s*([a-z0-9-]+):([A-Za-z0-9_.'-]+)\s*(=|!=|<=|>=|<|>|LIKE|MATCHES)\s*'([^']*)'\s*\]$"
    )
    .unwrap();
    /// Bracketed spans within a pattern.
    static ref SPAN_RE: Regex = Regex::new(r"\[[^\]\[]*\]").unwrap();
}

/// Timestamp fields shifted when `preserve_timestamps` is off.
const TIMESTAMP_FIELDS: &[&str] = &[
    "valid_from",
    "valid_until",
    "first_observed",
    "last_observed",
    "first_seen",
    "last_seen",
];

/// Per-call options for object anonymization.
#[derive(Debug, Clone)]
pub struct AnonymizeOptions {
    pub preserve_timestamps: bool,
    pub time_shift_days: i64,
}

impl Default for AnonymizeOptions {
    fn default() -> Self {
        Self {
            preserve_timestamps: true,
            time_shift_days: 0,
        }
    }
}

pub struct AnonymizationEngine {
    strategies: Vec<Box<dyn AnonymizationStrategy>>,
    default_strategy: Option<Box<dyn AnonymizationStrategy>>,
    pseudonym: Arc<Pseudonymizer>,
}

impl AnonymizationEngine {
    /// Engine with the builtin strategies and a random pseudonym key.
    pub fn new() -> Self {
        Self::with_pseudonymizer(Pseudonymizer::random())
    }

    pub fn with_pseudonymizer(pseudonymizer: Pseudonymizer) -> Self {
        let pseudonym = Arc::new(pseudonymizer);
        Self {
            strategies: vec![
                Box::new(IpStrategy::new(Arc::clone(&pseudonym))),
                Box::new(DomainStrategy::new(Arc::clone(&pseudonym))),
                Box::new(EmailStrategy::new(Arc::clone(&pseudonym))),
                Box::new(UrlStrategy::new(Arc::clone(&pseudonym))),
            ],
            default_strategy: Some(Box::new(PseudonymStrategy::new(Arc::clone(&pseudonym)))),
            pseudonym,
        }
    }

    /// Register a strategy. Later registrations take precedence over the
    /// builtins for the semantic types they handle.
    pub fn register_strategy(&mut self, strategy: Box<dyn AnonymizationStrategy>) {
        self.strategies.insert(0, strategy);
    }

    pub fn set_default_strategy(&mut self, strategy: Box<dyn AnonymizationStrategy>) {
        self.default_strategy = Some(strategy);
    }

    /// Anonymize one field value of a known semantic type.
    pub fn anonymize_field(
        &self,
        value: &str,
        semantic: SemanticType,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<String, AnonymizeError> {
        if level == AnonymizationLevel::None {
            return Ok(value.to_string());
        }
        if let Some(strategy) = self.strategies.iter().find(|s| s.can_handle(semantic)) {
            return Ok(strategy.anonymize(value, level, ctx));
        }
        match &self.default_strategy {
            Some(default) => Ok(default.anonymize(value, level, ctx)),
            None => Err(AnonymizeError::StrategyNotFound(semantic)),
        }
    }

    /// Anonymize a field value, auto-detecting its semantic type.
    pub fn anonymize_detected(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<String, AnonymizeError> {
        self.anonymize_field(value, detect_semantic_type(value), level, ctx)
    }

    /// Free-text anonymization: ordered regex passes applied back-to-front.
    pub fn anonymize_text(
        &self,
        input: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<String, AnonymizeError> {
        text::substitute(input, level, |original, semantic, lvl| {
            self.anonymize_field(original, semantic, lvl, ctx)
                .unwrap_or_else(|_| format!("anon:{}", self.pseudonym.token(original)))
        })
    }

    /// Anonymize only the literal values of a pattern's comparison clauses,
    /// preserving type/property/operator structure. Unrecognized clause
    /// shapes are replaced by a generic opaque placeholder.
    pub fn anonymize_pattern(
        &self,
        pattern: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<String, AnonymizeError> {
        text::check_len(pattern)?;
        if level == AnonymizationLevel::None {
            return Ok(pattern.to_string());
        }

        let mut out = String::new();
        let mut last = 0;
        for span in SPAN_RE.find_iter(pattern) {
            out.push_str(&pattern[last..span.start()]);
            out.push_str(&self.anonymize_clause(span.as_str(), level, ctx));
            last = span.end();
        }
        out.push_str(&pattern[last..]);
        Ok(out)
    }

    fn anonymize_clause(
        &self,
        clause: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String {
        if let Some(caps) = CLAUSE_RE.captures(clause) {
            let object_type = &caps[1];
            let property = &caps[2];
            let operator = &caps[3];
            let literal = &caps[4];
            let semantic = match object_type {
                "ipv4-addr" | "ipv6-addr" => Some(SemanticType::Address),
                "domain-name" => Some(SemanticType::Domain),
                "email-addr" => Some(SemanticType::Email),
                "url" => Some(SemanticType::Url),
                _ => None,
            };
            let anonymized = match semantic {
                Some(semantic) => self
                    .anonymize_field(literal, semantic, level, ctx)
                    .unwrap_or_else(|_| format!("anon:{}", self.pseudonym.token(literal))),
                None => ctx.value_for(literal, || format!("anon:{}", self.pseudonym.token(literal))),
            };
            format!("[{object_type}:{property} {operator} '{anonymized}']")
        } else {
            format!("[opaque:value = 'anon:{}']", self.pseudonym.token(clause))
        }
    }

    /// Anonymize a whole object: id substitution, timestamp handling, then
    /// shape-specific field rewriting. The input is never mutated.
    pub fn anonymize_object(
        &self,
        object: &StixObject,
        level: AnonymizationLevel,
        opts: &AnonymizeOptions,
        ctx: &mut AnonymizationContext,
    ) -> Result<StixObject, AnonymizeError> {
        if level == AnonymizationLevel::None {
            return Ok(object.clone());
        }

        let mut out = object.clone();
        out.id = ctx.id_for(&object.id);

        if !opts.preserve_timestamps {
            let shift = Duration::days(opts.time_shift_days);
            out.created = out.created.map(|t| t + shift);
            out.modified = out.modified.map(|t| t + shift);
            for key in TIMESTAMP_FIELDS {
                if let Some(Value::String(raw)) = out.extra.get(*key) {
                    if let Ok(parsed) = raw.parse::<DateTime<Utc>>() {
                        out.extra
                            .insert((*key).to_string(), Value::String((parsed + shift).to_rfc3339()));
                    }
                }
            }
        }

        if is_observable_type(&out.object_type) {
            let object_type = out.object_type.clone();
            self.anonymize_observable(&mut out.extra, &object_type, level, ctx)?;
        } else if out.object_type == "observed-data" {
            self.anonymize_observed_data(&mut out.extra, level, ctx)?;
        } else {
            self.anonymize_generic(&mut out.extra, level, ctx)?;
        }

        if out.object_type == "indicator" {
            if let Some(Value::String(pattern)) = out.extra.get("pattern") {
                let anonymized = self.anonymize_pattern(pattern, level, ctx)?;
                out.extra.insert("pattern".to_string(), Value::String(anonymized));
            }
        }

        self.rewrite_references(&mut out.extra, ctx);
        self.rewrite_custom_fields(&mut out.extra, level, ctx)?;

        Ok(out)
    }

    /// Object + trust tier convenience: map the tier to a level, then
    /// anonymize.
    pub fn anonymize_with_trust(
        &self,
        object: &StixObject,
        trust_tier: &str,
        ctx: &mut AnonymizationContext,
    ) -> Result<StixObject, AnonymizeError> {
        let level = AnonymizationLevel::for_trust_tier(trust_tier);
        self.anonymize_object(object, level, &AnonymizeOptions::default(), ctx)
    }

    /// Field-level anonymization of one cyber-observable's map.
    fn anonymize_observable(
        &self,
        map: &mut Map<String, Value>,
        object_type: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<(), AnonymizeError> {
        match object_type {
            "ipv4-addr" | "ipv6-addr" => {
                self.rewrite_string_field(map, "value", SemanticType::Address, level, ctx)?;
            }
            "domain-name" => {
                self.rewrite_string_field(map, "value", SemanticType::Domain, level, ctx)?;
            }
            "email-addr" => {
                self.rewrite_string_field(map, "value", SemanticType::Email, level, ctx)?;
                self.tokenize_field(map, "display_name", ctx);
            }
            "url" => {
                self.rewrite_string_field(map, "value", SemanticType::Url, level, ctx)?;
            }
            "file" => {
                if let Some(Value::String(name)) = map.get("name") {
                    let replacement = self.tokenized_filename(name, ctx);
                    map.insert("name".to_string(), Value::String(replacement));
                }
                if let Some(Value::Object(hashes)) = map.get_mut("hashes") {
                    for (_, hash) in hashes.iter_mut() {
                        if let Value::String(value) = hash {
                            let pseudonym = Arc::clone(&self.pseudonym);
                            let original = value.clone();
                            *hash = Value::String(
                                ctx.value_for(&original, || pseudonym.token_like(&original)),
                            );
                        }
                    }
                }
            }
            "user-account" => {
                for key in ["user_id", "account_login", "display_name"] {
                    self.tokenize_field(map, key, ctx);
                }
            }
            "process" => {
                if let Some(Value::String(cmd)) = map.get("command_line") {
                    let rewritten = self.anonymize_text(&cmd.clone(), level, ctx)?;
                    map.insert("command_line".to_string(), Value::String(rewritten));
                }
                if level >= AnonymizationLevel::High {
                    self.tokenize_field(map, "name", ctx);
                }
            }
            "network-traffic" => {
                // Ports and protocols stay; endpoint refs are handled by the
                // shared reference rewriting.
            }
            "email-message" => {
                self.anonymize_email_message(map, level, ctx)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Structured handling of an email-message map, including multipart
    /// bodies and received-header lines.
    fn anonymize_email_message(
        &self,
        map: &mut Map<String, Value>,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<(), AnonymizeError> {
        for key in ["subject", "body"] {
            if let Some(Value::String(content)) = map.get(key) {
                let rewritten = self.anonymize_text(&content.clone(), level, ctx)?;
                map.insert(key.to_string(), Value::String(rewritten));
            }
        }
        if let Some(Value::Array(lines)) = map.get("received_lines") {
            let mut rewritten = Vec::with_capacity(lines.len());
            for line in lines.clone() {
                match line {
                    Value::String(line) => {
                        rewritten.push(Value::String(self.anonymize_text(&line, level, ctx)?))
                    }
                    other => rewritten.push(other),
                }
            }
            map.insert("received_lines".to_string(), Value::Array(rewritten));
        }
        if let Some(Value::Array(parts)) = map.get("body_multipart") {
            let mut rewritten_parts = Vec::with_capacity(parts.len());
            for part in parts.clone() {
                match part {
                    Value::Object(mut part_map) => {
                        if let Some(Value::String(body)) = part_map.get("body") {
                            let rewritten = self.anonymize_text(&body.clone(), level, ctx)?;
                            part_map.insert("body".to_string(), Value::String(rewritten));
                        }
                        rewritten_parts.push(Value::Object(part_map));
                    }
                    other => rewritten_parts.push(other),
                }
            }
            map.insert("body_multipart".to_string(), Value::Array(rewritten_parts));
        }
        Ok(())
    }

    /// Walk the observed-data per-key object table, anonymizing each
    /// embedded object by its own type. Purely-numeric intra-table
    /// references pass through untouched.
    fn anonymize_observed_data(
        &self,
        map: &mut Map<String, Value>,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<(), AnonymizeError> {
        let table = match map.get("objects") {
            Some(Value::Object(table)) => table.clone(),
            Some(_) => {
                return Err(AnonymizeError::BadObject(
                    "observed-data 'objects' is not a table".to_string(),
                ))
            }
            None => return Ok(()),
        };

        let mut rewritten = Map::new();
        for (key, value) in table {
            match value {
                Value::Object(mut embedded) => {
                    let embedded_type = embedded
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    self.anonymize_observable(&mut embedded, &embedded_type, level, ctx)?;
                    self.rewrite_references(&mut embedded, ctx);
                    rewritten.insert(key, Value::Object(embedded));
                }
                other => {
                    rewritten.insert(key, other);
                }
            }
        }
        map.insert("objects".to_string(), Value::Object(rewritten));
        Ok(())
    }

    /// The generic-object path: free-text anonymization of name/description
    /// plus alias-list and external-reference handling. Field exposure is
    /// monotone in the level: Full keeps a subset of what High keeps.
    fn anonymize_generic(
        &self,
        map: &mut Map<String, Value>,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<(), AnonymizeError> {
        if let Some(Value::String(description)) = map.get("description") {
            if level >= AnonymizationLevel::Full {
                map.remove("description");
            } else {
                let rewritten = self.anonymize_text(&description.clone(), level, ctx)?;
                map.insert("description".to_string(), Value::String(rewritten));
            }
        }

        if let Some(Value::String(name)) = map.get("name") {
            let name = name.clone();
            let replacement = if level >= AnonymizationLevel::High {
                let pseudonym = Arc::clone(&self.pseudonym);
                ctx.value_for(&name, || format!("anon:{}", pseudonym.token(&name)))
            } else if level >= AnonymizationLevel::Medium {
                self.anonymize_text(&name, level, ctx)?
            } else {
                name
            };
            map.insert("name".to_string(), Value::String(replacement));
        }

        if let Some(Value::Array(aliases)) = map.get("aliases") {
            if level >= AnonymizationLevel::Full {
                map.remove("aliases");
            } else if level >= AnonymizationLevel::Medium {
                let rewritten = aliases
                    .clone()
                    .into_iter()
                    .map(|alias| match alias {
                        Value::String(alias) => {
                            let pseudonym = Arc::clone(&self.pseudonym);
                            Value::String(
                                ctx.value_for(&alias, || format!("anon:{}", pseudonym.token(&alias))),
                            )
                        }
                        other => other,
                    })
                    .collect();
                map.insert("aliases".to_string(), Value::Array(rewritten));
            }
        }

        if let Some(Value::Array(references)) = map.get("external_references") {
            if level >= AnonymizationLevel::Full {
                map.remove("external_references");
            } else if level >= AnonymizationLevel::Medium {
                let mut rewritten = Vec::with_capacity(references.len());
                for reference in references.clone() {
                    match reference {
                        Value::Object(mut entry) => {
                            if let Some(Value::String(url)) = entry.get("url") {
                                let anonymized =
                                    self.anonymize_field(&url.clone(), SemanticType::Url, level, ctx)?;
                                entry.insert("url".to_string(), Value::String(anonymized));
                            }
                            if level >= AnonymizationLevel::High {
                                entry.remove("description");
                            }
                            rewritten.push(Value::Object(entry));
                        }
                        other => rewritten.push(other),
                    }
                }
                map.insert("external_references".to_string(), Value::Array(rewritten));
            }
        }

        Ok(())
    }

    /// Reference-suffixed fields are id-substituted; purely-numeric values
    /// are intra-table references and pass through.
    fn rewrite_references(&self, map: &mut Map<String, Value>, ctx: &mut AnonymizationContext) {
        let keys: Vec<String> = map.keys().cloned().collect();
        for key in keys {
            if key.ends_with(REF_SUFFIX) {
                if let Some(Value::String(reference)) = map.get(&key) {
                    if !is_numeric(reference) {
                        let substituted = ctx.id_for(&reference.clone());
                        map.insert(key, Value::String(substituted));
                    }
                }
            } else if key.ends_with(REFS_SUFFIX) {
                if let Some(Value::Array(references)) = map.get(&key) {
                    let rewritten = references
                        .clone()
                        .into_iter()
                        .map(|reference| match reference {
                            Value::String(reference) if !is_numeric(&reference) => {
                                Value::String(ctx.id_for(&reference))
                            }
                            other => other,
                        })
                        .collect();
                    map.insert(key, Value::Array(rewritten));
                }
            }
        }
    }

    /// Custom / extension fields are walked recursively: string leaves are
    /// text-anonymized, maps and sequences are descended into.
    fn rewrite_custom_fields(
        &self,
        map: &mut Map<String, Value>,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<(), AnonymizeError> {
        let keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(CUSTOM_PREFIX))
            .cloned()
            .collect();
        for key in keys {
            if let Some(value) = map.get(&key) {
                let rewritten = self.rewrite_value(value.clone(), level, ctx)?;
                map.insert(key, rewritten);
            }
        }
        Ok(())
    }

    fn rewrite_value(
        &self,
        value: Value,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<Value, AnonymizeError> {
        Ok(match value {
            Value::String(leaf) => Value::String(self.anonymize_text(&leaf, level, ctx)?),
            Value::Array(items) => {
                let mut rewritten = Vec::with_capacity(items.len());
                for item in items {
                    rewritten.push(self.rewrite_value(item, level, ctx)?);
                }
                Value::Array(rewritten)
            }
            Value::Object(entries) => {
                let mut rewritten = Map::new();
                for (key, entry) in entries {
                    rewritten.insert(key, self.rewrite_value(entry, level, ctx)?);
                }
                Value::Object(rewritten)
            }
            other => other,
        })
    }

    fn rewrite_string_field(
        &self,
        map: &mut Map<String, Value>,
        key: &str,
        semantic: SemanticType,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<(), AnonymizeError> {
        if let Some(Value::String(value)) = map.get(key) {
            let anonymized = self.anonymize_field(&value.clone(), semantic, level, ctx)?;
            map.insert(key.to_string(), Value::String(anonymized));
        }
        Ok(())
    }

    fn tokenize_field(
        &self,
        map: &mut Map<String, Value>,
        key: &str,
        ctx: &mut AnonymizationContext,
    ) {
        if let Some(Value::String(value)) = map.get(key) {
            let value = value.clone();
            let pseudonym = Arc::clone(&self.pseudonym);
            let replacement = ctx.value_for(&value, || format!("anon:{}", pseudonym.token(&value)));
            map.insert(key.to_string(), Value::String(replacement));
        }
    }

    /// File names keep their extension so the shape stays useful.
    fn tokenized_filename(&self, name: &str, ctx: &mut AnonymizationContext) -> String {
        let pseudonym = Arc::clone(&self.pseudonym);
        ctx.value_for(name, || match name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!("file-{}.{ext}", pseudonym.token(name)),
            _ => format!("file-{}", pseudonym.token(name)),
        })
    }
}

impl Default for AnonymizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
