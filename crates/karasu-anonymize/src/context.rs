//! Per-pass consistency context

use std::collections::HashMap;
use uuid::Uuid;

/// Consistency maps for a single transformation pass.
///
/// Scope is one bundle or one request's worth of objects. Never share a
/// context across unrelated requests; repeated substitutions would become
/// correlatable across tenants.
#[derive(Debug, Default)]
pub struct AnonymizationContext {
    values: HashMap<String, String>,
    ids: HashMap<String, String>,
}

impl AnonymizationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The replacement for `original`, computing it on first sight.
    pub fn value_for(&mut self, original: &str, compute: impl FnOnce() -> String) -> String {
        self.values
            .entry(original.to_string())
            .or_insert_with(compute)
            .clone()
    }

    /// The anonymized id for `original`, minting one with the same type
    /// prefix on first sight. Non-id-shaped input gets an opaque id.
    pub fn id_for(&mut self, original: &str) -> String {
        self.ids
            .entry(original.to_string())
            .or_insert_with(|| {
                let prefix = original
                    .split_once("--")
                    .map(|(p, _)| p)
                    .filter(|p| !p.is_empty())
                    .unwrap_or("anonymized");
                format!("{}--{}", prefix, Uuid::new_v4())
            })
            .clone()
    }

    pub fn mapped_values(&self) -> usize {
        self.values.len()
    }

    pub fn mapped_ids(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_substitution_is_consistent() {
        let mut ctx = AnonymizationContext::new();
        let first = ctx.value_for("10.0.0.1", || "replacement-a".to_string());
        let second = ctx.value_for("10.0.0.1", || "replacement-b".to_string());
        assert_eq!(first, second);
        assert_eq!(ctx.mapped_values(), 1);
    }

    #[test]
    fn id_substitution_preserves_type_prefix() {
        let mut ctx = AnonymizationContext::new();
        let original = "indicator--6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        let anon = ctx.id_for(original);
        assert!(anon.starts_with("indicator--"));
        assert_ne!(anon, original);
        assert_eq!(anon, ctx.id_for(original));
    }

    #[test]
    fn independent_contexts_are_independent() {
        let original = "indicator--6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        let a = AnonymizationContext::new().id_for(original);
        let b = AnonymizationContext::new().id_for(original);
        assert_ne!(a, b);
    }
}
