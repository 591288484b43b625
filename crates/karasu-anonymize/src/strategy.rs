//! Semantic-type detection and the pluggable strategy interface

use crate::context::AnonymizationContext;
use crate::level::AnonymizationLevel;
use crate::pseudonym::Pseudonymizer;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Field semantics the engine can dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Address,
    Email,
    Url,
    Domain,
}

lazy_static! {
    static ref IPV4_SHAPE: Regex = Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").unwrap();
    // Loosely-shaped near-matches count as addresses too.
    static ref IPV4_LOOSE: Regex = Regex::new(r"^\d{1,3}(\.\d{1,3}){2,4}$").unwrap();
    static ref IPV6_SHAPE: Regex =
        Regex::new(r"^[0-9a-fA-F:]+:[0-9a-fA-F:]*$").unwrap();
    static ref EMAIL_TAIL: Regex = Regex::new(r"@[^@\s]+\.[^@\s.]+$").unwrap();
}

/// Ordered heuristic: address, then email, then URL, then domain.
/// Domain is the catch-all default.
pub fn detect_semantic_type(text: &str) -> SemanticType {
    let trimmed = text.trim();
    if IPV4_LOOSE.is_match(trimmed) || (trimmed.contains(':') && IPV6_SHAPE.is_match(trimmed)) {
        return SemanticType::Address;
    }
    if trimmed.contains('@') && EMAIL_TAIL.is_match(trimmed) {
        return SemanticType::Email;
    }
    if trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("ftp://")
    {
        return SemanticType::Url;
    }
    SemanticType::Domain
}

/// A per-semantic-type transform.
///
/// Implementations must be pure given (value, level, context): all
/// consistency state lives in the context, never in the strategy.
pub trait AnonymizationStrategy: Send + Sync {
    fn can_handle(&self, semantic: SemanticType) -> bool;

    fn anonymize(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String;
}

/// IP address strategy: prefix-preserving octet masking at the lower levels,
/// keyed pseudonym at the higher ones.
pub struct IpStrategy {
    pseudonym: Arc<Pseudonymizer>,
}

impl IpStrategy {
    pub fn new(pseudonym: Arc<Pseudonymizer>) -> Self {
        Self { pseudonym }
    }

    fn mask_v4(value: &str, keep_octets: usize) -> String {
        let octets: Vec<&str> = value.split('.').collect();
        octets
            .iter()
            .enumerate()
            .map(|(i, o)| if i < keep_octets { (*o).to_string() } else { "x".to_string() })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl AnonymizationStrategy for IpStrategy {
    fn can_handle(&self, semantic: SemanticType) -> bool {
        semantic == SemanticType::Address
    }

    fn anonymize(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String {
        if level == AnonymizationLevel::None {
            return value.to_string();
        }
        let pseudonym = Arc::clone(&self.pseudonym);
        ctx.value_for(value, || {
            if value.contains(':') {
                // IPv6: keep the routing prefix only at the lowest level.
                match level {
                    AnonymizationLevel::Low => {
                        let groups: Vec<&str> = value.split(':').collect();
                        let kept = groups.iter().take(2).cloned().collect::<Vec<_>>().join(":");
                        format!("{kept}::x")
                    }
                    _ => format!("ip:{}", pseudonym.token(value)),
                }
            } else {
                match level {
                    AnonymizationLevel::Low => Self::mask_v4(value, 3),
                    AnonymizationLevel::Medium => Self::mask_v4(value, 2),
                    _ => format!("ip:{}", pseudonym.token(value)),
                }
            }
        })
    }
}

/// Domain strategy: label masking, then keyed pseudonym domains.
pub struct DomainStrategy {
    pseudonym: Arc<Pseudonymizer>,
}

impl DomainStrategy {
    pub fn new(pseudonym: Arc<Pseudonymizer>) -> Self {
        Self { pseudonym }
    }
}

impl AnonymizationStrategy for DomainStrategy {
    fn can_handle(&self, semantic: SemanticType) -> bool {
        semantic == SemanticType::Domain
    }

    fn anonymize(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String {
        if level == AnonymizationLevel::None {
            return value.to_string();
        }
        let pseudonym = Arc::clone(&self.pseudonym);
        ctx.value_for(value, || match level {
            AnonymizationLevel::Low => match value.split_once('.') {
                Some((_, rest)) => format!("*.{rest}"),
                None => format!("{}.invalid", pseudonym.token(value)),
            },
            AnonymizationLevel::Medium => {
                let tld = value.rsplit('.').next().unwrap_or("invalid");
                format!("{}.{tld}", pseudonym.token(value))
            }
            _ => format!("{}.invalid", pseudonym.token(value)),
        })
    }
}

/// Email strategy: local-part masking, then full pseudonyms.
pub struct EmailStrategy {
    pseudonym: Arc<Pseudonymizer>,
}

impl EmailStrategy {
    pub fn new(pseudonym: Arc<Pseudonymizer>) -> Self {
        Self { pseudonym }
    }
}

impl AnonymizationStrategy for EmailStrategy {
    fn can_handle(&self, semantic: SemanticType) -> bool {
        semantic == SemanticType::Email
    }

    fn anonymize(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String {
        if level == AnonymizationLevel::None {
            return value.to_string();
        }
        let pseudonym = Arc::clone(&self.pseudonym);
        ctx.value_for(value, || {
            let domain = value.split_once('@').map(|(_, d)| d).unwrap_or("invalid");
            match level {
                AnonymizationLevel::Low => format!("*@{domain}"),
                AnonymizationLevel::Medium => format!("{}@{domain}", pseudonym.token(value)),
                _ => format!("{}@anon.invalid", pseudonym.token(value)),
            }
        })
    }
}

/// URL strategy: path stripping, then pseudonym hosts.
pub struct UrlStrategy {
    pseudonym: Arc<Pseudonymizer>,
}

impl UrlStrategy {
    pub fn new(pseudonym: Arc<Pseudonymizer>) -> Self {
        Self { pseudonym }
    }

    fn split_scheme(value: &str) -> (&str, &str) {
        match value.find("://") {
            Some(idx) => (&value[..idx], &value[idx + 3..]),
            None => ("https", value),
        }
    }
}

impl AnonymizationStrategy for UrlStrategy {
    fn can_handle(&self, semantic: SemanticType) -> bool {
        semantic == SemanticType::Url
    }

    fn anonymize(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String {
        if level == AnonymizationLevel::None {
            return value.to_string();
        }
        let pseudonym = Arc::clone(&self.pseudonym);
        ctx.value_for(value, || {
            let (scheme, rest) = Self::split_scheme(value);
            let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
            match level {
                AnonymizationLevel::Low => format!("{scheme}://{host}/"),
                AnonymizationLevel::Medium => {
                    format!("{scheme}://{}.invalid/", pseudonym.token(host))
                }
                _ => format!("https://{}.invalid/", pseudonym.token(value)),
            }
        })
    }
}

/// Catch-all default: an opaque keyed token for any value.
pub struct PseudonymStrategy {
    pseudonym: Arc<Pseudonymizer>,
}

impl PseudonymStrategy {
    pub fn new(pseudonym: Arc<Pseudonymizer>) -> Self {
        Self { pseudonym }
    }
}

impl AnonymizationStrategy for PseudonymStrategy {
    fn can_handle(&self, _semantic: SemanticType) -> bool {
        true
    }

    fn anonymize(
        &self,
        value: &str,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> String {
        if level == AnonymizationLevel::None {
            return value.to_string();
        }
        let pseudonym = Arc::clone(&self.pseudonym);
        ctx.value_for(value, || format!("anon:{}", pseudonym.token(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_order_is_address_email_url_domain() {
        assert_eq!(detect_semantic_type("203.0.113.5"), SemanticType::Address);
        assert_eq!(detect_semantic_type("203.0.113.5.6"), SemanticType::Address); // loose
        assert_eq!(detect_semantic_type("2001:db8::1"), SemanticType::Address);
        assert_eq!(detect_semantic_type("alice@example.com"), SemanticType::Email);
        assert_eq!(detect_semantic_type("https://example.com/x"), SemanticType::Url);
        assert_eq!(detect_semantic_type("example.com"), SemanticType::Domain);
        assert_eq!(detect_semantic_type("free text"), SemanticType::Domain); // catch-all
    }

    #[test]
    fn ip_masking_preserves_prefix() {
        let strategy = IpStrategy::new(Arc::new(Pseudonymizer::with_key([0u8; 32])));
        let mut ctx = AnonymizationContext::new();
        assert_eq!(
            strategy.anonymize("203.0.113.5", AnonymizationLevel::Low, &mut ctx),
            "203.0.113.x"
        );
        let mut ctx = AnonymizationContext::new();
        assert_eq!(
            strategy.anonymize("203.0.113.5", AnonymizationLevel::Medium, &mut ctx),
            "203.0.x.x"
        );
    }

    #[test]
    fn none_level_is_passthrough_for_every_strategy() {
        let key = Arc::new(Pseudonymizer::with_key([0u8; 32]));
        let strategies: Vec<Box<dyn AnonymizationStrategy>> = vec![
            Box::new(IpStrategy::new(Arc::clone(&key))),
            Box::new(DomainStrategy::new(Arc::clone(&key))),
            Box::new(EmailStrategy::new(Arc::clone(&key))),
            Box::new(UrlStrategy::new(Arc::clone(&key))),
            Box::new(PseudonymStrategy::new(key)),
        ];
        let mut ctx = AnonymizationContext::new();
        for strategy in &strategies {
            assert_eq!(
                strategy.anonymize("input-value", AnonymizationLevel::None, &mut ctx),
                "input-value"
            );
        }
    }

    #[test]
    fn email_low_masks_local_part_only() {
        let strategy = EmailStrategy::new(Arc::new(Pseudonymizer::with_key([0u8; 32])));
        let mut ctx = AnonymizationContext::new();
        assert_eq!(
            strategy.anonymize("alice@example.com", AnonymizationLevel::Low, &mut ctx),
            "*@example.com"
        );
    }

    #[test]
    fn url_low_strips_path() {
        let strategy = UrlStrategy::new(Arc::new(Pseudonymizer::with_key([0u8; 32])));
        let mut ctx = AnonymizationContext::new();
        assert_eq!(
            strategy.anonymize(
                "https://evil.example/payload?id=1",
                AnonymizationLevel::Low,
                &mut ctx
            ),
            "https://evil.example/"
        );
    }
}
