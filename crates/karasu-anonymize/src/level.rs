//! Anonymization levels and the trust-tier mapping

use serde::{Deserialize, Serialize};

/// How much of an object's content is obscured before disclosure.
///
/// Ordered: higher levels never expose more of the original value than
/// lower ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AnonymizationLevel {
    None,
    Low,
    Medium,
    High,
    /// The default for requesters with no trust relationship at all.
    #[default]
    Full,
}

impl AnonymizationLevel {
    /// Map a named trust tier to the level applied to that tier's reads.
    /// More trust means less anonymization; unknown tiers get the maximum.
    pub fn for_trust_tier(tier: &str) -> AnonymizationLevel {
        match tier {
            "full" => AnonymizationLevel::None,
            "standard" => AnonymizationLevel::Low,
            "moderate" => AnonymizationLevel::Medium,
            "minimal" => AnonymizationLevel::High,
            _ => AnonymizationLevel::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymizationLevel::None => "none",
            AnonymizationLevel::Low => "low",
            AnonymizationLevel::Medium => "medium",
            AnonymizationLevel::High => "high",
            AnonymizationLevel::Full => "full",
        }
    }

    pub fn from_str_lossy(s: &str) -> AnonymizationLevel {
        match s {
            "none" => AnonymizationLevel::None,
            "low" => AnonymizationLevel::Low,
            "medium" => AnonymizationLevel::Medium,
            "high" => AnonymizationLevel::High,
            _ => AnonymizationLevel::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(AnonymizationLevel::None < AnonymizationLevel::Low);
        assert!(AnonymizationLevel::High < AnonymizationLevel::Full);
    }

    #[test]
    fn trust_tier_mapping_is_inverse() {
        assert_eq!(AnonymizationLevel::for_trust_tier("full"), AnonymizationLevel::None);
        assert_eq!(AnonymizationLevel::for_trust_tier("none"), AnonymizationLevel::Full);
        assert_eq!(AnonymizationLevel::for_trust_tier("whatever"), AnonymizationLevel::Full);
    }
}
