//! Anonymization consistency properties

use karasu_anonymize::{
    detect_semantic_type, AnonymizationContext, AnonymizationEngine, AnonymizationLevel,
    Pseudonymizer,
};
use proptest::prelude::*;

fn levels() -> impl Strategy<Value = AnonymizationLevel> {
    prop_oneof![
        Just(AnonymizationLevel::Low),
        Just(AnonymizationLevel::Medium),
        Just(AnonymizationLevel::High),
        Just(AnonymizationLevel::Full),
    ]
}

proptest! {
    #[test]
    fn repeated_anonymization_is_consistent_within_a_context(
        value in "[a-z0-9.@:/-]{1,48}",
        level in levels(),
    ) {
        let engine = AnonymizationEngine::with_pseudonymizer(Pseudonymizer::with_key([5u8; 32]));
        let mut ctx = AnonymizationContext::new();
        let semantic = detect_semantic_type(&value);
        let first = engine.anonymize_field(&value, semantic, level, &mut ctx).unwrap();
        let second = engine.anonymize_field(&value, semantic, level, &mut ctx).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn none_level_is_identity(value in ".{0,64}") {
        let engine = AnonymizationEngine::with_pseudonymizer(Pseudonymizer::with_key([5u8; 32]));
        let mut ctx = AnonymizationContext::new();
        let semantic = detect_semantic_type(&value);
        let out = engine
            .anonymize_field(&value, semantic, AnonymizationLevel::None, &mut ctx)
            .unwrap();
        prop_assert_eq!(out, value);
    }

    #[test]
    fn text_anonymization_never_panics(text in ".{0,256}") {
        let engine = AnonymizationEngine::with_pseudonymizer(Pseudonymizer::with_key([5u8; 32]));
        let mut ctx = AnonymizationContext::new();
        let _ = engine.anonymize_text(&text, AnonymizationLevel::Full, &mut ctx).unwrap();
    }
}
