//! Detection totality properties

use karasu_version::VersionDetector;
use proptest::prelude::*;

proptest! {
    #[test]
    fn detection_never_panics_on_strings(payload in ".*") {
        let detector = VersionDetector::new();
        let first = detector.detect(&payload);
        // Detection is deterministic for identical input.
        prop_assert_eq!(first, detector.detect(&payload));
    }

    #[test]
    fn detection_never_panics_on_bytes(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let detector = VersionDetector::new();
        let _ = detector.detect_bytes(&payload);
    }

    #[test]
    fn random_words_are_unknown(payload in "[a-z]{1,32}( [a-z]{1,32}){0,8}") {
        let detector = VersionDetector::new();
        prop_assert_eq!(detector.detect(&payload), karasu_core::SpecVersion::Unknown);
    }
}
