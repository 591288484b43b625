//! Free-text anonymization passes
//!
//! All candidate spans are matched against the original text first, in
//! priority order (IPv6 before IPv4, URL before domain, then email, then
//! domain), overlaps are resolved in favor of the higher-priority pass, and
//! replacements are applied back-to-front so no replacement shifts the
//! offsets of the spans still to be processed. A domain inside an already
//! matched email or URL is therefore never re-substituted.

use crate::level::AnonymizationLevel;
use crate::strategy::SemanticType;
use crate::AnonymizeError;
use lazy_static::lazy_static;
use regex::Regex;

/// Inputs longer than this are rejected rather than scanned unbounded.
pub const MAX_TEXT_LEN: usize = 64 * 1024;

lazy_static! {
    // Compressed (`::`) forms first: the fully-expanded alternative would
    // otherwise stop at the compression and leave the tail unmatched.
    static ref IPV6_RE: Regex = Regex::new(
        r"\b(?:[0-9a-fA-F]{1,4}:){1,7}:(?:[0-9a-fA-F]{1,4}(?::[0-9a-fA-F]{1,4}){0,5}\b)?|\b(?:[0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{1,4}\b|::(?:[0-9a-fA-F]{1,4}(?::[0-9a-fA-F]{1,4}){0,6})\b"
    )
    .unwrap();
    static ref IPV4_RE: Regex = Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").unwrap();
    static ref URL_RE: Regex = Regex::new(r#"\b(?:https?|ftp)://[^\s'"<>,)\]]+"#).unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref DOMAIN_RE: Regex = Regex::new(
        r"\b(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}\b"
    )
    .unwrap();
}

#[derive(Debug)]
pub(crate) struct TextMatch {
    pub start: usize,
    pub end: usize,
    pub semantic: SemanticType,
}

/// Collect non-overlapping matches over the original text, priority-ordered.
pub(crate) fn collect_matches(text: &str) -> Vec<TextMatch> {
    let passes: [(&Regex, SemanticType); 5] = [
        (&IPV6_RE, SemanticType::Address),
        (&IPV4_RE, SemanticType::Address),
        (&URL_RE, SemanticType::Url),
        (&EMAIL_RE, SemanticType::Email),
        (&DOMAIN_RE, SemanticType::Domain),
    ];

    let mut accepted: Vec<TextMatch> = Vec::new();
    for (re, semantic) in passes {
        for m in re.find_iter(text) {
            let overlaps = accepted
                .iter()
                .any(|a| m.start() < a.end && a.start < m.end());
            if !overlaps {
                accepted.push(TextMatch {
                    start: m.start(),
                    end: m.end(),
                    semantic,
                });
            }
        }
    }

    // Back-to-front application order.
    accepted.sort_by(|a, b| b.start.cmp(&a.start));
    accepted
}

/// Bounds check shared by the text entry points.
pub(crate) fn check_len(text: &str) -> Result<(), AnonymizeError> {
    if text.len() > MAX_TEXT_LEN {
        return Err(AnonymizeError::InputTooLarge {
            len: text.len(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

/// Apply replacements back-to-front. `replace` is called with the matched
/// slice and its semantic type.
pub(crate) fn substitute(
    text: &str,
    level: AnonymizationLevel,
    mut replace: impl FnMut(&str, SemanticType, AnonymizationLevel) -> String,
) -> Result<String, AnonymizeError> {
    check_len(text)?;
    if level == AnonymizationLevel::None {
        return Ok(text.to_string());
    }

    let mut out = text.to_string();
    for m in collect_matches(text) {
        let original = &text[m.start..m.end];
        let replacement = replace(original, m.semantic, level);
        out.replace_range(m.start..m.end, &replacement);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_consumes_its_embedded_domain() {
        let matches = collect_matches("visit https://bad.example.com/x for details");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].semantic, SemanticType::Url);
    }

    #[test]
    fn email_consumes_its_domain_tail() {
        let matches = collect_matches("contact ops@bad.example.com now");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].semantic, SemanticType::Email);
    }

    #[test]
    fn ipv6_wins_over_partial_matches() {
        let matches = collect_matches("source 2001:db8:0:1:1:1:1:1 observed");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].semantic, SemanticType::Address);
    }

    #[test]
    fn compressed_ipv6_forms_match_whole() {
        for text in ["2001:db8::1", "fe80::1", "::1", "2001:0db8:85a3::8a2e:370:7334"] {
            let matches = collect_matches(text);
            assert_eq!(matches.len(), 1, "{text}");
            assert_eq!(matches[0].semantic, SemanticType::Address, "{text}");
            assert_eq!((matches[0].start, matches[0].end), (0, text.len()), "{text}");
        }
    }

    #[test]
    fn compressed_ipv6_is_substituted_in_free_text() {
        let out = substitute(
            "c2 beacon at 2001:db8::1 and fe80::1 active",
            AnonymizationLevel::Full,
            |_, semantic, _| format!("<{:?}>", semantic),
        )
        .unwrap();
        assert_eq!(out, "c2 beacon at <Address> and <Address> active");
    }

    #[test]
    fn matches_are_sorted_back_to_front() {
        let matches = collect_matches("a 1.2.3.4 b 5.6.7.8 c");
        assert_eq!(matches.len(), 2);
        assert!(matches[0].start > matches[1].start);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let text = "a".repeat(MAX_TEXT_LEN + 1);
        assert!(check_len(&text).is_err());
    }

    #[test]
    fn substitution_replaces_every_class() {
        let text = "ip 10.0.0.1, url http://a.example/x, mail x@b.example.com, host c.example.org";
        let out = substitute(text, AnonymizationLevel::Full, |_, semantic, _| {
            format!("<{:?}>", semantic)
        })
        .unwrap();
        assert_eq!(out, "ip <Address>, url <Url>, mail <Email>, host <Domain>");
    }
}
