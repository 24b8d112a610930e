//! C5: the domain pattern matcher.
//!
//! New code — the teacher has no rules engine. `glob` semantics use
//! `globset` (grounded in the `Alb-O-xeno` and
//! `Dicklesworthstone-mcp_agent_mail_rust` manifests from the retrieval
//! pack); `etld_plus_one` uses the `psl` crate, added specifically for
//! this component since no example repo resolves public suffixes.

use serde::{Deserialize, Serialize};

/// How a pattern string should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Exact,
    Wildcard,
    Glob,
    EtldPlusOne,
}

/// A single allow/deny/rule pattern entry.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub value: String,
    pub pattern_type: PatternType,
    pub enabled: bool,
}

/// Lower priority number = higher precedence for tie-breaks elsewhere.
pub fn pattern_priority(pattern_type: PatternType) -> u8 {
    match pattern_type {
        PatternType::Exact => 1,
        PatternType::Wildcard => 2,
        PatternType::EtldPlusOne => 3,
        PatternType::Glob => 4,
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// `Match(domain, pattern, pattern_type) -> bool` (spec §4.5).
pub fn match_pattern(domain: &str, pattern: &str, pattern_type: PatternType) -> bool {
    let domain = normalize(domain);
    let pattern = normalize(pattern);

    match pattern_type {
        PatternType::Exact => domain == pattern,
        PatternType::Wildcard => match_wildcard(&domain, &pattern),
        PatternType::Glob => match_glob(&domain, &pattern),
        PatternType::EtldPlusOne => match_etld_plus_one(&domain, &pattern),
    }
}

/// Only the form `*.BASE` with a non-empty `BASE` is recognized; matches
/// `BASE` itself and any `X.BASE` (boundary character must be `.`).
fn match_wildcard(domain: &str, pattern: &str) -> bool {
    let Some(base) = pattern.strip_prefix("*.") else {
        return domain == pattern;
    };
    if base.is_empty() {
        return false;
    }
    domain == base || domain.ends_with(&format!(".{base}"))
}

/// POSIX-style file-name matching; an invalid pattern falls back to exact.
fn match_glob(domain: &str, pattern: &str) -> bool {
    match globset::Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(domain),
        Err(_) => domain == pattern,
    }
}

/// Both inputs resolve to the same non-empty eTLD+1, or are byte-equal.
fn match_etld_plus_one(domain: &str, pattern: &str) -> bool {
    if domain == pattern {
        return true;
    }
    match (etld_plus_one(domain), etld_plus_one(pattern)) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

fn etld_plus_one(host: &str) -> Option<String> {
    psl::domain_str(host).map(|s| s.to_string())
}

/// `MatchAny`: linear scan, skipping disabled entries, first match wins.
pub fn match_any(domain: &str, patterns: &[Pattern]) -> bool {
    patterns
        .iter()
        .filter(|p| p.enabled)
        .any(|p| match_pattern(domain, &p.value, p.pattern_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_requires_byte_equality_after_normalization() {
        assert!(match_pattern("Example.com", "example.com", PatternType::Exact));
        assert!(!match_pattern("example.com", "example.org", PatternType::Exact));
    }

    #[test]
    fn wildcard_matches_base_and_subdomains() {
        assert!(match_pattern("example.com", "*.example.com", PatternType::Wildcard));
        assert!(match_pattern("foo.example.com", "*.example.com", PatternType::Wildcard));
        assert!(!match_pattern("evilexample.com", "*.example.com", PatternType::Wildcard));
    }

    #[test]
    fn wildcard_rejects_empty_base() {
        assert!(!match_pattern("anything", "*.", PatternType::Wildcard));
    }

    #[test]
    fn glob_matches_posix_style() {
        assert!(match_pattern("foo.example.com", "*.example.com", PatternType::Glob));
        assert!(match_pattern("api-v2.example.com", "api-?[0-9].example.com", PatternType::Glob));
    }

    #[test]
    fn glob_falls_back_to_exact_on_invalid_pattern() {
        assert!(match_pattern("a[", "a[", PatternType::Glob));
        assert!(!match_pattern("a[b", "a[", PatternType::Glob));
    }

    #[test]
    fn etld_plus_one_matches_across_subdomains() {
        assert!(match_pattern(
            "www.example.com",
            "mail.example.com",
            PatternType::EtldPlusOne
        ));
    }

    #[test]
    fn etld_plus_one_does_not_match_different_registrable_domains() {
        assert!(!match_pattern(
            "example.com",
            "example.org",
            PatternType::EtldPlusOne
        ));
    }

    #[test]
    fn priority_orders_exact_highest() {
        assert!(pattern_priority(PatternType::Exact) < pattern_priority(PatternType::Wildcard));
        assert!(pattern_priority(PatternType::Wildcard) < pattern_priority(PatternType::EtldPlusOne));
        assert!(pattern_priority(PatternType::EtldPlusOne) < pattern_priority(PatternType::Glob));
    }

    #[test]
    fn match_any_skips_disabled_entries() {
        let patterns = vec![
            Pattern {
                value: "*.example.com".into(),
                pattern_type: PatternType::Wildcard,
                enabled: false,
            },
            Pattern {
                value: "foo.example.com".into(),
                pattern_type: PatternType::Exact,
                enabled: true,
            },
        ];
        assert!(!match_any("bar.example.com", &patterns));
        assert!(match_any("foo.example.com", &patterns));
    }
}
