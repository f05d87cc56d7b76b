mod path;
mod pattern;

pub use path::{
    first_segment, normalize, normalize_prefix, split_uri, ExactMatcher, PrefixMatcher, UriParts,
};
pub use pattern::{compile_pattern, pattern_body, RegexMatcher};

use std::sync::Arc;

use tracing::debug;

use crate::types::{MatchType, RedirectRule};

/// Trait for request matchers
pub trait RequestMatcher: Send + Sync {
    /// Check if the request (`path?query`) matches this matcher
    fn matches(&self, request: &str) -> bool;
}

/// Never matches. Used for regex rules whose pattern is empty or does not compile.
#[derive(Debug, Clone)]
pub struct NeverMatcher;

impl RequestMatcher for NeverMatcher {
    fn matches(&self, _request: &str) -> bool {
        false
    }
}

/// Enum wrapper for all matcher types
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(ExactMatcher),
    Prefix(PrefixMatcher),
    Regex(RegexMatcher),
    Never(NeverMatcher),
}

impl Matcher {
    /// Build the matcher for a rule, compiling regex patterns without caching.
    pub fn for_rule(rule: &RedirectRule) -> Self {
        match rule.match_type {
            MatchType::Exact => Matcher::Exact(ExactMatcher::new(&rule.source)),
            MatchType::Prefix => Matcher::Prefix(PrefixMatcher::new(&rule.source)),
            MatchType::Regex => match compile_pattern(&rule.source) {
                Ok(regex) => Matcher::Regex(RegexMatcher::new(Arc::new(regex))),
                Err(e) => {
                    debug!(rule_id = rule.id, error = %e, "regex rule never matches");
                    Matcher::Never(NeverMatcher)
                }
            },
        }
    }
}

impl RequestMatcher for Matcher {
    fn matches(&self, request: &str) -> bool {
        match self {
            Matcher::Exact(m) => m.matches(request),
            Matcher::Prefix(m) => m.matches(request),
            Matcher::Regex(m) => m.matches(request),
            Matcher::Never(m) => m.matches(request),
        }
    }
}

/// Decide whether `rule` matches a request.
///
/// `request` is the raw `path?query` of the request. Exact and prefix rules compare
/// normalized forms; regex rules see the request as-is. The host does not take part
/// in matching.
pub fn matches(rule: &RedirectRule, request: &str, _host: &str) -> bool {
    Matcher::for_rule(rule).matches(request)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::types::RedirectStatus;

    fn rule(source: &str, match_type: MatchType) -> RedirectRule {
        let now = SystemTime::now();
        RedirectRule {
            id: 1,
            source: source.to_string(),
            target: "/new".to_string(),
            status: RedirectStatus::MovedPermanently,
            match_type,
            hits: 0,
            last_hit: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_exact_match() {
        let r = rule("/old-path?ref=abc", MatchType::Exact);
        assert!(matches(&r, "/old-path?ref=abc", "example.com"));
        assert!(!matches(&r, "/old-path?ref=xyz", "example.com"));
    }

    #[test]
    fn test_prefix_match() {
        let r = rule("/legacy/", MatchType::Prefix);
        assert!(matches(&r, "/legacy/page-1?x=1", "example.com"));
        assert!(!matches(&r, "/other/page", "example.com"));
    }

    #[test]
    fn test_regex_match() {
        let r = rule("#^/docs/(v\\d+)/(.+)$#", MatchType::Regex);
        assert!(matches(&r, "/docs/v2/install", "example.com"));
        assert!(!matches(&r, "/docs/latest/install", "example.com"));
    }

    #[test]
    fn test_regex_uses_raw_request() {
        // Exact/prefix lower-case the path; regex must not.
        let r = rule("^/Docs/", MatchType::Regex);
        assert!(matches(&r, "/Docs/x", "example.com"));
        assert!(!matches(&r, "/docs/x", "example.com"));
    }

    #[test]
    fn test_empty_and_invalid_patterns_never_match() {
        assert!(!matches(&rule("", MatchType::Regex), "/", "example.com"));
        assert!(!matches(&rule("   ", MatchType::Regex), "/a", "example.com"));
        assert!(!matches(&rule("#(#", MatchType::Regex), "/(", "example.com"));
        assert!(matches!(
            Matcher::for_rule(&rule("[", MatchType::Regex)),
            Matcher::Never(_)
        ));
    }

    #[test]
    fn test_host_is_ignored() {
        let r = rule("/a", MatchType::Exact);
        assert!(matches(&r, "/a", "one.example"));
        assert!(matches(&r, "/a", "two.example"));
    }
}
