use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::matcher::{
    compile_pattern, ExactMatcher, Matcher, NeverMatcher, PrefixMatcher, RegexMatcher,
    RequestMatcher,
};
use crate::types::{MatchType, RedirectRule};

/// Default LRU cache size
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Cache value type: compiled pattern, or `None` for a pattern that never matches
type CacheValue = Option<Arc<Regex>>;

/// A rule paired with its matcher
pub struct CompiledRule<'a> {
    /// The stored rule
    pub rule: &'a RedirectRule,
    /// Request matcher
    pub matcher: Matcher,
}

impl CompiledRule<'_> {
    /// Check if this rule matches the given request
    pub fn matches(&self, request: &str) -> bool {
        self.matcher.matches(request)
    }
}

/// Compiles rules into matchers, memoizing compiled regex patterns.
///
/// Regex rules are tried on every request that reaches them, so their patterns are
/// compiled once and kept in an LRU cache keyed by the stored source.
pub struct RuleCompiler {
    cache: Mutex<LruCache<String, CacheValue>>,
}

impl RuleCompiler {
    /// Create a new compiler
    pub fn new(cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Compile a rule
    pub fn compile<'a>(&self, rule: &'a RedirectRule) -> CompiledRule<'a> {
        let matcher = match rule.match_type {
            MatchType::Exact => Matcher::Exact(ExactMatcher::new(&rule.source)),
            MatchType::Prefix => Matcher::Prefix(PrefixMatcher::new(&rule.source)),
            MatchType::Regex => match self.regex_for(rule) {
                Some(regex) => Matcher::Regex(RegexMatcher::new(regex)),
                None => Matcher::Never(NeverMatcher),
            },
        };
        CompiledRule { rule, matcher }
    }

    /// Return the first rule in `rules` that matches the request.
    pub fn first_match<'a>(
        &self,
        rules: &'a [RedirectRule],
        request: &str,
    ) -> Option<&'a RedirectRule> {
        rules
            .iter()
            .map(|rule| self.compile(rule))
            .find(|compiled| compiled.matches(request))
            .map(|compiled| compiled.rule)
    }

    fn regex_for(&self, rule: &RedirectRule) -> CacheValue {
        if let Some(cached) = self.cache.lock().get(&rule.source) {
            return cached.clone();
        }

        // Compiled without the lock; concurrent misses may compile the same pattern.
        let compiled = match compile_pattern(&rule.source) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(e) => {
                debug!(rule_id = rule.id, error = %e, "regex rule never matches");
                None
            }
        };
        self.cache.lock().put(rule.source.clone(), compiled.clone());
        compiled
    }

    /// Number of cached patterns
    pub fn cached_patterns(&self) -> usize {
        self.cache.lock().len()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        cache.clear();
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}
