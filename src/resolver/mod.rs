//! Resolver module.
//!
//! Turns an inbound request into a redirect directive using the rules in a
//! [`RuleStore`]. The host calls [`Resolver::resolve`] once per request and issues the
//! HTTP redirect itself when a directive comes back.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::compile::{RuleCompiler, DEFAULT_CACHE_SIZE};
use crate::matcher::{split_uri, UriParts};
use crate::store::RuleStore;
use crate::tracker::{HitTracker, TrackingMode};
use crate::types::{RedirectDirective, RedirectRule, RequestInfo};

/// Paths never redirected by default
pub const DEFAULT_RESERVED_PATHS: [&str; 2] = ["/robots.txt", "/sitemap.xml"];

/// Customization point applied to a directive after the hit is recorded.
pub trait RedirectHook: Send + Sync {
    /// Adjust the directive produced by `rule` for `request` (`path?query`).
    fn rewrite(&self, directive: &mut RedirectDirective, rule: &RedirectRule, request: &str);
}

impl<F> RedirectHook for F
where
    F: Fn(&mut RedirectDirective, &RedirectRule, &str) + Send + Sync,
{
    fn rewrite(&self, directive: &mut RedirectDirective, rule: &RedirectRule, request: &str) {
        self(directive, rule, request)
    }
}

/// Resolver options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Host-level switch for the redirect feature
    pub enabled: bool,
    /// Request paths (without query) that are never redirected
    pub reserved_paths: Vec<String>,
    /// LRU cache size for compiled regex patterns
    pub regex_cache_size: usize,
    /// How hits are recorded
    pub tracking: TrackingMode,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            reserved_paths: DEFAULT_RESERVED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            regex_cache_size: DEFAULT_CACHE_SIZE,
            tracking: TrackingMode::default(),
        }
    }
}

impl ResolverOptions {
    /// Create new resolver options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable redirects.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replace the reserved path list.
    pub fn with_reserved_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set regex cache size.
    pub fn with_regex_cache_size(mut self, size: usize) -> Self {
        self.regex_cache_size = size;
        self
    }

    /// Set tracking mode.
    pub fn with_tracking(mut self, tracking: TrackingMode) -> Self {
        self.tracking = tracking;
        self
    }
}

/// Resolves requests against stored redirect rules.
pub struct Resolver {
    store: Arc<dyn RuleStore>,
    compiler: RuleCompiler,
    tracker: HitTracker,
    hooks: Vec<Arc<dyn RedirectHook>>,
    options: ResolverOptions,
}

impl Resolver {
    /// Create a new resolver over `store`.
    pub fn new(store: Arc<dyn RuleStore>, options: ResolverOptions) -> Self {
        let tracker = HitTracker::new(Arc::clone(&store), options.tracking);
        Self {
            store,
            compiler: RuleCompiler::new(options.regex_cache_size),
            tracker,
            hooks: Vec::new(),
            options,
        }
    }

    /// Register a hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: impl RedirectHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve a request to a redirect, or `None` to serve it normally.
    ///
    /// Never fails: an unreachable store is logged and treated as no match.
    pub fn resolve(&self, request: &RequestInfo) -> Option<RedirectDirective> {
        if !self.options.enabled || request.skip || request.uri.is_empty() {
            return None;
        }

        let parts = split_uri(&request.uri);
        if self.is_reserved(&parts.path) {
            return None;
        }
        let path_query = parts.path_and_query();

        let rule = self.find_rule(&path_query)?;

        if is_same_destination(&path_query, &rule.target) {
            debug!(rule_id = rule.id, request = %path_query, "loop guard: target equals request");
            return None;
        }

        self.tracker.record(rule.id);

        let mut directive = RedirectDirective {
            rule_id: rule.id,
            target: rule.target.clone(),
            status: rule.status,
        };
        for hook in &self.hooks {
            hook.rewrite(&mut directive, &rule, &path_query);
        }

        debug!(
            rule_id = rule.id,
            request = %path_query,
            target = %directive.target,
            status = directive.status.code(),
            "redirect"
        );
        Some(directive)
    }

    /// Host-facing form: `(target, status, matched)`.
    ///
    /// When `matched` is false the target is empty and the status is 0.
    pub fn resolve_uri(&self, uri: &str, host: &str, skip: bool) -> (String, u16, bool) {
        let request = RequestInfo::new(uri, host).with_skip(skip);
        match self.resolve(&request) {
            Some(directive) => (directive.target, directive.status.code(), true),
            None => (String::new(), 0, false),
        }
    }

    /// First rule matching `path_query`, in candidate order.
    pub fn find_rule(&self, path_query: &str) -> Option<RedirectRule> {
        let candidates = match self.store.candidates_for(path_query) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(request = %path_query, error = %e, "rule lookup failed, serving request");
                return None;
            }
        };
        self.compiler
            .first_match(&candidates, path_query)
            .cloned()
    }

    /// Drop cached regex patterns, e.g. after bulk edits.
    pub fn clear_cache(&self) {
        self.compiler.clear_cache();
    }

    fn is_reserved(&self, path: &str) -> bool {
        self.options.reserved_paths.iter().any(|p| p == path)
    }
}

/// True when redirecting `request` to `target` would land on the same request.
///
/// Paths are compared with trailing slashes stripped and case preserved, queries
/// verbatim, so a redirect that only fixes case (`/Old-Page` to `/old-page`) is not a
/// loop. Only relative targets are checked. A target carrying a host is never
/// considered a loop, even if it points back at the current site.
pub fn is_same_destination(request: &str, target: &str) -> bool {
    let target = split_uri(target);
    if target.host.is_some() {
        return false;
    }
    destination_key(&split_uri(request)) == destination_key(&target)
}

fn destination_key(parts: &UriParts) -> (&str, Option<&str>) {
    let path = parts.path.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    (path, parts.query.as_deref())
}
