//! Redirect Engine - rule-based URL redirection for web hosts
//!
//! This library decides whether an inbound request should be redirected:
//! - Exact, prefix and regex source patterns
//! - Candidate pre-filtering so only plausible rules are evaluated
//! - Deterministic precedence (exact, then prefix, then regex; newest first)
//! - Loop guard for targets that point back at the request
//! - Hit counting with inline or detached writes
//! - CSV import and export
//! - LRU caching of compiled patterns
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use redirect_engine::{MemoryRuleStore, NewRule, RequestInfo, Resolver, ResolverOptions, RuleStore};
//!
//! let store = Arc::new(MemoryRuleStore::new());
//! store.insert(NewRule::new("/old-page", "/new-page")).unwrap();
//! store
//!     .insert(NewRule::new("/blog/*", "/articles").with_status(302).with_match_type("prefix"))
//!     .unwrap();
//! store
//!     .insert(NewRule::new("#^/docs/v\\d+/.*$#", "/docs/latest").with_match_type("regex"))
//!     .unwrap();
//!
//! let resolver = Resolver::new(store.clone(), ResolverOptions::new());
//!
//! let directive = resolver
//!     .resolve(&RequestInfo::new("/Old-Page/", "example.com"))
//!     .unwrap();
//! assert_eq!(directive.target, "/new-page");
//! assert_eq!(directive.status.code(), 301);
//!
//! let directive = resolver
//!     .resolve(&RequestInfo::new("/blog/2024/hello", "example.com"))
//!     .unwrap();
//! assert_eq!(directive.target, "/articles");
//!
//! assert!(resolver.resolve(&RequestInfo::new("/contact", "example.com")).is_none());
//! ```
//!
//! # Match Types
//!
//! | Type | Source | Matches |
//! |------|--------|---------|
//! | `exact` | `/old-page` | `/old-page`, `/OLD-PAGE/` |
//! | `prefix` | `/blog` | `/blog`, `/blog/post`, `/blogroll` |
//! | `regex` | `#^/p/\d+$#` | `/p/42` |
//!
//! Exact and prefix sources are compared after normalization: fragment dropped,
//! scheme and host removed, trailing slashes stripped and the path lowercased. The
//! query string is kept verbatim. Regex sources run against the raw `path?query` and
//! may be wrapped in `/`, `#`, `~` or `!` delimiters.

pub mod codec;
pub mod compile;
pub mod error;
pub mod matcher;
pub mod resolver;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export commonly used items
pub use codec::{export_csv, import_csv, ExportOptions, ImportReport, CSV_HEADER};
pub use compile::{CompiledRule, RuleCompiler, DEFAULT_CACHE_SIZE};
pub use error::{RedirectError, Result, StoreErrorKind};
pub use matcher::{matches, normalize, Matcher, RequestMatcher};
pub use store::{FileRuleStore, MemoryRuleStore, RuleStore};
pub use tracker::{HitTracker, TrackingMode};
pub use types::{
    MatchType, NewRule, RedirectDirective, RedirectRule, RedirectStatus, RequestInfo, RulePage,
    RuleUpdate,
};

// Re-export resolver types
pub use resolver::{is_same_destination, RedirectHook, Resolver, ResolverOptions};
