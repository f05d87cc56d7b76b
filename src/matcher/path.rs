use once_cell::sync::Lazy;
use url::Url;

use super::RequestMatcher;

/// Base for resolving protocol-relative references (`//host/path`).
static BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost/").expect("BASE_URL: hardcoded url is invalid"));

/// Host, path and query of a URI. The fragment is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriParts {
    /// Host of an absolute or protocol-relative URI
    pub host: Option<String>,
    /// Path as written; may be empty
    pub path: String,
    /// Query without the leading `?`; an empty query is `None`
    pub query: Option<String>,
}

impl UriParts {
    fn from_url(url: &Url) -> Self {
        Self {
            host: url
                .host_str()
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            path: url.path().to_string(),
            query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        }
    }

    /// `path?query`, the form handed to the store and matchers.
    pub fn path_and_query(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        match &self.query {
            Some(q) => format!("{}?{}", path, q),
            None => path.to_string(),
        }
    }
}

/// Split a URI into host, path and query.
///
/// Absolute (`https://host/p`) and protocol-relative (`//host/p`) URIs go through the
/// URL parser; anything else is treated as a relative reference and split by hand.
pub fn split_uri(uri: &str) -> UriParts {
    if uri.starts_with("//") {
        if let Ok(url) = BASE_URL.join(uri) {
            return UriParts::from_url(&url);
        }
    } else if let Ok(url) = Url::parse(uri) {
        return UriParts::from_url(&url);
    }

    let without_fragment = uri.split_once('#').map_or(uri, |(head, _)| head);
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };
    UriParts {
        host: None,
        path: path.to_string(),
        query: query.filter(|q| !q.is_empty()).map(str::to_string),
    }
}

/// Normalize a URI for exact/prefix comparison.
///
/// Lower-cases the path, strips trailing slashes (an empty path becomes `/`) and
/// reattaches the query string verbatim.
pub fn normalize(uri: &str) -> String {
    normalize_parts(&split_uri(uri))
}

fn normalize_parts(parts: &UriParts) -> String {
    let trimmed = parts.path.trim_end_matches('/');
    let mut out = if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_lowercase()
    };
    if let Some(ref query) = parts.query {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// Normalized prefix of a prefix rule: trailing `*` removed after normalization.
pub fn normalize_prefix(source: &str) -> String {
    normalize(source).trim_end_matches('*').to_string()
}

/// First path segment of a normalized URI, used as the prefix index key.
///
/// Strings not starting with `/` map to the empty key, which every lookup visits.
pub fn first_segment(normalized: &str) -> &str {
    let Some(rest) = normalized.strip_prefix('/') else {
        return "";
    };
    let end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
    &rest[..end]
}

/// Exact matcher: normalized request equals normalized source
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    normalized: String,
}

impl ExactMatcher {
    pub fn new(source: &str) -> Self {
        Self {
            normalized: normalize(source),
        }
    }
}

impl RequestMatcher for ExactMatcher {
    fn matches(&self, request: &str) -> bool {
        normalize(request) == self.normalized
    }
}

/// Prefix matcher: normalized request starts with the normalized source
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    pub fn new(source: &str) -> Self {
        Self {
            prefix: normalize_prefix(source),
        }
    }
}

impl RequestMatcher for PrefixMatcher {
    fn matches(&self, request: &str) -> bool {
        normalize(request).starts_with(&self.prefix)
    }
}
