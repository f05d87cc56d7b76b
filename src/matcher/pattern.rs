use std::borrow::Cow;
use std::sync::Arc;

use regex::Regex;

use super::RequestMatcher;
use crate::error::{RedirectError, Result};

/// Characters accepted as a delimiter pair around a stored pattern.
const DELIMITERS: [char; 4] = ['/', '#', '~', '!'];

/// Extract the regex body from a stored pattern.
///
/// A pattern whose first and last characters are the same delimiter is unwrapped and its
/// escaped delimiters are unescaped. Any other pattern is used whole, as if wrapped in
/// `#...#` with internal `#` escaped. Returns `None` for an empty pattern or a lone
/// delimiter.
pub fn pattern_body(pattern: &str) -> Option<Cow<'_, str>> {
    let pattern = pattern.trim();
    let first = pattern.chars().next()?;

    if !DELIMITERS.contains(&first) || !pattern.ends_with(first) {
        return Some(Cow::Borrowed(pattern));
    }
    if pattern.len() == 1 {
        return None;
    }

    // Delimiters are ASCII, so byte slicing stays on char boundaries.
    let inner = &pattern[1..pattern.len() - 1];
    Some(unescape_delimiter(inner, first))
}

fn unescape_delimiter(body: &str, delimiter: char) -> Cow<'_, str> {
    if !body.contains('\\') {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if next == delimiter => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

/// Compile a stored pattern into a regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    let body = pattern_body(pattern)
        .ok_or_else(|| RedirectError::ValidationFailed("Empty regex pattern".to_string()))?;
    Ok(Regex::new(&body)?)
}

/// Regex matcher: the raw request matches the pattern
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Arc<Regex>,
}

impl RegexMatcher {
    pub fn new(regex: Arc<Regex>) -> Self {
        Self { regex }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl RequestMatcher for RegexMatcher {
    fn matches(&self, request: &str) -> bool {
        self.regex.is_match(request)
    }
}
