use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{RedirectError, Result};
use crate::matcher::compile_pattern;

/// Maximum stored length (in characters) of a rule's source and target.
pub const MAX_FIELD_LEN: usize = 2048;

/// How a rule's source is compared against a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Normalized request equals normalized source
    #[default]
    Exact,
    /// Normalized request starts with normalized source
    Prefix,
    /// Raw request matches the source pattern
    Regex,
}

impl MatchType {
    /// Parse a stored match type name. Names are case-sensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "exact" => Some(MatchType::Exact),
            "prefix" => Some(MatchType::Prefix),
            "regex" => Some(MatchType::Regex),
            _ => None,
        }
    }

    /// Parse a match type, falling back to `Exact` for unknown names.
    pub fn parse_or_default(name: &str) -> Self {
        Self::parse(name).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Regex => "regex",
        }
    }

    /// Candidate ordering: lower values are tried first.
    pub fn priority(&self) -> u8 {
        match self {
            MatchType::Exact => 0,
            MatchType::Prefix => 1,
            MatchType::Regex => 2,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = RedirectError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
            .ok_or_else(|| RedirectError::ValidationFailed(format!("Unknown match type: {}", s)))
    }
}

impl From<MatchType> for String {
    fn from(m: MatchType) -> Self {
        m.as_str().to_string()
    }
}

/// HTTP status used for a redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RedirectStatus {
    /// 301
    #[default]
    MovedPermanently,
    /// 302
    Found,
    /// 307
    TemporaryRedirect,
    /// 308
    PermanentRedirect,
}

impl RedirectStatus {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            301 => Some(RedirectStatus::MovedPermanently),
            302 => Some(RedirectStatus::Found),
            307 => Some(RedirectStatus::TemporaryRedirect),
            308 => Some(RedirectStatus::PermanentRedirect),
            _ => None,
        }
    }

    /// Map any code outside {301, 302, 307, 308} to 301.
    pub fn coerce(code: u16) -> Self {
        Self::from_code(code).unwrap_or_default()
    }

    pub fn code(&self) -> u16 {
        match self {
            RedirectStatus::MovedPermanently => 301,
            RedirectStatus::Found => 302,
            RedirectStatus::TemporaryRedirect => 307,
            RedirectStatus::PermanentRedirect => 308,
        }
    }
}

impl TryFrom<u16> for RedirectStatus {
    type Error = String;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unsupported redirect status {}", code))
    }
}

impl From<RedirectStatus> for u16 {
    fn from(status: RedirectStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for RedirectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A persisted redirect rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectRule {
    /// Store-assigned identifier, never reused
    pub id: u64,
    /// Path, path prefix or pattern depending on `match_type`
    pub source: String,
    /// Destination URL (absolute or relative)
    pub target: String,
    pub status: RedirectStatus,
    pub match_type: MatchType,
    /// Number of redirects issued by this rule
    pub hits: u64,
    /// Time of the most recent recorded hit
    pub last_hit: Option<SystemTime>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Raw rule fields supplied by the admin screen, API or CSV import.
///
/// Status and match type are kept raw; the store coerces unknown values
/// to `301` and `exact` on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub source: String,
    pub target: String,
    pub status: u16,
    pub match_type: String,
}

impl NewRule {
    /// Create an exact 301 rule.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            status: RedirectStatus::default().code(),
            match_type: MatchType::default().into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_match_type(mut self, match_type: impl Into<String>) -> Self {
        self.match_type = match_type.into();
        self
    }

    /// Reject values the store would otherwise coerce.
    ///
    /// The store never calls this; admin callers that prefer a rejected write over a
    /// silently defaulted one use it before `insert`.
    pub fn validate_strict(&self) -> Result<()> {
        validate_fields(
            Some(&self.source),
            Some(&self.target),
            Some(self.status),
            Some(&self.match_type),
        )
    }
}

/// Partial update of a rule. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    pub source: Option<String>,
    pub target: Option<String>,
    pub status: Option<u16>,
    pub match_type: Option<String>,
}

impl RuleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn match_type(mut self, match_type: impl Into<String>) -> Self {
        self.match_type = Some(match_type.into());
        self
    }

    /// True when no recognized field is set.
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.target.is_none()
            && self.status.is_none()
            && self.match_type.is_none()
    }

    /// Strict counterpart of the store's coercion, see [`NewRule::validate_strict`].
    pub fn validate_strict(&self) -> Result<()> {
        validate_fields(
            self.source.as_deref(),
            self.target.as_deref(),
            self.status,
            self.match_type.as_deref(),
        )
    }
}

fn validate_fields(
    source: Option<&str>,
    target: Option<&str>,
    status: Option<u16>,
    match_type: Option<&str>,
) -> Result<()> {
    if source.is_some_and(|s| s.trim().is_empty()) {
        return Err(RedirectError::ValidationFailed("Empty source".to_string()));
    }
    if target.is_some_and(|t| t.trim().is_empty()) {
        return Err(RedirectError::ValidationFailed("Empty target".to_string()));
    }
    if let Some(code) = status {
        if RedirectStatus::from_code(code).is_none() {
            return Err(RedirectError::ValidationFailed(format!(
                "Unsupported status: {}",
                code
            )));
        }
    }
    if let Some(name) = match_type {
        let match_type: MatchType = name.parse()?;
        if let (MatchType::Regex, Some(pattern)) = (match_type, source) {
            compile_pattern(pattern)?;
        }
    }
    Ok(())
}

/// One page of rules, newest first
#[derive(Debug, Clone, Default)]
pub struct RulePage {
    pub rows: Vec<RedirectRule>,
    /// Total number of rules in the store
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
}

impl RulePage {
    pub fn total_pages(&self) -> usize {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page)
    }
}

/// Redirect handed back to the host for the actual HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectDirective {
    /// The rule that produced this redirect
    pub rule_id: u64,
    /// Value for the `Location` header
    pub target: String,
    pub status: RedirectStatus,
}

/// Inbound request as seen by the host dispatcher
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Raw request URI, e.g. `/old-path?ref=abc`
    pub uri: String,
    /// Request host, lower-cased
    pub host: String,
    /// Host-supplied skip signal (admin, async or internal requests)
    pub skip: bool,
}

impl RequestInfo {
    pub fn new(uri: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            host: host.into().to_lowercase(),
            skip: false,
        }
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_parse() {
        assert_eq!(MatchType::parse("exact"), Some(MatchType::Exact));
        assert_eq!(MatchType::parse("prefix"), Some(MatchType::Prefix));
        assert_eq!(MatchType::parse("regex"), Some(MatchType::Regex));
        assert_eq!(MatchType::parse("Regex"), None);
        assert_eq!(MatchType::parse_or_default("wildcard"), MatchType::Exact);
        assert!("glob".parse::<MatchType>().is_err());
    }

    #[test]
    fn test_match_type_priority_order() {
        assert!(MatchType::Exact.priority() < MatchType::Prefix.priority());
        assert!(MatchType::Prefix.priority() < MatchType::Regex.priority());
    }

    #[test]
    fn test_status_coerce() {
        assert_eq!(RedirectStatus::coerce(302), RedirectStatus::Found);
        assert_eq!(RedirectStatus::coerce(308).code(), 308);
        assert_eq!(RedirectStatus::coerce(200), RedirectStatus::MovedPermanently);
        assert_eq!(RedirectStatus::coerce(0).code(), 301);
    }

    #[test]
    fn test_status_serde_as_number() {
        let json = serde_json::to_string(&RedirectStatus::TemporaryRedirect).unwrap();
        assert_eq!(json, "307");
        let status: RedirectStatus = serde_json::from_str("302").unwrap();
        assert_eq!(status, RedirectStatus::Found);
        assert!(serde_json::from_str::<RedirectStatus>("404").is_err());
    }

    #[test]
    fn test_new_rule_defaults() {
        let rule = NewRule::new("/a", "/b");
        assert_eq!(rule.status, 301);
        assert_eq!(rule.match_type, "exact");
        assert!(rule.validate_strict().is_ok());
    }

    #[test]
    fn test_validate_strict_rejects_bad_fields() {
        let bad_status = NewRule::new("/a", "/b").with_status(404);
        assert!(matches!(
            bad_status.validate_strict(),
            Err(RedirectError::ValidationFailed(_))
        ));

        let bad_type = NewRule::new("/a", "/b").with_match_type("glob");
        assert!(matches!(
            bad_type.validate_strict(),
            Err(RedirectError::ValidationFailed(_))
        ));

        let empty_target = NewRule::new("/a", "  ");
        assert!(empty_target.validate_strict().is_err());

        let bad_regex = NewRule::new("#^/docs/(v\\d+#", "/b").with_match_type(MatchType::Regex);
        assert!(matches!(
            bad_regex.validate_strict(),
            Err(RedirectError::RegexError(_))
        ));
    }

    #[test]
    fn test_rule_update_is_empty() {
        assert!(RuleUpdate::new().is_empty());
        assert!(!RuleUpdate::new().status(302).is_empty());
        assert!(RuleUpdate::new().status(999).validate_strict().is_err());
        assert!(RuleUpdate::new().target("/x").validate_strict().is_ok());
    }

    #[test]
    fn test_rule_page_total_pages() {
        let page = RulePage {
            rows: vec![],
            total: 41,
            page: 1,
            per_page: 20,
        };
        assert_eq!(page.total_pages(), 3);
        let empty = RulePage::default();
        assert_eq!(empty.total_pages(), 0);
    }

    #[test]
    fn test_request_info_lowercases_host() {
        let req = RequestInfo::new("/a", "Example.COM").with_skip(true);
        assert_eq!(req.host, "example.com");
        assert!(req.skip);
    }
}
