use thiserror::Error;

/// Classifies rule store errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The backing storage could not be reached or written
    Unavailable,
    /// Persisted data could not be decoded
    Corrupt,
}

/// Redirect engine error types
#[derive(Error, Debug)]
pub enum RedirectError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Rule not found: {0}")]
    NotFound(u64),

    #[error("Store error: {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
    },

    #[error("CSV error at line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RedirectError {
    /// Shorthand for an unreachable store.
    pub fn unavailable(message: impl Into<String>) -> Self {
        RedirectError::Store {
            kind: StoreErrorKind::Unavailable,
            message: message.into(),
        }
    }

    /// True when the store could not be reached. The redirect path treats this as "no match".
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RedirectError::Store {
                kind: StoreErrorKind::Unavailable,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, RedirectError>;
