//! Rule storage.
//!
//! [`RuleStore`] is the contract shared by the admin screens, the CSV codec and the
//! resolver. Two implementations are provided:
//! - `MemoryRuleStore`: indexed in-memory table
//! - `FileRuleStore`: the in-memory table persisted as a JSON snapshot

use std::time::SystemTime;

use crate::error::{RedirectError, Result};
use crate::types::{NewRule, RedirectRule, RulePage, RuleUpdate};

mod file;
mod memory;

pub use file::FileRuleStore;
pub use memory::MemoryRuleStore;

pub(crate) use memory::Snapshot;

/// Persistence for redirect rules.
pub trait RuleStore: Send + Sync {
    /// Insert a rule and return its id.
    ///
    /// Unknown match types become `exact` and unsupported statuses become `301`.
    /// An empty source or target is rejected with `ValidationFailed`.
    fn insert(&self, rule: NewRule) -> Result<u64>;

    /// Apply the fields present in `fields`.
    ///
    /// Returns `false` when no field is set or the rule does not exist.
    fn update(&self, id: u64, fields: RuleUpdate) -> Result<bool>;

    /// Delete a rule. Returns `false` if it did not exist.
    fn delete(&self, id: u64) -> Result<bool>;

    /// Delete several rules and return how many were removed.
    fn bulk_delete(&self, ids: &[u64]) -> Result<usize>;

    /// Fetch a rule by id.
    fn get(&self, id: u64) -> Result<Option<RedirectRule>>;

    /// One page of rules ordered by id descending. Pages are 1-based.
    fn list(&self, page: usize, per_page: usize) -> Result<RulePage>;

    /// Rules that could match `request` (`path?query`).
    ///
    /// Exact candidates come first, then prefix candidates, then every regex rule;
    /// each group ordered by id descending. Every rule that could match is included.
    fn candidates_for(&self, request: &str) -> Result<Vec<RedirectRule>>;

    /// Increment a rule's hit counter and set its last hit time.
    ///
    /// Returns `false` if the rule does not exist.
    fn record_hit(&self, id: u64, at: SystemTime) -> Result<bool>;

    /// Fetch a rule that must exist.
    fn require(&self, id: u64) -> Result<RedirectRule> {
        self.get(id)?.ok_or(RedirectError::NotFound(id))
    }
}
