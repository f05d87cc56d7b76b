use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RuleStore;
use crate::error::{RedirectError, Result};
use crate::matcher::{first_segment, normalize, normalize_prefix};
use crate::types::{
    MatchType, NewRule, RedirectRule, RedirectStatus, RulePage, RuleUpdate, MAX_FIELD_LEN,
};

/// Serializable image of a rule table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub next_id: u64,
    pub rules: Vec<RedirectRule>,
}

/// Where a rule lives in the candidate indexes
enum IndexKey {
    /// Normalized source
    Exact(String),
    /// First segment of the normalized, star-stripped source
    Prefix(String),
    Regex,
}

impl IndexKey {
    fn of(rule: &RedirectRule) -> Self {
        match rule.match_type {
            MatchType::Exact => IndexKey::Exact(normalize(&rule.source)),
            MatchType::Prefix => {
                IndexKey::Prefix(first_segment(&normalize_prefix(&rule.source)).to_string())
            }
            MatchType::Regex => IndexKey::Regex,
        }
    }
}

struct Table {
    rules: BTreeMap<u64, RedirectRule>,
    exact: HashMap<String, BTreeSet<u64>>,
    prefix: HashMap<String, BTreeSet<u64>>,
    regex: BTreeSet<u64>,
    next_id: u64,
}

impl Table {
    fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
            exact: HashMap::new(),
            prefix: HashMap::new(),
            regex: BTreeSet::new(),
            next_id: 1,
        }
    }

    fn add(&mut self, rule: RedirectRule) {
        match IndexKey::of(&rule) {
            IndexKey::Exact(key) => {
                self.exact.entry(key).or_default().insert(rule.id);
            }
            IndexKey::Prefix(key) => {
                self.prefix.entry(key).or_default().insert(rule.id);
            }
            IndexKey::Regex => {
                self.regex.insert(rule.id);
            }
        }
        self.rules.insert(rule.id, rule);
    }

    fn remove(&mut self, id: u64) -> Option<RedirectRule> {
        let rule = self.rules.remove(&id)?;
        match IndexKey::of(&rule) {
            IndexKey::Exact(key) => remove_id(&mut self.exact, &key, id),
            IndexKey::Prefix(key) => remove_id(&mut self.prefix, &key, id),
            IndexKey::Regex => {
                self.regex.remove(&id);
            }
        }
        Some(rule)
    }

    fn resolve_ids<'a>(
        &'a self,
        ids: impl DoubleEndedIterator<Item = &'a u64> + 'a,
    ) -> impl Iterator<Item = RedirectRule> + 'a {
        ids.rev().filter_map(|id| self.rules.get(id)).cloned()
    }
}

fn remove_id(index: &mut HashMap<String, BTreeSet<u64>>, key: &str, id: u64) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Trim a source/target value and cap it at the stored column length.
fn clean_field(value: String, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RedirectError::ValidationFailed(format!("Empty {}", field)));
    }
    let capped = match trimmed.char_indices().nth(MAX_FIELD_LEN) {
        Some((end, _)) => &trimmed[..end],
        None => trimmed,
    };
    Ok(capped.to_string())
}

fn coerce_status(code: u16) -> RedirectStatus {
    RedirectStatus::from_code(code).unwrap_or_else(|| {
        debug!(status = code, "unsupported redirect status, using 301");
        RedirectStatus::default()
    })
}

fn coerce_match_type(name: &str) -> MatchType {
    MatchType::parse(name).unwrap_or_else(|| {
        debug!(match_type = name, "unknown match type, using exact");
        MatchType::default()
    })
}

/// In-memory rule table with candidate indexes.
///
/// Exact rules are indexed by normalized source, prefix rules by the first path
/// segment of their prefix, so a lookup touches only the buckets a request can reach.
/// Regex rules are always candidates.
pub struct MemoryRuleStore {
    table: RwLock<Table>,
}

impl MemoryRuleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::new()),
        }
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.table.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let table = self.table.read();
        Snapshot {
            next_id: table.next_id,
            rules: table.rules.values().cloned().collect(),
        }
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut table = Table::new();
        let max_id = snapshot.rules.iter().map(|r| r.id).max().unwrap_or(0);
        table.next_id = snapshot.next_id.max(max_id + 1).max(1);
        for rule in snapshot.rules {
            table.add(rule);
        }
        Self {
            table: RwLock::new(table),
        }
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for MemoryRuleStore {
    fn insert(&self, rule: NewRule) -> Result<u64> {
        let source = clean_field(rule.source, "source")?;
        let target = clean_field(rule.target, "target")?;
        let status = coerce_status(rule.status);
        let match_type = coerce_match_type(&rule.match_type);
        let now = SystemTime::now();

        let mut table = self.table.write();
        let id = table.next_id;
        table.next_id += 1;
        table.add(RedirectRule {
            id,
            source,
            target,
            status,
            match_type,
            hits: 0,
            last_hit: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    fn update(&self, id: u64, fields: RuleUpdate) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }
        let source = fields
            .source
            .map(|s| clean_field(s, "source"))
            .transpose()?;
        let target = fields
            .target
            .map(|t| clean_field(t, "target"))
            .transpose()?;

        let mut table = self.table.write();
        // Re-adding keeps the indexes in step with a changed source or match type.
        let Some(mut rule) = table.remove(id) else {
            return Ok(false);
        };
        if let Some(source) = source {
            rule.source = source;
        }
        if let Some(target) = target {
            rule.target = target;
        }
        if let Some(code) = fields.status {
            rule.status = coerce_status(code);
        }
        if let Some(ref name) = fields.match_type {
            rule.match_type = coerce_match_type(name);
        }
        rule.updated_at = SystemTime::now();
        table.add(rule);
        Ok(true)
    }

    fn delete(&self, id: u64) -> Result<bool> {
        Ok(self.table.write().remove(id).is_some())
    }

    fn bulk_delete(&self, ids: &[u64]) -> Result<usize> {
        let mut table = self.table.write();
        Ok(ids.iter().filter(|&&id| table.remove(id).is_some()).count())
    }

    fn get(&self, id: u64) -> Result<Option<RedirectRule>> {
        Ok(self.table.read().rules.get(&id).cloned())
    }

    fn list(&self, page: usize, per_page: usize) -> Result<RulePage> {
        let page = page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let table = self.table.read();
        let rows = table
            .rules
            .values()
            .rev()
            .skip(offset)
            .take(per_page)
            .cloned()
            .collect();

        Ok(RulePage {
            rows,
            total: table.rules.len(),
            page,
            per_page,
        })
    }

    fn candidates_for(&self, request: &str) -> Result<Vec<RedirectRule>> {
        let normalized = normalize(request);
        let table = self.table.read();
        let mut candidates = Vec::new();

        if let Some(ids) = table.exact.get(&normalized) {
            candidates.extend(table.resolve_ids(ids.iter()));
        }

        // A prefix rule can only match if its first segment is a prefix of the
        // request's first segment, so look up every prefix of it (including "").
        let segment = first_segment(&normalized);
        let mut prefix_ids = BTreeSet::new();
        let ends = segment
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(segment.len()));
        for end in ends {
            if let Some(ids) = table.prefix.get(&segment[..end]) {
                prefix_ids.extend(ids.iter().copied());
            }
        }
        candidates.extend(table.resolve_ids(prefix_ids.iter()));

        candidates.extend(table.resolve_ids(table.regex.iter()));
        Ok(candidates)
    }

    fn record_hit(&self, id: u64, at: SystemTime) -> Result<bool> {
        let mut table = self.table.write();
        match table.rules.get_mut(&id) {
            Some(rule) => {
                rule.hits = rule.hits.saturating_add(1);
                rule.last_hit = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
