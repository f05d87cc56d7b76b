//! Hit tracking.
//!
//! Recording a hit is best-effort: failures are logged and never reach the caller,
//! so a slow or broken store cannot hold up a redirect.

use std::sync::Arc;
use std::time::SystemTime;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::store::RuleStore;

/// How hit updates are issued relative to the redirect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Single-row update on the calling thread
    #[default]
    Inline,
    /// Handed to the ambient tokio runtime's blocking pool; inline when there is none
    Detached,
}

/// Increments a rule's hit counter and last-hit time.
#[derive(Clone)]
pub struct HitTracker {
    store: Arc<dyn RuleStore>,
    mode: TrackingMode,
}

impl HitTracker {
    pub fn new(store: Arc<dyn RuleStore>, mode: TrackingMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Record one hit for `rule_id`. Never fails.
    pub fn record(&self, rule_id: u64) {
        match self.mode {
            TrackingMode::Inline => record_now(self.store.as_ref(), rule_id),
            TrackingMode::Detached => self.record_detached(rule_id),
        }
    }

    #[cfg(feature = "async")]
    fn record_detached(&self, rule_id: u64) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                // The join handle is dropped: the write finishes on its own.
                handle.spawn_blocking(move || record_now(store.as_ref(), rule_id));
            }
            Err(_) => record_now(self.store.as_ref(), rule_id),
        }
    }

    #[cfg(not(feature = "async"))]
    fn record_detached(&self, rule_id: u64) {
        record_now(self.store.as_ref(), rule_id)
    }
}

fn record_now(store: &dyn RuleStore, rule_id: u64) {
    match store.record_hit(rule_id, SystemTime::now()) {
        Ok(true) => debug!(rule_id, "hit recorded"),
        Ok(false) => debug!(rule_id, "hit not recorded: rule no longer exists"),
        Err(e) => warn!(rule_id, error = %e, "failed to record hit"),
    }
}
