use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{MemoryRuleStore, RuleStore, Snapshot};
use crate::error::{RedirectError, Result, StoreErrorKind};
use crate::types::{NewRule, RedirectRule, RulePage, RuleUpdate};

/// Rule store persisted as a JSON snapshot.
///
/// Reads are served from an in-memory table. Every admin mutation rewrites the snapshot
/// (written to `<path>.tmp`, then renamed into place). Hit counters are only kept in
/// memory until the next mutation, [`FileRuleStore::flush`], or drop.
pub struct FileRuleStore {
    path: PathBuf,
    inner: MemoryRuleStore,
    write_lock: Mutex<()>,
    dirty: AtomicBool,
}

impl FileRuleStore {
    /// Open a snapshot file. A missing file yields an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let inner = match fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot =
                    serde_json::from_slice(&bytes).map_err(|e| RedirectError::Store {
                        kind: StoreErrorKind::Corrupt,
                        message: format!("Failed to decode '{}': {}", path.display(), e),
                    })?;
                debug!(path = %path.display(), rules = snapshot.rules.len(), "loaded rule snapshot");
                MemoryRuleStore::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryRuleStore::new(),
            Err(e) => {
                return Err(RedirectError::unavailable(format!(
                    "Failed to read '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        })
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Write pending hit counters to disk.
    pub fn flush(&self) -> Result<()> {
        if self.dirty.load(Ordering::Acquire) {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let _lock = self.write_lock.lock();
        // Cleared before the snapshot is taken so hits recorded meanwhile stay pending.
        self.dirty.store(false, Ordering::Release);
        let snapshot = self.inner.snapshot();

        self.write_snapshot(&snapshot).map_err(|e| {
            self.dirty.store(true, Ordering::Release);
            RedirectError::unavailable(format!("Failed to write '{}': {}", self.path.display(), e))
        })
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = tmp_path_for(&self.path);
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
    }

    /// Persist after a mutation that changed something.
    fn persist_if(&self, changed: bool) -> Result<()> {
        if changed {
            self.persist()?;
        }
        Ok(())
    }
}

/// `<path>.tmp`, with the full file name (extension included) kept.
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl RuleStore for FileRuleStore {
    fn insert(&self, rule: NewRule) -> Result<u64> {
        let id = self.inner.insert(rule)?;
        self.persist()?;
        Ok(id)
    }

    fn update(&self, id: u64, fields: RuleUpdate) -> Result<bool> {
        let updated = self.inner.update(id, fields)?;
        self.persist_if(updated)?;
        Ok(updated)
    }

    fn delete(&self, id: u64) -> Result<bool> {
        let deleted = self.inner.delete(id)?;
        self.persist_if(deleted)?;
        Ok(deleted)
    }

    fn bulk_delete(&self, ids: &[u64]) -> Result<usize> {
        let deleted = self.inner.bulk_delete(ids)?;
        self.persist_if(deleted > 0)?;
        Ok(deleted)
    }

    fn get(&self, id: u64) -> Result<Option<RedirectRule>> {
        self.inner.get(id)
    }

    fn list(&self, page: usize, per_page: usize) -> Result<RulePage> {
        self.inner.list(page, per_page)
    }

    fn candidates_for(&self, request: &str) -> Result<Vec<RedirectRule>> {
        self.inner.candidates_for(request)
    }

    fn record_hit(&self, id: u64, at: SystemTime) -> Result<bool> {
        let recorded = self.inner.record_hit(id, at)?;
        if recorded {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(recorded)
    }
}

impl Drop for FileRuleStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush hit counters");
        }
    }
}
