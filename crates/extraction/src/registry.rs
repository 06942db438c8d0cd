//! FieldSpec registry
//!
//! Holds the rule set currently in effect. Writers swap a whole
//! `Arc<FieldSpecSet>`; readers clone the `Arc` once per message and never
//! observe a half-applied update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use contracts::FieldSpecSet;
use tracing::debug;

/// Shared, atomically replaceable rule set
#[derive(Debug)]
pub struct FieldSpecRegistry {
    current: RwLock<Arc<FieldSpecSet>>,
    version: AtomicU64,
}

impl FieldSpecRegistry {
    /// Registry holding an empty rule set
    pub fn new() -> Self {
        Self::with_set(FieldSpecSet::empty())
    }

    pub fn with_set(set: FieldSpecSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
            version: AtomicU64::new(0),
        }
    }

    /// Swap in a new rule set, returning the one it replaced
    pub fn replace(&self, set: FieldSpecSet) -> Arc<FieldSpecSet> {
        let next = Arc::new(set);
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, next)
        };
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, topic = %previous.topic(), "field spec set replaced");
        previous
    }

    /// Consistent snapshot of the rule set
    pub fn current(&self) -> Arc<FieldSpecSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of replacements so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl Default for FieldSpecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
