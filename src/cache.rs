//! Per-(plug, version, context) compute cache.

use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::component::ComponentId;
use crate::error::GraphError;
use crate::value::Value;

/// Cache key: plug identity, the plug's dirty version, and the context hash.
///
/// Including the version means dirtying never has to race readers to clear
/// entries; a bumped version simply keys fresh entries, and the stale ones
/// are pruned by the propagation pass that bumped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) plug: ComponentId,
    pub(crate) version: u64,
    pub(crate) context: u64,
}

/// Cache of computed values with an at-most-one-computation guarantee.
///
/// Each entry is a `OnceCell`; racing readers of the same key block on the
/// winner's initialization instead of computing twice. A failed computation
/// leaves the cell empty, so errors are reported to every caller and never
/// cached.
#[derive(Default)]
pub(crate) struct ComputeCache {
    entries: Mutex<AHashMap<CacheKey, Arc<OnceCell<Value>>>>,
}

impl ComputeCache {
    /// Get the cached value for `key`, computing it with `f` on a miss.
    pub(crate) fn get_or_compute(
        &self,
        key: CacheKey,
        f: impl FnOnce() -> Result<Value, GraphError>,
    ) -> Result<Value, GraphError> {
        let cell = {
            let mut entries = self.entries.lock();
            entries.entry(key).or_default().clone()
        };
        // The map lock is released before initialization so a long compute
        // never blocks unrelated lookups.
        cell.get_or_try_init(f).cloned()
    }

    /// Peek without computing.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<Value> {
        let entries = self.entries.lock();
        entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Drop every entry for `plug` older than `version`.
    pub(crate) fn prune_stale(&self, plug: ComponentId, version: u64) {
        self.entries
            .lock()
            .retain(|key, _| key.plug != plug || key.version >= version);
    }
}
