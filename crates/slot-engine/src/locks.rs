//! Per-key async mutual exclusion (one lock per guide, one per offering).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Map size at which idle entries are first swept.
const MIN_PRUNE_AT: usize = 1024;

#[derive(Debug)]
struct Entries<K> {
    locks: HashMap<K, Arc<AsyncMutex<()>>>,
    prune_at: usize,
}

/// One async mutex per key, created on first use.
///
/// An entry nobody holds a handle to is idle and may be dropped; the sweep runs
/// when the map doubles past its size after the previous sweep, so the map stays
/// within twice the number of keys in use (or [`MIN_PRUNE_AT`]).
#[derive(Debug)]
pub struct KeyedLocks<K> {
    entries: Mutex<Entries<K>>,
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                locks: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
        }
    }

    /// The lock guarding `key`. Callers hold `lock_for(key).lock().await` for the critical section.
    pub fn lock_for(&self, key: K) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.locks.contains_key(&key) && entries.locks.len() >= entries.prune_at {
            // Only the map's own reference left: no holder, no waiter.
            entries.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            entries.prune_at = (entries.locks.len() * 2).max(MIN_PRUNE_AT);
        }
        entries.locks.entry(key).or_default().clone()
    }

    /// Number of keys currently tracked, idle ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
