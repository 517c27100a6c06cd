// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO per-key lock map
//!
//! Each key gets an independent [FIFO lock](crate::fifo). Entries are created
//! on first use and pruned when their last holder lets go. The map-wide mutex
//! only serializes bookkeeping; the per-key wait happens outside it.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

type Entries<K> = Arc<Mutex<HashMap<K, KeyEntry>>>;

struct KeyEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Registered holders, including those still queued for `lock`
    holders: usize,
}

/// Map of independent FIFO locks, one per key
pub struct KeyedFifoLock<K> {
    entries: Entries<K>,
}

/// Proof of holding the lock for one key. Released on drop.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard<K: Eq + Hash> {
    entries: Entries<K>,
    key: K,
    slot: Option<OwnedMutexGuard<()>>,
}

fn lock_entries<K>(entries: &Mutex<HashMap<K, KeyEntry>>) -> MutexGuard<'_, HashMap<K, KeyEntry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

impl<K: Eq + Hash + Clone> KeyedFifoLock<K> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait until this caller is the sole holder of `key`.
    ///
    /// If the returned future is dropped before completing, the registration
    /// is rolled back as if the key had been unlocked.
    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let slot = {
            let mut entries = lock_entries(&self.entries);
            let entry = entries.entry(key.clone()).or_insert_with(|| KeyEntry {
                lock: Arc::new(tokio::sync::Mutex::new(())),
                holders: 0,
            });
            entry.holders += 1;
            Arc::clone(&entry.lock)
        };

        let mut guard = KeyGuard {
            entries: Arc::clone(&self.entries),
            key,
            slot: None,
        };
        guard.slot = Some(slot.lock_owned().await);
        guard
    }

    /// Number of keys with at least one registered holder
    pub fn len(&self) -> usize {
        lock_entries(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        lock_entries(&self.entries).contains_key(key)
    }

    /// Holders registered for `key`, counting queued waiters
    pub fn holders(&self, key: &K) -> usize {
        lock_entries(&self.entries)
            .get(key)
            .map_or(0, |entry| entry.holders)
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedFifoLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for KeyedFifoLock<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K> fmt::Debug for KeyedFifoLock<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = lock_entries(&self.entries).len();
        f.debug_struct("KeyedFifoLock").field("keys", &keys).finish()
    }
}

impl<K: Eq + Hash> KeyGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Release the key; the next queued acquirer proceeds
    pub fn unlock(self) {
        drop(self);
    }
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // The entry must be gone before the per-key lock is released, or a
        // racing `lock` could install a second entry for the same key.
        {
            let mut entries = lock_entries(&self.entries);
            if let Some(entry) = entries.get_mut(&self.key) {
                entry.holders = entry.holders.saturating_sub(1);
                if entry.holders == 0 {
                    entries.remove(&self.key);
                }
            }
        }
        drop(self.slot.take());
    }
}

impl<K: Eq + Hash + fmt::Debug> fmt::Debug for KeyGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard")
            .field("key", &self.key)
            .field("held", &self.slot.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "keyed_tests.rs"]
mod tests;
