// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO exclusive lock
//!
//! A binary lock whose blocked acquirers are served in arrival order. Backed
//! by tokio's mutex, which queues waiters fairly.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive lock granting waiters in the order they arrived
#[derive(Clone, Debug, Default)]
pub struct FifoLock {
    slot: Arc<Mutex<()>>,
}

/// Proof of holding a [`FifoLock`]. Released on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct FifoGuard {
    _slot: OwnedMutexGuard<()>,
}

impl FifoLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until this caller is the sole holder
    pub async fn lock(&self) -> FifoGuard {
        FifoGuard {
            _slot: Arc::clone(&self.slot).lock_owned().await,
        }
    }

    /// Take the lock only if nobody holds it or waits for it
    pub fn try_lock(&self) -> Option<FifoGuard> {
        Arc::clone(&self.slot)
            .try_lock_owned()
            .ok()
            .map(|slot| FifoGuard { _slot: slot })
    }

    pub fn is_locked(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}

impl FifoGuard {
    /// Release the lock; the next queued acquirer proceeds
    pub fn unlock(self) {
        drop(self);
    }
}

#[cfg(test)]
#[path = "fifo_tests.rs"]
mod tests;
