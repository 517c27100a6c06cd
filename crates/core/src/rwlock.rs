// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader/writer lock with cancellable acquisition
//!
//! Admission to the inner [`RwLock`] goes through a single-slot gate that is
//! raced against the caller's [`Context`]. Either both the gate and the inner
//! lock are acquired, or neither is.

use crate::context::Context;
use crate::error::CancelCause;
use std::ops::{Deref, DerefMut};
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader/writer lock whose acquisition aborts when the caller's context ends
#[derive(Debug, Default)]
pub struct CancelRwLock<T> {
    gate: Mutex<()>,
    inner: RwLock<T>,
}

/// Shared hold on a [`CancelRwLock`]
#[derive(Debug)]
pub struct ReadGuard<'a, T> {
    // Fields drop in order: inner lock first, then the gate.
    inner: RwLockReadGuard<'a, T>,
    _gate: MutexGuard<'a, ()>,
}

/// Exclusive hold on a [`CancelRwLock`]
#[derive(Debug)]
pub struct WriteGuard<'a, T> {
    inner: RwLockWriteGuard<'a, T>,
    _gate: MutexGuard<'a, ()>,
}

impl<T> CancelRwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            gate: Mutex::new(()),
            inner: RwLock::new(value),
        }
    }

    async fn admit(&self, ctx: &Context) -> Result<MutexGuard<'_, ()>, CancelCause> {
        tokio::select! {
            biased;
            cause = ctx.done() => Err(cause),
            gate = self.gate.lock() => Ok(gate),
        }
    }

    /// Acquire a shared hold, unless `ctx` ends first
    pub async fn read(&self, ctx: &Context) -> Result<ReadGuard<'_, T>, CancelCause> {
        let gate = self.admit(ctx).await?;
        let inner = self.inner.read().await;
        Ok(ReadGuard { inner, _gate: gate })
    }

    /// Acquire an exclusive hold, unless `ctx` ends first
    pub async fn write(&self, ctx: &Context) -> Result<WriteGuard<'_, T>, CancelCause> {
        let gate = self.admit(ctx).await?;
        let inner = self.inner.write().await;
        Ok(WriteGuard { inner, _gate: gate })
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[cfg(test)]
#[path = "rwlock_tests.rs"]
mod tests;
