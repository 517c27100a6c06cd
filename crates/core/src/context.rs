// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation contexts
//!
//! A [`Context`] is a node in a tree of cancellation scopes. Cancelling a
//! context cancels every context derived from it. Each context records why it
//! ended; a context ended by an ancestor reports the ancestor's cause.

use crate::error::CancelCause;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Handle to a cancellation scope. Clones share the same scope.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    token: CancellationToken,
    cause: OnceLock<CancelCause>,
    parent: Option<Arc<Inner>>,
    deadline: Option<Instant>,
}

impl Inner {
    fn cause(&self) -> Option<CancelCause> {
        if let Some(cause) = self.cause.get() {
            return Some(*cause);
        }
        self.parent.as_ref().and_then(|p| p.cause())
    }
}

impl Context {
    /// Create a root context. It ends only when cancelled explicitly.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                parent: None,
                deadline: None,
            }),
        }
    }

    /// Derive a child that ends when this context ends or when cancelled itself
    pub fn child(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    /// Derive a child that ends after `timeout` at the latest.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that ends at `deadline` at the latest.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.inner.deadline {
            Some(parent) if parent <= deadline => parent,
            _ => deadline,
        };
        let ctx = self.derive(Some(deadline));

        let timer = ctx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    timer.cancel_with(CancelCause::DeadlineExceeded);
                }
                _ = timer.cancelled() => {}
            }
        });

        ctx
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                cause: OnceLock::new(),
                parent: Some(Arc::clone(&self.inner)),
                deadline,
            }),
        }
    }

    /// Cancel with [`CancelCause::Canceled`]
    pub fn cancel(&self) {
        self.cancel_with(CancelCause::Canceled);
    }

    /// Cancel this context and its descendants, recording `cause`.
    ///
    /// No-op if the context has already ended; the first cause wins.
    pub fn cancel_with(&self, cause: CancelCause) {
        if self.inner.token.is_cancelled() {
            return;
        }
        let _ = self.inner.cause.set(cause);
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Why the context ended, or `None` while it is still live
    pub fn cause(&self) -> Option<CancelCause> {
        if !self.is_cancelled() {
            return None;
        }
        Some(self.inner.cause().unwrap_or(CancelCause::Canceled))
    }

    /// `Err(cause)` once the context has ended
    pub fn check(&self) -> Result<(), CancelCause> {
        match self.cause() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Future that completes when the context ends
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Wait for the context to end and return why
    pub async fn done(&self) -> CancelCause {
        self.cancelled().await;
        self.cause().unwrap_or(CancelCause::Canceled)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("cause", &self.cause())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
