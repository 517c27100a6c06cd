// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preemptive shared/exclusive lock coordinator
//!
//! Many callers hold shared *leases* concurrently. Each lease carries a
//! [`Context`] derived from the caller's. An exclusive request cancels every
//! active lease's context, gives each holder [`GRACE_PERIOD`] to let go, tears
//! down whoever is left, and only then grants exclusivity.
//!
//! All arbitration runs on a single task that takes requests from a queue one
//! at a time. Once that task has shut down, callers are served by the
//! admission gate itself, a plain [`FifoLock`], so an exclusive hold granted
//! before shutdown still excludes everyone who arrives after it.

use crate::config::CoordinatorConfig;
use crate::context::Context;
use crate::error::{CancelCause, LockError};
use crate::fifo::{FifoGuard, FifoLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How long a preempted lease may keep running before it is released for it
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Identifies a lease among the currently active ones.
///
/// Numbering restarts at zero on every exclusive grant, so ids are only
/// unique among leases alive at the same time.
pub type LeaseId = u64;

/// Lifecycle of the decision task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Arbitrating requests
    Running,
    /// Shutdown signalled; outstanding leases are being revoked
    ShuttingDown,
    /// Decision task exited; callers use the fallback lock
    Closed,
}

enum Request {
    Exclusive {
        reply: oneshot::Sender<ExclusiveGuard>,
    },
    Shared {
        ctx: Context,
        reply: oneshot::Sender<Result<Lease, CancelCause>>,
    },
}

/// Active leases and the count an exclusive request drains to zero
struct Leases {
    table: Mutex<LeaseTable>,
    outstanding: watch::Sender<usize>,
}

struct LeaseTable {
    active: HashMap<LeaseId, Arc<LeaseHandle>>,
    next_id: LeaseId,
}

struct LeaseHandle {
    id: LeaseId,
    ctx: Context,
    /// Fired exactly once, by whichever release gets there first
    released: CancellationToken,
    leases: Arc<Leases>,
}

impl Leases {
    fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            table: Mutex::new(LeaseTable {
                active: HashMap::new(),
                next_id: 0,
            }),
            outstanding,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, LeaseTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn len(&self) -> usize {
        self.lock_table().active.len()
    }

    fn register(self: &Arc<Self>, parent: &Context) -> Lease {
        let ctx = parent.child();
        let handle = {
            let mut table = self.lock_table();
            let id = table.next_id;
            table.next_id += 1;
            let handle = Arc::new(LeaseHandle {
                id,
                ctx,
                released: CancellationToken::new(),
                leases: Arc::clone(self),
            });
            table.active.insert(id, Arc::clone(&handle));
            self.outstanding.send_replace(table.active.len());
            handle
        };
        tracing::debug!(lease = handle.id, "lease granted");
        Lease {
            ctx: handle.ctx.clone(),
            kind: LeaseKind::Coordinated(handle),
        }
    }

    fn snapshot(&self) -> Vec<Arc<LeaseHandle>> {
        self.lock_table().active.values().cloned().collect()
    }

    /// Cancel every active lease and start its grace timer
    fn disseminate(&self, shutdown: &Context) -> usize {
        let handles = self.snapshot();
        for handle in &handles {
            handle.ctx.cancel_with(CancelCause::Preempted);
            tokio::spawn(release_after_grace(Arc::clone(handle), shutdown.clone()).in_current_span());
        }
        handles.len()
    }

    fn reset_ids(&self) {
        self.lock_table().next_id = 0;
    }

    /// Cancel and release every active lease immediately
    fn revoke_all(&self) -> usize {
        let handles = self.snapshot();
        for handle in &handles {
            handle.ctx.cancel_with(CancelCause::Shutdown);
            handle.release();
        }
        handles.len()
    }
}

impl LeaseHandle {
    /// Tear the lease down. Returns false if it was already released.
    fn release(&self) -> bool {
        {
            let mut table = self.leases.lock_table();
            if self.released.is_cancelled() {
                return false;
            }
            self.released.cancel();
            self.ctx.cancel_with(CancelCause::Released);
            table.active.remove(&self.id);
            self.leases.outstanding.send_replace(table.active.len());
        }
        tracing::debug!(lease = self.id, "lease released");
        true
    }
}

/// Give a preempted lease until the grace period ends, the coordinator shuts
/// down, or the holder releases it, whichever comes first.
async fn release_after_grace(handle: Arc<LeaseHandle>, shutdown: Context) {
    tokio::select! {
        _ = handle.released.cancelled() => return,
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(GRACE_PERIOD) => {
            tracing::warn!(lease = handle.id, grace = ?GRACE_PERIOD, "lease outlived grace period, forcing release");
        }
    }
    handle.release();
}

/// A shared hold granted by [`LockCoordinator::rlock`].
///
/// The lease's context is cancelled when an exclusive request preempts it or
/// when it is released. Dropping the lease releases it.
#[must_use = "the lease is released as soon as it is dropped"]
pub struct Lease {
    ctx: Context,
    kind: LeaseKind,
}

enum LeaseKind {
    Coordinated(Arc<LeaseHandle>),
    /// Granted after shutdown; holds the fallback lock for its lifetime
    Fallback(Mutex<Option<FifoGuard>>),
}

impl Lease {
    fn fallback(ctx: Context, guard: FifoGuard) -> Self {
        Self {
            ctx,
            kind: LeaseKind::Fallback(Mutex::new(Some(guard))),
        }
    }

    /// Context the holder should watch; it ends when the lease must stop
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Id among active leases, `None` for fallback leases
    pub fn id(&self) -> Option<LeaseId> {
        match &self.kind {
            LeaseKind::Coordinated(handle) => Some(handle.id),
            LeaseKind::Fallback(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.kind, LeaseKind::Fallback(_))
    }

    /// Give the lease back. Safe to call any number of times.
    ///
    /// Returns false if the lease was already released, either by an earlier
    /// call or by the coordinator after preemption.
    pub fn release(&self) -> bool {
        match &self.kind {
            LeaseKind::Coordinated(handle) => handle.release(),
            LeaseKind::Fallback(slot) => {
                let guard = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
                if guard.is_some() {
                    self.ctx.cancel_with(CancelCause::Released);
                }
                guard.is_some()
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id())
            .field("fallback", &self.is_fallback())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// An exclusive hold granted by [`LockCoordinator::lock`]. Released on drop.
#[must_use = "the exclusive hold is released as soon as it is dropped"]
pub struct ExclusiveGuard {
    hold: Option<FifoGuard>,
    fallback: bool,
}

impl ExclusiveGuard {
    pub fn is_held(&self) -> bool {
        self.hold.is_some()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Release the hold. Later calls do nothing.
    pub fn unlock(&mut self) {
        if self.hold.take().is_some() {
            tracing::debug!("exclusive lock released");
        }
    }
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl fmt::Debug for ExclusiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveGuard")
            .field("held", &self.is_held())
            .field("fallback", &self.is_fallback())
            .finish()
    }
}

/// The decision task's half of the coordinator
struct Arbiter {
    requests: mpsc::Receiver<Request>,
    gate: FifoLock,
    leases: Arc<Leases>,
    lifetime: Context,
    state: watch::Sender<CoordinatorState>,
}

impl Arbiter {
    async fn run(mut self) {
        tracing::info!("lock coordinator started");
        loop {
            let request = tokio::select! {
                biased;
                _ = self.lifetime.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            match request {
                Request::Exclusive { reply } => self.grant_exclusive(reply).await,
                Request::Shared { ctx, reply } => self.grant_shared(ctx, reply).await,
            }
        }
        self.close();
    }

    async fn grant_exclusive(&mut self, reply: oneshot::Sender<ExclusiveGuard>) {
        // Dropping `reply` on shutdown sends the caller to the fallback lock
        let gate = tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => return,
            gate = self.gate.lock() => gate,
        };

        let preempted = self.leases.disseminate(&self.lifetime);
        self.leases.reset_ids();

        let mut outstanding = self.leases.outstanding.subscribe();
        let _ = outstanding.wait_for(|count| *count == 0).await;

        tracing::debug!(preempted, "exclusive lock granted");
        let guard = ExclusiveGuard {
            hold: Some(gate),
            fallback: false,
        };
        if reply.send(guard).is_err() {
            tracing::debug!("exclusive requester went away before grant");
        }
    }

    async fn grant_shared(&mut self, ctx: Context, reply: oneshot::Sender<Result<Lease, CancelCause>>) {
        let gate = tokio::select! {
            biased;
            cause = ctx.done() => {
                tracing::debug!(%cause, "shared request cancelled before admission");
                let _ = reply.send(Err(cause));
                return;
            }
            _ = self.lifetime.cancelled() => return,
            gate = self.gate.lock() => gate,
        };

        let lease = self.leases.register(&ctx);
        drop(gate);

        // An unclaimed lease is released when the failed send drops it
        let _ = reply.send(Ok(lease));
    }

    fn close(mut self) {
        self.state.send_replace(CoordinatorState::ShuttingDown);
        tracing::info!("lock coordinator shutting down");

        self.requests.close();
        let mut abandoned = 0usize;
        while self.requests.try_recv().is_ok() {
            abandoned += 1;
        }

        let revoked = self.leases.revoke_all();
        self.state.send_replace(CoordinatorState::Closed);
        tracing::info!(revoked, abandoned, "lock coordinator closed");
    }
}

/// Grants shared leases to many callers and preempts them all for an
/// exclusive caller.
pub struct LockCoordinator {
    config: CoordinatorConfig,
    requests: mpsc::Sender<Request>,
    lifetime: Context,
    leases: Arc<Leases>,
    state: watch::Receiver<CoordinatorState>,
    gate: FifoLock,
}

impl LockCoordinator {
    /// Start a coordinator whose lifetime ends with `parent`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(parent: &Context, config: CoordinatorConfig) -> Self {
        let lifetime = parent.child();
        let (requests_tx, requests_rx) = mpsc::channel(config.queue_depth.max(1));
        let (state_tx, state_rx) = watch::channel(CoordinatorState::Running);
        let leases = Arc::new(Leases::new());
        let gate = FifoLock::new();

        let arbiter = Arbiter {
            requests: requests_rx,
            gate: gate.clone(),
            leases: Arc::clone(&leases),
            lifetime: lifetime.clone(),
            state: state_tx,
        };
        let span = tracing::info_span!("lock_coordinator", name = %config.name);
        tokio::spawn(arbiter.run().instrument(span));

        Self {
            config,
            requests: requests_tx,
            lifetime,
            leases,
            state: state_rx,
            gate,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        if self.state.has_changed().is_err() {
            return CoordinatorState::Closed;
        }
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CoordinatorState::Closed
    }

    /// Number of leases granted and not yet released
    pub fn active_leases(&self) -> usize {
        self.leases.len()
    }

    /// Acquire the exclusive hold.
    ///
    /// Every active lease is preempted first. Not cancellable: the call
    /// returns once all leases have been released.
    pub async fn lock(&self) -> Result<ExclusiveGuard, LockError> {
        if !self.is_closed() {
            let (reply, granted) = oneshot::channel();
            if self.requests.send(Request::Exclusive { reply }).await.is_ok() {
                if let Ok(guard) = granted.await {
                    return Ok(guard);
                }
            }
        }
        self.fallback_lock().await
    }

    /// Acquire a shared lease, unless `ctx` ends before it is admitted.
    ///
    /// The lease's context is derived from `ctx`.
    pub async fn rlock(&self, ctx: &Context) -> Result<Lease, LockError> {
        ctx.check()?;
        if !self.is_closed() {
            let (reply, granted) = oneshot::channel();
            let request = Request::Shared {
                ctx: ctx.clone(),
                reply,
            };
            let sent = tokio::select! {
                biased;
                cause = ctx.done() => return Err(cause.into()),
                sent = self.requests.send(request) => sent.is_ok(),
            };
            if sent {
                // A lease granted after `ctx` wins is dropped with the reply
                let reply = tokio::select! {
                    biased;
                    cause = ctx.done() => return Err(cause.into()),
                    reply = granted => reply,
                };
                if let Ok(result) = reply {
                    return result.map_err(LockError::from);
                }
            }
        }
        self.fallback_lease(ctx).await
    }

    async fn fallback_lock(&self) -> Result<ExclusiveGuard, LockError> {
        if !self.config.fallback_after_shutdown {
            return Err(LockError::Closed);
        }
        tracing::debug!(name = %self.config.name, "coordinator closed, taking fallback lock");
        Ok(ExclusiveGuard {
            hold: Some(self.gate.lock().await),
            fallback: true,
        })
    }

    async fn fallback_lease(&self, ctx: &Context) -> Result<Lease, LockError> {
        if !self.config.fallback_after_shutdown {
            return Err(LockError::Closed);
        }
        tracing::debug!(name = %self.config.name, "coordinator closed, taking fallback lease");
        let guard = tokio::select! {
            biased;
            cause = ctx.done() => return Err(cause.into()),
            guard = self.gate.lock() => guard,
        };
        Ok(Lease::fallback(ctx.child(), guard))
    }

    /// Signal shutdown and wait for the decision task to close
    pub async fn shutdown(&self) {
        self.lifetime.cancel_with(CancelCause::Shutdown);
        self.wait_closed().await;
    }

    /// Wait until the coordinator is closed, up to the configured timeout
    pub async fn wait_closed(&self) {
        let mut state = self.state.clone();
        let closed = state.wait_for(|s| *s == CoordinatorState::Closed);
        if tokio::time::timeout(self.config.shutdown_timeout, closed)
            .await
            .is_err()
        {
            tracing::warn!(name = %self.config.name, "timed out waiting for lock coordinator to close");
        }
    }
}

impl Drop for LockCoordinator {
    fn drop(&mut self) {
        self.lifetime.cancel_with(CancelCause::Shutdown);
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("active_leases", &self.active_leases())
            .finish()
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
