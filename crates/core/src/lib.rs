//! leasehold-core: in-process lock primitives
//!
//! This crate provides:
//! - A cancellation [`Context`] tree with recorded causes and deadlines
//! - A FIFO exclusive lock and a FIFO per-key lock map
//! - A reader/writer lock whose acquisition aborts on cancellation
//! - A [`LockCoordinator`] that preempts shared leases for exclusive callers

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod context;
pub mod error;

// Primitives (order matters for dependencies)
pub mod fifo;
pub mod keyed;
pub mod rwlock;
pub mod coordinator;

// Re-exports
pub use config::CoordinatorConfig;
pub use context::Context;
pub use coordinator::{
    CoordinatorState, ExclusiveGuard, Lease, LeaseId, LockCoordinator, GRACE_PERIOD,
};
pub use error::{CancelCause, ConfigError, LockError};
pub use fifo::{FifoGuard, FifoLock};
pub use keyed::{KeyGuard, KeyedFifoLock};
pub use rwlock::{CancelRwLock, ReadGuard, WriteGuard};
