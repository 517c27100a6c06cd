// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared by the lock primitives

use thiserror::Error;

/// Why a [`Context`](crate::context::Context) ended.
///
/// Doubles as the error returned when an acquisition loses the race against
/// the caller's own cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelCause {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("lease preempted by an exclusive lock request")]
    Preempted,
    #[error("lease released")]
    Released,
    #[error("lock coordinator shut down")]
    Shutdown,
}

/// Errors returned by the lock coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The caller's context ended before the request was granted
    #[error("lock request cancelled: {0}")]
    Cancelled(#[from] CancelCause),
    /// The coordinator has shut down and fallback locking is disabled
    #[error("lock coordinator is closed")]
    Closed,
}

/// Errors produced while loading coordinator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
