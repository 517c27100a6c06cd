// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drill command: preempt lease holders with an exclusive request

use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use leasehold_core::{CancelCause, Context, CoordinatorConfig, LockCoordinator, LockError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(clap::Args)]
pub struct DrillArgs {
    /// Number of lease holders to admit
    #[arg(long, default_value_t = 10)]
    readers: usize,

    /// How many of the holders ignore preemption and must be torn down
    #[arg(long, default_value_t = 0)]
    stubborn: usize,

    /// Time a cooperative holder needs to wind down after preemption
    #[arg(long, default_value = "50ms", value_parser = humantime::parse_duration)]
    wind_down: Duration,

    /// Coordinator configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct DrillReport {
    pub coordinator: String,
    pub readers: usize,
    pub preempted: usize,
    pub force_released: usize,
    pub exclusive_wait_ms: u64,
    pub after_shutdown: AfterShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterShutdown {
    Fallback,
    Closed,
}

impl fmt::Display for DrillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Coordinator: {}", self.coordinator)?;
        writeln!(f, "Readers admitted: {}", self.readers)?;
        writeln!(f, "Preempted: {}", self.preempted)?;
        writeln!(f, "Force-released: {}", self.force_released)?;
        writeln!(f, "Exclusive granted after: {}ms", self.exclusive_wait_ms)?;
        let after = match self.after_shutdown {
            AfterShutdown::Fallback => "fallback lock",
            AfterShutdown::Closed => "closed",
        };
        writeln!(f, "After shutdown: {}", after)
    }
}

pub async fn handle(args: DrillArgs, format: OutputFormat) -> Result<()> {
    let report = run(args).await?;
    output::print(&report, format);
    Ok(())
}

async fn run(args: DrillArgs) -> Result<DrillReport> {
    if args.stubborn > args.readers {
        bail!(
            "--stubborn ({}) cannot exceed --readers ({})",
            args.stubborn,
            args.readers
        );
    }

    let config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)?,
        None => CoordinatorConfig::new("drill"),
    };
    let name = config.name.clone();

    let root = Context::new();
    let coordinator = LockCoordinator::spawn(&root, config);
    let finish = root.child();
    let preempted = Arc::new(AtomicUsize::new(0));
    let forced = Arc::new(AtomicUsize::new(0));

    let mut holders = JoinSet::new();
    for i in 0..args.readers {
        let lease = coordinator.rlock(&root).await?;
        let stubborn = i < args.stubborn;
        let wind_down = args.wind_down;
        let finish = finish.clone();
        let preempted = Arc::clone(&preempted);
        let forced = Arc::clone(&forced);

        holders.spawn(async move {
            if lease.context().done().await == CancelCause::Preempted {
                preempted.fetch_add(1, Ordering::SeqCst);
            }
            if stubborn {
                finish.cancelled().await;
            } else {
                tokio::time::sleep(wind_down).await;
            }
            if !lease.release() {
                forced.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
    tracing::info!(readers = args.readers, stubborn = args.stubborn, "leases admitted");

    let started = Instant::now();
    let guard = coordinator.lock().await?;
    let exclusive_wait = started.elapsed();
    tracing::info!(elapsed_ms = exclusive_wait.as_millis() as u64, "exclusive lock granted");
    drop(guard);

    finish.cancel();
    while let Some(joined) = holders.join_next().await {
        joined?;
    }

    coordinator.shutdown().await;
    let after_shutdown = match coordinator.lock().await {
        Ok(_) => AfterShutdown::Fallback,
        Err(LockError::Closed) => AfterShutdown::Closed,
        Err(e) => return Err(e.into()),
    };

    Ok(DrillReport {
        coordinator: name,
        readers: args.readers,
        preempted: preempted.load(Ordering::SeqCst),
        force_released: forced.load(Ordering::SeqCst),
        exclusive_wait_ms: exclusive_wait.as_millis() as u64,
        after_shutdown,
    })
}

#[cfg(test)]
#[path = "drill_tests.rs"]
mod tests;
