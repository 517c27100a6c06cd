// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keys command: contend on a per-key lock map

use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use leasehold_core::KeyedFifoLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(clap::Args)]
pub struct KeysArgs {
    /// Number of concurrent workers
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Keys to contend on (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "alpha,beta,gamma")]
    keys: Vec<String>,

    /// Acquisitions per worker
    #[arg(long, default_value_t = 100)]
    rounds: usize,
}

#[derive(Debug, Serialize)]
pub struct KeysReport {
    pub workers: usize,
    pub rounds: usize,
    pub keys: Vec<KeyCount>,
    pub remaining_entries: usize,
}

#[derive(Debug, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub acquisitions: usize,
    pub max_holders: usize,
}

impl fmt::Display for KeysReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workers: {} x {} rounds", self.workers, self.rounds)?;
        for count in &self.keys {
            writeln!(
                f,
                "  {}: {} acquisitions, max {} holder(s)",
                count.key, count.acquisitions, count.max_holders
            )?;
        }
        writeln!(f, "Remaining entries: {}", self.remaining_entries)
    }
}

#[derive(Default)]
struct KeyStats {
    inside: AtomicUsize,
    max_inside: AtomicUsize,
    acquisitions: AtomicUsize,
}

pub async fn handle(args: KeysArgs, format: OutputFormat) -> Result<()> {
    let report = run(args).await?;
    output::print(&report, format);
    Ok(())
}

async fn run(args: KeysArgs) -> Result<KeysReport> {
    let mut seen = HashSet::new();
    let mut keys = args.keys.clone();
    keys.retain(|k| !k.trim().is_empty() && seen.insert(k.clone()));
    if keys.is_empty() {
        bail!("at least one key is required");
    }

    let stats: Arc<HashMap<String, KeyStats>> = Arc::new(
        keys.iter()
            .map(|k| (k.clone(), KeyStats::default()))
            .collect(),
    );
    let keys = Arc::new(keys);
    let locks = KeyedFifoLock::new();

    let mut workers = JoinSet::new();
    for worker in 0..args.workers {
        let locks = locks.clone();
        let keys = Arc::clone(&keys);
        let stats = Arc::clone(&stats);
        let rounds = args.rounds;

        workers.spawn(async move {
            for round in 0..rounds {
                let key = &keys[(worker + round) % keys.len()];
                let _guard = locks.lock(key.clone()).await;
                if let Some(entry) = stats.get(key) {
                    let now = entry.inside.fetch_add(1, Ordering::SeqCst) + 1;
                    entry.max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    entry.inside.fetch_sub(1, Ordering::SeqCst);
                    entry.acquisitions.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    }
    while let Some(joined) = workers.join_next().await {
        joined?;
    }

    let counts: Vec<KeyCount> = keys
        .iter()
        .filter_map(|key| {
            stats.get(key).map(|entry| KeyCount {
                key: key.clone(),
                acquisitions: entry.acquisitions.load(Ordering::SeqCst),
                max_holders: entry.max_inside.load(Ordering::SeqCst),
            })
        })
        .collect();

    if let Some(violation) = counts.iter().find(|c| c.max_holders > 1) {
        bail!(
            "key {} had {} concurrent holders",
            violation.key,
            violation.max_holders
        );
    }

    Ok(KeysReport {
        workers: args.workers,
        rounds: args.rounds,
        keys: counts,
        remaining_entries: locks.len(),
    })
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
