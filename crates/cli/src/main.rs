// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! lh - drills for the leasehold lock primitives

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use commands::{drill, keys};
use output::OutputFormat;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(
    name = "lh",
    version,
    about = "Leasehold - drills for preemptive lock coordination"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preempt a set of lease holders with an exclusive request
    Drill(drill::DrillArgs),
    /// Contend on a per-key lock map
    Keys(keys::KeysArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = setup_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Drill(args) => drill::handle(args, cli.format).await,
        Commands::Keys(args) => keys::handle(args, cli.format).await,
    }
}

fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .with_context(|| format!("log file has no name: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
