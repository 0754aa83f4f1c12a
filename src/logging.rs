//! `env_logger` setup for embedding applications
//!
//! Filtering follows `RUST_LOG`; without it, this crate logs at `info`.

use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Truncated on every start; keeps log lines out of a terminal UI
    File(PathBuf),
}

/// Install the global logger. A second call fails instead of panicking.
pub fn init(target: LogTarget) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_module("table_migrate", log::LevelFilter::Info);
    builder.parse_env(env_logger::Env::default());

    match target {
        LogTarget::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
        LogTarget::File(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {:?}", path))?;
            builder.target(env_logger::Target::Pipe(Box::new(log_file)));
        }
    }

    builder.try_init().context("Logger already initialized")
}
