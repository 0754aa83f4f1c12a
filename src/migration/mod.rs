//! Migration runs and progress polling
//!
//! `idle -> running -> {succeeded, failed}`. The engine owns the single
//! current run; the tracker samples it on an interval until it ends.

pub mod engine;
pub mod run;
pub mod tracker;

pub use engine::MigrationEngine;
pub use run::{MigrationHandle, MigrationPhase, MigrationRun};
pub use tracker::{ProgressSubscription, ProgressTracker};
