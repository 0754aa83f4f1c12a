use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationPhase {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl MigrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Succeeded | MigrationPhase::Failed)
    }
}

/// Identifies one run of a [`super::MigrationEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MigrationHandle {
    pub(crate) id: u64,
}

impl MigrationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Snapshot of one migration attempt.
///
/// `migrated_records` never decreases and never exceeds `total_records`
/// once the total is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRun {
    /// 0 for a pending run that was never started
    pub id: u64,
    pub source_table: String,
    pub target_table: String,
    pub phase: MigrationPhase,
    /// `None` until the backend has counted the source table
    pub total_records: Option<u64>,
    pub migrated_records: u64,
    /// Set only when `phase` is `Failed`
    pub error_message: Option<String>,
    /// Backend message of a successful run
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationRun {
    /// A run waiting for an explicit start
    pub fn idle(source_table: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            id: 0,
            source_table: source_table.into(),
            target_table: target_table.into(),
            phase: MigrationPhase::Idle,
            total_records: None,
            migrated_records: 0,
            error_message: None,
            message: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn running(id: u64, source_table: &str, target_table: &str) -> Self {
        Self {
            id,
            phase: MigrationPhase::Running,
            started_at: Some(Utc::now()),
            ..Self::idle(source_table, target_table)
        }
    }

    pub fn handle(&self) -> MigrationHandle {
        MigrationHandle { id: self.id }
    }

    /// Rounded share of migrated records, 0 while the total is unknown or 0
    pub fn percentage(&self) -> u8 {
        match self.total_records {
            Some(total) if total > 0 => {
                let ratio = self.migrated_records.min(total) as f64 / total as f64;
                (ratio * 100.0).round() as u8
            }
            _ => 0,
        }
    }

    /// Running without a known total: show "starting", not 0%
    pub fn is_indeterminate(&self) -> bool {
        self.phase == MigrationPhase::Running && self.total_records.is_none()
    }

    /// Merge backend counters; ignored unless running.
    ///
    /// A total of 0 means "not counted yet". Returns whether anything changed.
    pub(crate) fn apply_progress(&mut self, total: u64, migrated: u64) -> bool {
        if self.phase != MigrationPhase::Running {
            return false;
        }

        let before = (self.total_records, self.migrated_records);

        if total > 0 {
            let total = total.max(self.migrated_records);
            self.total_records = Some(total);
            self.migrated_records = self.migrated_records.max(migrated.min(total));
        } else {
            self.migrated_records = self.migrated_records.max(migrated);
        }

        before != (self.total_records, self.migrated_records)
    }

    pub(crate) fn succeed(&mut self, total: Option<u64>, message: Option<String>) {
        let total = total
            .or(self.total_records)
            .unwrap_or(self.migrated_records)
            .max(self.migrated_records);
        self.total_records = Some(total);
        self.migrated_records = total;
        self.phase = MigrationPhase::Succeeded;
        self.message = message;
        self.finished_at = Some(Utc::now());
    }

    /// Counters keep their last known values; nothing is rolled back
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.phase = MigrationPhase::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }
}
