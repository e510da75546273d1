use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::foundation::core::FrameKey;
use crate::foundation::error::LapseResult;
use crate::store::atomic::{read_json, write_json_atomic};

/// Lifecycle of a scheduler run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, no batch processed yet.
    Pending,
    /// At least one batch processed; resumable.
    Running,
    /// Every key of the range has a terminal manifest entry.
    Completed,
    /// Halted by a run-level error.
    Error,
}

/// Process-wide state of one run, checkpointed after every batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// First date of the requested range.
    pub start_date: NaiveDate,
    /// Last date of the requested range (inclusive).
    pub end_date: NaiveDate,
    /// When the (possibly resumed) run first started.
    pub started_at: DateTime<Utc>,
    /// Last checkpoint time.
    pub updated_at: DateTime<Utc>,
    /// Run status.
    pub status: RunStatus,
    /// Date partitions whose keys are all terminal, in date order.
    pub completed_partitions: Vec<NaiveDate>,
    /// Last key of the most recent checkpointed batch.
    pub last_completed: Option<FrameKey>,
    /// Keys in the range.
    pub total_frames: u64,
    /// Keys with a `success` entry.
    pub completed_frames: u64,
    /// Keys with a `failed` entry.
    pub failed_frames: u64,
    /// Successful keys where either layer used a fallback offset.
    pub fallback_frames: u64,
    /// Keys flagged as adjacent duplicates.
    pub duplicate_frames: u64,
    /// Keys skipped this invocation because they were already successful.
    #[serde(default)]
    pub skipped_frames: u64,
    /// Run-level error message when `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressRecord {
    /// Fresh record for `[start, end]`.
    pub fn new(start: NaiveDate, end: NaiveDate, total_frames: u64, now: DateTime<Utc>) -> Self {
        Self {
            start_date: start,
            end_date: end,
            started_at: now,
            updated_at: now,
            status: RunStatus::Pending,
            completed_partitions: Vec::new(),
            last_completed: None,
            total_frames,
            completed_frames: 0,
            failed_frames: 0,
            fallback_frames: 0,
            duplicate_frames: 0,
            skipped_frames: 0,
            error: None,
        }
    }

    /// Load the record at `path`, if any.
    pub fn load(path: &Path) -> LapseResult<Option<Self>> {
        read_json(path)
    }

    /// Atomically write the record to `path`.
    pub fn persist(&self, path: &Path) -> LapseResult<()> {
        write_json_atomic(path, self)
    }

    /// `true` when this record covers a prefix of `[start, end]` and can be resumed.
    pub fn resumes(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date == start && self.end_date <= end
    }

    /// Successful frames that used a fallback, as a fraction of successful frames.
    pub fn fallback_rate(&self) -> f64 {
        if self.completed_frames == 0 {
            0.0
        } else {
            self.fallback_frames as f64 / self.completed_frames as f64
        }
    }

    /// Keys with a terminal outcome.
    pub fn terminal_frames(&self) -> u64 {
        self.completed_frames + self.failed_frames
    }
}

#[cfg(test)]
#[path = "../../tests/unit/store/progress.rs"]
mod tests;
