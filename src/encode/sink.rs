use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::foundation::error::LapseResult;

/// A date partition whose keys all reached a terminal manifest status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedPartition {
    /// Partition date.
    pub date: NaiveDate,
    /// Partition directory.
    pub dir: PathBuf,
    /// Successful frame files in chronological order.
    pub frames: Vec<PathBuf>,
}

/// Consumer of completed date partitions.
///
/// Ordering contract: `frames` is sorted by slot and every file exists with a `success`
/// manifest entry at call time. Partitions are surfaced in date order, at most once per run.
pub trait PartitionSink: Send {
    /// Called once every key of `date` is `success` or `failed`.
    fn partition_complete(
        &mut self,
        date: NaiveDate,
        dir: &Path,
        frames: &[PathBuf],
    ) -> LapseResult<()>;
}

/// Sink that ignores every partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl PartitionSink for NullSink {
    fn partition_complete(&mut self, _: NaiveDate, _: &Path, _: &[PathBuf]) -> LapseResult<()> {
        Ok(())
    }
}

/// In-memory sink for tests and debugging.
///
/// Clones share the same buffer, so a clone can be handed to the scheduler and inspected later.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    partitions: Arc<Mutex<Vec<CompletedPartition>>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the partitions received so far, in arrival order.
    pub fn partitions(&self) -> Vec<CompletedPartition> {
        match self.partitions.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Dates received so far, in arrival order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.partitions().into_iter().map(|p| p.date).collect()
    }
}

impl PartitionSink for CollectingSink {
    fn partition_complete(
        &mut self,
        date: NaiveDate,
        dir: &Path,
        frames: &[PathBuf],
    ) -> LapseResult<()> {
        let part = CompletedPartition {
            date,
            dir: dir.to_path_buf(),
            frames: frames.to_vec(),
        };
        match self.partitions.lock() {
            Ok(mut guard) => guard.push(part),
            Err(poisoned) => poisoned.into_inner().push(part),
        }
        Ok(())
    }
}
