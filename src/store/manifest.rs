use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::foundation::core::FrameKey;
use crate::foundation::error::{LapseError, LapseResult};
use crate::store::atomic::{read_json, write_json_atomic};

const MANIFEST_VERSION: u32 = 1;

/// Production outcome of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    /// Scheduled, not yet finished.
    Pending,
    /// Frame file written and trusted.
    Success,
    /// Fetch or composite failed; eligible for retry on a later run.
    Failed,
}

/// Manifest record for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Frame key.
    pub key: FrameKey,
    /// Current status.
    pub status: FrameStatus,
    /// Frame file path relative to the store root (success only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Offset (minutes) that produced the disk layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_offset_minutes: Option<i64>,
    /// Offset (minutes) that produced the corona layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corona_offset_minutes: Option<i64>,
    /// Earlier adjacent frame this one duplicates after a fallback, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<FrameKey>,
    /// Encoded frame size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u64>,
    /// Failure description (failed only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fetch attempts used in the last attempt cycle.
    #[serde(default)]
    pub attempts: u32,
    /// Time of the last attempt.
    pub last_attempt: DateTime<Utc>,
}

impl ManifestEntry {
    /// Fresh `pending` entry.
    pub fn pending(key: FrameKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: FrameStatus::Pending,
            path: None,
            disk_offset_minutes: None,
            corona_offset_minutes: None,
            duplicate_of: None,
            byte_size: None,
            error: None,
            attempts: 0,
            last_attempt: now,
        }
    }

    /// `failed` entry carrying `error`.
    pub fn failed(
        key: FrameKey,
        error: impl Into<String>,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: FrameStatus::Failed,
            error: Some(error.into()),
            attempts,
            ..Self::pending(key, now)
        }
    }

    /// `true` when either layer needed a non-zero offset.
    pub fn used_fallback(&self) -> bool {
        self.disk_offset_minutes.is_some_and(|o| o != 0)
            || self.corona_offset_minutes.is_some_and(|o| o != 0)
    }

    /// `true` for `success` and `failed`.
    pub fn is_terminal(&self) -> bool {
        self.status != FrameStatus::Pending
    }
}

/// Per-status entry counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    /// Entries still pending.
    pub pending: usize,
    /// Successful entries.
    pub success: usize,
    /// Failed entries.
    pub failed: usize,
    /// Successful entries that used a fallback offset.
    pub fallback: usize,
    /// Entries flagged as adjacent duplicates.
    pub duplicates: usize,
}

impl ManifestSummary {
    /// All entries.
    pub fn total(&self) -> usize {
        self.pending + self.success + self.failed
    }
}

#[derive(Deserialize)]
struct ManifestFile {
    version: u32,
    entries: BTreeMap<FrameKey, ManifestEntry>,
}

#[derive(Serialize)]
struct ManifestFileRef<'a> {
    version: u32,
    entries: &'a BTreeMap<FrameKey, ManifestEntry>,
}

/// Keyed record store of per-frame outcomes.
///
/// Point reads and updates happen in memory; [`Manifest::persist`] rewrites the file atomically,
/// which the scheduler does once per batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<FrameKey, ManifestEntry>,
}

impl Manifest {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file is an empty manifest.
    pub fn load(path: &Path) -> LapseResult<Self> {
        let Some(file) = read_json::<ManifestFile>(path)? else {
            return Ok(Self::new());
        };
        if file.version != MANIFEST_VERSION {
            return Err(LapseError::serde(format!(
                "manifest '{}' has unsupported version {}",
                path.display(),
                file.version
            )));
        }
        for (key, entry) in &file.entries {
            if *key != entry.key {
                return Err(LapseError::serde(format!(
                    "manifest entry {key} carries mismatched key {}",
                    entry.key
                )));
            }
        }
        Ok(Self {
            entries: file.entries,
        })
    }

    /// Atomically write the whole manifest to `path`.
    pub fn persist(&self, path: &Path) -> LapseResult<()> {
        write_json_atomic(
            path,
            &ManifestFileRef {
                version: MANIFEST_VERSION,
                entries: &self.entries,
            },
        )
    }

    /// Entry for `key`.
    pub fn get(&self, key: &FrameKey) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    /// `true` when `key` has a `success` entry.
    pub fn is_success(&self, key: &FrameKey) -> bool {
        self.get(key).is_some_and(|e| e.status == FrameStatus::Success)
    }

    /// Insert or replace the entry for `entry.key`.
    pub fn upsert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(entry.key, entry)
    }

    /// Remove the entry for `key`.
    pub fn remove(&mut self, key: &FrameKey) -> Option<ManifestEntry> {
        self.entries.remove(key)
    }

    /// Drop every `failed` entry; returns how many were removed.
    pub fn remove_failed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.status != FrameStatus::Failed);
        before - self.entries.len()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Entries of one date partition, in slot order.
    pub fn partition(&self, date: NaiveDate) -> impl Iterator<Item = &ManifestEntry> {
        let lo = FrameKey::new(date, 0);
        let hi = FrameKey::new(date, u32::MAX);
        self.entries.range(lo..=hi).map(|(_, e)| e)
    }

    /// Per-status counts over all entries.
    pub fn summary(&self) -> ManifestSummary {
        summarize(self.entries.values())
    }

    /// Per-status counts over the given keys; keys without an entry are not counted.
    pub fn summary_for<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a FrameKey>,
    ) -> ManifestSummary {
        summarize(keys.into_iter().filter_map(|k| self.entries.get(k)))
    }
}

fn summarize<'a>(entries: impl Iterator<Item = &'a ManifestEntry>) -> ManifestSummary {
    let mut s = ManifestSummary::default();
    for e in entries {
        match e.status {
            FrameStatus::Pending => s.pending += 1,
            FrameStatus::Success => {
                s.success += 1;
                if e.used_fallback() {
                    s.fallback += 1;
                }
            }
            FrameStatus::Failed => s.failed += 1,
        }
        if e.duplicate_of.is_some() {
            s.duplicates += 1;
        }
    }
    s
}

#[cfg(test)]
#[path = "../../tests/unit/store/manifest.rs"]
mod tests;
