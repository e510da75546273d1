use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::foundation::core::{FrameKey, SLOT_DIGITS};
use crate::foundation::error::{LapseError, LapseResult};
use crate::store::atomic::write_atomic;
use crate::store::manifest::{FrameStatus, Manifest, ManifestEntry};

const MANIFEST_FILE: &str = "manifest.json";
const PROGRESS_FILE: &str = "progress.json";
const FRAME_EXT: &str = "jpg";

/// Consistency report between the manifest and the files on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Frame files with no `success` manifest entry (untrusted, e.g. interrupted writes).
    pub orphan_files: Vec<PathBuf>,
    /// `success` entries whose frame file is gone.
    pub missing_files: Vec<FrameKey>,
}

impl AuditReport {
    /// `true` when manifest and disk agree.
    pub fn is_clean(&self) -> bool {
        self.orphan_files.is_empty() && self.missing_files.is_empty()
    }
}

/// Date-partitioned frame files plus the manifest that vouches for them.
///
/// Layout under `root`:
///
/// ```text
/// manifest.json
/// progress.json
/// 2024-03-01/0000.jpg
/// 2024-03-01/0001.jpg
/// ...
/// ```
///
/// A file on disk counts as produced only when the manifest holds a `success` entry for its
/// key. Manifest updates are in memory until [`FrameStore::flush`].
#[derive(Debug)]
pub struct FrameStore {
    root: PathBuf,
    manifest: Manifest,
}

impl FrameStore {
    /// Open (or create) a store rooted at `root`, loading its manifest.
    pub fn open(root: impl Into<PathBuf>) -> LapseResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            LapseError::persistence(format!("create store root '{}': {e}", root.display()))
        })?;
        let manifest = Manifest::load(&root.join(MANIFEST_FILE))?;
        tracing::debug!(
            root = %root.display(),
            entries = manifest.len(),
            "opened frame store"
        );
        Ok(Self { root, manifest })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Path of the progress file.
    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    /// Frame file path relative to the root, e.g. `2024-03-01/0042.jpg`.
    pub fn relative_path(key: &FrameKey) -> PathBuf {
        PathBuf::from(key.partition()).join(format!(
            "{:0width$}.{FRAME_EXT}",
            key.slot,
            width = SLOT_DIGITS
        ))
    }

    /// Absolute frame file path for `key`.
    pub fn frame_path(&self, key: &FrameKey) -> PathBuf {
        self.root.join(Self::relative_path(key))
    }

    /// Directory holding one date partition.
    pub fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    /// `true` when `key` has a `success` entry and its file exists.
    pub fn has(&self, key: &FrameKey) -> bool {
        self.manifest.is_success(key) && self.frame_path(key).is_file()
    }

    /// Atomically write the encoded frame for `key`; returns the absolute path.
    ///
    /// Does not touch the manifest; record the outcome with [`FrameStore::mark_outcome`].
    pub fn save(&self, key: &FrameKey, bytes: &[u8]) -> LapseResult<PathBuf> {
        let path = self.frame_path(key);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Record `entry` in the in-memory manifest.
    ///
    /// A `failed` outcome also deletes any frame file left at the key's path, so the partition
    /// directory never holds a frame the manifest does not vouch for.
    pub fn mark_outcome(&mut self, entry: ManifestEntry) -> LapseResult<()> {
        if entry.status == FrameStatus::Failed {
            self.discard(&entry.key)?;
        }
        self.manifest.upsert(entry);
        Ok(())
    }

    /// Delete the frame file for `key` if there is one; returns whether a file was removed.
    pub fn discard(&self, key: &FrameKey) -> LapseResult<bool> {
        let path = self.frame_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(%key, path = %path.display(), "removed untrusted frame file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LapseError::persistence(format!(
                "remove '{}': {e}",
                path.display()
            ))),
        }
    }

    /// Manifest entry for `key`.
    pub fn entry(&self, key: &FrameKey) -> Option<&ManifestEntry> {
        self.manifest.get(key)
    }

    /// Persist the manifest atomically.
    pub fn flush(&self) -> LapseResult<()> {
        self.manifest.persist(&self.manifest_path())
    }

    /// Borrow the manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Mutably borrow the manifest.
    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    /// Absolute paths of the `success` frames of one partition, in slot order.
    pub fn partition_frames(&self, date: NaiveDate) -> Vec<PathBuf> {
        self.manifest
            .partition(date)
            .filter(|e| e.status == FrameStatus::Success)
            .map(|e| self.frame_path(&e.key))
            .collect()
    }

    /// Drop `failed` manifest entries and persist; returns how many were removed.
    pub fn remove_failed(&mut self) -> LapseResult<usize> {
        let removed = self.manifest.remove_failed();
        if removed > 0 {
            self.flush()?;
        }
        tracing::info!(removed, "removed failed manifest entries");
        Ok(removed)
    }

    /// Compare the manifest against the frame files on disk.
    pub fn audit(&self) -> LapseResult<AuditReport> {
        let mut report = AuditReport::default();

        for entry in self.manifest.iter() {
            if entry.status == FrameStatus::Success && !self.frame_path(&entry.key).is_file() {
                report.missing_files.push(entry.key);
            }
        }

        let read_dir = |dir: &Path| {
            fs::read_dir(dir)
                .map_err(|e| LapseError::persistence(format!("list '{}': {e}", dir.display())))
        };
        let mut partitions: Vec<PathBuf> = Vec::new();
        for dirent in read_dir(&self.root)? {
            let dirent = dirent.map_err(|e| LapseError::persistence(e.to_string()))?;
            let path = dirent.path();
            if path.is_dir() && parse_partition(&path).is_some() {
                partitions.push(path);
            }
        }
        partitions.sort();

        for dir in partitions {
            let Some(date) = parse_partition(&dir) else {
                continue;
            };
            let mut files: Vec<PathBuf> = Vec::new();
            for dirent in read_dir(&dir)? {
                let dirent = dirent.map_err(|e| LapseError::persistence(e.to_string()))?;
                files.push(dirent.path());
            }
            files.sort();
            for file in files {
                let trusted = frame_slot(&file)
                    .is_some_and(|slot| self.manifest.is_success(&FrameKey::new(date, slot)));
                if !trusted {
                    report.orphan_files.push(file);
                }
            }
        }
        Ok(report)
    }
}

fn parse_partition(dir: &Path) -> Option<NaiveDate> {
    let name = dir.file_name()?.to_str()?;
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

fn frame_slot(file: &Path) -> Option<u32> {
    if file.extension()?.to_str()? != FRAME_EXT {
        return None;
    }
    let stem = file.file_stem()?.to_str()?;
    if stem.len() != SLOT_DIGITS {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
#[path = "../../tests/unit/store/frame_store.rs"]
mod tests;
