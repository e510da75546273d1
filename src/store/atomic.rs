use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::foundation::error::{LapseError, LapseResult};

/// Sibling temp path used while writing `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via a synced temp file and rename, so readers never observe a
/// partially written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> LapseResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            LapseError::persistence(format!("create directory '{}': {e}", parent.display()))
        })?;
    }
    let tmp = temp_path(path);
    let write = || -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        LapseError::persistence(format!("write '{}': {e}", path.display()))
    })
}

/// Serialize `value` as pretty JSON and write it atomically.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> LapseResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| LapseError::serde(format!("serialize '{}': {e}", path.display())))?;
    write_atomic(path, &bytes)
}

/// Read and parse a JSON file; `Ok(None)` when it does not exist.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> LapseResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LapseError::persistence(format!(
                "read '{}': {e}",
                path.display()
            )));
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| LapseError::serde(format!("parse '{}': {e}", path.display())))
}

#[cfg(test)]
#[path = "../../tests/unit/store/atomic.rs"]
mod tests;
