use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::NaiveDate;

use crate::config::EncodeSettings;
use crate::encode::sink::PartitionSink;
use crate::foundation::error::{LapseError, LapseResult};

/// Options for one partition encode.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeConfig {
    /// Output frames-per-second.
    pub fps: u32,
    /// libx264 constant rate factor (0-51, lower is better).
    pub crf: u8,
    /// libx264 preset name.
    pub preset: String,
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
}

impl EncodeConfig {
    /// Options writing to `out_path` with the configured quality settings.
    pub fn from_settings(settings: &EncodeSettings, out_path: impl Into<PathBuf>) -> Self {
        Self {
            fps: settings.fps,
            crf: settings.crf,
            preset: settings.preset.clone(),
            out_path: out_path.into(),
            overwrite: true,
        }
    }

    /// Reject values ffmpeg would refuse.
    pub fn validate(&self) -> LapseResult<()> {
        if self.fps == 0 {
            return Err(LapseError::validation("encode fps must be non-zero"));
        }
        if self.crf > 51 {
            return Err(LapseError::validation("encode crf must be within 0..=51"));
        }
        if self.preset.is_empty() || !self.preset.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LapseError::validation(format!(
                "encode preset '{}' is not a libx264 preset name",
                self.preset
            )));
        }
        Ok(())
    }
}

/// Check that `frames` all live directly in `dir`, sort strictly ascending by file name, and
/// are the only `.jpg` files there.
///
/// The encoder reads frames through a lexicographic glob, so a frame outside `dir` or out of
/// order would be silently dropped or misplaced in the video, and any other `.jpg` in `dir`
/// would be encoded too.
pub fn check_frame_order(dir: &Path, frames: &[PathBuf]) -> LapseResult<()> {
    if frames.is_empty() {
        return Err(LapseError::validation(format!(
            "no frames to encode in '{}'",
            dir.display()
        )));
    }
    let mut prev: Option<&std::ffi::OsStr> = None;
    for f in frames {
        if f.parent() != Some(dir) {
            return Err(LapseError::validation(format!(
                "frame '{}' is not inside '{}'",
                f.display(),
                dir.display()
            )));
        }
        if !f.is_file() {
            return Err(LapseError::validation(format!(
                "frame '{}' does not exist",
                f.display()
            )));
        }
        let name = f.file_name();
        if prev.is_some() && name <= prev {
            return Err(LapseError::validation(format!(
                "frame '{}' is out of chronological order",
                f.display()
            )));
        }
        prev = name;
    }

    let listed: std::collections::HashSet<&Path> = frames.iter().map(PathBuf::as_path).collect();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| LapseError::persistence(format!("list '{}': {e}", dir.display())))?;
    for dirent in entries {
        let path = dirent.map_err(|e| LapseError::persistence(e.to_string()))?.path();
        let is_jpg = path.extension().is_some_and(|ext| ext == "jpg");
        if is_jpg && !listed.contains(path.as_path()) {
            return Err(LapseError::validation(format!(
                "'{}' is not a trusted frame of this partition",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Build the ffmpeg argument list for encoding `dir/*.jpg` with `cfg`.
pub fn ffmpeg_args(dir: &Path, cfg: &EncodeConfig) -> Vec<OsString> {
    let mut pattern = dir.as_os_str().to_os_string();
    pattern.push("/*.jpg");

    let mut args: Vec<OsString> = vec![if cfg.overwrite { "-y" } else { "-n" }.into()];
    args.extend(
        [
            "-loglevel",
            "error",
            "-framerate",
            cfg.fps.to_string().as_str(),
            "-pattern_type",
            "glob",
            "-i",
        ]
        .map(OsString::from),
    );
    args.push(pattern);
    args.extend(
        [
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            cfg.preset.as_str(),
            "-crf",
            cfg.crf.to_string().as_str(),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]
        .map(OsString::from),
    );
    args.push(cfg.out_path.clone().into_os_string());
    args
}

/// Run the system `ffmpeg` over one partition directory.
///
/// `frames` is the expected content of `dir`, in order; it is checked before the process is
/// spawned.
pub fn encode_partition(dir: &Path, frames: &[PathBuf], cfg: &EncodeConfig) -> LapseResult<()> {
    cfg.validate()?;
    check_frame_order(dir, frames)?;
    ensure_parent_dir(&cfg.out_path)?;

    if !cfg.overwrite && cfg.out_path.exists() {
        return Err(LapseError::validation(format!(
            "output file '{}' already exists",
            cfg.out_path.display()
        )));
    }
    if !is_ffmpeg_on_path() {
        return Err(LapseError::encoder(
            "ffmpeg is required for MP4 encoding, but was not found on PATH",
        ));
    }

    let output = Command::new("ffmpeg")
        .args(ffmpeg_args(dir, cfg))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            LapseError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LapseError::encoder(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    tracing::info!(
        dir = %dir.display(),
        out = %cfg.out_path.display(),
        frames = frames.len(),
        "encoded partition"
    );
    Ok(())
}

/// Partition sink that encodes every completed partition to `out_dir/YYYY-MM-DD.mp4`.
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    settings: EncodeSettings,
}

impl FfmpegEncoder {
    /// Create an encoder from the `encode` config section.
    pub fn new(settings: EncodeSettings) -> Self {
        Self { settings }
    }

    /// Output path for one partition.
    pub fn out_path(&self, date: NaiveDate) -> PathBuf {
        self.settings
            .out_dir
            .join(format!("{}.mp4", date.format("%Y-%m-%d")))
    }
}

impl PartitionSink for FfmpegEncoder {
    fn partition_complete(
        &mut self,
        date: NaiveDate,
        dir: &Path,
        frames: &[PathBuf],
    ) -> LapseResult<()> {
        if frames.is_empty() {
            tracing::warn!(%date, "partition has no successful frames; skipping encode");
            return Ok(());
        }
        let cfg = EncodeConfig::from_settings(&self.settings, self.out_path(date));
        encode_partition(dir, frames, &cfg)
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> LapseResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
