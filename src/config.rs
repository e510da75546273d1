//! Pipeline configuration.
//!
//! A single [`PipelineConfig`] is built at process start (defaults, optionally overlaid by a JSON
//! file) and passed by reference to every component. Nothing reads ambient global state, so a
//! test configuration and a production configuration can live in the same process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::SlotGrid;
use crate::foundation::error::{LapseError, LapseResult};

/// Root configuration object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Time grid.
    pub grid: GridConfig,
    /// Remote screenshot endpoint and the two layers fetched per frame.
    pub source: SourceConfig,
    /// Time-offset fallback sequence.
    pub fallback: FallbackConfig,
    /// Grading, feathering and crop geometry.
    pub composite: CompositeConfig,
    /// Batching, concurrency and retry policy.
    pub scheduler: SchedulerConfig,
    /// On-disk frame archive.
    pub store: StoreConfig,
    /// External encoder hand-off.
    pub encode: EncodeSettings,
}

/// Time grid settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Minutes between slots; must divide 1440.
    pub slot_minutes: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { slot_minutes: 15 }
    }
}

/// One remote image layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    /// Short name used in logs, errors and manifest fields.
    pub name: String,
    /// Layer/visibility selector understood by the endpoint.
    pub selector: String,
    /// Angular image scale (arcseconds per pixel).
    pub scale: f64,
    /// Requested pixel width.
    pub width: u32,
    /// Requested pixel height.
    pub height: u32,
    /// Crop origin x, in arcseconds from disk centre.
    pub x0: f64,
    /// Crop origin y, in arcseconds from disk centre.
    pub y0: f64,
}

/// Remote source settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Screenshot endpoint URL.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound on accepted response size in bytes.
    pub max_response_bytes: u64,
    /// Narrow-field solar disk layer.
    pub disk: LayerSpec,
    /// Wide-field coronagraph layer.
    pub corona: LayerSpec,
}

impl SourceConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.helioviewer.org/v2/takeScreenshot/".to_string(),
            timeout_secs: 30,
            max_response_bytes: 32 * 1024 * 1024,
            disk: LayerSpec {
                name: "disk".to_string(),
                selector: "[SDO,AIA,AIA,171,1,100]".to_string(),
                scale: 2.42044,
                width: 1920,
                height: 1920,
                x0: 0.0,
                y0: 0.0,
            },
            corona: LayerSpec {
                name: "corona".to_string(),
                selector: "[SOHO,LASCO,C2,white-light,1,100]".to_string(),
                scale: 8.0,
                width: 1920,
                height: 1440,
                x0: 0.0,
                y0: 0.0,
            },
        }
    }
}

/// Fallback offset sequence, in minutes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// Offsets tried in order; must start with 0 and contain no duplicates.
    pub offsets_minutes: Vec<i64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            offsets_minutes: vec![0, 1, -1, 3, -3, 5, -5, 7, -7],
        }
    }
}

/// Per-layer color grade. All transforms are per-pixel with fixed coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeSpec {
    /// Chroma retained after desaturation (0 = grayscale, 1 = unchanged).
    pub saturation: f32,
    /// Per-channel RGB multipliers applied after desaturation.
    pub tint: [f32; 3],
    /// Contrast around mid-gray (1 = unchanged).
    pub contrast: f32,
    /// Gamma exponent applied last (1 = unchanged, < 1 brightens).
    pub gamma: f32,
}

impl GradeSpec {
    /// The identity grade.
    pub const IDENTITY: GradeSpec = GradeSpec {
        saturation: 1.0,
        tint: [1.0, 1.0, 1.0],
        contrast: 1.0,
        gamma: 1.0,
    };
}

/// Output crop rectangle on the composite canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CropRect {
    /// Left offset in pixels.
    pub x: u32,
    /// Top offset in pixels.
    pub y: u32,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
}

/// Compositor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositeConfig {
    /// Grade applied to the corona layer (cool, desaturated).
    pub corona_grade: GradeSpec,
    /// Grade applied to the disk layer (warm, contrasty).
    pub disk_grade: GradeSpec,
    /// Side of the square the disk raster is resized to.
    pub disk_size: u32,
    /// Radius (pixels, in resized disk space) that stays fully opaque.
    pub composite_radius: f32,
    /// Width of the transition band beyond `composite_radius`; 0 gives a hard edge.
    pub feather_radius: f32,
    /// Final crop of the canvas.
    pub crop: CropRect,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            corona_grade: GradeSpec {
                saturation: 0.35,
                tint: [0.92, 0.98, 1.08],
                contrast: 1.0,
                gamma: 1.0,
            },
            disk_grade: GradeSpec {
                saturation: 1.0,
                tint: [1.08, 0.96, 0.82],
                contrast: 1.12,
                gamma: 0.9,
            },
            disk_size: 1435,
            composite_radius: 400.0,
            feather_radius: 40.0,
            crop: CropRect {
                x: 230,
                y: 117,
                width: 1460,
                height: 1200,
            },
        }
    }
}

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Frames per checkpointed batch.
    pub batch_size: usize,
    /// Worker threads for network fetches.
    pub fetch_concurrency: usize,
    /// Worker threads for compositing.
    pub composite_concurrency: usize,
    /// Calls per fallback offset for transient transport errors (1 = no retry).
    pub max_attempts: u32,
    /// Fixed delay between calls at the same offset, in milliseconds.
    pub retry_delay_ms: u64,
    /// Ceiling for one batch; `None` derives it from timeout, offsets and attempts.
    pub batch_timeout_secs: Option<u64>,
}

impl SchedulerConfig {
    /// Delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            fetch_concurrency: 8,
            composite_concurrency: 2,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            batch_timeout_secs: None,
        }
    }
}

/// Frame archive settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory holding date partitions, the manifest and the progress file.
    pub root: PathBuf,
    /// JPEG quality for frame files (1..=100).
    pub jpeg_quality: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("frames"),
            jpeg_quality: 92,
        }
    }
}

/// Encoder hand-off settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodeSettings {
    /// Output frame rate.
    pub fps: u32,
    /// x264 constant rate factor.
    pub crf: u8,
    /// x264 preset name.
    pub preset: String,
    /// Directory receiving one video per date partition.
    pub out_dir: PathBuf,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            fps: 24,
            crf: 18,
            preset: "slow".to_string(),
            out_dir: PathBuf::from("videos"),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> LapseResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .map_err(|e| LapseError::serde(format!("parse config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Time grid described by this config.
    pub fn slot_grid(&self) -> LapseResult<SlotGrid> {
        SlotGrid::new(self.grid.slot_minutes)
    }

    /// Canvas size: the larger of the corona raster and the resized disk, per axis.
    pub fn canvas_size(&self) -> (u32, u32) {
        let c = &self.source.corona;
        let d = self.composite.disk_size;
        (c.width.max(d), c.height.max(d))
    }

    /// Effective batch ceiling.
    ///
    /// Derived as the worst case for one layer (every offset spends all its attempts and the
    /// delays between them), doubled for the two layers fetched per frame.
    pub fn batch_timeout(&self) -> Duration {
        if let Some(secs) = self.scheduler.batch_timeout_secs {
            return Duration::from_secs(secs);
        }
        let offsets = self.fallback.offsets_minutes.len().max(1) as u32;
        let attempts = self.scheduler.max_attempts.max(1);
        let per_offset =
            self.source.timeout() * attempts + self.scheduler.retry_delay() * (attempts - 1);
        per_offset * offsets * 2
    }

    /// Reject inconsistent settings before any work starts.
    pub fn validate(&self) -> LapseResult<()> {
        self.slot_grid()?;

        let offsets = &self.fallback.offsets_minutes;
        if offsets.first() != Some(&0) {
            return Err(LapseError::validation(
                "fallback offsets must be non-empty and start with 0",
            ));
        }
        let mut seen = offsets.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != offsets.len() {
            return Err(LapseError::validation("fallback offsets must not repeat"));
        }

        for layer in [&self.source.disk, &self.source.corona] {
            if layer.width == 0 || layer.height == 0 {
                return Err(LapseError::validation(format!(
                    "layer '{}' width/height must be non-zero",
                    layer.name
                )));
            }
            if !layer.scale.is_finite() || layer.scale <= 0.0 {
                return Err(LapseError::validation(format!(
                    "layer '{}' scale must be > 0",
                    layer.name
                )));
            }
        }
        if self.source.timeout_secs == 0 {
            return Err(LapseError::validation("source timeout must be > 0"));
        }

        let comp = &self.composite;
        if comp.disk_size == 0 {
            return Err(LapseError::validation("disk_size must be non-zero"));
        }
        if !comp.composite_radius.is_finite() || comp.composite_radius < 0.0 {
            return Err(LapseError::validation("composite_radius must be >= 0"));
        }
        if !comp.feather_radius.is_finite() || comp.feather_radius < 0.0 {
            return Err(LapseError::validation("feather_radius must be >= 0"));
        }
        for grade in [&comp.corona_grade, &comp.disk_grade] {
            if !grade.gamma.is_finite() || grade.gamma <= 0.0 {
                return Err(LapseError::validation("grade gamma must be > 0"));
            }
        }
        let (cw, ch) = self.canvas_size();
        let crop = comp.crop;
        if crop.width == 0
            || crop.height == 0
            || u64::from(crop.x) + u64::from(crop.width) > u64::from(cw)
            || u64::from(crop.y) + u64::from(crop.height) > u64::from(ch)
        {
            return Err(LapseError::validation(format!(
                "crop {}x{}+{}+{} does not fit the {cw}x{ch} canvas",
                crop.width, crop.height, crop.x, crop.y
            )));
        }

        let s = &self.scheduler;
        if s.batch_size == 0 || s.fetch_concurrency == 0 || s.composite_concurrency == 0 {
            return Err(LapseError::validation(
                "batch size and concurrency bounds must be non-zero",
            ));
        }
        if s.max_attempts == 0 {
            return Err(LapseError::validation("max_attempts must be >= 1"));
        }

        if !(1..=100).contains(&self.store.jpeg_quality) {
            return Err(LapseError::validation("jpeg_quality must be in 1..=100"));
        }
        if self.encode.fps == 0 {
            return Err(LapseError::validation("encode fps must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
