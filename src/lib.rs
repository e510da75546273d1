//! Resumable solar time-lapse frame pipeline.
//!
//! For every slot of a UTC day grid the pipeline fetches two remote layers (a solar disk and a
//! coronagraph image), walks a time-offset fallback sequence when the exact timestamp has no
//! data, composites the disk over the corona with a feathered screen blend, and stores the
//! result as a date-partitioned JPEG frame. A manifest records every frame's outcome and a
//! progress record checkpoints each batch, so an interrupted run resumes without refetching.
//!
//! - Build one [`PipelineConfig`]
//! - Create a [`BatchScheduler`] over an [`ImageSource`] (normally [`HttpImageSource`])
//! - `run` a date range; completed partitions go to a [`PartitionSink`] such as
//!   [`FfmpegEncoder`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod composite;
mod config;
mod encode;
mod fetch;
mod foundation;
mod logging;
mod schedule;
mod store;

pub use composite::compositor::{Compositor, encode_jpeg};
pub use composite::feather::{FeatherMask, edge_alpha};
pub use composite::measure;
pub use config::{
    CompositeConfig, CropRect, EncodeSettings, FallbackConfig, GradeSpec, GridConfig, LayerSpec,
    PipelineConfig, SchedulerConfig, SourceConfig, StoreConfig,
};
pub use encode::ffmpeg::{
    EncodeConfig, FfmpegEncoder, check_frame_order, encode_partition, ensure_parent_dir,
    ffmpeg_args, is_ffmpeg_on_path,
};
pub use encode::sink::{CollectingSink, CompletedPartition, NullSink, PartitionSink};
pub use fetch::fallback::{FallbackOutcome, FallbackResolver, FallbackStats};
pub use fetch::source::{
    HttpImageSource, ImageSource, RasterFormat, screenshot_params, sniff_raster_format,
    validate_raster,
};
pub use foundation::core::{
    FrameKey, MINUTES_PER_DAY, SLOT_DIGITS, SlotGrid, dates_inclusive, format_api_timestamp,
    parse_api_timestamp, strip_fractional_seconds,
};
pub use foundation::error::{CompositeError, FetchError, LapseError, LapseResult};
pub use logging::{DEFAULT_FILTER, filter_directives, init_logging};
pub use schedule::cancel::CancelToken;
pub use schedule::scheduler::{BatchScheduler, CompositeResult};
pub use store::frame_store::{AuditReport, FrameStore};
pub use store::manifest::{FrameStatus, Manifest, ManifestEntry, ManifestSummary};
pub use store::progress::{ProgressRecord, RunStatus};
