//! Encoder collaborator boundary.
//!
//! The scheduler hands each completed date partition to a [`sink::PartitionSink`]; the
//! production sink shells out to the system `ffmpeg`.

/// `ffmpeg`-based partition encoding (MP4 output via system `ffmpeg`).
pub(crate) mod ffmpeg;
/// Partition sink trait and built-in sinks.
pub(crate) mod sink;
