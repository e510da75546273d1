//! Durable state: frame files, the manifest and the progress record.

pub(crate) mod atomic;
/// Date-partitioned frame files and manifest ownership.
pub(crate) mod frame_store;
/// Per-frame outcome records.
pub(crate) mod manifest;
/// Run checkpoint record.
pub(crate) mod progress;
