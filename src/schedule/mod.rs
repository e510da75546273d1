//! Batch scheduling: resumable, checkpointed production of a date range.

/// Cooperative cancellation.
pub(crate) mod cancel;
pub(crate) mod duplicates;
/// The batch scheduler.
pub(crate) mod scheduler;
