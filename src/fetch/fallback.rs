use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::config::{FallbackConfig, LayerSpec};
use crate::fetch::source::ImageSource;
use crate::foundation::core::format_api_timestamp;
use crate::foundation::error::FetchError;

/// Result of resolving one layer for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// Raw raster bytes as returned by the source.
    pub raster: Vec<u8>,
    /// Timestamp that actually produced the raster.
    pub timestamp: DateTime<Utc>,
    /// Offset applied to the canonical timestamp, in minutes (0 = exact hit).
    pub offset_minutes: i64,
    /// Number of offsets tried, including the successful one.
    pub attempts: usize,
}

impl FallbackOutcome {
    /// `true` when a non-zero offset produced the raster.
    pub fn used_fallback(&self) -> bool {
        self.offset_minutes != 0
    }
}

/// Aggregate counters for fallback-rate reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackStats {
    /// Successful resolutions.
    pub resolved: u64,
    /// Successful resolutions that needed a non-zero offset.
    pub fallbacks: u64,
    /// Resolutions where every offset failed.
    pub exhausted: u64,
}

impl FallbackStats {
    /// Fraction of successful resolutions that used a fallback offset.
    pub fn fallback_rate(&self) -> f64 {
        if self.resolved == 0 {
            0.0
        } else {
            self.fallbacks as f64 / self.resolved as f64
        }
    }
}

/// Walks a fixed offset sequence around a target timestamp until a source call succeeds.
///
/// Offsets are tried strictly in configured order and the first success wins.
/// [`FetchError::InvalidContent`] moves on to the next offset at once. Transient errors are
/// retried at the same offset up to `max_attempts` calls with a fixed delay, then the walk
/// moves on as well; a timestamp that keeps failing at the network level still gets every
/// other offset before [`FetchError::Exhausted`] is reported.
pub struct FallbackResolver<S> {
    source: S,
    offsets: Vec<i64>,
    max_attempts: u32,
    retry_delay: std::time::Duration,
    resolved: AtomicU64,
    fallbacks: AtomicU64,
    exhausted: AtomicU64,
}

impl<S: ImageSource> FallbackResolver<S> {
    /// Wrap `source` with the configured offset sequence.
    pub fn new(source: S, cfg: &FallbackConfig) -> Self {
        Self::with_offsets(source, cfg.offsets_minutes.clone())
    }

    /// Wrap `source` with an explicit offset sequence (minutes).
    ///
    /// Starts with one call per offset; see [`FallbackResolver::with_retry`].
    pub fn with_offsets(source: S, offsets: Vec<i64>) -> Self {
        Self {
            source,
            offsets,
            max_attempts: 1,
            retry_delay: std::time::Duration::ZERO,
            resolved: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Retry transient errors up to `max_attempts` calls per offset, sleeping `delay` between.
    pub fn with_retry(mut self, max_attempts: u32, delay: std::time::Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Offset sequence in minutes.
    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    /// Borrow the wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Snapshot of the aggregate counters.
    pub fn stats(&self) -> FallbackStats {
        FallbackStats {
            resolved: self.resolved.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Resolve `layer` at `target`, trying each offset in order.
    pub fn resolve(
        &self,
        target: DateTime<Utc>,
        layer: &LayerSpec,
    ) -> Result<FallbackOutcome, FetchError> {
        self.resolve_counted(target, layer).0
    }

    /// Like [`FallbackResolver::resolve`], also returning the most calls spent on one offset.
    pub(crate) fn resolve_counted(
        &self,
        target: DateTime<Utc>,
        layer: &LayerSpec,
    ) -> (Result<FallbackOutcome, FetchError>, u32) {
        let mut last: Option<FetchError> = None;
        let mut most_calls = 0;
        for (i, &offset) in self.offsets.iter().enumerate() {
            let ts = target + Duration::minutes(offset);
            let (res, calls) = self.fetch_at(ts, offset, layer);
            most_calls = most_calls.max(calls);
            match res {
                Ok(raster) => {
                    self.resolved.fetch_add(1, Ordering::Relaxed);
                    if offset != 0 {
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            layer = %layer.name,
                            target = %format_api_timestamp(target),
                            offset_minutes = offset,
                            "resolved with fallback offset"
                        );
                    }
                    let outcome = FallbackOutcome {
                        raster,
                        timestamp: ts,
                        offset_minutes: offset,
                        attempts: i + 1,
                    };
                    return (Ok(outcome), most_calls);
                }
                Err(err) => {
                    tracing::debug!(
                        layer = %layer.name,
                        at = %format_api_timestamp(ts),
                        offset_minutes = offset,
                        error = %err,
                        "no usable raster at offset"
                    );
                    last = Some(err);
                }
            }
        }

        self.exhausted.fetch_add(1, Ordering::Relaxed);
        let err = FetchError::Exhausted {
            attempts: self.offsets.len(),
            last: last.map_or_else(|| "no offsets configured".to_string(), |e| e.to_string()),
        };
        (Err(err), most_calls)
    }

    /// One offset: retry transient errors, give up at once on anything else.
    fn fetch_at(
        &self,
        ts: DateTime<Utc>,
        offset: i64,
        layer: &LayerSpec,
    ) -> (Result<Vec<u8>, FetchError>, u32) {
        let mut call = 0;
        loop {
            call += 1;
            match self.source.fetch(ts, layer) {
                Err(err) if err.is_transient() && call < self.max_attempts => {
                    tracing::warn!(
                        layer = %layer.name,
                        at = %format_api_timestamp(ts),
                        offset_minutes = offset,
                        attempt = call,
                        error = %err,
                        "transient fetch error; retrying"
                    );
                    std::thread::sleep(self.retry_delay);
                }
                res => return (res, call),
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/fetch/fallback.rs"]
mod tests;
