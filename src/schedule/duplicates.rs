use chrono::{DateTime, Utc};
use sha2::{Digest as _, Sha256};

use crate::fetch::fallback::FallbackOutcome;
use crate::foundation::core::FrameKey;

/// What a layer of a finished frame was actually built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LayerTrace {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) digest: [u8; 32],
    pub(crate) used_fallback: bool,
}

impl LayerTrace {
    pub(crate) fn of(outcome: &FallbackOutcome) -> Self {
        Self {
            timestamp: outcome.timestamp,
            digest: Sha256::digest(&outcome.raster).into(),
            used_fallback: outcome.used_fallback(),
        }
    }

    fn duplicates(&self, prev: &LayerTrace) -> bool {
        (self.used_fallback || prev.used_fallback)
            && (self.timestamp == prev.timestamp || self.digest == prev.digest)
    }
}

/// Flags adjacent frames that resolved to the same upstream raster after a fallback.
///
/// Frames are observed in key order with their position in the requested range; two frames are
/// adjacent when their positions differ by one. A failed frame is simply not observed, which
/// breaks adjacency.
#[derive(Debug, Default)]
pub(crate) struct DuplicateTracker {
    prev: Option<(usize, FrameKey, [LayerTrace; 2])>,
}

impl DuplicateTracker {
    /// Record a successful frame; returns the earlier key it duplicates, if any.
    pub(crate) fn observe(
        &mut self,
        pos: usize,
        key: FrameKey,
        layers: [LayerTrace; 2],
    ) -> Option<FrameKey> {
        let dup = match &self.prev {
            Some((prev_pos, prev_key, prev_layers)) if prev_pos + 1 == pos => layers
                .iter()
                .zip(prev_layers)
                .any(|(cur, prev)| cur.duplicates(prev))
                .then_some(*prev_key),
            _ => None,
        };
        self.prev = Some((pos, key, layers));
        dup
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/duplicates.rs"]
mod tests;
