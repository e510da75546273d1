/// Convenience result type used across the pipeline.
pub type LapseResult<T> = Result<T, LapseError>;

/// Failure of a single raster fetch.
///
/// The variant decides retry policy: [`FetchError::is_transient`] errors are retried at the same
/// fallback offset, everything else moves on to the next offset.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the per-call timeout.
    #[error("fetch timed out after {secs}s")]
    Timeout {
        /// Timeout that was exceeded, in seconds.
        secs: u64,
    },

    /// Network or server-side failure that may succeed on a later attempt.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered, but not with a usable PNG/JPEG raster.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// Every offset in the fallback sequence failed.
    #[error("fallback exhausted after {attempts} offsets (last: {last})")]
    Exhausted {
        /// Number of offsets tried.
        attempts: usize,
        /// Description of the last offset's failure.
        last: String,
    },
}

impl FetchError {
    /// Build a [`FetchError::Transport`] value.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Build a [`FetchError::InvalidContent`] value.
    pub fn invalid_content(msg: impl Into<String>) -> Self {
        Self::InvalidContent(msg.into())
    }

    /// `true` for network-level failures worth retrying with the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}

/// Failure while decoding, blending or encoding a frame.
///
/// Composite errors are final for the frame: re-running on identical bytes fails identically.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    /// Source raster could not be decoded.
    #[error("decode error ({layer}): {msg}")]
    Decode {
        /// Which input layer failed (`disk` or `corona`).
        layer: &'static str,
        /// Decoder message.
        msg: String,
    },

    /// Raster or configured geometry is inconsistent (e.g. crop outside canvas).
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Output frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum LapseError {
    /// Invalid configuration or caller-provided data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Frame-level fetch failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Frame-level composite failure.
    #[error(transparent)]
    Composite(#[from] CompositeError),

    /// Frame files, manifest or progress could not be durably written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The external encoder could not be run or reported failure.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// A batch exceeded the configured ceiling; an upstream dependency is likely hung.
    #[error("batch exceeded timeout of {secs}s")]
    BatchTimeout {
        /// Configured ceiling in seconds.
        secs: u64,
    },

    /// Errors when serializing or deserializing persisted records.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LapseError {
    /// Build a [`LapseError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`LapseError::Persistence`] value.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Build a [`LapseError::Encoder`] value.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Build a [`LapseError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` when the error is scoped to a single frame and the run may continue.
    pub fn is_frame_level(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Composite(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
