use std::io::Read as _;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{LayerSpec, SourceConfig};
use crate::foundation::core::format_api_timestamp;
use crate::foundation::error::FetchError;

/// Raster formats accepted from the remote endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFormat {
    /// PNG (`\x89PNG\r\n\x1a\n`).
    Png,
    /// JPEG (`FF D8 FF`).
    Jpeg,
}

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Identify a raster by its leading magic bytes.
pub fn sniff_raster_format(bytes: &[u8]) -> Option<RasterFormat> {
    if bytes.starts_with(PNG_MAGIC) {
        Some(RasterFormat::Png)
    } else if bytes.starts_with(JPEG_MAGIC) {
        Some(RasterFormat::Jpeg)
    } else {
        None
    }
}

/// Check a response body (and its declared content type, when present) for usable raster data.
///
/// Magic bytes are authoritative; a declared type is only allowed to be `image/*` or a generic
/// binary type.
pub fn validate_raster(
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<RasterFormat, FetchError> {
    if let Some(ct) = content_type {
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if !mime.is_empty() && !mime.starts_with("image/") && mime != "application/octet-stream" {
            return Err(FetchError::invalid_content(format!(
                "unexpected content type '{mime}' ({} bytes)",
                bytes.len()
            )));
        }
    }
    if bytes.is_empty() {
        return Err(FetchError::invalid_content("empty response body"));
    }
    sniff_raster_format(bytes).ok_or_else(|| {
        FetchError::invalid_content(format!(
            "response is not PNG or JPEG ({} bytes, starts {:02x?})",
            bytes.len(),
            &bytes[..bytes.len().min(8)]
        ))
    })
}

/// Fetches one raster for a timestamp and layer.
///
/// Implementations perform no caching and no retries; both belong to callers.
pub trait ImageSource: Send + Sync {
    /// Fetch the raster for `layer` at `timestamp`.
    fn fetch(&self, timestamp: DateTime<Utc>, layer: &LayerSpec) -> Result<Vec<u8>, FetchError>;
}

impl<T: ImageSource + ?Sized> ImageSource for std::sync::Arc<T> {
    fn fetch(&self, timestamp: DateTime<Utc>, layer: &LayerSpec) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(timestamp, layer)
    }
}

/// Query parameters for one screenshot request.
pub fn screenshot_params(
    timestamp: DateTime<Utc>,
    layer: &LayerSpec,
) -> Vec<(&'static str, String)> {
    vec![
        ("date", format_api_timestamp(timestamp)),
        ("layers", layer.selector.clone()),
        ("imageScale", layer.scale.to_string()),
        ("width", layer.width.to_string()),
        ("height", layer.height.to_string()),
        ("x0", layer.x0.to_string()),
        ("y0", layer.y0.to_string()),
        ("display", "true".to_string()),
        ("watermark", "false".to_string()),
    ]
}

/// [`ImageSource`] backed by the remote screenshot HTTP API.
pub struct HttpImageSource {
    agent: ureq::Agent,
    endpoint: String,
    timeout: Duration,
    max_response_bytes: u64,
}

impl HttpImageSource {
    /// Build a source from the `source` config section.
    pub fn new(cfg: &SourceConfig) -> Self {
        Self::with_timeout(&cfg.endpoint, cfg.timeout(), cfg.max_response_bytes)
    }

    /// Build a source with an explicit endpoint and per-call timeout.
    pub fn with_timeout(endpoint: &str, timeout: Duration, max_response_bytes: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("coronalapse/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
            timeout,
            max_response_bytes,
        }
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    fn read_body(&self, resp: ureq::Response) -> Result<(Option<String>, Vec<u8>), FetchError> {
        let content_type = resp.header("content-type").map(str::to_string);
        let mut body = Vec::new();
        resp.into_reader()
            .take(self.max_response_bytes + 1)
            .read_to_end(&mut body)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    FetchError::Timeout {
                        secs: self.timeout_secs(),
                    }
                }
                _ => FetchError::transport(format!("read body: {e}")),
            })?;
        if body.len() as u64 > self.max_response_bytes {
            return Err(FetchError::invalid_content(format!(
                "response exceeds {} bytes",
                self.max_response_bytes
            )));
        }
        Ok((content_type, body))
    }

    fn classify_transport(&self, err: &ureq::Transport) -> FetchError {
        let io_timeout = std::error::Error::source(err)
            .and_then(|s| s.downcast_ref::<std::io::Error>())
            .is_some_and(|io| {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            });
        if io_timeout || err.to_string().contains("timed out") {
            FetchError::Timeout {
                secs: self.timeout_secs(),
            }
        } else {
            FetchError::transport(err.to_string())
        }
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, timestamp: DateTime<Utc>, layer: &LayerSpec) -> Result<Vec<u8>, FetchError> {
        let mut req = self.agent.get(&self.endpoint);
        for (k, v) in screenshot_params(timestamp, layer) {
            req = req.query(k, &v);
        }

        match req.call() {
            Ok(resp) => {
                let (content_type, body) = self.read_body(resp)?;
                validate_raster(content_type.as_deref(), &body)?;
                Ok(body)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                let snippet: String = text.chars().take(200).collect();
                if code == 429 || code >= 500 {
                    Err(FetchError::transport(format!("HTTP {code}: {snippet}")))
                } else {
                    Err(FetchError::invalid_content(format!("HTTP {code}: {snippet}")))
                }
            }
            Err(ureq::Error::Transport(t)) => Err(self.classify_transport(&t)),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/fetch/source.rs"]
mod tests;
