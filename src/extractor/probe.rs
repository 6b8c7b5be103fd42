//! Byte-sniffing image prober.
//!
//! Streams the head of an image and decodes just enough to learn its
//! dimensions and format. Gives up at [`MAX_PROBE_BYTES`] or on timeout.

use async_trait::async_trait;
use image::{ImageDecoder, ImageReader};
use std::io::Cursor;
use std::time::Duration;

use crate::utils::{CHROME_USER_AGENT, MAX_PROBE_BYTES};

/// What a successful probe learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedImage {
    pub width: u32,
    pub height: u32,
    /// Lower-case extension-style name (`"png"`, `"jpg"`, `"gif"`), if sniffed.
    pub format: Option<String>,
    pub has_alpha: bool,
}

#[async_trait]
pub trait ImageProber: Send + Sync {
    /// `None` on timeout, non-200, or undecodable bytes.
    async fn probe(&self, url: &str) -> Option<ProbedImage>;
}

/// Prober over reqwest.
#[derive(Clone)]
pub struct HttpImageProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpImageProber {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(CHROME_USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    async fn fetch_and_sniff(&self, url: &str) -> anyhow::Result<Option<ProbedImage>> {
        let mut response = self.client.get(url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!(url, status = %response.status(), "Probe got non-200");
            return Ok(None);
        }

        let mut buffer: Vec<u8> = Vec::with_capacity(16 * 1024);
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            if let Some(probed) = sniff(&buffer) {
                return Ok(Some(probed));
            }
            if buffer.len() >= MAX_PROBE_BYTES {
                tracing::debug!(url, bytes = buffer.len(), "Probe cap reached");
                return Ok(None);
            }
        }

        Ok(sniff(&buffer))
    }
}

#[async_trait]
impl ImageProber for HttpImageProber {
    async fn probe(&self, url: &str) -> Option<ProbedImage> {
        match tokio::time::timeout(self.timeout, self.fetch_and_sniff(url)).await {
            Ok(Ok(probed)) => probed,
            Ok(Err(e)) => {
                tracing::debug!(url, "Probe failed: {e:#}");
                None
            }
            Err(_) => {
                tracing::debug!(url, "Probe timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

/// Decode the image header from a possibly truncated buffer.
pub fn sniff(bytes: &[u8]) -> Option<ProbedImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let format = reader
        .format()
        .and_then(|f| f.extensions_str().first().map(|ext| (*ext).to_string()));
    let decoder = reader.into_decoder().ok()?;
    let (width, height) = decoder.dimensions();

    Some(ProbedImage {
        width,
        height,
        format,
        has_alpha: decoder.color_type().has_alpha(),
    })
}
