use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

/// Returned when no provider could describe an image.
pub const CAPTION_UNAVAILABLE: &str = "Unable to generate caption";
/// Per-frame placeholder used while building a video summary.
pub const FRAME_UNAVAILABLE: &str = "No description available";
pub const SUMMARY_UNAVAILABLE: &str = "No summary available";
/// Summary used when none of the frames could be described.
pub const GENERIC_VIDEO_SUMMARY: &str = "The video contains scenes of varying content.";

/// Seconds into a video at which thumbnails are captioned.
pub const THUMBNAIL_OFFSETS_SECS: [u32; 3] = [1, 5, 10];

/// Where the image to caption comes from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// An image-to-text model. `caption` may return empty text when the model
/// answered without a description.
#[async_trait]
pub trait CaptionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Stored as the caption when the model answers with empty text.
    fn placeholder(&self) -> &str {
        "Image description unavailable"
    }

    async fn caption(&self, image_base64: &str) -> Result<String>;
}

/// A text summarization model.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Retry policy for the primary caption model.
#[derive(Debug, Clone, Copy)]
pub struct CaptionPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    /// Pause between attempts (not after the last one).
    pub pause: Duration,
}

impl Default for CaptionPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(15),
            pause: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCaptions {
    /// Caption of the first thumbnail.
    pub caption: String,
    /// All thumbnail captions joined with a space.
    pub summary: String,
}

/// Caption pipeline: primary model with retries, then a one-shot fallback,
/// then the [`CAPTION_UNAVAILABLE`] sentinel. Never fails.
#[derive(Clone)]
pub struct Captioner {
    http: reqwest::Client,
    primary: Option<Arc<dyn CaptionModel>>,
    fallback: Option<Arc<dyn CaptionModel>>,
    summarizer: Option<Arc<dyn SummaryModel>>,
    policy: CaptionPolicy,
}

impl Captioner {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            primary: None,
            fallback: None,
            summarizer: None,
            policy: CaptionPolicy::default(),
        }
    }

    pub fn with_primary(mut self, model: Arc<dyn CaptionModel>) -> Self {
        self.primary = Some(model);
        self
    }

    pub fn with_fallback(mut self, model: Arc<dyn CaptionModel>) -> Self {
        self.fallback = Some(model);
        self
    }

    pub fn with_summarizer(mut self, model: Arc<dyn SummaryModel>) -> Self {
        self.summarizer = Some(model);
        self
    }

    pub fn with_policy(mut self, policy: CaptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Describe a single image.
    pub async fn caption(&self, source: &MediaSource) -> String {
        let image = match self.load(source).await {
            Ok(bytes) => B64.encode(bytes),
            Err(e) => {
                warn!("Could not load image for captioning: {:#}", e);
                return CAPTION_UNAVAILABLE.to_string();
            }
        };
        debug!("Caption payload preview: {}...", &image[..image.len().min(50)]);

        if let Some(primary) = &self.primary {
            let attempts = self.policy.attempts.max(1);
            for attempt in 1..=attempts {
                match self.call(primary.as_ref(), &image).await {
                    Ok(text) => return non_empty_or_placeholder(text, primary.as_ref()),
                    Err(e) => {
                        let name = primary.name();
                        warn!("{} attempt {}/{} failed: {:#}", name, attempt, attempts, e);
                        if attempt < attempts {
                            tokio::time::sleep(self.policy.pause).await;
                        }
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            match self.call(fallback.as_ref(), &image).await {
                Ok(text) => {
                    info!("Caption produced by fallback model {}", fallback.name());
                    return non_empty_or_placeholder(text, fallback.as_ref());
                }
                Err(e) => warn!("Fallback {} failed: {:#}", fallback.name(), e),
            }
        }

        CAPTION_UNAVAILABLE.to_string()
    }

    /// Caption every thumbnail concurrently. The first frame's caption
    /// becomes the memory caption and all of them form the summary.
    pub async fn caption_video(&self, thumbnails: &[MediaSource]) -> VideoCaptions {
        let captions = join_all(thumbnails.iter().map(|t| self.caption(t))).await;

        VideoCaptions {
            caption: captions
                .first()
                .cloned()
                .unwrap_or_else(|| CAPTION_UNAVAILABLE.to_string()),
            summary: captions.join(" "),
        }
    }

    /// Describe every frame once and condense the descriptions with the
    /// summarization model.
    pub async fn summarize_frames(&self, thumbnails: &[MediaSource]) -> String {
        let descriptions = join_all(thumbnails.iter().enumerate().map(|(i, t)| async move {
            match self.describe_frame(t).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("Thumbnail {} description: {}", i + 1, text);
                    text
                }
                Ok(_) => FRAME_UNAVAILABLE.to_string(),
                Err(e) => {
                    warn!("Error describing thumbnail {}: {:#}", i + 1, e);
                    FRAME_UNAVAILABLE.to_string()
                }
            }
        }))
        .await;

        if descriptions.iter().all(|d| d == FRAME_UNAVAILABLE) {
            return GENERIC_VIDEO_SUMMARY.to_string();
        }

        let combined = descriptions.join("\n");
        let Some(summarizer) = &self.summarizer else {
            return SUMMARY_UNAVAILABLE.to_string();
        };
        match tokio::time::timeout(self.policy.timeout, summarizer.summarize(&combined)).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => summary,
            Ok(Ok(_)) => SUMMARY_UNAVAILABLE.to_string(),
            Ok(Err(e)) => {
                warn!("Error generating summary: {:#}", e);
                SUMMARY_UNAVAILABLE.to_string()
            }
            Err(_) => {
                warn!("Summary generation timed out");
                SUMMARY_UNAVAILABLE.to_string()
            }
        }
    }

    async fn describe_frame(&self, source: &MediaSource) -> Result<String> {
        let primary = self.primary.as_ref().ok_or_else(|| anyhow!("no caption model configured"))?;
        let image = B64.encode(self.load(source).await?);
        self.call(primary.as_ref(), &image).await
    }

    async fn call(&self, model: &dyn CaptionModel, image: &str) -> Result<String> {
        tokio::time::timeout(self.policy.timeout, model.caption(image))
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.policy.timeout))?
    }

    async fn load(&self, source: &MediaSource) -> Result<Vec<u8>> {
        match source {
            MediaSource::Bytes(bytes) => Ok(bytes.clone()),
            MediaSource::Url(url) => {
                let response = self
                    .http
                    .get(url)
                    .timeout(self.policy.timeout)
                    .send()
                    .await
                    .with_context(|| format!("fetching {url}"))?
                    .error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

fn non_empty_or_placeholder(text: String, model: &dyn CaptionModel) -> String {
    if text.trim().is_empty() {
        model.placeholder().to_string()
    } else {
        text
    }
}
