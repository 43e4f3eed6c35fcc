use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub mod simulated;

pub use simulated::SimulatedExtractor;

use crate::cli::PlatformHint;

/// Message attached to every failed extraction
pub const EXTRACTION_FAILED_MESSAGE: &str = "Extraction failed, please check that the link is valid";

/// Video platform a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Bilibili,
    #[serde(rename = "YouTube")]
    YouTube,
    #[serde(rename = "Douyin/TikTok")]
    DouyinTikTok,
    Unknown,
}

impl Platform {
    /// Classify a link by substring. Matching ignores case.
    pub fn from_url(url: &str) -> Self {
        let url_lower = url.to_lowercase();
        if url_lower.contains("bilibili") {
            Platform::Bilibili
        } else if url_lower.contains("youtube") {
            Platform::YouTube
        } else if url_lower.contains("douyin") || url_lower.contains("tiktok") {
            Platform::DouyinTikTok
        } else {
            Platform::Unknown
        }
    }

    /// Resolve the platform for a single extraction, honoring an explicit choice
    pub fn resolve(url: &str, hint: PlatformHint) -> Self {
        match hint {
            PlatformHint::Auto => Self::from_url(url),
            PlatformHint::Bilibili => Platform::Bilibili,
            PlatformHint::Youtube => Platform::YouTube,
            PlatformHint::Douyin => Platform::DouyinTikTok,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bilibili => "Bilibili",
            Platform::YouTube => "YouTube",
            Platform::DouyinTikTok => "Douyin/TikTok",
            Platform::Unknown => "Unknown",
        }
    }

    /// Platforms that links are classified into
    pub fn supported() -> [Platform; 3] {
        [Platform::Bilibili, Platform::YouTube, Platform::DouyinTikTok]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success { title: String, result_id: String },
    Failure { error: String },
}

impl ExtractionOutcome {
    pub fn success(title: impl Into<String>, result_id: impl Into<String>) -> Self {
        ExtractionOutcome::Success {
            title: title.into(),
            result_id: result_id.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ExtractionOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }
}

/// Trait for extracting a transcript from one link
///
/// Implementations never fail with an error: a failed extraction is an
/// expected outcome and is reported as [`ExtractionOutcome::Failure`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptExtractor: Send + Sync {
    /// Extract the transcript for `url`, the `index`-th link of its batch
    async fn extract(&self, url: &str, index: usize) -> ExtractionOutcome;

    /// Get the name of this extractor
    fn name(&self) -> &'static str;
}

type ExtractFn = dyn Fn(String, usize) -> BoxFuture<'static, ExtractionOutcome> + Send + Sync;

/// Adapter turning an async closure into a [`TranscriptExtractor`]
pub struct FnExtractor {
    f: Box<ExtractFn>,
}

impl FnExtractor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(String, usize) -> BoxFuture<'static, ExtractionOutcome> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl TranscriptExtractor for FnExtractor {
    async fn extract(&self, url: &str, index: usize) -> ExtractionOutcome {
        (self.f)(url.to_string(), index).await
    }

    fn name(&self) -> &'static str {
        "function"
    }
}
