//! Lianwen - batch transcript extraction for video links
//!
//! This library provides the headless core behind the `lianwen` CLI: link
//! validation, the sequential batch state machine and its async driver,
//! simulated extraction, clipboard access and result presentation.

pub mod batch;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod extractors;
pub mod output;
pub mod utils;

pub use batch::processor::{BatchHandle, BatchProcessor};
pub use batch::{BatchItem, BatchRun, ItemStatus, Progress, RunState, MAX_BATCH_LINKS};
pub use cli::{Cli, Commands, OutputFormat, PlatformHint};
pub use config::Config;
pub use extractors::{ExtractionOutcome, FnExtractor, Platform, TranscriptExtractor};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to batch extraction
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Please enter at least one video link")]
    NoLinks,

    #[error("A batch supports at most {max} links, got {count}")]
    TooManyLinks { count: usize, max: usize },

    #[error("Item {index} is out of range for a batch of {len}")]
    ItemOutOfRange { index: usize, len: usize },

    #[error("Invalid transition for item {index}: {reason}")]
    InvalidTransition { index: usize, reason: &'static str },

    #[error("Result for item {index} arrived after the batch was cancelled")]
    StaleResult { index: usize },

    #[error("Cannot access the clipboard, please paste manually: {0}")]
    ClipboardUnavailable(String),

    #[error("No valid links in the clipboard")]
    NoLinksInClipboard,

    #[error("Malformed result handoff: {0}")]
    MalformedHandoff(String),
}
