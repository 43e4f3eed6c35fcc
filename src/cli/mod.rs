use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lianwen",
    about = "Lianwen - Extract transcripts from Bilibili, YouTube, Douyin and TikTok links",
    version,
    long_about = "A CLI tool for extracting video transcripts one link at a time or in batches of up to 20 links. Batches run sequentially and can be cancelled with Ctrl-C."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "FILE", env = "LIANWEN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the transcript of a single video link
    Extract {
        /// Video link (Bilibili, YouTube, Douyin, TikTok)
        #[arg(value_name = "URL", required_unless_present = "paste")]
        url: Option<String>,

        /// Take the video link from the clipboard
        #[arg(long)]
        paste: bool,

        /// Platform of the link (detected from the link by default)
        #[arg(short, long, value_enum, default_value = "auto")]
        platform: PlatformHint,

        /// Output format (falls back to the configured default)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Export the transcript as a timestamped text file in the export directory
        #[arg(long)]
        export: bool,

        /// Copy the transcript to the clipboard
        #[arg(long)]
        copy: bool,
    },

    /// Extract transcripts for a list of links, one per line
    Batch {
        /// File with one link per line ("-" reads standard input)
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Link to add to the batch (repeatable)
        #[arg(short, long = "link", value_name = "URL")]
        links: Vec<String>,

        /// Append links found in the clipboard
        #[arg(long)]
        paste: bool,

        /// Output format (falls back to the configured default)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Export every successful transcript into the export directory
        #[arg(long)]
        download_all: bool,

        /// Retry failed items once after the batch completes
        #[arg(long)]
        retry_failed: bool,
    },

    /// Show results from a result handoff query
    Show {
        /// Query string such as `batchId=...&format=markdown&batchResults=...`
        #[arg(value_name = "QUERY")]
        query: String,

        /// Copy a share link for the results to the clipboard
        #[arg(long)]
        share: bool,

        /// Retry the failed item at this position (1-based) of a "view all" query
        #[arg(long, value_name = "N")]
        retry: Option<usize>,
    },

    /// Show configuration, or change it with --set
    Config {
        /// Setting to change, e.g. `simulation.success_rate=0.5` (repeatable)
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// List supported platforms
    Platforms,
}

/// Transcript display format. Purely a presentation choice.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown with headings
    #[default]
    Markdown,
    /// Text with [HH:MM:SS] timestamps
    Timestamp,
    /// Plain text
    Plain,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Timestamp => "timestamp",
            OutputFormat::Plain => "plain",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(OutputFormat::Markdown),
            "timestamp" | "timestamped" => Some(OutputFormat::Timestamp),
            "plain" | "text" => Some(OutputFormat::Plain),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform selection for single-link extraction
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlatformHint {
    /// Detect from the link
    #[default]
    Auto,
    Bilibili,
    Youtube,
    Douyin,
}
