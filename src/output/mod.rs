use anyhow::{Context, Result};
use console::style;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::{BatchItem, BatchRun, ItemStatus, Progress, RunState};
use crate::cli::OutputFormat;
use crate::utils::generate_unique_filename;
use crate::BatchError;

pub mod formatters;

pub use formatters::*;

/// Path of the result detail view
pub const RESULT_VIEW_PATH: &str = "/extract-result";

/// Path prefix of shared results
pub const SHARE_PATH: &str = "/share";

/// Everything the result detail view needs to rebuild a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultHandoff {
    pub batch_id: String,
    pub format: OutputFormat,
    /// Present for "view all"; absent when a single result is opened
    pub items: Option<Vec<BatchItem>>,
}

impl ResultHandoff {
    /// Handoff for every item of a run ("view all")
    pub fn from_run(run: &BatchRun) -> Self {
        Self {
            batch_id: format!("batch_{}", chrono::Utc::now().timestamp_millis()),
            format: run.format(),
            items: Some(run.items().to_vec()),
        }
    }

    /// Handoff for one successful item ("view")
    pub fn for_item(item: &BatchItem, format: OutputFormat) -> Option<Self> {
        item.result_id().map(|id| Self {
            batch_id: id.to_string(),
            format,
            items: None,
        })
    }

    /// Encode as `batchId=..&format=..[&batchResults=<json>]`
    pub fn to_query(&self) -> Result<String> {
        let mut query = format!(
            "batchId={}&format={}",
            urlencoding::encode(&self.batch_id),
            self.format
        );
        if let Some(items) = &self.items {
            let json = serde_json::to_string(items).context("Failed to serialize batch results")?;
            query.push_str("&batchResults=");
            query.push_str(&urlencoding::encode(&json));
        }
        Ok(query)
    }

    /// Link to the result detail view
    pub fn to_link(&self) -> Result<String> {
        Ok(format!("{}?{}", RESULT_VIEW_PATH, self.to_query()?))
    }

    /// Public link to the shared result, keyed by batch id
    pub fn share_link(&self) -> Result<String, BatchError> {
        if self.batch_id.is_empty() {
            return Err(BatchError::MalformedHandoff(
                "a batchId is needed to share results".to_string(),
            ));
        }
        Ok(format!("{}/{}", SHARE_PATH, urlencoding::encode(&self.batch_id)))
    }

    /// Decode a query string or a full result view link
    pub fn from_query(query: &str) -> Result<Self, BatchError> {
        let query = query.trim();
        let query = query
            .split_once('?')
            .map(|(_, rest)| rest)
            .unwrap_or(query);

        let mut batch_id = None;
        let mut format = OutputFormat::default();
        let mut items = None;

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(value)
                .map_err(|e| BatchError::MalformedHandoff(format!("{key}: {e}")))?;

            match key {
                "batchId" => batch_id = Some(value.into_owned()),
                // unknown formats fall back to the default
                "format" => format = OutputFormat::parse(&value).unwrap_or_default(),
                "batchResults" => {
                    let parsed: Vec<BatchItem> = serde_json::from_str(&value)
                        .map_err(|e| BatchError::MalformedHandoff(format!("batchResults: {e}")))?;
                    items = Some(parsed);
                }
                _ => tracing::debug!("Ignoring query parameter {}", key),
            }
        }

        if batch_id.is_none() && items.is_none() {
            return Err(BatchError::MalformedHandoff(
                "expected batchId or batchResults".to_string(),
            ));
        }

        Ok(Self {
            batch_id: batch_id.unwrap_or_default(),
            format,
            items,
        })
    }
}

/// Status label for one item
pub fn status_label(status: &ItemStatus) -> String {
    match status {
        ItemStatus::Pending => style("… Pending").dim().to_string(),
        ItemStatus::Processing => style("⟳ Processing").yellow().to_string(),
        ItemStatus::Success { .. } => style("✔ Success").green().to_string(),
        ItemStatus::Failed { .. } => style("✘ Failed").red().to_string(),
    }
}

/// One row of the batch result list
pub fn render_item_row(index: usize, item: &BatchItem, format: OutputFormat) -> String {
    let mut row = format!(
        "{:>2}. {} ({})  {}",
        index + 1,
        item.url,
        item.platform,
        status_label(&item.status)
    );

    match &item.status {
        ItemStatus::Success { title, .. } => {
            row.push_str(&format!("  {}", title));
            if let Some(link) = ResultHandoff::for_item(item, format).and_then(|h| h.to_link().ok()) {
                row.push_str(&format!("\n      view: {}", link));
            }
        }
        ItemStatus::Failed { error } => {
            row.push_str(&format!(
                "\n      {}  (retry with: show --retry {} <view-all link>)",
                style(error).red(),
                index + 1
            ));
        }
        _ => {}
    }

    row
}

/// Fixed-width textual progress bar
pub fn render_progress_bar(progress: Progress, width: usize) -> String {
    let filled = match progress.percent() {
        Some(percent) => ((percent / 100.0) * width as f64).round() as usize,
        None => 0,
    };
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Progress header plus one row per item
pub fn render_run(run: &BatchRun) -> String {
    let progress = run.progress();
    let percent = progress
        .percent()
        .map(|p| format!("{:.0}%", p))
        .unwrap_or_else(|| "-".to_string());

    let mut output = format!(
        "Overall progress: {}  {} {}\n",
        progress,
        render_progress_bar(progress, 30),
        percent
    );

    for (index, item) in run.items().iter().enumerate() {
        output.push_str(&render_item_row(index, item, run.format()));
        output.push('\n');
    }

    match run.state() {
        RunState::Cancelled => output.push_str("Batch processing cancelled\n"),
        RunState::Completed => output.push_str(&format!(
            "Done: {} succeeded, {} failed\n",
            run.successes().count(),
            run.failure_count()
        )),
        _ => {}
    }

    output
}

/// Write transcript text to a new timestamped file in `dir`
pub async fn export_transcript(content: &str, dir: &Path, base_name: &str) -> Result<PathBuf> {
    fs_err::create_dir_all(dir).context("Failed to create export directory")?;
    let path = dir.join(generate_unique_filename(base_name, "txt"));

    fs_err::write(&path, content).context("Failed to write transcript")?;
    tracing::info!("Exported transcript to {}", path.display());
    Ok(path)
}

/// Save transcript text to an explicit path
pub async fn save_to_file(content: &str, path: &Path) -> Result<()> {
    fs_err::write(path, content)?;
    Ok(())
}

/// Export one file per successful item of a run ("download all")
pub async fn download_all(run: &BatchRun, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for item in run.successes() {
        let title = item.title().unwrap_or("transcript");
        let content = render_transcript(title, run.format());
        paths.push(export_transcript(&content, dir, title).await?);
    }
    Ok(paths)
}
