//! Batch run model: link validation, per-item lifecycle and the run-level
//! state machine.
//!
//! A [`BatchRun`] is a plain value. Every transition consumes the run and
//! returns the next one, so the processor (and tests) can drive it without
//! any UI attached.

use serde::{Deserialize, Serialize};

pub mod processor;

use crate::cli::OutputFormat;
use crate::extractors::{ExtractionOutcome, Platform};
use crate::BatchError;

/// Hard cap on links per batch
pub const MAX_BATCH_LINKS: usize = 20;

/// Split free text into candidate links: one per line, trimmed, blanks dropped
pub fn parse_links(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse and check the link count of a batch submission
pub fn validate_links(input: &str) -> Result<Vec<String>, BatchError> {
    let links = parse_links(input);
    check_link_count(links.len())?;
    Ok(links)
}

fn check_link_count(count: usize) -> Result<(), BatchError> {
    if count == 0 {
        return Err(BatchError::NoLinks);
    }
    if count > MAX_BATCH_LINKS {
        return Err(BatchError::TooManyLinks {
            count,
            max: MAX_BATCH_LINKS,
        });
    }
    Ok(())
}

/// Lifecycle of one item. Title and result id exist only on success, the
/// error only on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Success {
        title: String,
        #[serde(rename = "id")]
        result_id: String,
    },
    Failed {
        error: String,
    },
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Success { .. } | ItemStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "Pending",
            ItemStatus::Processing => "Processing",
            ItemStatus::Success { .. } => "Success",
            ItemStatus::Failed { .. } => "Failed",
        }
    }
}

impl From<ExtractionOutcome> for ItemStatus {
    fn from(outcome: ExtractionOutcome) -> Self {
        match outcome {
            ExtractionOutcome::Success { title, result_id } => ItemStatus::Success { title, result_id },
            ExtractionOutcome::Failure { error } => ItemStatus::Failed { error },
        }
    }
}

/// One submitted link and its status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub url: String,
    pub platform: Platform,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl BatchItem {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            platform: Platform::from_url(&url),
            url,
            status: ItemStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn title(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Success { title, .. } => Some(title),
            _ => None,
        }
    }

    pub fn result_id(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Success { result_id, .. } => Some(result_id),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Aggregate progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    /// Percentage done, `None` for an empty run
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.processed as f64 / self.total as f64 * 100.0)
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.processed, self.total)
    }
}

/// One sequential processing of a submitted link list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRun {
    items: Vec<BatchItem>,
    cursor: usize,
    processed: usize,
    state: RunState,
    cancelled: bool,
    format: OutputFormat,
}

impl BatchRun {
    /// Start a run with one pending item per link
    pub fn start(links: Vec<String>, format: OutputFormat) -> Result<Self, BatchError> {
        check_link_count(links.len())?;

        Ok(Self {
            items: links.into_iter().map(BatchItem::new).collect(),
            cursor: 0,
            processed: 0,
            state: RunState::Running,
            cancelled: false,
            format,
        })
    }

    /// Validate free-text input and start a run from it
    pub fn from_input(input: &str, format: OutputFormat) -> Result<Self, BatchError> {
        Self::start(validate_links(input)?, format)
    }

    /// Rebuild a completed run from the items of a finished batch
    pub fn restore(items: Vec<BatchItem>, format: OutputFormat) -> Result<Self, BatchError> {
        check_link_count(items.len())?;

        if let Some(index) = items.iter().position(|item| !item.is_terminal()) {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "only finished batches can be restored",
            });
        }

        let total = items.len();
        Ok(Self {
            items,
            cursor: total,
            processed: total,
            state: RunState::Completed,
            cancelled: false,
            format,
        })
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&BatchItem> {
        self.items.get(index)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.processed,
            total: self.items.len(),
        }
    }

    /// Run reached a terminal run state
    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::Cancelled)
    }

    /// Index of the next item to process, if the run is still going
    pub fn next_index(&self) -> Option<usize> {
        if self.state != RunState::Running || self.cursor >= self.items.len() {
            return None;
        }
        Some(self.cursor)
    }

    /// Items left in `Processing` by a cancelled run
    pub fn abandoned(&self) -> impl Iterator<Item = (usize, &BatchItem)> {
        let cancelled = self.state == RunState::Cancelled;
        self.items
            .iter()
            .enumerate()
            .filter(move |(_, item)| cancelled && item.status == ItemStatus::Processing)
    }

    pub fn successes(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Success { .. }))
    }

    pub fn failure_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Failed { .. }))
            .count()
    }

    fn check_index(&self, index: usize) -> Result<(), BatchError> {
        if index >= self.items.len() {
            return Err(BatchError::ItemOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }

    /// Move the item at the cursor from `Pending` to `Processing`
    pub fn begin_item(mut self, index: usize) -> Result<Self, BatchError> {
        self.check_index(index)?;

        if self.state != RunState::Running {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "batch is not running",
            });
        }
        if index != self.cursor {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "items must start in input order",
            });
        }
        if self.items[index].status != ItemStatus::Pending {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "item is not pending",
            });
        }

        self.items[index].status = ItemStatus::Processing;
        Ok(self)
    }

    /// Record the outcome of the item in flight and move the cursor on.
    ///
    /// A cancelled run rejects the outcome with [`BatchError::StaleResult`]
    /// and the item keeps its current state.
    pub fn complete_item(mut self, index: usize, outcome: ExtractionOutcome) -> Result<Self, BatchError> {
        self.check_index(index)?;

        if self.state == RunState::Cancelled {
            return Err(BatchError::StaleResult { index });
        }
        if self.state != RunState::Running {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "batch is not running",
            });
        }
        if self.items[index].status != ItemStatus::Processing {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "item is not processing",
            });
        }

        self.items[index].status = outcome.into();
        self.processed += 1;
        self.cursor = self.next_pending_after(index);
        if self.cursor >= self.items.len() {
            self.state = RunState::Completed;
        }
        Ok(self)
    }

    fn next_pending_after(&self, index: usize) -> usize {
        self.items
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, item)| item.status == ItemStatus::Pending)
            .map(|(i, _)| i)
            .unwrap_or(self.items.len())
    }

    /// Stop the run. Items keep whatever state they are in.
    /// Has no effect unless the run is running.
    pub fn cancel(mut self) -> Self {
        if self.state == RunState::Running {
            self.state = RunState::Cancelled;
            self.cancelled = true;
        }
        self
    }

    /// Send one failed item of a completed run back to `Pending` and resume
    /// the run at that item.
    pub fn retry_item(mut self, index: usize) -> Result<Self, BatchError> {
        self.check_index(index)?;

        if self.state != RunState::Completed {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "only items of a completed batch can be retried",
            });
        }
        if !matches!(self.items[index].status, ItemStatus::Failed { .. }) {
            return Err(BatchError::InvalidTransition {
                index,
                reason: "only failed items can be retried",
            });
        }

        self.items[index].status = ItemStatus::Pending;
        self.processed -= 1;
        self.cursor = index;
        self.state = RunState::Running;
        Ok(self)
    }
}
