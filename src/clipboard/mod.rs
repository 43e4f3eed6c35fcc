//! Clipboard access for pasting links and copying transcripts.
//!
//! The clipboard is an outside service: a read or write either works or
//! fails with a notice for the user. Nothing is retried.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::BatchError;

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn read_text(&self) -> Result<String, BatchError>;

    async fn write_text(&self, text: &str) -> Result<(), BatchError>;
}

/// Clipboard kept in a plain text file
pub struct FileClipboard {
    path: PathBuf,
}

impl FileClipboard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Clipboard for FileClipboard {
    async fn read_text(&self) -> Result<String, BatchError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| BatchError::ClipboardUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    async fn write_text(&self, text: &str) -> Result<(), BatchError> {
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| BatchError::ClipboardUnavailable(format!("{}: {}", self.path.display(), e)))
    }
}

/// In-process clipboard; `None` contents behave like a denied clipboard
#[derive(Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(text.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn read_text(&self) -> Result<String, BatchError> {
        self.contents()
            .ok_or_else(|| BatchError::ClipboardUnavailable("clipboard is empty".to_string()))
    }

    async fn write_text(&self, text: &str) -> Result<(), BatchError> {
        let mut guard = self
            .contents
            .lock()
            .map_err(|_| BatchError::ClipboardUnavailable("clipboard lock poisoned".to_string()))?;
        *guard = Some(text.to_string());
        Ok(())
    }
}

/// Non-empty clipboard lines that contain `http`
async fn clipboard_links(clipboard: &dyn Clipboard) -> Result<Vec<String>, BatchError> {
    let text = clipboard.read_text().await.map_err(|e| {
        tracing::warn!("Clipboard read failed: {}", e);
        e
    })?;

    let links: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains("http"))
        .map(str::to_string)
        .collect();

    if links.is_empty() {
        return Err(BatchError::NoLinksInClipboard);
    }
    Ok(links)
}

/// Append the links found in the clipboard to `current` input.
///
/// Only non-empty lines containing `http` count as links.
pub async fn paste_links(current: &str, clipboard: &dyn Clipboard) -> Result<String, BatchError> {
    let pasted = clipboard_links(clipboard).await?;

    let current = current.trim();
    let mut merged = String::from(current);
    if !current.is_empty() {
        merged.push('\n');
    }
    merged.push_str(&pasted.join("\n"));
    Ok(merged)
}

/// First link in the clipboard, for single-link extraction
pub async fn paste_link(clipboard: &dyn Clipboard) -> Result<String, BatchError> {
    let mut links = clipboard_links(clipboard).await?;
    Ok(links.swap_remove(0))
}

/// Copy transcript text to the clipboard
pub async fn copy_content(content: &str, clipboard: &dyn Clipboard) -> Result<(), BatchError> {
    clipboard.write_text(content).await.map_err(|e| {
        tracing::warn!("Clipboard write failed: {}", e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::block_on;

    #[test]
    fn test_paste_appends_only_http_lines() {
        let clipboard = MemoryClipboard::with_text(
            "https://www.bilibili.com/video/BV1\nsome note\n\n  https://v.douyin.com/x/  \n",
        );

        let merged = block_on(paste_links("https://youtube.com/watch?v=1\n", &clipboard)).unwrap();

        assert_eq!(
            merged,
            "https://youtube.com/watch?v=1\nhttps://www.bilibili.com/video/BV1\nhttps://v.douyin.com/x/"
        );
    }

    #[test]
    fn test_paste_into_empty_input() {
        let clipboard = MemoryClipboard::with_text("https://a.example/1");
        let merged = block_on(paste_links("   ", &clipboard)).unwrap();
        assert_eq!(merged, "https://a.example/1");
    }

    #[test]
    fn test_paste_without_links_is_a_notice() {
        let clipboard = MemoryClipboard::with_text("just words\nmore words");
        assert_eq!(
            block_on(paste_links("", &clipboard)),
            Err(BatchError::NoLinksInClipboard)
        );
    }

    #[test]
    fn test_unreadable_clipboard_asks_to_paste_manually() {
        let clipboard = MemoryClipboard::default();
        let err = block_on(paste_links("", &clipboard)).unwrap_err();
        assert!(matches!(err, BatchError::ClipboardUnavailable(_)));
        assert!(err.to_string().contains("paste manually"));
    }

    #[test]
    fn test_paste_link_takes_first_link() {
        let clipboard = MemoryClipboard::with_text(
            "watch this\n  https://www.bilibili.com/video/BV1  \nhttps://v.douyin.com/x/\n",
        );
        assert_eq!(
            block_on(paste_link(&clipboard)).unwrap(),
            "https://www.bilibili.com/video/BV1"
        );
    }

    #[test]
    fn test_paste_link_notices() {
        let clipboard = MemoryClipboard::with_text("no links here");
        assert_eq!(block_on(paste_link(&clipboard)), Err(BatchError::NoLinksInClipboard));

        let denied = MemoryClipboard::default();
        assert!(matches!(
            block_on(paste_link(&denied)),
            Err(BatchError::ClipboardUnavailable(_))
        ));
    }

    #[test]
    fn test_copy_writes_clipboard() {
        let clipboard = MemoryClipboard::default();
        block_on(copy_content("# Title", &clipboard)).unwrap();
        assert_eq!(clipboard.contents().as_deref(), Some("# Title"));
    }

    #[tokio::test]
    async fn test_file_clipboard_round_trip() {
        let dir = TempDir::new().unwrap();
        let clipboard = FileClipboard::new(dir.path().join("clipboard.txt"));

        assert!(clipboard.read_text().await.is_err());
        copy_content("https://youtube.com/watch?v=9", &clipboard).await.unwrap();
        let merged = paste_links("", &clipboard).await.unwrap();
        assert_eq!(merged, "https://youtube.com/watch?v=9");
    }

    #[tokio::test]
    async fn test_file_clipboard_write_failure() {
        let dir = TempDir::new().unwrap();
        let clipboard = FileClipboard::new(dir.path().join("missing").join("clipboard.txt"));
        let err = copy_content("text", &clipboard).await.unwrap_err();
        assert!(matches!(err, BatchError::ClipboardUnavailable(_)));
    }
}
