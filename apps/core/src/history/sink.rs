//! Durable storage for the history log.
//!
//! The engine only ever talks to the [`HistorySink`] trait; the bundled
//! implementation is a JSON-lines file. One JSON object per line, `#`
//! comment lines tolerated, malformed lines skipped with a warning so one
//! corrupt record never poisons a whole load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::EngineError;
use crate::models::HistoryEntry;

/// Narrow contract for durable history storage.
#[async_trait]
pub trait HistorySink: Send + Sync + 'static {
    /// Reads every stored entry, oldest first.
    async fn load_all(&self) -> Result<Vec<HistoryEntry>, EngineError>;

    /// Appends the given entries, preserving order.
    async fn append_all(&self, entries: &[HistoryEntry]) -> Result<(), EngineError>;
}

/// JSON-lines file sink.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistorySink for JsonFileSink {
    async fn load_all(&self) -> Result<Vec<HistoryEntry>, EngineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut entries = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("skipping malformed history line: {} - line: {}", e, trimmed);
                }
            }
        }
        Ok(entries)
    }

    async fn append_all(&self, entries: &[HistoryEntry]) -> Result<(), EngineError> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let fresh = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut buffer = String::new();
        if fresh {
            buffer.push_str("# Cognimode history log\n");
            buffer.push_str("# Each line is a JSON object representing one entry\n");
        }
        for entry in entries {
            buffer.push_str(&serde_json::to_string(entry)?);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
