//! Transaction Journal - Append-only JSONL Records
//!
//! Persists broadcast and confirmation events to daily JSONL files in
//! the format `transactions/YYYY-MM-DD.jsonl`. Each line is a
//! self-contained JSON record, so a crash mid-run never corrupts
//! earlier entries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::ports::journal::{Journal, JournalEntry};

/// Append-only JSONL journal with daily file rotation.
pub struct JsonlJournal {
    /// Directory holding the daily files.
    transactions_dir: PathBuf,
}

impl JsonlJournal {
    /// Create the journal under `data_dir/transactions`.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let transactions_dir = data_dir.as_ref().join("transactions");

        fs::create_dir_all(&transactions_dir)
            .await
            .context("Failed to create transactions directory")?;

        Ok(Self { transactions_dir })
    }

    /// File today's entries are appended to.
    pub fn current_file(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.transactions_dir.join(format!("{date}.jsonl"))
    }
}

#[async_trait]
impl Journal for JsonlJournal {
    #[instrument(skip(self, entry), fields(tx_hash = %entry.tx_hash()))]
    async fn record(&self, entry: &JournalEntry) -> Result<()> {
        let path = self.current_file();

        let mut json =
            serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open journal file")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write journal entry")?;

        file.flush().await.context("Failed to flush journal")?;

        debug!(file = %path.display(), "Journal entry recorded");
        Ok(())
    }
}

/// Journal that discards everything. Used when persistence is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

#[async_trait]
impl Journal for NullJournal {
    async fn record(&self, _entry: &JournalEntry) -> Result<()> {
        Ok(())
    }
}
