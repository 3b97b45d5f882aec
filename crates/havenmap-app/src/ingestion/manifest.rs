//! Append-only ledger of records written by an import run.
//!
//! Each line is one JSON object naming the stored record, the spreadsheet row
//! it came from and its geohash. Re-running an import appends new lines; the
//! ledger is never rewritten.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub record_id: String,
    /// 1-based data row in the source sheet.
    pub row: usize,
    pub geohash: String,
    pub timestamp: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn new(record_id: impl Into<String>, row: usize, geohash: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            row,
            geohash: geohash.into(),
            timestamp: Utc::now(),
        }
    }
}

/// NDJSON writer opened in append mode. The parent directory must exist.
pub struct ManifestWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl ManifestWriter {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Buffered; call [`ManifestWriter::close`] or [`ManifestWriter::sync`]
    /// before relying on the line being on disk.
    pub async fn write(&mut self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        let json = serde_json::to_string(entry)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn sync(&mut self) -> Result<(), ManifestError> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(mut self) -> Result<(), ManifestError> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Read every entry of an existing ledger, oldest first.
pub async fn read_entries<P: AsRef<Path>>(path: P) -> Result<Vec<ManifestEntry>, ManifestError> {
    let contents = tokio::fs::read_to_string(path).await?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ManifestError::from))
        .collect()
}
