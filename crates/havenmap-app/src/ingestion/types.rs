use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::Record;
use crate::services::{GeocodeError, StoreError};

/// Failures that abort an import before any row is processed.
#[derive(Debug, Error, Clone)]
pub enum IngestError {
    #[error("spreadsheet `{}` not found", path.display())]
    FileNotFound { path: PathBuf },
    #[error("spreadsheet `{}` is not readable tabular data: {message}", path.display())]
    UnreadableFormat { path: PathBuf, message: String },
    #[error("failed to build geocoding client: {0}")]
    GeocoderSetup(GeocodeError),
    #[error("spreadsheet reader task failed: {0}")]
    Join(Arc<tokio::task::JoinError>),
}

impl IngestError {
    pub(crate) fn unreadable(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::UnreadableFormat {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Why a row produced no record.
#[derive(Debug, Clone, Error)]
pub enum SkipReason {
    #[error("no usable coordinates and no address to geocode")]
    NoCoordinates,
    #[error("geocoding failed: {0}")]
    Geocode(#[from] GeocodeError),
}

/// Per-row decision of the importer.
#[derive(Debug, Clone)]
pub enum RowOutcome {
    Kept(Record),
    Skipped(SkipReason),
}

impl RowOutcome {
    pub fn is_kept(&self) -> bool {
        matches!(self, RowOutcome::Kept(_))
    }
}

/// Progress events emitted while importing a spreadsheet. `row` is the
/// 1-based data row number, which equals the 0-based sheet row index since
/// sheet row 0 is the header.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    Started {
        rows: usize,
    },
    RowStored {
        row: usize,
        record_id: String,
        geohash: String,
        geocoded: bool,
    },
    RowSkipped {
        row: usize,
        reason: SkipReason,
    },
    StoreFailed {
        row: usize,
        record_id: String,
        error: StoreError,
    },
    Completed {
        summary: IngestSummary,
    },
}

/// Counters collected over one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub rows: usize,
    pub stored: usize,
    pub geocoded: usize,
    pub skipped: usize,
    pub store_failed: usize,
}
