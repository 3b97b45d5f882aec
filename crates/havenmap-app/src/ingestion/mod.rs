//! Spreadsheet import: reading rows, deciding their fate, storing records.

pub mod manifest;
pub mod spreadsheet;
pub mod types;

pub use manifest::{ManifestEntry, ManifestError, ManifestWriter, read_entries};
pub use spreadsheet::{SpreadsheetIngestor, ingest, read_rows};
pub use types::{IngestError, IngestEvent, IngestSummary, RowOutcome, SkipReason};
