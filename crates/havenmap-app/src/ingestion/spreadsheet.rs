//! Spreadsheet importer: rows in, located records out.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;

use async_stream::try_stream;
use bon::Builder;
use calamine::{Data, Reader, open_workbook_auto};
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{IngestError, IngestEvent, IngestSummary, RowOutcome, SkipReason};
use crate::constants::DEFAULT_COLLECTION;
use crate::pipeline::{Cell, ColumnLayout, Record, map_row};
use crate::services::{Bootstrap, DocumentStore, Geocoder, GoogleGeocoder};

/// Reads the first sheet of a workbook and stores one record per usable row.
///
/// Rows are handled one at a time in file order. Per-row problems (failed
/// geocoding, a rejected write) are reported as events and never stop the
/// run; only an unreadable input file is fatal, and that is detected before
/// the first write.
#[derive(Clone, Builder)]
pub struct SpreadsheetIngestor {
    geocoder: Arc<dyn Geocoder>,
    store: Arc<dyn DocumentStore>,
    #[builder(into, default = DEFAULT_COLLECTION.to_string())]
    collection: String,
    #[builder(default)]
    layout: ColumnLayout,
}

impl SpreadsheetIngestor {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Decide the fate of one data row: keep it with coordinates attached, or
    /// skip it with a reason. Geocodes when the sheet lacks usable
    /// coordinates and an address is present.
    pub async fn process_row(&self, cells: &[Cell]) -> RowOutcome {
        match self.resolve_row(cells).await {
            Ok((record, _)) => RowOutcome::Kept(record),
            Err(reason) => RowOutcome::Skipped(reason),
        }
    }

    async fn resolve_row(&self, cells: &[Cell]) -> Result<(Record, bool), SkipReason> {
        let candidate = map_row(cells, &self.layout, Uuid::new_v4().to_string());
        if let Some(coordinates) = candidate.coordinates {
            return Ok((candidate.record.with_coordinates(coordinates), false));
        }

        let Some(address) = candidate.geocode_query() else {
            return Err(SkipReason::NoCoordinates);
        };
        let coordinates = self.geocoder.geocode(address).await?;
        Ok((candidate.record.with_coordinates(coordinates), true))
    }

    /// Import `path`, yielding progress events. The stream ends with
    /// [`IngestEvent::Completed`], or with an error if the file is unusable.
    pub fn ingest_stream(
        &self,
        path: impl AsRef<Path>,
    ) -> impl Stream<Item = Result<IngestEvent, IngestError>> + '_ {
        let path = path.as_ref().to_path_buf();

        try_stream! {
            let rows = read_rows(&path).await?;
            info!(path = %path.display(), rows = rows.len(), collection = %self.collection, "importing spreadsheet");
            yield IngestEvent::Started { rows: rows.len() };

            let mut summary = IngestSummary {
                rows: rows.len(),
                ..IngestSummary::default()
            };

            for (index, cells) in rows.iter().enumerate() {
                let row = index + 1;
                match self.resolve_row(cells).await {
                    Ok((record, geocoded)) => {
                        let record_id = record.id.clone();
                        let geohash = record.spatial_hash().unwrap_or_default().to_string();
                        let document = record.to_representation();

                        match self.store.put(&self.collection, &record_id, &document).await {
                            Ok(()) => {
                                summary.stored += 1;
                                if geocoded {
                                    summary.geocoded += 1;
                                }
                                debug!(row, record_id = %record_id, geohash = %geohash, geocoded, "stored record");
                                yield IngestEvent::RowStored { row, record_id, geohash, geocoded };
                            }
                            Err(error) => {
                                summary.store_failed += 1;
                                warn!(row, record_id = %record_id, error = %error, "failed to store record");
                                yield IngestEvent::StoreFailed { row, record_id, error };
                            }
                        }
                    }
                    Err(reason) => {
                        summary.skipped += 1;
                        match &reason {
                            SkipReason::NoCoordinates => {
                                debug!(row, "skipping row without coordinates or address")
                            }
                            SkipReason::Geocode(error) => {
                                warn!(row, error = %error, "skipping row after geocoding failure")
                            }
                        }
                        yield IngestEvent::RowSkipped { row, reason };
                    }
                }
            }

            info!(
                rows = summary.rows,
                stored = summary.stored,
                geocoded = summary.geocoded,
                skipped = summary.skipped,
                store_failed = summary.store_failed,
                "spreadsheet import finished"
            );
            yield IngestEvent::Completed { summary };
        }
    }

    /// Import `path` to completion and return the counters.
    pub async fn ingest(&self, path: impl AsRef<Path>) -> Result<IngestSummary, IngestError> {
        let mut stream = pin!(self.ingest_stream(path));
        let mut summary = IngestSummary::default();
        while let Some(event) = stream.next().await {
            if let IngestEvent::Completed { summary: done } = event? {
                summary = done;
            }
        }
        Ok(summary)
    }
}

/// Import `path` into the bootstrap's store using the production geocoder
/// and the default collection and column layout.
pub async fn ingest(
    path: impl AsRef<Path>,
    api_key: &str,
    bootstrap: &Bootstrap,
) -> Result<IngestSummary, IngestError> {
    let geocoder = GoogleGeocoder::new(api_key).map_err(IngestError::GeocoderSetup)?;
    SpreadsheetIngestor::builder()
        .geocoder(Arc::new(geocoder))
        .store(bootstrap.store.clone())
        .build()
        .ingest(path)
        .await
}

/// Parse the first sheet of `path` into data rows, dropping the header row.
/// Rows and columns are positioned from cell A1 even when the used range
/// starts further down or right: sheet row 0 is always the header, and data
/// row `n` is sheet row `n`.
pub async fn read_rows(path: &Path) -> Result<Vec<Vec<Cell>>, IngestError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(IngestError::unreadable(path, "not a regular file")),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(IngestError::unreadable(path, err.to_string())),
    }

    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_first_sheet(&owned))
        .await
        .map_err(|err| IngestError::Join(Arc::new(err)))?
}

fn read_first_sheet(path: &Path) -> Result<Vec<Vec<Cell>>, IngestError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|err| IngestError::unreadable(path, err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::unreadable(path, "workbook has no sheets"))?
        .map_err(|err| IngestError::unreadable(path, err.to_string()))?;

    let Some((first_row, first_column)) = range.start() else {
        return Err(IngestError::unreadable(path, "first sheet is empty"));
    };
    let offset = first_column as usize;

    let leading = std::iter::repeat_with(Vec::new).take(first_row as usize);
    let used = range.rows().map(|row| {
        let mut cells = vec![Cell::Empty; offset];
        cells.extend(row.iter().map(Cell::from));
        cells
    });
    Ok(leading.chain(used).skip(1).collect())
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}
