//! Mapping of spreadsheet rows onto record candidates.

use serde::Deserialize;

use super::coordinates::Coordinates;
use super::record::Record;
use crate::constants::{MIN_ROW_WIDTH, UNSPECIFIED};

/// A single spreadsheet cell, independent of the workbook format.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Trimmed textual value; `None` for empty or whitespace-only cells.
    pub fn text(&self) -> Option<String> {
        let text = match self {
            Cell::Empty => return None,
            Cell::Text(text) => text.trim().to_string(),
            Cell::Number(value) => format_number(*value),
            Cell::Bool(value) => value.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Best-effort numeric value: numbers as-is, text parsed after trimming.
    pub fn number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value).filter(|v| v.is_finite()),
            Cell::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Source column (0-indexed) of every record field.
///
/// The default mirrors the established sheet format, where longitude and
/// information share column 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub source_service: usize,
    pub contact: usize,
    pub agency_provider: usize,
    pub website: usize,
    pub address: usize,
    pub latitude: usize,
    pub longitude: usize,
    pub information: usize,
    pub hours_of_operation: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            source_service: 0,
            contact: 1,
            agency_provider: 2,
            website: 3,
            address: 4,
            latitude: 5,
            longitude: 6,
            information: 6,
            hours_of_operation: 7,
        }
    }
}

impl ColumnLayout {
    /// Number of columns a row is conceptually padded to.
    pub fn width(&self) -> usize {
        [
            self.source_service,
            self.contact,
            self.agency_provider,
            self.website,
            self.address,
            self.latitude,
            self.longitude,
            self.information,
            self.hours_of_operation,
        ]
        .into_iter()
        .max()
        .map_or(MIN_ROW_WIDTH, |last| (last + 1).max(MIN_ROW_WIDTH))
    }
}

/// Record built from one row, before any geocoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCandidate {
    pub record: Record,
    /// Present only when both coordinate columns parsed to an in-range pair.
    pub coordinates: Option<Coordinates>,
}

impl RowCandidate {
    /// Address to geocode when the sheet did not carry usable coordinates.
    pub fn geocode_query(&self) -> Option<&str> {
        match self.coordinates {
            Some(_) => None,
            None => self.record.address.as_deref(),
        }
    }
}

/// Map `row` onto a candidate record with identifier `id`. Columns past the
/// end of the row read as empty.
pub fn map_row(row: &[Cell], layout: &ColumnLayout, id: impl Into<String>) -> RowCandidate {
    static MISSING: Cell = Cell::Empty;
    let cell = |index: usize| row.get(index).unwrap_or(&MISSING);
    let text_or_default =
        |index: usize| cell(index).text().unwrap_or_else(|| UNSPECIFIED.to_string());

    let record = Record::builder()
        .id(id)
        .source_service(text_or_default(layout.source_service))
        .maybe_contact(cell(layout.contact).text())
        .agency_provider(text_or_default(layout.agency_provider))
        .maybe_website(cell(layout.website).text())
        .maybe_address(cell(layout.address).text())
        .maybe_information(cell(layout.information).text())
        .hours_of_operation(text_or_default(layout.hours_of_operation))
        .build();

    let coordinates = Coordinates::from_parts(
        cell(layout.latitude).number(),
        cell(layout.longitude).number(),
    );

    RowCandidate {
        record,
        coordinates,
    }
}
