//! Pure transformations from spreadsheet rows to located records.
//!
//! Modules under this namespace must remain free of IO and external side effects
//! so the ingestor and tests can share them.

pub mod coordinates;
pub mod geohash;
pub mod record;
pub mod row;

pub use coordinates::{CoordinateError, Coordinates};
pub use geohash::{BoundingBox, Direction, GeohashError};
pub use record::{Record, RecordError};
pub use row::{Cell, ColumnLayout, RowCandidate, map_row};
