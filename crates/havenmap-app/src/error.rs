//! Application-level error type for the `havenmap` binary.

use thiserror::Error;

use crate::config;
use crate::ingestion::{IngestError, ManifestError};
use crate::paths::PathError;
use crate::pipeline::{CoordinateError, GeohashError, RecordError};
use crate::services::{BootstrapError, GeocodeError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Geohash(#[from] GeohashError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("record `{id}` not found in collection `{collection}`")]
    RecordNotFound { collection: String, id: String },
    #[error(transparent)]
    Coordinates(#[from] CoordinateError),
}
