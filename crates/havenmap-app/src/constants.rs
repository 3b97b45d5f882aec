//! Cross-cutting application constants.

/// Stored in place of required text fields whose source cell is empty.
pub const UNSPECIFIED: &str = "N/A";

/// Rows are read as if they had at least this many columns.
pub const MIN_ROW_WIDTH: usize = 8;

/// Collection that receives imported records unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "resources";

/// Success sentinel of the geocoding API `status` field.
pub const GEOCODE_STATUS_OK: &str = "OK";

/// File name of the import ledger under the data directory.
pub const IMPORT_MANIFEST_FILE: &str = "import_manifest.ndjson";
