use crate::pipeline::geohash::MAX_PRECISION;
use crate::services::validate_key;

/// Validate geohash precision: must be between 1 and 12.
pub fn validate_precision(s: &str) -> Result<usize, String> {
    let value = s
        .parse::<usize>()
        .map_err(|_| format!("invalid number: {}", s))?;

    if value == 0 {
        return Err("precision must be at least 1".to_string());
    }

    if value > MAX_PRECISION {
        return Err(format!("precision cannot exceed {MAX_PRECISION}"));
    }

    Ok(value)
}

/// Validate collection name: non-empty, no path separators, no leading dot.
pub fn validate_collection(s: &str) -> Result<String, String> {
    validate_key(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
