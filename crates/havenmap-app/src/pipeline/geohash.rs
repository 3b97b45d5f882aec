//! Geohash encoding: base-32 interleaved bisection of longitude/latitude.
//!
//! Even bits refine longitude, odd bits refine latitude, five bits per output
//! character. Shared prefixes imply spatial proximity.

use thiserror::Error;

use super::coordinates::{
    Coordinates, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE,
};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const BITS_PER_CHAR: usize = 5;

/// Precision used for the `geohash` field of persisted records.
pub const DEFAULT_PRECISION: usize = 10;
/// Finer cells are below f64 resolution for longitude.
pub const MAX_PRECISION: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeohashError {
    #[error("geohash precision must be within 1..={MAX_PRECISION}, got {0}")]
    InvalidPrecision(usize),
    #[error("geohash must not be empty")]
    Empty,
    #[error("invalid geohash character `{character}` at position {position}")]
    InvalidCharacter { character: char, position: usize },
    #[error("geohash `{hash}` has no {direction:?} neighbor")]
    NoNeighbor { hash: String, direction: Direction },
}

/// Cardinal direction for [`neighbor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    fn offsets(self) -> (f64, f64) {
        match self {
            Direction::North => (1.0, 0.0),
            Direction::South => (-1.0, 0.0),
            Direction::East => (0.0, 1.0),
            Direction::West => (0.0, -1.0),
        }
    }
}

/// Cell covered by a geohash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Coordinates {
        Coordinates::new_unchecked(
            (self.min_latitude + self.max_latitude) / 2.0,
            (self.min_longitude + self.max_longitude) / 2.0,
        )
    }

    pub fn latitude_error(&self) -> f64 {
        (self.max_latitude - self.min_latitude) / 2.0
    }

    pub fn longitude_error(&self) -> f64 {
        (self.max_longitude - self.min_longitude) / 2.0
    }

    pub fn contains(&self, coords: Coordinates) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coords.latitude())
            && (self.min_longitude..=self.max_longitude).contains(&coords.longitude())
    }
}

/// Encode `coords` into a geohash of `precision` characters.
pub fn encode(coords: Coordinates, precision: usize) -> Result<String, GeohashError> {
    if precision == 0 || precision > MAX_PRECISION {
        return Err(GeohashError::InvalidPrecision(precision));
    }
    Ok(encode_unchecked(coords, precision))
}

/// Encode with [`DEFAULT_PRECISION`].
pub fn encode_default(coords: Coordinates) -> String {
    encode_unchecked(coords, DEFAULT_PRECISION)
}

fn encode_unchecked(coords: Coordinates, precision: usize) -> String {
    let mut lat_range = (MIN_LATITUDE, MAX_LATITUDE);
    let mut lon_range = (MIN_LONGITUDE, MAX_LONGITUDE);
    let mut hash = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0;
    let mut index = 0usize;

    while hash.len() < precision {
        let (range, value) = if even {
            (&mut lon_range, coords.longitude())
        } else {
            (&mut lat_range, coords.latitude())
        };
        let mid = (range.0 + range.1) / 2.0;
        index <<= 1;
        if value >= mid {
            index |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;
        bits += 1;

        if bits == BITS_PER_CHAR {
            hash.push(BASE32[index] as char);
            bits = 0;
            index = 0;
        }
    }

    hash
}

/// Decode a geohash into the cell it covers. Case-insensitive.
pub fn decode_bbox(hash: &str) -> Result<BoundingBox, GeohashError> {
    if hash.is_empty() {
        return Err(GeohashError::Empty);
    }

    let mut lat_range = (MIN_LATITUDE, MAX_LATITUDE);
    let mut lon_range = (MIN_LONGITUDE, MAX_LONGITUDE);
    let mut even = true;

    for (position, character) in hash.chars().enumerate() {
        let value = char_value(character).ok_or(GeohashError::InvalidCharacter {
            character,
            position,
        })?;
        for shift in (0..BITS_PER_CHAR).rev() {
            let range = if even {
                &mut lon_range
            } else {
                &mut lat_range
            };
            let mid = (range.0 + range.1) / 2.0;
            if (value >> shift) & 1 == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even = !even;
        }
    }

    Ok(BoundingBox {
        min_latitude: lat_range.0,
        max_latitude: lat_range.1,
        min_longitude: lon_range.0,
        max_longitude: lon_range.1,
    })
}

/// Decode to the cell center plus latitude/longitude error margins.
pub fn decode(hash: &str) -> Result<(Coordinates, f64, f64), GeohashError> {
    let bbox = decode_bbox(hash)?;
    Ok((bbox.center(), bbox.latitude_error(), bbox.longitude_error()))
}

/// Adjacent cell of the same precision. Longitude wraps at the antimeridian;
/// there is nothing north of the northernmost row (or south of the southernmost).
pub fn neighbor(hash: &str, direction: Direction) -> Result<String, GeohashError> {
    let bbox = decode_bbox(hash)?;
    let center = bbox.center();
    let (d_lat, d_lon) = direction.offsets();

    let latitude = center.latitude() + d_lat * bbox.latitude_error() * 2.0;
    if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(GeohashError::NoNeighbor {
            hash: hash.to_string(),
            direction,
        });
    }

    let mut longitude = center.longitude() + d_lon * bbox.longitude_error() * 2.0;
    if longitude > MAX_LONGITUDE {
        longitude -= 360.0;
    } else if longitude < MIN_LONGITUDE {
        longitude += 360.0;
    }

    Ok(encode_unchecked(
        Coordinates::new_unchecked(latitude, longitude),
        hash.chars().count(),
    ))
}

fn char_value(character: char) -> Option<usize> {
    let lower = character.to_ascii_lowercase();
    if !lower.is_ascii() {
        return None;
    }
    BASE32.iter().position(|&c| c == lower as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(lat: f64, lon: f64) -> Coordinates {
        Coordinates::new(lat, lon).expect("valid test coordinates")
    }

    #[test]
    fn encodes_reference_points() {
        assert_eq!(
            encode(coords(57.64911, 10.40744), 11).unwrap(),
            "u4pruydqqvj"
        );
        assert_eq!(encode(coords(42.6, -5.6), 5).unwrap(), "ezs42");
        assert_eq!(encode_default(coords(0.0, 0.0)), "s000000000");
        assert_eq!(encode_default(coords(37.42, -122.08)), "9q9hyh053c");
    }

    #[test]
    fn extreme_corners_stay_in_range() {
        assert_eq!(encode(coords(90.0, 180.0), 5).unwrap(), "zzzzz");
        assert_eq!(encode(coords(-90.0, -180.0), 5).unwrap(), "00000");
    }

    #[test]
    fn encode_is_deterministic() {
        let point = coords(-33.8688, 151.2093);
        assert_eq!(encode_default(point), encode_default(point));
    }

    #[test]
    fn rejects_invalid_precision() {
        let point = coords(1.0, 1.0);
        assert_eq!(encode(point, 0), Err(GeohashError::InvalidPrecision(0)));
        assert_eq!(
            encode(point, MAX_PRECISION + 1),
            Err(GeohashError::InvalidPrecision(MAX_PRECISION + 1))
        );
    }

    #[test]
    fn decodes_cell_bounds() {
        let bbox = decode_bbox("ezs42").unwrap();
        assert_eq!(bbox.min_latitude, 42.5830078125);
        assert_eq!(bbox.max_latitude, 42.626953125);
        assert_eq!(bbox.min_longitude, -5.625);
        assert_eq!(bbox.max_longitude, -5.5810546875);

        let (center, lat_err, lon_err) = decode("EZS42").unwrap();
        assert!((center.latitude() - 42.60498046875).abs() < 1e-12);
        assert!((center.longitude() + 5.60302734375).abs() < 1e-12);
        assert!(lat_err > 0.0 && lon_err > 0.0);
    }

    #[test]
    fn decoded_cell_contains_encoded_point() {
        let point = coords(37.42, -122.08);
        let hash = encode_default(point);
        assert!(decode_bbox(&hash).unwrap().contains(point));
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(decode_bbox(""), Err(GeohashError::Empty));
        assert_eq!(
            decode_bbox("ezs4a"),
            Err(GeohashError::InvalidCharacter {
                character: 'a',
                position: 4
            })
        );
    }

    #[test]
    fn neighbors_of_reference_cell() {
        assert_eq!(neighbor("ezs42", Direction::North).unwrap(), "ezs48");
        assert_eq!(neighbor("ezs42", Direction::South).unwrap(), "ezs40");
        assert_eq!(neighbor("ezs42", Direction::East).unwrap(), "ezs43");
        assert_eq!(neighbor("ezs42", Direction::West).unwrap(), "ezefr");
    }

    #[test]
    fn neighbor_wraps_antimeridian_and_stops_at_poles() {
        assert_eq!(neighbor("b", Direction::West).unwrap(), "z");
        assert!(matches!(
            neighbor("zzzzz", Direction::North),
            Err(GeohashError::NoNeighbor { .. })
        ));
    }
}
