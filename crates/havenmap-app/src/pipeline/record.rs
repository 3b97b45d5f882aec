//! Normalized service listing and its document representation.
//!
//! The geohash is never set on its own: it is derived whenever coordinates are
//! attached, and recomputed (not trusted) when a persisted document is read
//! back.

use bon::Builder;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use super::coordinates::Coordinates;
use super::geohash;

/// Wire keys of the document representation.
pub mod keys {
    pub const ID: &str = "id";
    pub const SOURCE_SERVICE: &str = "sourceService";
    pub const CONTACT: &str = "contact";
    pub const AGENCY_PROVIDER: &str = "agencyProvider";
    pub const WEBSITE: &str = "website";
    pub const ADDRESS: &str = "address";
    pub const INFORMATION: &str = "information";
    pub const HOURS_OF_OPERATION: &str = "hoursOfOperation";
    pub const COORDINATES: &str = "coordinates";
    pub const GEOHASH: &str = "geohash";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";

    /// Every top-level key, in representation order.
    pub const ALL: [&str; 10] = [
        ID,
        SOURCE_SERVICE,
        CONTACT,
        AGENCY_PROVIDER,
        WEBSITE,
        ADDRESS,
        INFORMATION,
        HOURS_OF_OPERATION,
        COORDINATES,
        GEOHASH,
    ];
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required field `{0}`")]
    MissingRequiredField(&'static str),
    #[error("field `{field}` has an invalid value (expected {expected})")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Location {
    coordinates: Coordinates,
    geohash: String,
}

impl Location {
    fn new(coordinates: Coordinates) -> Self {
        Self {
            geohash: geohash::encode_default(coordinates),
            coordinates,
        }
    }
}

/// One imported service/resource listing.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct Record {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub source_service: String,
    pub contact: Option<String>,
    #[builder(into)]
    pub agency_provider: String,
    pub website: Option<String>,
    pub address: Option<String>,
    pub information: Option<String>,
    #[builder(into)]
    pub hours_of_operation: String,
    #[builder(skip)]
    location: Option<Location>,
}

impl Record {
    /// Return a copy of this record located at `coordinates`, with the geohash
    /// derived from them.
    pub fn with_coordinates(self, coordinates: Coordinates) -> Self {
        Self {
            location: Some(Location::new(coordinates)),
            ..self
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.location.as_ref().map(|loc| loc.coordinates)
    }

    pub fn spatial_hash(&self) -> Option<&str> {
        self.location.as_ref().map(|loc| loc.geohash.as_str())
    }

    /// Document representation. Every key in [`keys::ALL`] is present; absent
    /// optional values are `null`.
    pub fn to_representation(&self) -> JsonMap<String, JsonValue> {
        let mut map = JsonMap::with_capacity(keys::ALL.len());
        map.insert(keys::ID.into(), JsonValue::from(self.id.as_str()));
        map.insert(
            keys::SOURCE_SERVICE.into(),
            JsonValue::from(self.source_service.as_str()),
        );
        map.insert(keys::CONTACT.into(), optional_text(&self.contact));
        map.insert(
            keys::AGENCY_PROVIDER.into(),
            JsonValue::from(self.agency_provider.as_str()),
        );
        map.insert(keys::WEBSITE.into(), optional_text(&self.website));
        map.insert(keys::ADDRESS.into(), optional_text(&self.address));
        map.insert(keys::INFORMATION.into(), optional_text(&self.information));
        map.insert(
            keys::HOURS_OF_OPERATION.into(),
            JsonValue::from(self.hours_of_operation.as_str()),
        );

        match &self.location {
            Some(location) => {
                let mut coords = JsonMap::with_capacity(2);
                coords.insert(
                    keys::LATITUDE.into(),
                    JsonValue::from(location.coordinates.latitude()),
                );
                coords.insert(
                    keys::LONGITUDE.into(),
                    JsonValue::from(location.coordinates.longitude()),
                );
                map.insert(keys::COORDINATES.into(), JsonValue::Object(coords));
                map.insert(
                    keys::GEOHASH.into(),
                    JsonValue::from(location.geohash.as_str()),
                );
            }
            None => {
                map.insert(keys::COORDINATES.into(), JsonValue::Null);
                map.insert(keys::GEOHASH.into(), JsonValue::Null);
            }
        }

        map
    }

    /// Inverse of [`Record::to_representation`]. Missing and `null` optional
    /// fields are both read as absent. A stored `geohash` is validated as a
    /// string but otherwise ignored in favor of one derived from `coordinates`.
    pub fn from_representation(map: &JsonMap<String, JsonValue>) -> Result<Self, RecordError> {
        let record = Record::builder()
            .id(required_text(map, keys::ID)?)
            .source_service(required_text(map, keys::SOURCE_SERVICE)?)
            .maybe_contact(optional_field(map, keys::CONTACT)?)
            .agency_provider(required_text(map, keys::AGENCY_PROVIDER)?)
            .maybe_website(optional_field(map, keys::WEBSITE)?)
            .maybe_address(optional_field(map, keys::ADDRESS)?)
            .maybe_information(optional_field(map, keys::INFORMATION)?)
            .hours_of_operation(required_text(map, keys::HOURS_OF_OPERATION)?)
            .build();

        // Validated for shape only; the derived value wins.
        optional_field(map, keys::GEOHASH)?;

        match parse_coordinates(map)? {
            Some(coordinates) => Ok(record.with_coordinates(coordinates)),
            None => Ok(record),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_representation().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = JsonMap::<String, JsonValue>::deserialize(deserializer)?;
        Record::from_representation(&map).map_err(D::Error::custom)
    }
}

fn optional_text(value: &Option<String>) -> JsonValue {
    value
        .as_deref()
        .map(JsonValue::from)
        .unwrap_or(JsonValue::Null)
}

fn required_text(
    map: &JsonMap<String, JsonValue>,
    field: &'static str,
) -> Result<String, RecordError> {
    optional_field(map, field)?.ok_or(RecordError::MissingRequiredField(field))
}

fn optional_field(
    map: &JsonMap<String, JsonValue>,
    field: &'static str,
) -> Result<Option<String>, RecordError> {
    match map.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(RecordError::InvalidField {
            field,
            expected: "string",
        }),
    }
}

fn parse_coordinates(
    map: &JsonMap<String, JsonValue>,
) -> Result<Option<Coordinates>, RecordError> {
    const INVALID: RecordError = RecordError::InvalidField {
        field: keys::COORDINATES,
        expected: "object with in-range numeric latitude and longitude",
    };

    let object = match map.get(keys::COORDINATES) {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Object(object)) => object,
        Some(_) => return Err(INVALID),
    };

    let latitude = object.get(keys::LATITUDE).and_then(JsonValue::as_f64);
    let longitude = object.get(keys::LONGITUDE).and_then(JsonValue::as_f64);
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Coordinates::new(lat, lon).map(Some).map_err(|_| INVALID),
        _ => Err(INVALID),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> Record {
        Record::builder()
            .id("3f2b8c1e-0000-4000-8000-000000000001")
            .source_service("Food Bank")
            .contact("555-1234".to_string())
            .agency_provider("Helping Hands")
            .website("example.org".to_string())
            .address("123 Main St".to_string())
            .information("Info text".to_string())
            .hours_of_operation("9-5 M-F")
            .build()
            .with_coordinates(Coordinates::new(37.42, -122.08).unwrap())
    }

    fn bare_record() -> Record {
        Record::builder()
            .id("rec-2")
            .source_service("N/A")
            .agency_provider("N/A")
            .hours_of_operation("N/A")
            .build()
    }

    #[test]
    fn round_trips_fully_populated_record() {
        let record = full_record();
        let restored = Record::from_representation(&record.to_representation()).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn round_trips_record_without_optionals() {
        let record = bare_record();
        let restored = Record::from_representation(&record.to_representation()).unwrap();
        assert_eq!(restored, record);
        assert!(restored.coordinates().is_none());
        assert!(restored.spatial_hash().is_none());
    }

    #[test]
    fn round_trips_through_serialized_json() {
        let record = full_record();
        let text = serde_json::to_string(&record).unwrap();
        let restored: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn representation_has_exact_key_set() {
        let map = bare_record().to_representation();
        let mut actual: Vec<&str> = map.keys().map(String::as_str).collect();
        let mut expected = keys::ALL.to_vec();
        actual.sort_unstable();
        expected.sort_unstable();
        assert_eq!(actual, expected);
        assert_eq!(map[keys::COORDINATES], JsonValue::Null);
        assert_eq!(map[keys::GEOHASH], JsonValue::Null);
    }

    #[test]
    fn representation_nests_coordinates() {
        let map = full_record().to_representation();
        assert_eq!(
            map[keys::COORDINATES],
            json!({"latitude": 37.42, "longitude": -122.08})
        );
        assert_eq!(map[keys::GEOHASH], json!("9q9hyh053c"));
    }

    #[test]
    fn spatial_hash_tracks_coordinates() {
        let record = bare_record();
        assert!(record.spatial_hash().is_none());

        let located = record.with_coordinates(Coordinates::new(0.0, 0.0).unwrap());
        assert_eq!(located.spatial_hash(), Some("s000000000"));

        let moved = located.with_coordinates(Coordinates::new(42.6, -5.6).unwrap());
        assert!(moved.spatial_hash().unwrap().starts_with("ezs42"));
    }

    #[test]
    fn stored_geohash_is_recomputed() {
        let mut map = full_record().to_representation();
        map.insert(keys::GEOHASH.into(), json!("zzzz"));
        let restored = Record::from_representation(&map).unwrap();
        assert_eq!(restored.spatial_hash(), Some("9q9hyh053c"));
    }

    #[test]
    fn missing_optional_keys_are_absent() {
        let map = json!({
            "id": "a",
            "sourceService": "s",
            "agencyProvider": "p",
            "hoursOfOperation": "h"
        });
        let record = Record::from_representation(map.as_object().unwrap()).unwrap();
        assert!(record.contact.is_none());
        assert!(record.coordinates().is_none());
    }

    #[test]
    fn reports_each_missing_required_field() {
        for field in [
            keys::ID,
            keys::SOURCE_SERVICE,
            keys::AGENCY_PROVIDER,
            keys::HOURS_OF_OPERATION,
        ] {
            let mut map = bare_record().to_representation();
            map.remove(field);
            assert_eq!(
                Record::from_representation(&map),
                Err(RecordError::MissingRequiredField(field))
            );
        }
    }

    #[test]
    fn rejects_malformed_values() {
        let mut map = bare_record().to_representation();
        map.insert(keys::CONTACT.into(), json!(42));
        assert!(matches!(
            Record::from_representation(&map),
            Err(RecordError::InvalidField { field: "contact", .. })
        ));

        let mut map = bare_record().to_representation();
        map.insert(keys::COORDINATES.into(), json!({"latitude": 91.0, "longitude": 0.0}));
        assert!(matches!(
            Record::from_representation(&map),
            Err(RecordError::InvalidField { field: "coordinates", .. })
        ));
    }
}
