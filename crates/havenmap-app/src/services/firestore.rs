//! Firestore REST backend for [`DocumentStore`].
//!
//! Documents travel as Firestore typed values (`stringValue`, `doubleValue`,
//! `mapValue`, ...); [`encode_fields`] and [`decode_fields`] convert between
//! those and plain JSON objects.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map as JsonMap, Number, Value as JsonValue, json};
use tracing::debug;
use url::Url;

use crate::services::bootstrap::AuthHandle;
use crate::services::document_store::{Document, DocumentStore, StoreError, validate_key};

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1/";
pub const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";
const LIST_PAGE_SIZE: &str = "300";
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct FirestoreStore {
    http: Client,
    documents_root: Url,
    auth: AuthHandle,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: JsonMap<String, JsonValue>,
}

#[derive(Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

impl FirestoreStore {
    /// Build a client for `projects/{project}/databases/{database}` under
    /// `base_url`. The project comes from the auth handle.
    pub fn new(base_url: &str, database: &str, auth: AuthHandle) -> Result<Self, StoreError> {
        let project_id = auth
            .project_id()
            .ok_or_else(|| StoreError::InvalidKey("firestore requires a project id".to_string()))?;
        validate_key(project_id)?;
        validate_key(database)?;

        let documents_root = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidKey(format!("{base_url}: {e}")))
            .and_then(|base| {
                with_segments(
                    base,
                    &["projects", project_id, "databases", database, "documents"],
                )
            })?;

        let http = Client::builder()
            .user_agent(concat!("havenmap/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            documents_root,
            auth,
        })
    }

    fn collection_url(&self, collection: &str) -> Result<Url, StoreError> {
        validate_key(collection)?;
        with_segments(self.documents_root.clone(), &[collection])
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url, StoreError> {
        validate_key(collection)?;
        validate_key(id)?;
        with_segments(self.documents_root.clone(), &[collection, id])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Append each key as one percent-encoded path segment, so `?`, `#` or `:`
/// inside a key can never change the query, fragment or scheme.
fn with_segments(mut url: Url, segments: &[&str]) -> Result<Url, StoreError> {
    let base = url.to_string();
    url.path_segments_mut()
        .map_err(|()| StoreError::InvalidKey(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn status_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    StoreError::HttpStatus { status, message }
}

#[async_trait::async_trait]
impl DocumentStore for FirestoreStore {
    async fn put(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError> {
        let url = self.document_url(collection, id)?;
        let body = json!({ "fields": encode_fields(document) });

        let response = self
            .authorize(self.http.patch(url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        debug!(collection, id, "stored firestore document");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.authorize(self.http.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload = response.bytes().await?;
        let document: FirestoreDocument = serde_json::from_slice(&payload)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_fields(&document.fields).map(Some)
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let url = self.collection_url(collection)?;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let response = self
                .authorize(self.http.get(url.clone()))
                .query(&query)
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                break;
            }
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let payload = response.bytes().await?;
            let page: ListDocumentsResponse = serde_json::from_slice(&payload)
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            ids.extend(page.documents.into_iter().filter_map(|doc| {
                doc.name
                    .rsplit('/')
                    .next()
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }
}

/// Encode a JSON object as a Firestore `fields` map.
pub fn encode_fields(document: &Document) -> JsonMap<String, JsonValue> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({ "nullValue": null }),
        JsonValue::Bool(b) => json!({ "booleanValue": b }),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n })
            }
        }
        JsonValue::String(s) => json!({ "stringValue": s }),
        JsonValue::Array(items) => {
            let values: Vec<JsonValue> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        JsonValue::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Decode a Firestore `fields` map back into a plain JSON object.
pub fn decode_fields(fields: &JsonMap<String, JsonValue>) -> Result<Document, StoreError> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

fn decode_value(typed: &JsonValue) -> Result<JsonValue, StoreError> {
    let object = typed
        .as_object()
        .filter(|object| object.len() == 1)
        .ok_or_else(|| StoreError::Decode(format!("expected a typed value, got {typed}")))?;
    let Some((kind, inner)) = object.iter().next() else {
        return Err(StoreError::Decode("empty typed value".to_string()));
    };

    let decoded = match (kind.as_str(), inner) {
        ("nullValue", _) => JsonValue::Null,
        ("booleanValue", JsonValue::Bool(b)) => JsonValue::Bool(*b),
        ("integerValue", JsonValue::String(s)) => s
            .parse::<i64>()
            .map(JsonValue::from)
            .map_err(|e| StoreError::Decode(format!("integerValue `{s}`: {e}")))?,
        ("integerValue", JsonValue::Number(n)) => JsonValue::Number(n.clone()),
        ("doubleValue", JsonValue::Number(n)) => n
            .as_f64()
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| StoreError::Decode(format!("doubleValue `{n}`")))?,
        (
            "stringValue" | "timestampValue" | "referenceValue" | "bytesValue",
            JsonValue::String(s),
        ) => JsonValue::String(s.clone()),
        ("arrayValue", JsonValue::Object(array)) => {
            let values = match array.get("values") {
                None => Vec::new(),
                Some(JsonValue::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(other) => {
                    return Err(StoreError::Decode(format!("arrayValue.values {other}")));
                }
            };
            JsonValue::Array(values)
        }
        ("mapValue", JsonValue::Object(map)) => match map.get("fields") {
            None => JsonValue::Object(JsonMap::new()),
            Some(JsonValue::Object(fields)) => JsonValue::Object(decode_fields(fields)?),
            Some(other) => return Err(StoreError::Decode(format!("mapValue.fields {other}"))),
        },
        ("geoPointValue", JsonValue::Object(point)) => JsonValue::Object(point.clone()),
        (kind, value) => {
            return Err(StoreError::Decode(format!(
                "unsupported typed value {kind}: {value}"
            )));
        }
    };

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(base_url: &str) -> FirestoreStore {
        let auth = AuthHandle::new(crate::services::Credentials {
            project_id: "demo".to_string(),
            client_email: None,
            access_token: None,
        });
        FirestoreStore::new(base_url, "(default)", auth).expect("firestore store")
    }

    #[test]
    fn document_urls_escape_reserved_characters() {
        let store = store_at("https://firestore.googleapis.com/v1/");
        let root = "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents";

        let url = store.document_url("resources", "abc").unwrap();
        assert_eq!(url.as_str(), format!("{root}/resources/abc"));

        let url = store.document_url("resources", "a?b").unwrap();
        assert_eq!(url.as_str(), format!("{root}/resources/a%3Fb"));
        assert_eq!(url.query(), None);

        let url = store.document_url("res#x", "abc").unwrap();
        assert_eq!(url.as_str(), format!("{root}/res%23x/abc"));
        assert_eq!(url.fragment(), None);

        let url = store.document_url("x:y", "id").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.as_str(), format!("{root}/x:y/id"));

        let url = store.document_url("resources", "100%").unwrap();
        assert_eq!(url.as_str(), format!("{root}/resources/100%25"));

        let url = store.collection_url("res#x").unwrap();
        assert_eq!(url.as_str(), format!("{root}/res%23x"));
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_its_path() {
        let store = store_at("http://127.0.0.1:8080/v1");
        assert_eq!(
            store.collection_url("resources").unwrap().as_str(),
            "http://127.0.0.1:8080/v1/projects/demo/databases/(default)/documents/resources"
        );
    }

    #[test]
    fn encodes_scalar_and_nested_values() {
        let document = json!({
            "id": "abc",
            "count": 3,
            "ratio": 0.5,
            "flag": true,
            "missing": null,
            "coordinates": {"latitude": 37.42, "longitude": -122.08},
            "tags": ["a", 1]
        });
        let fields = encode_fields(document.as_object().unwrap());

        assert_eq!(fields["id"], json!({"stringValue": "abc"}));
        assert_eq!(fields["count"], json!({"integerValue": "3"}));
        assert_eq!(fields["ratio"], json!({"doubleValue": 0.5}));
        assert_eq!(fields["flag"], json!({"booleanValue": true}));
        assert_eq!(fields["missing"], json!({"nullValue": null}));
        assert_eq!(
            fields["coordinates"],
            json!({"mapValue": {"fields": {
                "latitude": {"doubleValue": 37.42},
                "longitude": {"doubleValue": -122.08}
            }}})
        );
        assert_eq!(
            fields["tags"],
            json!({"arrayValue": {"values": [{"stringValue": "a"}, {"integerValue": "1"}]}})
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let document = json!({
            "id": "abc",
            "count": -7,
            "whole_float": 2.0,
            "coordinates": {"latitude": 0.0, "longitude": 151.2093},
            "geohash": null,
            "list": [[], {}]
        });
        let object = document.as_object().unwrap();
        let decoded = decode_fields(&encode_fields(object)).unwrap();
        assert_eq!(&decoded, object);
    }

    #[test]
    fn decodes_sparse_server_shapes() {
        let fields = json!({
            "empty_map": {"mapValue": {}},
            "empty_list": {"arrayValue": {}},
            "when": {"timestampValue": "2024-01-01T00:00:00Z"}
        });
        let decoded = decode_fields(fields.as_object().unwrap()).unwrap();
        assert_eq!(decoded["empty_map"], json!({}));
        assert_eq!(decoded["empty_list"], json!([]));
        assert_eq!(decoded["when"], json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn rejects_unknown_or_malformed_values() {
        for bad in [
            json!({"x": {"mysteryValue": 1}}),
            json!({"x": {"integerValue": "1.5"}}),
            json!({"x": "bare"}),
            json!({"x": {"stringValue": "a", "booleanValue": true}}),
        ] {
            assert!(decode_fields(bad.as_object().unwrap()).is_err(), "{bad}");
        }
    }
}
