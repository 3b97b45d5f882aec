//! IO-bound collaborators of the importer.
//!
//! Everything that talks to the network or the filesystem on behalf of the
//! pipeline lives here. Pure transforms stay in `crate::pipeline`.

pub mod bootstrap;
pub mod document_store;
pub mod firestore;
pub mod geocode;

pub use bootstrap::{AuthHandle, Bootstrap, BootstrapError, CredentialSource, Credentials};
pub use document_store::{
    Document, DocumentStore, DurableWrite, FsDocumentStore, MemoryDocumentStore, StoreError,
    validate_key,
};
pub use firestore::{FirestoreStore, decode_fields, encode_fields};
pub use geocode::{GeocodeError, Geocoder, GoogleGeocoder, parse_response};
