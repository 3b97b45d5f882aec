//! Credential loading and construction of the authenticated store bundle.
//!
//! Nothing here is global: callers build a [`Bootstrap`] once at startup and
//! pass its handles to whatever needs them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::paths::{AppPaths, PathError};
use crate::services::document_store::{DocumentStore, FsDocumentStore, StoreError};
use crate::services::firestore::FirestoreStore;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to read credentials file {path}: {source}")]
    CredentialsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credentials file {path} is not valid JSON: {source}")]
    CredentialsMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credentials are missing `{0}`")]
    MissingField(&'static str),
    #[error("storage backend `{0}` requires credentials")]
    MissingCredentials(StorageBackend),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error("failed to initialize document store: {0}")]
    Store(#[from] StoreError),
}

/// Service account fields needed to reach the document database.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    fn validate(self) -> Result<Self, BootstrapError> {
        if self.project_id.trim().is_empty() {
            return Err(BootstrapError::MissingField("project_id"));
        }
        Ok(self)
    }
}

/// Where credentials come from: a JSON file on disk, or fields supplied
/// directly (typically from environment variables via the config layer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Inline(Credentials),
}

impl CredentialSource {
    pub fn resolve(&self) -> Result<Credentials, BootstrapError> {
        match self {
            CredentialSource::File(path) => {
                let bytes =
                    std::fs::read(path).map_err(|source| BootstrapError::CredentialsUnreadable {
                        path: path.clone(),
                        source,
                    })?;
                let credentials: Credentials = serde_json::from_slice(&bytes).map_err(|source| {
                    BootstrapError::CredentialsMalformed {
                        path: path.clone(),
                        source,
                    }
                })?;
                debug!(path = %path.display(), "loaded credentials from file");
                credentials.validate()
            }
            CredentialSource::Inline(credentials) => credentials.clone().validate(),
        }
    }
}

/// Authentication state shared by store clients.
#[derive(Debug, Clone, Default)]
pub struct AuthHandle {
    credentials: Option<Arc<Credentials>>,
}

impl AuthHandle {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(Arc::new(credentials)),
        }
    }

    /// Handle for backends that need no authentication.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.credentials.as_deref().map(|c| c.project_id.as_str())
    }

    pub fn client_email(&self) -> Option<&str> {
        self.credentials
            .as_deref()
            .and_then(|c| c.client_email.as_deref())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.credentials
            .as_deref()
            .and_then(|c| c.access_token.as_deref())
    }
}

/// Owned bundle of the auth handle and the document store it unlocks.
#[derive(Clone)]
pub struct Bootstrap {
    pub auth: AuthHandle,
    pub store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Bootstrap {
    /// Resolve `source` and open the configured store with those credentials.
    pub fn initialize(
        source: &CredentialSource,
        storage: &StorageConfig,
    ) -> Result<Self, BootstrapError> {
        let auth = AuthHandle::new(source.resolve()?);
        let store = open_store(storage, &auth)?;
        info!(
            backend = %storage.backend,
            project_id = auth.project_id().unwrap_or_default(),
            client_email = auth.client_email().unwrap_or_default(),
            "initialized document store"
        );
        Ok(Self { auth, store })
    }

    /// Open the configured store, using credentials only when a source is
    /// given. The filesystem backend works without them.
    pub fn from_storage(
        source: Option<&CredentialSource>,
        storage: &StorageConfig,
    ) -> Result<Self, BootstrapError> {
        match source {
            Some(source) => Self::initialize(source, storage),
            None if storage.backend == StorageBackend::Fs => {
                let auth = AuthHandle::anonymous();
                let store = open_store(storage, &auth)?;
                debug!(path = %storage.path.display(), "initialized local document store");
                Ok(Self { auth, store })
            }
            None => Err(BootstrapError::MissingCredentials(storage.backend)),
        }
    }

    /// Wrap an existing store, e.g. a test double.
    pub fn local(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            auth: AuthHandle::anonymous(),
            store,
        }
    }

    /// Release the handles. Outstanding clones of the store stay usable.
    pub fn shutdown(self) {
        info!(
            authenticated = self.auth.is_authenticated(),
            "shutting down document store"
        );
        drop(self);
    }
}

fn open_store(
    storage: &StorageConfig,
    auth: &AuthHandle,
) -> Result<Arc<dyn DocumentStore>, BootstrapError> {
    let store: Arc<dyn DocumentStore> = match storage.backend {
        StorageBackend::Fs => Arc::new(
            FsDocumentStore::builder()
                .paths(AppPaths::new(&storage.path)?)
                .durability(storage.durability)
                .build(),
        ),
        StorageBackend::Firestore => Arc::new(FirestoreStore::new(
            &storage.firestore.base_url,
            &storage.firestore.database,
            auth.clone(),
        )?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FirestoreConfig;
    use crate::services::document_store::DurableWrite;
    use tempfile::TempDir;

    fn fs_storage(path: PathBuf) -> StorageConfig {
        StorageConfig {
            backend: StorageBackend::Fs,
            path,
            collection: "resources".to_string(),
            durability: DurableWrite::None,
            firestore: FirestoreConfig::default(),
        }
    }

    fn inline(project_id: &str) -> CredentialSource {
        CredentialSource::Inline(Credentials {
            project_id: project_id.to_string(),
            client_email: Some("importer@example.iam".to_string()),
            access_token: Some("secret-token".to_string()),
        })
    }

    #[test]
    fn resolves_credentials_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("service-account.json");
        std::fs::write(
            &path,
            r#"{"project_id":"demo","client_email":"a@b","access_token":"t","type":"service_account"}"#,
        )
        .unwrap();

        let credentials = CredentialSource::File(path).resolve().unwrap();
        assert_eq!(credentials.project_id, "demo");
        assert_eq!(credentials.client_email.as_deref(), Some("a@b"));
        assert_eq!(credentials.access_token.as_deref(), Some("t"));
    }

    #[test]
    fn reports_unreadable_and_malformed_files() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.json");
        assert!(matches!(
            CredentialSource::File(missing).resolve(),
            Err(BootstrapError::CredentialsUnreadable { .. })
        ));

        let broken = temp.path().join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        assert!(matches!(
            CredentialSource::File(broken).resolve(),
            Err(BootstrapError::CredentialsMalformed { .. })
        ));
    }

    #[test]
    fn rejects_blank_project_id() {
        assert!(matches!(
            inline("  ").resolve(),
            Err(BootstrapError::MissingField("project_id"))
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let CredentialSource::Inline(credentials) = inline("demo") else {
            unreachable!()
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("demo"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn initialize_returns_authenticated_bundle() {
        let temp = TempDir::new().unwrap();
        let bootstrap =
            Bootstrap::initialize(&inline("demo"), &fs_storage(temp.path().to_path_buf()))
                .unwrap();
        assert!(bootstrap.auth.is_authenticated());
        assert_eq!(bootstrap.auth.project_id(), Some("demo"));
        assert_eq!(bootstrap.auth.bearer_token(), Some("secret-token"));
        bootstrap.shutdown();
    }

    #[test]
    fn fs_backend_runs_without_credentials_but_firestore_does_not() {
        let temp = TempDir::new().unwrap();
        let storage = fs_storage(temp.path().to_path_buf());
        let bootstrap = Bootstrap::from_storage(None, &storage).unwrap();
        assert!(!bootstrap.auth.is_authenticated());

        let firestore = StorageConfig {
            backend: StorageBackend::Firestore,
            ..storage
        };
        assert!(matches!(
            Bootstrap::from_storage(None, &firestore),
            Err(BootstrapError::MissingCredentials(StorageBackend::Firestore))
        ));
        assert!(Bootstrap::from_storage(Some(&inline("demo")), &firestore).is_ok());
    }
}
