//! Layered configuration loading and XDG path helpers.

use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::constants::DEFAULT_COLLECTION;
use crate::pipeline::ColumnLayout;
use crate::services::bootstrap::{CredentialSource, Credentials};
use crate::services::document_store::DurableWrite;
use crate::services::firestore::{DEFAULT_FIRESTORE_BASE_URL, DEFAULT_FIRESTORE_DATABASE};
use crate::services::geocode::DEFAULT_GEOCODE_ENDPOINT;

const APP_NAME: &str = "havenmap";
const SETTINGS_FILE: &str = "settings.toml";
const LOCAL_CONFIG_FILE: &str = "config/settings.toml";
const DEFAULT_ETC_DIR: &str = "/etc";
const ETC_DIR_VAR: &str = "HAVENMAP_ETC_CONFIG_DIR";
const OVERRIDE_FILE_VAR: &str = "HAVENMAP_CONFIG_FILE";
const ENV_PREFIX: &str = "HAVENMAP";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error("invalid credentials configuration: {0}")]
    Credentials(String),
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Firestore,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
    pub collection: String,
    #[serde(default)]
    pub durability: DurableWrite,
    #[serde(default)]
    pub firestore: FirestoreConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FirestoreConfig {
    pub base_url: String,
    pub database: String,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
            database: DEFAULT_FIRESTORE_DATABASE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocodingConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    File,
    Inline,
}

/// Flat credential settings. Environment variables such as
/// `HAVENMAP__CREDENTIALS__PROJECT_ID` populate the inline form.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub source: Option<CredentialKind>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl CredentialsConfig {
    /// Pick the credential source. Without an explicit `source`, a `path`
    /// selects the file form and anything else the inline form.
    pub fn to_source(&self) -> Result<CredentialSource, AppConfigError> {
        let kind = self.source.unwrap_or(if self.path.is_some() {
            CredentialKind::File
        } else {
            CredentialKind::Inline
        });

        match kind {
            CredentialKind::File => self.path.clone().map(CredentialSource::File).ok_or_else(|| {
                AppConfigError::Credentials("`credentials.path` is required for file credentials".into())
            }),
            CredentialKind::Inline => {
                let project_id = self.project_id.clone().ok_or_else(|| {
                    AppConfigError::Credentials(
                        "`credentials.project_id` is required for inline credentials".into(),
                    )
                })?;
                Ok(CredentialSource::Inline(Credentials {
                    project_id,
                    client_email: self.client_email.clone(),
                    access_token: self.access_token.clone(),
                }))
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ImportConfig {
    pub columns: ColumnLayout,
}

impl AppConfig {
    pub fn credential_source(&self) -> Result<Option<CredentialSource>, AppConfigError> {
        self.credentials
            .as_ref()
            .map(CredentialsConfig::to_source)
            .transpose()
    }
}

/// Load configuration. Later sources win: built-in defaults, the system
/// file, the XDG user file, `./config/settings.toml`, the file named by
/// `HAVENMAP_CONFIG_FILE`, then `HAVENMAP__SECTION__KEY` variables.
pub fn load() -> Result<AppConfig, AppConfigError> {
    let dirs = project_dirs()?;
    let default_storage = dirs.data_dir().to_path_buf();

    let etc_dir = env::var_os(ETC_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ETC_DIR));
    let etc_file = etc_dir.join(APP_NAME).join(SETTINGS_FILE);
    let user_file = dirs.config_dir().join(SETTINGS_FILE);

    let mut builder = Config::builder()
        .set_default("storage.backend", StorageBackend::Fs.to_string())?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?
        .set_default("storage.collection", DEFAULT_COLLECTION)?
        .set_default("geocoding.endpoint", DEFAULT_GEOCODE_ENDPOINT)?
        .add_source(file_source(etc_file))
        .add_source(file_source(user_file))
        .add_source(file_source(PathBuf::from(LOCAL_CONFIG_FILE)));

    if let Some(override_file) = env::var_os(OVERRIDE_FILE_VAR) {
        builder = builder.add_source(file_source(PathBuf::from(override_file)));
    }

    let cfg = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;
    Ok(cfg)
}

fn file_source(path: PathBuf) -> impl config::Source + Send + Sync + 'static {
    File::from(path).format(FileFormat::Toml).required(false)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", APP_NAME, APP_NAME).ok_or(AppConfigError::MissingProjectDirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_lowercase() {
        assert_eq!(StorageBackend::Fs.to_string(), "fs");
        assert_eq!(
            "firestore".parse::<StorageBackend>().unwrap(),
            StorageBackend::Firestore
        );
    }

    #[test]
    fn path_implies_file_credentials() {
        let cfg = CredentialsConfig {
            path: Some(PathBuf::from("/run/secrets/sa.json")),
            ..Default::default()
        };
        assert_eq!(
            cfg.to_source().unwrap(),
            CredentialSource::File(PathBuf::from("/run/secrets/sa.json"))
        );
    }

    #[test]
    fn inline_credentials_need_project_id() {
        let missing = CredentialsConfig {
            source: Some(CredentialKind::Inline),
            access_token: Some("t".into()),
            ..Default::default()
        };
        assert!(matches!(
            missing.to_source(),
            Err(AppConfigError::Credentials(_))
        ));

        let inline = CredentialsConfig {
            project_id: Some("demo".into()),
            ..missing
        };
        let CredentialSource::Inline(credentials) = inline.to_source().unwrap() else {
            panic!("expected inline credentials");
        };
        assert_eq!(credentials.project_id, "demo");
        assert_eq!(credentials.access_token.as_deref(), Some("t"));
    }

    #[test]
    fn explicit_file_source_needs_path() {
        let cfg = CredentialsConfig {
            source: Some(CredentialKind::File),
            project_id: Some("demo".into()),
            ..Default::default()
        };
        assert!(matches!(cfg.to_source(), Err(AppConfigError::Credentials(_))));
    }
}
