//! Firebase app configuration.
//!
//! `FirebaseOptions` can be parsed from the standard `google-services.json` file or built
//! programmatically. `Endpoints` holds the base URLs of every REST surface the crate talks to
//! and picks up the usual emulator environment variables.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration is not valid JSON.
    #[error("service config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is absent.
    #[error("service config is missing `{0}`")]
    MissingField(&'static str),
    /// The configuration file could not be read.
    #[error("failed to read service config: {0}")]
    Io(#[from] std::io::Error),
}

const IDENTITY_TOOLKIT_API: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_API: &str = "https://securetoken.googleapis.com/v1";
const INSTALLATIONS_API: &str = "https://firebaseinstallations.googleapis.com/v1";
const REMOTE_CONFIG_API: &str = "https://firebaseremoteconfig.googleapis.com/v1";
const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const STORAGE_API: &str = "https://firebasestorage.googleapis.com/v0";
const ANALYTICS_API: &str = "https://www.google-analytics.com/mp/collect";

/// Base URLs of the Firebase REST surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub identity_toolkit: String,
    pub secure_token: String,
    pub installations: String,
    pub remote_config: String,
    pub firestore: String,
    pub storage: String,
    pub analytics: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity_toolkit: IDENTITY_TOOLKIT_API.to_string(),
            secure_token: SECURE_TOKEN_API.to_string(),
            installations: INSTALLATIONS_API.to_string(),
            remote_config: REMOTE_CONFIG_API.to_string(),
            firestore: FIRESTORE_API.to_string(),
            storage: STORAGE_API.to_string(),
            analytics: ANALYTICS_API.to_string(),
        }
    }
}

impl Endpoints {
    /// Production endpoints with the emulator overrides found in the environment applied.
    ///
    /// Recognised variables: `FIREBASE_AUTH_EMULATOR_HOST`, `FIRESTORE_EMULATOR_HOST`,
    /// `FIREBASE_STORAGE_EMULATOR_HOST`, `FIREBASE_INSTALLATIONS_API_URL` and
    /// `FIREBASE_REMOTE_CONFIG_API_URL`.
    pub fn from_env() -> Self {
        let mut endpoints = Self::default();
        if let Ok(host) = std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            endpoints.identity_toolkit = format!("http://{}/identitytoolkit.googleapis.com/v1", host);
            endpoints.secure_token = format!("http://{}/securetoken.googleapis.com/v1", host);
        }
        if let Ok(host) = std::env::var("FIRESTORE_EMULATOR_HOST") {
            endpoints.firestore = format!("http://{}/v1", host);
        }
        if let Ok(host) = std::env::var("FIREBASE_STORAGE_EMULATOR_HOST") {
            endpoints.storage = format!("http://{}/v0", host);
        }
        if let Ok(url) = std::env::var("FIREBASE_INSTALLATIONS_API_URL") {
            endpoints.installations = url;
        }
        if let Ok(url) = std::env::var("FIREBASE_REMOTE_CONFIG_API_URL") {
            endpoints.remote_config = url;
        }
        endpoints
    }

    /// Routes every surface below one base URL, e.g. a local mock server.
    pub fn emulated(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            identity_toolkit: format!("{}/identitytoolkit.googleapis.com/v1", base),
            secure_token: format!("{}/securetoken.googleapis.com/v1", base),
            installations: format!("{}/installations/v1", base),
            remote_config: format!("{}/remoteconfig/v1", base),
            firestore: format!("{}/firestore/v1", base),
            storage: format!("{}/storage/v0", base),
            analytics: format!("{}/mp/collect", base),
        }
    }
}

/// Options identifying a Firebase project and app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseOptions {
    pub api_key: String,
    pub application_id: String,
    pub project_id: String,
    pub gcm_sender_id: Option<String>,
    pub database_url: Option<String>,
    pub storage_bucket: Option<String>,
    pub analytics_api_secret: Option<String>,
    pub endpoints: Endpoints,
}

#[derive(Deserialize)]
struct ServiceConfig {
    project_info: Option<ProjectInfo>,
    #[serde(default)]
    client: Vec<ClientEntry>,
}

#[derive(Deserialize)]
struct ProjectInfo {
    firebase_url: Option<String>,
    project_number: Option<String>,
    project_id: Option<String>,
    storage_bucket: Option<String>,
}

#[derive(Deserialize)]
struct ClientEntry {
    client_info: Option<ClientInfo>,
    #[serde(default)]
    api_key: Vec<ApiKeyEntry>,
}

#[derive(Deserialize)]
struct ClientInfo {
    mobilesdk_app_id: Option<String>,
}

#[derive(Deserialize)]
struct ApiKeyEntry {
    current_key: Option<String>,
}

impl FirebaseOptions {
    pub fn new(
        project_id: impl Into<String>,
        application_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            application_id: application_id.into(),
            project_id: project_id.into(),
            gcm_sender_id: None,
            database_url: None,
            storage_bucket: None,
            analytics_api_secret: None,
            endpoints: Endpoints::from_env(),
        }
    }

    /// Parses a `google-services.json` document.
    ///
    /// Only the first `client` entry and its first API key are used.
    pub fn from_service_json(json: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(json)?;
        let project = config
            .project_info
            .ok_or(ConfigError::MissingField("project_info"))?;
        let client = config
            .client
            .into_iter()
            .next()
            .ok_or(ConfigError::MissingField("client[0]"))?;

        let application_id = client
            .client_info
            .and_then(|info| info.mobilesdk_app_id)
            .ok_or(ConfigError::MissingField("client[0].client_info.mobilesdk_app_id"))?;
        let api_key = client
            .api_key
            .into_iter()
            .next()
            .and_then(|key| key.current_key)
            .ok_or(ConfigError::MissingField("client[0].api_key[0].current_key"))?;
        let project_id = project
            .project_id
            .ok_or(ConfigError::MissingField("project_info.project_id"))?;
        let project_number = project
            .project_number
            .ok_or(ConfigError::MissingField("project_info.project_number"))?;
        let firebase_url = project
            .firebase_url
            .ok_or(ConfigError::MissingField("project_info.firebase_url"))?;
        let storage_bucket = project
            .storage_bucket
            .ok_or(ConfigError::MissingField("project_info.storage_bucket"))?;

        Ok(Self::new(project_id, application_id, api_key)
            .with_gcm_sender_id(project_number)
            .with_database_url(firebase_url)
            .with_storage_bucket(storage_bucket))
    }

    /// Reads and parses a `google-services.json` file.
    pub fn from_service_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_service_json(&json)
    }

    pub fn with_storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.storage_bucket = Some(bucket.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_gcm_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.gcm_sender_id = Some(sender_id.into());
        self
    }

    /// Enables Analytics. The secret is a Measurement Protocol API secret of the app's data stream.
    pub fn with_analytics_api_secret(mut self, api_secret: impl Into<String>) -> Self {
        self.analytics_api_secret = Some(api_secret.into());
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}
