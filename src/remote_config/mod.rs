//! Firebase Remote Config client.
//!
//! Fetches the app's parameter values through the client fetch endpoint, the one the mobile
//! SDKs use, identified by the Firebase installation. Fetched values stay pending until
//! [`FirebaseRemoteConfig::activate`] makes them visible to the getters.
//!
//! # Throttling
//!
//! `fetch` is served from the last successful fetch while it is younger than the requested
//! minimum interval. A `429` from the backend is reported as [`RemoteConfigError::Throttled`]
//! and recorded as [`LastFetchStatus::Throttled`].

pub mod models;
pub mod status;

#[cfg(test)]
mod tests;

pub use crate::models::{LastFetchStatus, RemoteConfigValue, ValueSource};

use crate::core::parse_error_response;
use crate::installations::{FirebaseInstallations, InstallationsError};
use chrono::{DateTime, Utc};
use models::{FetchOutcome, FetchRequest, FetchResponse, SDK_VERSION};
use reqwest::{header, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum fetch interval used by [`FirebaseRemoteConfig::fetch_and_activate`].
pub const DEFAULT_MINIMUM_FETCH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

const DEFAULT_LANGUAGE_CODE: &str = "en-US";

#[derive(Error, Debug)]
pub enum RemoteConfigError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Fetch throttled by the backend")]
    Throttled,
    #[error("Installation unavailable: {0}")]
    Installations(#[from] InstallationsError),
}

/// Metadata about the most recent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigInfo {
    pub last_fetch_status: LastFetchStatus,
    /// Time of the last successful fetch.
    pub fetch_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ConfigState {
    defaults: HashMap<String, String>,
    fetched: HashMap<String, String>,
    pending: bool,
    active: HashMap<String, String>,
    etag: Option<String>,
    last_fetch_status: LastFetchStatus,
    fetch_time: Option<DateTime<Utc>>,
    last_success: Option<Instant>,
}

/// Client-side Remote Config for one app.
pub struct FirebaseRemoteConfig {
    client: ClientWithMiddleware,
    fetch_url: String,
    app_id: String,
    language_code: String,
    installations: Arc<FirebaseInstallations>,
    state: Mutex<ConfigState>,
    fetching: tokio::sync::Mutex<()>,
}

impl FirebaseRemoteConfig {
    /// Creates a new `FirebaseRemoteConfig` instance.
    ///
    /// This is typically called via `FirebaseApp::remote_config()`.
    pub fn new(
        client: ClientWithMiddleware,
        base_url: &str,
        project_id: &str,
        app_id: &str,
        installations: Arc<FirebaseInstallations>,
    ) -> Self {
        Self {
            client,
            fetch_url: format!(
                "{}/projects/{}/namespaces/firebase:fetch",
                base_url.trim_end_matches('/'),
                project_id
            ),
            app_id: app_id.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            installations,
            state: Mutex::new(ConfigState::default()),
            fetching: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the language code sent with fetches, e.g. `"ja-JP"`.
    pub fn with_language_code(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = language_code.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, ConfigState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetches the template unless the last successful fetch is younger than
    /// `minimum_fetch_interval`. Fetched values are not visible until activated.
    pub async fn fetch(&self, minimum_fetch_interval: Duration) -> Result<(), RemoteConfigError> {
        let _fetching = self.fetching.lock().await;

        let last_success = self.state().last_success;
        if let Some(last) = last_success {
            if last.elapsed() < minimum_fetch_interval {
                debug!("Remote Config served from the last fetch");
                return Ok(());
            }
        }

        let result = self.fetch_from_backend().await;
        let mut state = self.state();
        match result {
            Ok((outcome, etag)) => {
                if let FetchOutcome::Updated(entries) = outcome {
                    info!(parameters = entries.len(), "Remote Config fetched");
                    state.fetched = entries;
                    state.pending = true;
                } else {
                    debug!("Remote Config unchanged since the last fetch");
                }
                if etag.is_some() {
                    state.etag = etag;
                }
                state.last_fetch_status = LastFetchStatus::Success;
                state.fetch_time = Some(Utc::now());
                state.last_success = Some(Instant::now());
                Ok(())
            }
            Err(RemoteConfigError::Throttled) => {
                warn!("Remote Config fetch throttled");
                state.last_fetch_status = LastFetchStatus::Throttled;
                Err(RemoteConfigError::Throttled)
            }
            Err(e) => {
                warn!(error = %e, "Remote Config fetch failed");
                state.last_fetch_status = LastFetchStatus::Failure;
                Err(e)
            }
        }
    }

    async fn fetch_from_backend(&self) -> Result<(FetchOutcome, Option<String>), RemoteConfigError> {
        let installation_id = self.installations.id().await?;
        let installation_token = self.installations.token(false).await?;
        let etag = self.state().etag.clone();

        let request = FetchRequest {
            sdk_version: SDK_VERSION,
            app_instance_id: &installation_id,
            app_instance_id_token: &installation_token.token,
            app_id: &self.app_id,
            language_code: &self.language_code,
        };

        let response = self
            .client
            .post(&self.fetch_url)
            .header(header::IF_NONE_MATCH, etag.as_deref().unwrap_or("*"))
            .json(&request)
            .send()
            .await?;

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        match response.status() {
            StatusCode::OK => {
                let body: FetchResponse = response.json().await?;
                let outcome = body.into_outcome().map_err(RemoteConfigError::ApiError)?;
                Ok((outcome, etag))
            }
            StatusCode::NOT_MODIFIED => Ok((FetchOutcome::Unchanged, etag)),
            StatusCode::TOO_MANY_REQUESTS => Err(RemoteConfigError::Throttled),
            _ => Err(RemoteConfigError::ApiError(
                parse_error_response(response, "Remote Config fetch failed").await,
            )),
        }
    }

    /// Makes the last fetched values active. Returns `false` when nothing new was fetched.
    pub fn activate(&self) -> bool {
        let mut state = self.state();
        if !state.pending {
            return false;
        }
        state.active = state.fetched.clone();
        state.pending = false;
        debug!(parameters = state.active.len(), "Remote Config activated");
        true
    }

    /// Fetches with [`DEFAULT_MINIMUM_FETCH_INTERVAL`] and activates.
    pub async fn fetch_and_activate(&self) -> Result<bool, RemoteConfigError> {
        self.fetch(DEFAULT_MINIMUM_FETCH_INTERVAL).await?;
        Ok(self.activate())
    }

    /// Replaces the in-app defaults.
    pub fn set_defaults<K, V>(&self, defaults: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.state().defaults = defaults
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    /// Every known key: defaults overlaid with the active values.
    pub fn all(&self) -> HashMap<String, RemoteConfigValue> {
        let state = self.state();
        let defaults = state.defaults.iter().map(|(k, v)| {
            (
                k.clone(),
                RemoteConfigValue {
                    value: v.clone(),
                    source: ValueSource::Default,
                },
            )
        });
        let active = state.active.iter().map(|(k, v)| {
            (
                k.clone(),
                RemoteConfigValue {
                    value: v.clone(),
                    source: ValueSource::Remote,
                },
            )
        });
        defaults.chain(active).collect()
    }

    pub fn get_value(&self, key: &str) -> RemoteConfigValue {
        let state = self.state();
        if let Some(value) = state.active.get(key) {
            return RemoteConfigValue {
                value: value.clone(),
                source: ValueSource::Remote,
            };
        }
        match state.defaults.get(key) {
            Some(value) => RemoteConfigValue {
                value: value.clone(),
                source: ValueSource::Default,
            },
            None => RemoteConfigValue {
                value: String::new(),
                source: ValueSource::Static,
            },
        }
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_value(key).value
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get_value(key).as_bool()
    }

    pub fn get_long(&self, key: &str) -> i64 {
        self.get_value(key).as_i64()
    }

    pub fn get_double(&self, key: &str) -> f64 {
        self.get_value(key).as_f64()
    }

    pub fn info(&self) -> ConfigInfo {
        let state = self.state();
        ConfigInfo {
            last_fetch_status: state.last_fetch_status,
            fetch_time: state.fetch_time,
        }
    }
}
