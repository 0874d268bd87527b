//! Firebase Installations client.
//!
//! An installation is identified by a FID generated on the client and registered once with the
//! Installations API. The registration's refresh token is then used to mint short-lived
//! installation auth tokens, which Remote Config requires on every fetch.

pub mod live;
pub mod models;

#[cfg(test)]
mod tests;

use crate::core::parse_error_response;
use crate::observable::LiveValue;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use models::{
    parse_duration_secs, CreateInstallationRequest, CreateInstallationResponse,
    GenerateAuthTokenRequest, InstallationInfo, TokenResponse, AUTH_VERSION, SDK_VERSION,
};
use rand::Rng;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Auth tokens closer than this to expiry are regenerated.
const TOKEN_EXPIRY_TOLERANCE_SECS: i64 = 60 * 60;

#[derive(Error, Debug)]
pub enum InstallationsError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A Firebase Installations auth token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationToken {
    pub token: String,
    pub expiration_time: DateTime<Utc>,
}

impl InstallationToken {
    fn from_response(response: TokenResponse) -> Self {
        Self {
            expiration_time: Utc::now() + Duration::seconds(parse_duration_secs(&response.expires_in)),
            token: response.token,
        }
    }

    fn is_fresh(&self) -> bool {
        self.expiration_time > Utc::now() + Duration::seconds(TOKEN_EXPIRY_TOLERANCE_SECS)
    }
}

struct Registration {
    fid: String,
    refresh_token: String,
    auth_token: InstallationToken,
}

/// Client for the Firebase Installations API of one app.
pub struct FirebaseInstallations {
    client: ClientWithMiddleware,
    base_url: String,
    app_id: String,
    registration: Mutex<Option<Registration>>,
    pub(crate) live: OnceLock<LiveValue<String>>,
}

/// Generates a FID: 17 random bytes whose first four bits are `0111`, base64url encoded and
/// cut to 22 characters.
pub(crate) fn generate_fid() -> String {
    let mut bytes = [0u8; 17];
    rand::thread_rng().fill(&mut bytes);
    bytes[0] = 0b0111_0000 | (bytes[0] & 0b0000_1111);
    let mut fid = URL_SAFE_NO_PAD.encode(bytes);
    fid.truncate(22);
    fid
}

impl FirebaseInstallations {
    /// Creates a new `FirebaseInstallations` instance.
    ///
    /// This is typically called via `FirebaseApp::installations()`.
    pub fn new(client: ClientWithMiddleware, base_url: &str, project_id: &str, app_id: &str) -> Self {
        Self {
            client,
            base_url: format!(
                "{}/projects/{}/installations",
                base_url.trim_end_matches('/'),
                project_id
            ),
            app_id: app_id.to_string(),
            registration: Mutex::new(None),
            live: OnceLock::new(),
        }
    }

    /// Returns the installation id, registering the installation on first use.
    pub async fn id(&self) -> Result<String, InstallationsError> {
        let mut registration = self.registration.lock().await;
        if let Some(registration) = registration.as_ref() {
            return Ok(registration.fid.clone());
        }
        let created = self.register().await?;
        let fid = created.fid.clone();
        *registration = Some(created);
        Ok(fid)
    }

    /// Returns an installation auth token, generating a new one when forced or close to expiry.
    pub async fn token(&self, force_refresh: bool) -> Result<InstallationToken, InstallationsError> {
        let mut guard = self.registration.lock().await;
        let registration = match guard.take() {
            Some(registration) => registration,
            None => self.register().await?,
        };
        let registration = guard.insert(registration);

        if !force_refresh && registration.auth_token.is_fresh() {
            return Ok(registration.auth_token.clone());
        }

        debug!(fid = %registration.fid, "Generating installation auth token");
        let token = self
            .generate_auth_token(&registration.fid, &registration.refresh_token)
            .await?;
        registration.auth_token = token.clone();
        Ok(token)
    }

    async fn register(&self) -> Result<Registration, InstallationsError> {
        let fid = generate_fid();
        let request = CreateInstallationRequest {
            fid: &fid,
            auth_version: AUTH_VERSION,
            app_id: &self.app_id,
            sdk_version: SDK_VERSION,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(InstallationsError::ApiError(
                parse_error_response(response, "Installation registration failed").await,
            ));
        }

        let created: CreateInstallationResponse = response.json().await?;
        // The backend may assign a different FID than the one proposed.
        let fid = created.fid.unwrap_or(fid);
        info!(fid = %fid, "Installation registered");
        Ok(Registration {
            fid,
            refresh_token: created.refresh_token,
            auth_token: InstallationToken::from_response(created.auth_token),
        })
    }

    async fn generate_auth_token(
        &self,
        fid: &str,
        refresh_token: &str,
    ) -> Result<InstallationToken, InstallationsError> {
        let url = format!("{}/{}/authTokens:generate", self.base_url, fid);
        let request = GenerateAuthTokenRequest {
            installation: InstallationInfo {
                sdk_version: SDK_VERSION,
            },
        };

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("{} {}", AUTH_VERSION, refresh_token),
            )
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(InstallationsError::ApiError(
                parse_error_response(response, "Installation token generation failed").await,
            ));
        }

        Ok(InstallationToken::from_response(response.json().await?))
    }
}
