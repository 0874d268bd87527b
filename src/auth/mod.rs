//! Firebase Authentication client.
//!
//! Signs users in through the Identity Toolkit REST API and keeps their ID token fresh through
//! the Secure Token API. Sign-in state and token changes are broadcast on `watch` channels,
//! which is what [`LiveFirebaseAuth`](live::LiveFirebaseAuth) and the context build on.

pub mod live;
pub mod models;
pub mod token_cache;

#[cfg(test)]
mod tests;

pub use crate::models::{FirebaseUser, IdToken};

use crate::core::middleware::TokenProvider;
use crate::core::parse_error_response;
use crate::observable::LiveValue;
use live::AuthSnapshot;
use models::{
    parse_expires_in, RefreshTokenResponse, SignInResponse, SignInWithCustomTokenRequest,
    SignInWithPasswordRequest, SignUpRequest,
};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::{Mutex, OnceLock};
use thiserror::Error;
use tokio::sync::watch;
use token_cache::CachedAccessToken;
use tracing::{debug, info};

/// Tokens closer than this to expiry are refreshed before use.
const TOKEN_EXPIRY_TOLERANCE_SECS: i64 = 5 * 60;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("No user is signed in")]
    NotSignedIn,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct Session {
    user: FirebaseUser,
    id_token: IdToken,
    refresh_token: String,
}

/// Client-side Firebase Auth for one app.
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    identity_url: String,
    secure_token_url: String,
    session: Mutex<Option<Session>>,
    users: watch::Sender<Option<FirebaseUser>>,
    tokens: watch::Sender<Option<IdToken>>,
    pub(crate) live: OnceLock<LiveValue<AuthSnapshot>>,
    access_token_cache: CachedAccessToken,
}

impl FirebaseAuth {
    /// Creates a new `FirebaseAuth` instance.
    ///
    /// This is typically called via `FirebaseApp::auth()`.
    pub fn new(client: ClientWithMiddleware, identity_url: String, secure_token_url: String) -> Self {
        let (users, _) = watch::channel(None);
        let (tokens, _) = watch::channel(None);
        Self {
            client,
            identity_url,
            secure_token_url,
            session: Mutex::new(None),
            users,
            tokens,
            live: OnceLock::new(),
            access_token_cache: CachedAccessToken::new(),
        }
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The currently signed-in user.
    pub fn current_user(&self) -> Option<FirebaseUser> {
        self.session().as_ref().map(|s| s.user.clone())
    }

    /// Receives the signed-in user on every sign-in and sign-out.
    pub fn auth_state_changes(&self) -> watch::Receiver<Option<FirebaseUser>> {
        self.users.subscribe()
    }

    /// Receives the ID token on sign-in, sign-out and every refresh.
    pub fn id_token_changes(&self) -> watch::Receiver<Option<IdToken>> {
        self.tokens.subscribe()
    }

    /// The ID-token cache used by [`FirebaseAuth::get_cached_access_token`].
    pub fn access_token_cache(&self) -> &CachedAccessToken {
        &self.access_token_cache
    }

    /// Returns the current ID token, served from a 59 minute cache.
    pub async fn get_cached_access_token(
        &self,
    ) -> Result<String, crate::play_services::PlayServiceError> {
        self.access_token_cache.get(self).await
    }

    async fn post<B: serde::Serialize>(
        &self,
        endpoint: &str,
        body: &B,
        what: &str,
    ) -> Result<SignInResponse, AuthError> {
        let url = format!("{}/{}", self.identity_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, &format!("{} failed", what)).await,
            ));
        }

        Ok(response.json().await?)
    }

    fn establish(&self, response: SignInResponse, is_anonymous: bool) -> Result<FirebaseUser, AuthError> {
        let uid = response
            .local_id
            .clone()
            .or_else(|| crate::models::token_subject(&response.id_token))
            .ok_or_else(|| AuthError::ApiError("Sign-in response carries no user id".to_string()))?;

        let user = FirebaseUser {
            uid,
            email: response.email.filter(|e| !e.is_empty()),
            display_name: response.display_name.filter(|n| !n.is_empty()),
            is_anonymous,
        };
        let id_token = IdToken::from_response(
            response.id_token,
            parse_expires_in(response.expires_in.as_deref()),
        );

        *self.session() = Some(Session {
            user: user.clone(),
            id_token: id_token.clone(),
            refresh_token: response.refresh_token,
        });
        info!(uid = %user.uid, "User signed in");
        self.users.send_replace(Some(user.clone()));
        self.tokens.send_replace(Some(id_token));
        Ok(user)
    }

    pub async fn sign_in_anonymously(&self) -> Result<FirebaseUser, AuthError> {
        let request = SignUpRequest {
            return_secure_token: true,
            ..Default::default()
        };
        let response = self.post("accounts:signUp", &request, "Anonymous sign-in").await?;
        self.establish(response, true)
    }

    pub async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<FirebaseUser, AuthError> {
        let request = SignUpRequest {
            email: Some(email),
            password: Some(password),
            return_secure_token: true,
        };
        let response = self.post("accounts:signUp", &request, "Create user").await?;
        self.establish(response, false)
    }

    pub async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<FirebaseUser, AuthError> {
        let request = SignInWithPasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = self
            .post("accounts:signInWithPassword", &request, "Password sign-in")
            .await?;
        self.establish(response, false)
    }

    pub async fn sign_in_with_custom_token(&self, token: &str) -> Result<FirebaseUser, AuthError> {
        let request = SignInWithCustomTokenRequest {
            token,
            return_secure_token: true,
        };
        let response = self
            .post("accounts:signInWithCustomToken", &request, "Custom token sign-in")
            .await?;
        self.establish(response, false)
    }

    /// Signs the current user out. Does nothing when nobody is signed in.
    pub fn sign_out(&self) {
        let previous = self.session().take();
        if let Some(session) = previous {
            info!(uid = %session.user.uid, "User signed out");
            self.users.send_replace(None);
            self.tokens.send_replace(None);
        }
    }

    /// Returns the ID token of the current user, refreshing it when forced or close to expiry.
    pub async fn get_id_token(&self, force_refresh: bool) -> Result<IdToken, AuthError> {
        let session = self.session().clone().ok_or(AuthError::NotSignedIn)?;

        if !force_refresh
            && !session
                .id_token
                .expires_within(chrono::Duration::seconds(TOKEN_EXPIRY_TOLERANCE_SECS))
        {
            return Ok(session.id_token);
        }

        debug!(uid = %session.user.uid, "Refreshing ID token");
        let refreshed = self.refresh(&session.refresh_token).await?;
        let id_token = IdToken::from_response(
            refreshed.id_token,
            parse_expires_in(refreshed.expires_in.as_deref()),
        );

        let stored = {
            let mut current = self.session();
            match current.as_mut() {
                // A sign-out or a different sign-in raced with the refresh; keep the newer state.
                Some(active) if active.user.uid == session.user.uid => {
                    active.id_token = id_token.clone();
                    active.refresh_token = refreshed.refresh_token;
                    true
                }
                _ => false,
            }
        };
        if !stored {
            return Err(AuthError::NotSignedIn);
        }

        self.tokens.send_replace(Some(id_token.clone()));
        Ok(id_token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshTokenResponse, AuthError> {
        let url = format!("{}/token", self.secure_token_url);
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .finish();

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Token refresh failed").await,
            ));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl TokenProvider for FirebaseAuth {
    async fn bearer_token(&self) -> Option<String> {
        self.get_id_token(false).await.ok().map(|t| t.token)
    }
}
