//! Value types shared by the service clients and the context snapshot.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A signed-in Firebase user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_anonymous: bool,
}

/// A Firebase ID token together with the claims the client cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub sign_in_provider: Option<String>,
}

#[derive(Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
    iat: Option<i64>,
    #[serde(default)]
    firebase: Option<FirebaseClaim>,
}

#[derive(Deserialize)]
struct FirebaseClaim {
    sign_in_provider: Option<String>,
}

impl IdToken {
    /// Builds a token from an API response.
    ///
    /// The JWT payload is decoded without verification; when it can't be read the expiry falls
    /// back to `expires_in_secs` from now.
    pub fn from_response(token: String, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let claims = decode_claims(&token);
        let issued_at = claims
            .as_ref()
            .and_then(|c| c.iat)
            .and_then(|iat| DateTime::from_timestamp(iat, 0))
            .unwrap_or(now);
        let expiration_time = claims
            .as_ref()
            .and_then(|c| c.exp)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
            .unwrap_or_else(|| now + Duration::seconds(expires_in_secs));
        let sign_in_provider = claims
            .and_then(|c| c.firebase)
            .and_then(|f| f.sign_in_provider);

        Self {
            token,
            issued_at,
            expiration_time,
            sign_in_provider,
        }
    }

    /// Returns `true` if the token expires within `tolerance` from now.
    pub fn expires_within(&self, tolerance: Duration) -> bool {
        self.expiration_time <= Utc::now() + tolerance
    }
}

fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Reads the `sub` claim of a JWT, used when an endpoint doesn't return the user id.
pub(crate) fn token_subject(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Subject {
        user_id: Option<String>,
        sub: Option<String>,
    }
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let subject: Subject = serde_json::from_slice(&bytes).ok()?;
    subject.user_id.or(subject.sub)
}

/// Where a Remote Config value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    /// No value for the key; the static default of the getter applies.
    Static,
    /// In-app default set through `set_defaults`.
    Default,
    /// Activated value fetched from the backend.
    Remote,
}

/// A single Remote Config value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfigValue {
    pub value: String,
    pub source: ValueSource,
}

const TRUTHY: [&str; 6] = ["1", "true", "t", "yes", "y", "on"];

impl RemoteConfigValue {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn as_bool(&self) -> bool {
        TRUTHY.contains(&self.value.to_ascii_lowercase().as_str())
    }

    pub fn as_i64(&self) -> i64 {
        self.value.trim().parse().unwrap_or(0)
    }

    pub fn as_f64(&self) -> f64 {
        self.value.trim().parse().unwrap_or(0.0)
    }
}

/// Outcome of the most recent Remote Config fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LastFetchStatus {
    #[default]
    NoFetchYet,
    Success,
    Failure,
    Throttled,
}
