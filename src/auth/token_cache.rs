use super::FirebaseAuth;
use crate::play_services::PlayServiceError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a cached access token is served before it is refreshed.
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(59 * 60);

#[derive(Clone)]
struct CachedToken {
    uid: String,
    token: String,
    expires_at: Instant,
}

/// Time-bounded cache of the signed-in user's ID token.
///
/// The cached value is returned while it is younger than [`ACCESS_TOKEN_LIFETIME`] and belongs
/// to the user currently signed in; otherwise the token is force-refreshed and cached again.
pub struct CachedAccessToken {
    cached: Mutex<Option<CachedToken>>,
}

impl CachedAccessToken {
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self, auth: &FirebaseAuth) -> Result<String, PlayServiceError> {
        let user = auth.current_user();
        let mut cached = self.cached.lock().await;

        if let (Some(entry), Some(user)) = (cached.as_ref(), user.as_ref()) {
            if entry.uid == user.uid && !entry.token.is_empty() && Instant::now() < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        let user = user.ok_or_else(|| PlayServiceError::FirebaseAuthFailed("not authorized".to_string()))?;
        let token = auth.get_id_token(true).await.map_err(|e| {
            PlayServiceError::FirebaseAuthFailed(format!("getIdToken(true) failed: {}", e))
        })?;

        *cached = Some(CachedToken {
            uid: user.uid,
            token: token.token.clone(),
            expires_at: Instant::now() + ACCESS_TOKEN_LIFETIME,
        });
        Ok(token.token)
    }

    /// Drops the cached token so the next call refreshes it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

impl Default for CachedAccessToken {
    fn default() -> Self {
        Self::new()
    }
}
