//! What a [`FirebaseContext`](super::FirebaseContext) reads from the service clients.
//!
//! The traits are implemented by the crate's clients when their feature is enabled and can be
//! implemented by anything else that should feed a context.

use crate::models::{FirebaseUser, IdToken, LastFetchStatus, RemoteConfigValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

#[async_trait]
pub trait AuthSource: Send + Sync {
    /// Carries the signed-in user, updated on every sign-in and sign-out.
    fn auth_state_changes(&self) -> watch::Receiver<Option<FirebaseUser>>;

    /// Forces a new ID token for the signed-in user.
    async fn refresh_token(&self) -> anyhow::Result<IdToken>;
}

#[async_trait]
pub trait InstallationSource: Send + Sync {
    async fn installation_id(&self) -> anyhow::Result<String>;
}

#[async_trait]
pub trait RemoteConfigSource: Send + Sync {
    /// Fetches unless the last fetch is younger than `minimum_fetch_interval`, then activates.
    async fn refresh(&self, minimum_fetch_interval: Duration) -> anyhow::Result<()>;

    /// Makes the last fetched values active. Returns whether the active values changed.
    fn activate(&self) -> bool;

    /// The active values overlaid on the defaults.
    fn values(&self) -> HashMap<String, RemoteConfigValue>;

    fn last_fetch_status(&self) -> LastFetchStatus;
}

#[cfg(feature = "auth")]
#[async_trait]
impl AuthSource for crate::auth::FirebaseAuth {
    fn auth_state_changes(&self) -> watch::Receiver<Option<FirebaseUser>> {
        crate::auth::FirebaseAuth::auth_state_changes(self)
    }

    async fn refresh_token(&self) -> anyhow::Result<IdToken> {
        Ok(self.get_id_token(true).await?)
    }
}

#[cfg(feature = "installations")]
#[async_trait]
impl InstallationSource for crate::installations::FirebaseInstallations {
    async fn installation_id(&self) -> anyhow::Result<String> {
        Ok(self.id().await?)
    }
}

#[cfg(feature = "remote_config")]
#[async_trait]
impl RemoteConfigSource for crate::remote_config::FirebaseRemoteConfig {
    async fn refresh(&self, minimum_fetch_interval: Duration) -> anyhow::Result<()> {
        self.fetch(minimum_fetch_interval).await?;
        crate::remote_config::FirebaseRemoteConfig::activate(self);
        Ok(())
    }

    fn activate(&self) -> bool {
        crate::remote_config::FirebaseRemoteConfig::activate(self)
    }

    fn values(&self) -> HashMap<String, RemoteConfigValue> {
        self.all()
    }

    fn last_fetch_status(&self) -> LastFetchStatus {
        self.info().last_fetch_status
    }
}
