//! Firebase client toolkit.
//!
//! [`Firebase`] is a registry of named [`FirebaseApp`]s. Each app hands out lazily created
//! service clients (Auth, Installations, Remote Config, Firestore, Storage, Analytics) that
//! talk to the Firebase client REST APIs, and [`Firebase::context`] gives a live
//! [`FirebaseContextSnapshot`](context::FirebaseContextSnapshot) of the app's state.
//!
//! Every service is behind a default-on Cargo feature of the same name.

#[cfg(feature = "analytics")]
pub mod analytics;
#[cfg(feature = "auth")]
pub mod auth;
pub mod context;
pub mod core;
#[cfg(feature = "firestore")]
pub mod firestore;
#[cfg(feature = "installations")]
pub mod installations;
pub mod models;
pub mod observable;
pub mod options;
pub mod play_services;
pub mod registry;
#[cfg(feature = "remote_config")]
pub mod remote_config;
#[cfg(feature = "storage")]
pub mod storage;

pub use context::{ContextSettings, FirebaseContext, FirebaseContextSnapshot};
pub use options::{ConfigError, Endpoints, FirebaseOptions};
pub use registry::Firebase;

use crate::core::build_client;
use crate::core::middleware::AuthMiddleware;
use context::ContextSources;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::{Arc, OnceLock};

#[cfg(feature = "analytics")]
use analytics::FirebaseAnalytics;
#[cfg(feature = "auth")]
use auth::FirebaseAuth;
#[cfg(feature = "firestore")]
use firestore::FirebaseFirestore;
#[cfg(feature = "installations")]
use installations::FirebaseInstallations;
#[cfg(feature = "remote_config")]
use remote_config::FirebaseRemoteConfig;
#[cfg(feature = "storage")]
use storage::{parse_bucket_url, FirebaseStorage, StorageError};
#[cfg(feature = "storage")]
use std::collections::HashMap;
#[cfg(feature = "storage")]
use std::sync::Mutex;

/// Name of the default app. The empty name refers to it as well.
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";

/// One configured Firebase app and its service clients.
pub struct FirebaseApp {
    name: String,
    options: FirebaseOptions,
    client: ClientWithMiddleware,
    user_client: OnceLock<ClientWithMiddleware>,
    #[cfg(feature = "auth")]
    auth: OnceLock<Arc<FirebaseAuth>>,
    #[cfg(feature = "installations")]
    installations: OnceLock<Arc<FirebaseInstallations>>,
    #[cfg(feature = "remote_config")]
    remote_config: OnceLock<Arc<FirebaseRemoteConfig>>,
    #[cfg(feature = "firestore")]
    firestore: OnceLock<Arc<FirebaseFirestore>>,
    #[cfg(feature = "storage")]
    storage: Mutex<HashMap<String, Arc<FirebaseStorage>>>,
    #[cfg(feature = "analytics")]
    analytics: OnceLock<Option<Arc<FirebaseAnalytics>>>,
}

impl FirebaseApp {
    pub fn new(name: &str, options: FirebaseOptions) -> Self {
        let client = build_client(AuthMiddleware::new(options.api_key.clone()));
        Self {
            name: name.to_string(),
            options,
            client,
            user_client: OnceLock::new(),
            #[cfg(feature = "auth")]
            auth: OnceLock::new(),
            #[cfg(feature = "installations")]
            installations: OnceLock::new(),
            #[cfg(feature = "remote_config")]
            remote_config: OnceLock::new(),
            #[cfg(feature = "firestore")]
            firestore: OnceLock::new(),
            #[cfg(feature = "storage")]
            storage: Mutex::new(HashMap::new()),
            #[cfg(feature = "analytics")]
            analytics: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &FirebaseOptions {
        &self.options
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_APP_NAME
    }

    /// Client for the user-scoped APIs: the API key plus the signed-in user's ID token.
    #[cfg_attr(not(any(feature = "firestore", feature = "storage")), allow(dead_code))]
    fn user_client(&self) -> ClientWithMiddleware {
        self.user_client
            .get_or_init(|| {
                #[cfg(feature = "auth")]
                let middleware = AuthMiddleware::new(self.options.api_key.clone())
                    .with_token_provider(self.auth());
                #[cfg(not(feature = "auth"))]
                let middleware = AuthMiddleware::new(self.options.api_key.clone());
                build_client(middleware)
            })
            .clone()
    }

    #[cfg(feature = "auth")]
    pub fn auth(&self) -> Arc<FirebaseAuth> {
        self.auth
            .get_or_init(|| {
                let endpoints = &self.options.endpoints;
                Arc::new(FirebaseAuth::new(
                    self.client.clone(),
                    endpoints.identity_toolkit.clone(),
                    endpoints.secure_token.clone(),
                ))
            })
            .clone()
    }

    #[cfg(feature = "installations")]
    pub fn installations(&self) -> Arc<FirebaseInstallations> {
        self.installations
            .get_or_init(|| {
                Arc::new(FirebaseInstallations::new(
                    self.client.clone(),
                    &self.options.endpoints.installations,
                    &self.options.project_id,
                    &self.options.application_id,
                ))
            })
            .clone()
    }

    #[cfg(feature = "remote_config")]
    pub fn remote_config(&self) -> Arc<FirebaseRemoteConfig> {
        self.remote_config
            .get_or_init(|| {
                Arc::new(FirebaseRemoteConfig::new(
                    self.client.clone(),
                    &self.options.endpoints.remote_config,
                    &self.options.project_id,
                    &self.options.application_id,
                    self.installations(),
                ))
            })
            .clone()
    }

    #[cfg(feature = "firestore")]
    pub fn firestore(&self) -> Arc<FirebaseFirestore> {
        self.firestore
            .get_or_init(|| {
                Arc::new(FirebaseFirestore::new(
                    self.user_client(),
                    &self.options.endpoints.firestore,
                    &self.options.project_id,
                ))
            })
            .clone()
    }

    /// Storage client for a bucket: `gs://bucket`, a bare bucket name, or `""` for the app's
    /// default bucket. Clients are cached per bucket.
    #[cfg(feature = "storage")]
    pub fn storage(&self, url: &str) -> Result<Arc<FirebaseStorage>, StorageError> {
        let bucket = if url.is_empty() {
            self.options
                .storage_bucket
                .clone()
                .ok_or_else(|| StorageError::InvalidUrl("no default storage bucket".to_string()))?
        } else {
            parse_bucket_url(url)?
        };

        let mut buckets = self.storage.lock().unwrap_or_else(|e| e.into_inner());
        let storage = buckets.entry(bucket).or_insert_with_key(|bucket| {
            Arc::new(FirebaseStorage::new(
                self.user_client(),
                &self.options.endpoints.storage,
                bucket,
            ))
        });
        Ok(storage.clone())
    }

    /// Analytics client, or `None` when the options carry no Measurement Protocol API secret.
    #[cfg(feature = "analytics")]
    pub fn analytics(&self) -> Option<Arc<FirebaseAnalytics>> {
        self.analytics
            .get_or_init(|| {
                let api_secret = self.options.analytics_api_secret.as_deref()?;
                Some(Arc::new(FirebaseAnalytics::new(
                    build_client(AuthMiddleware::anonymous()),
                    &self.options.endpoints.analytics,
                    &self.options.application_id,
                    api_secret,
                )))
            })
            .clone()
    }

    /// The services of this app a [`FirebaseContext`] reads.
    pub fn context_sources(&self) -> ContextSources {
        #[allow(unused_mut)]
        let mut sources = ContextSources::default();
        #[cfg(feature = "auth")]
        {
            sources.auth = Some(self.auth());
        }
        #[cfg(feature = "installations")]
        {
            sources.installations = Some(self.installations());
        }
        #[cfg(feature = "remote_config")]
        {
            sources.remote_config = Some(self.remote_config());
        }
        sources
    }
}

impl std::fmt::Debug for FirebaseApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseApp")
            .field("name", &self.name)
            .field("project_id", &self.options.project_id)
            .field("application_id", &self.options.application_id)
            .finish()
    }
}
