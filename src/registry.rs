//! Registry of named Firebase apps and their contexts.

use crate::context::{ContextError, ContextMap, ContextSettings, FirebaseContext};
use crate::options::{ConfigError, FirebaseOptions};
use crate::{FirebaseApp, DEFAULT_APP_NAME};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[cfg(feature = "analytics")]
use crate::analytics::FirebaseAnalytics;
#[cfg(feature = "auth")]
use crate::auth::FirebaseAuth;
#[cfg(feature = "firestore")]
use crate::firestore::FirebaseFirestore;
#[cfg(feature = "installations")]
use crate::installations::FirebaseInstallations;
#[cfg(feature = "remote_config")]
use crate::remote_config::FirebaseRemoteConfig;
#[cfg(feature = "storage")]
use crate::storage::FirebaseStorage;

type AppProvider = Arc<dyn Fn(&str) -> Option<FirebaseOptions> + Send + Sync>;

/// `""` and [`DEFAULT_APP_NAME`] both name the default app.
fn normalize_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_APP_NAME
    } else {
        name
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Named Firebase apps, created on first configuration and cached by name.
///
/// Service accessors return `None` for names that are not configured; they never fail.
pub struct Firebase {
    apps: Mutex<HashMap<String, Arc<FirebaseApp>>>,
    provider: Mutex<Option<AppProvider>>,
    contexts: Arc<ContextMap>,
    context_settings: ContextSettings,
}

impl Default for Firebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Firebase {
    pub fn new() -> Self {
        Self {
            apps: Mutex::new(HashMap::new()),
            provider: Mutex::new(None),
            contexts: Arc::new(Mutex::new(HashMap::new())),
            context_settings: ContextSettings::default(),
        }
    }

    /// Settings used for the contexts this registry creates.
    pub fn with_context_settings(mut self, settings: ContextSettings) -> Self {
        self.context_settings = settings;
        self
    }

    /// Registers an app under `name` unless one exists already; returns the registered app.
    pub fn provide(&self, name: &str, options: FirebaseOptions) -> Arc<FirebaseApp> {
        let name = normalize_name(name);
        let mut apps = lock(&self.apps);
        if let Some(app) = apps.get(name) {
            debug!(name, "App already configured");
            return app.clone();
        }
        info!(name, project_id = %options.project_id, "Firebase app configured");
        let app = Arc::new(FirebaseApp::new(name, options));
        apps.insert(name.to_string(), app.clone());
        app
    }

    /// Configures the default app from a `google-services.json` document.
    pub fn provide_from_service_config(&self, json: &str) -> Result<Arc<FirebaseApp>, ConfigError> {
        self.provide_named_from_service_config(DEFAULT_APP_NAME, json)
    }

    pub fn provide_named_from_service_config(
        &self,
        name: &str,
        json: &str,
    ) -> Result<Arc<FirebaseApp>, ConfigError> {
        let options = FirebaseOptions::from_service_json(json)?;
        Ok(self.provide(name, options))
    }

    /// Configures the default app from a `google-services.json` file.
    pub fn provide_from_file(&self, path: impl AsRef<Path>) -> Result<Arc<FirebaseApp>, ConfigError> {
        let options = FirebaseOptions::from_service_file(path)?;
        Ok(self.provide(DEFAULT_APP_NAME, options))
    }

    /// Installs a factory consulted for names that are not configured yet.
    pub fn set_app_provider<F>(&self, provider: F)
    where
        F: Fn(&str) -> Option<FirebaseOptions> + Send + Sync + 'static,
    {
        *lock(&self.provider) = Some(Arc::new(provider));
    }

    pub fn app(&self, name: &str) -> Option<Arc<FirebaseApp>> {
        let name = normalize_name(name);
        if let Some(app) = lock(&self.apps).get(name) {
            return Some(app.clone());
        }
        let provider = lock(&self.provider).clone()?;
        let options = provider(name)?;
        Some(self.provide(name, options))
    }

    /// Removes an app and closes its context.
    ///
    /// Service handles already handed out keep working; later lookups of `name` see no app.
    pub async fn delete_app(&self, name: &str) -> bool {
        let name = normalize_name(name);
        let removed = lock(&self.apps).remove(name).is_some();
        let context = lock(&self.contexts).remove(name);
        if let Some(context) = context {
            context.close().await;
        }
        if removed {
            info!(name, "Firebase app deleted");
        }
        removed
    }

    /// The live context of an app, created on first access and cached until closed.
    ///
    /// A name with no configured app still gets a context; its snapshots stay empty.
    pub fn context(&self, name: &str) -> Result<Arc<FirebaseContext>, ContextError> {
        let name = normalize_name(name);
        let sources = match self.app(name) {
            Some(app) => app.context_sources(),
            None => {
                debug!(name, "No app configured, context has no sources");
                Default::default()
            }
        };

        let mut contexts = lock(&self.contexts);
        if let Some(context) = contexts.get(name) {
            if !context.is_closed() {
                return Ok(context.clone());
            }
        }
        let context = FirebaseContext::start_in(
            name,
            sources,
            self.context_settings,
            Some(Arc::downgrade(&self.contexts)),
        )?;
        contexts.insert(name.to_string(), context.clone());
        Ok(context)
    }

    #[cfg(feature = "auth")]
    pub fn auth(&self, name: &str) -> Option<Arc<FirebaseAuth>> {
        self.app(name).map(|app| app.auth())
    }

    #[cfg(feature = "installations")]
    pub fn installations(&self, name: &str) -> Option<Arc<FirebaseInstallations>> {
        self.app(name).map(|app| app.installations())
    }

    #[cfg(feature = "remote_config")]
    pub fn remote_config(&self, name: &str) -> Option<Arc<FirebaseRemoteConfig>> {
        self.app(name).map(|app| app.remote_config())
    }

    #[cfg(feature = "firestore")]
    pub fn firestore(&self, name: &str) -> Option<Arc<FirebaseFirestore>> {
        self.app(name).map(|app| app.firestore())
    }

    /// Storage for `url` (`""` for the default bucket) of the app `name`.
    #[cfg(feature = "storage")]
    pub fn storage(&self, url: &str, name: &str) -> Option<Arc<FirebaseStorage>> {
        let app = self.app(name)?;
        match app.storage(url) {
            Ok(storage) => Some(storage),
            Err(e) => {
                warn!(name = app.name(), url, error = %e, "Storage unavailable");
                None
            }
        }
    }

    #[cfg(feature = "analytics")]
    pub fn analytics(&self, name: &str) -> Option<Arc<FirebaseAnalytics>> {
        self.app(name)?.analytics()
    }

    pub fn link_app_module() -> bool {
        true
    }

    pub fn link_auth_module() -> bool {
        cfg!(feature = "auth")
    }

    pub fn link_installations_module() -> bool {
        cfg!(feature = "installations")
    }

    pub fn link_remote_config_module() -> bool {
        cfg!(feature = "remote_config")
    }

    pub fn link_firestore_module() -> bool {
        cfg!(feature = "firestore")
    }

    pub fn link_storage_module() -> bool {
        cfg!(feature = "storage")
    }

    pub fn link_analytics_module() -> bool {
        cfg!(feature = "analytics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Endpoints;
    use std::time::Duration;

    const SERVICE_JSON: &str = r#"{
        "project_info": {
            "project_number": "1",
            "firebase_url": "https://demo.firebaseio.com",
            "project_id": "demo",
            "storage_bucket": "demo.appspot.com"
        },
        "client": [
            {
                "client_info": { "mobilesdk_app_id": "1:1:android:abc" },
                "api_key": [ { "current_key": "key123" } ]
            }
        ]
    }"#;

    /// Routes every service to an unreachable local port so background loops fail fast.
    fn offline_options(project_id: &str) -> FirebaseOptions {
        FirebaseOptions::new(project_id, "1:1:android:abc", "key123")
            .with_endpoints(Endpoints::emulated("http://127.0.0.1:9"))
    }

    fn offline_registry() -> Firebase {
        Firebase::new().with_context_settings(
            ContextSettings::debug().with_installation_retry_delay(Duration::from_secs(1)),
        )
    }

    #[test]
    fn test_default_app_from_service_config() {
        let firebase = Firebase::new();
        let app = firebase.provide_from_service_config(SERVICE_JSON).unwrap();
        assert!(app.is_default());
        assert_eq!(app.options().project_id, "demo");
        assert_eq!(app.options().api_key, "key123");

        assert!(firebase.app("").is_some());
        assert!(Arc::ptr_eq(&firebase.app("").unwrap(), &app));
        assert!(Arc::ptr_eq(&firebase.app(DEFAULT_APP_NAME).unwrap(), &app));
        assert!(firebase.app("other").is_none());
        assert!(Firebase::link_app_module());
        #[cfg(feature = "auth")]
        assert!(firebase.auth("other").is_none());
    }

    #[test]
    fn test_provide_is_idempotent() {
        let firebase = Firebase::new();
        let first = firebase
            .provide_named_from_service_config("secondary", SERVICE_JSON)
            .unwrap();
        let second = firebase.provide("secondary", offline_options("changed"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.options().project_id, "demo");
        assert!(!second.is_default());
        assert!(firebase.app("").is_none());
    }

    #[test]
    fn test_invalid_service_config_is_reported() {
        let firebase = Firebase::new();
        let err = firebase.provide_from_service_config("{}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("project_info")));
        assert!(firebase.app("").is_none());
    }

    #[test]
    fn test_provide_from_file() {
        let path = std::env::temp_dir().join(format!(
            "google-services-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, SERVICE_JSON).unwrap();

        let firebase = Firebase::new();
        let app = firebase.provide_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(app.is_default());
        assert_eq!(
            app.options().database_url.as_deref(),
            Some("https://demo.firebaseio.com")
        );

        let err = firebase.provide_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_app_provider_is_consulted_for_unknown_names() {
        let firebase = Firebase::new();
        firebase.set_app_provider(|name| (name == "lazy").then(|| offline_options("lazy-project")));

        let app = firebase.app("lazy").unwrap();
        assert_eq!(app.options().project_id, "lazy-project");
        assert!(Arc::ptr_eq(&firebase.app("lazy").unwrap(), &app));
        assert!(firebase.app("unknown").is_none());
    }

    #[test]
    fn test_service_handles_are_cached() {
        let firebase = Firebase::new();
        firebase.provide_from_service_config(SERVICE_JSON).unwrap();

        #[cfg(feature = "auth")]
        assert!(Arc::ptr_eq(
            &firebase.auth("").unwrap(),
            &firebase.auth(DEFAULT_APP_NAME).unwrap()
        ));
        #[cfg(feature = "remote_config")]
        assert!(Arc::ptr_eq(
            &firebase.remote_config("").unwrap(),
            &firebase.remote_config("").unwrap()
        ));
        #[cfg(feature = "firestore")]
        assert!(Arc::ptr_eq(
            &firebase.firestore("").unwrap(),
            &firebase.firestore("").unwrap()
        ));
        #[cfg(feature = "analytics")]
        assert!(firebase.analytics("").is_none());
    }

    #[cfg(feature = "storage")]
    #[test]
    fn test_storage_per_bucket() {
        let firebase = Firebase::new();
        firebase.provide_from_service_config(SERVICE_JSON).unwrap();

        let default = firebase.storage("", "").unwrap();
        assert_eq!(default.bucket(), "demo.appspot.com");
        assert!(Arc::ptr_eq(&default, &firebase.storage("gs://demo.appspot.com", "").unwrap()));

        let other = firebase.storage("gs://other-bucket", "").unwrap();
        assert_eq!(other.bucket(), "other-bucket");
        assert!(!Arc::ptr_eq(&default, &other));

        assert!(firebase.storage("https://example.com", "").is_none());
        assert!(firebase.storage("", "missing").is_none());
    }

    #[cfg(feature = "analytics")]
    #[test]
    fn test_analytics_requires_api_secret() {
        let firebase = Firebase::new();
        firebase.provide("", offline_options("demo").with_analytics_api_secret("secret"));
        let analytics = firebase.analytics("").unwrap();
        assert!(Arc::ptr_eq(&analytics, &firebase.analytics("").unwrap()));
    }

    #[tokio::test]
    async fn test_context_cached_per_name() {
        let firebase = offline_registry();
        firebase.provide("", offline_options("demo"));
        firebase.provide("other", offline_options("other"));

        let default = firebase.context("").unwrap();
        assert!(default.is_default());
        assert!(Arc::ptr_eq(&default, &firebase.context(DEFAULT_APP_NAME).unwrap()));

        let other = firebase.context("other").unwrap();
        assert!(!Arc::ptr_eq(&default, &other));
        assert_eq!(other.name(), "other");

        default.close().await;
        other.close().await;
    }

    #[tokio::test]
    async fn test_close_evicts_context() {
        let firebase = offline_registry();
        firebase.provide("", offline_options("demo"));

        let first = firebase.context("").unwrap();
        first.close().await;
        assert!(first.is_closed());

        let second = firebase.context("").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());

        // Closing the stale instance again must not evict its replacement.
        first.close().await;
        assert!(Arc::ptr_eq(&second, &firebase.context("").unwrap()));

        second.close().await;
    }

    #[tokio::test]
    async fn test_delete_app_closes_context() {
        let firebase = offline_registry();
        firebase.provide("temp", offline_options("temp"));
        let context = firebase.context("temp").unwrap();

        assert!(firebase.delete_app("temp").await);
        assert!(context.is_closed());
        assert!(firebase.app("temp").is_none());
        assert!(!firebase.delete_app("temp").await);
    }

    #[tokio::test]
    async fn test_context_without_app_is_empty() {
        let firebase = Firebase::new();
        let context = firebase.context("nothing").unwrap();
        let snapshot = context.snapshot().unwrap();
        assert!(snapshot.user.is_none());
        assert!(snapshot.remote_config_values.is_empty());
        context.close().await;
    }
}
