//! Google Analytics for Firebase, sent through the GA4 Measurement Protocol.
//!
//! Events are posted to `mp/collect` with the app's Firebase app id and a Measurement
//! Protocol API secret. Each handle identifies itself with a random app instance id.


use rand::Rng;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

const MAX_EVENT_NAME_LENGTH: usize = 40;
const RESERVED_PREFIXES: [&str; 3] = ["firebase_", "google_", "ga_"];

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Invalid event name: {0}")]
    InvalidEventName(String),
}

#[derive(Serialize)]
struct MeasurementPayload<'a> {
    app_instance_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    events: [MeasurementEvent<'a>; 1],
}

#[derive(Serialize)]
struct MeasurementEvent<'a> {
    name: &'a str,
    params: &'a BTreeMap<String, Value>,
}

/// Checks an event name against the Analytics naming rules.
pub fn validate_event_name(name: &str) -> Result<(), AnalyticsError> {
    let invalid = || AnalyticsError::InvalidEventName(name.to_string());
    if name.is_empty() || name.len() > MAX_EVENT_NAME_LENGTH {
        return Err(invalid());
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }
    if RESERVED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return Err(invalid());
    }
    Ok(())
}

fn generate_app_instance_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Analytics client for one app.
pub struct FirebaseAnalytics {
    client: ClientWithMiddleware,
    collect_url: String,
    app_instance_id: String,
    user_id: Mutex<Option<String>>,
}

impl FirebaseAnalytics {
    /// Creates a new `FirebaseAnalytics` instance.
    ///
    /// This is typically called via `FirebaseApp::analytics()`.
    pub fn new(
        client: ClientWithMiddleware,
        collect_url: &str,
        firebase_app_id: &str,
        api_secret: &str,
    ) -> Self {
        let mut url = collect_url.to_string();
        url.push('?');
        url.push_str(
            &url::form_urlencoded::Serializer::new(String::new())
                .append_pair("firebase_app_id", firebase_app_id)
                .append_pair("api_secret", api_secret)
                .finish(),
        );
        Self {
            client,
            collect_url: url,
            app_instance_id: generate_app_instance_id(),
            user_id: Mutex::new(None),
        }
    }

    /// The random 32 hex digit id this handle reports events under.
    pub fn app_instance_id(&self) -> &str {
        &self.app_instance_id
    }

    /// Attaches `user_id` to every event logged afterwards; `None` clears it.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    /// Logs one event.
    pub async fn log_event(
        &self,
        name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<(), AnalyticsError> {
        validate_event_name(name)?;

        let payload = MeasurementPayload {
            app_instance_id: &self.app_instance_id,
            user_id: self.user_id.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            events: [MeasurementEvent { name, params }],
        };

        let response = self
            .client
            .post(&self.collect_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AnalyticsError::ApiError(format!(
                "Collect failed {}: {}",
                status, text
            )));
        }

        debug!(event = name, "Analytics event sent");
        Ok(())
    }
}
