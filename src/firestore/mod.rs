//! Cloud Firestore module.
//!
//! Document-scoped access to Cloud Firestore over its REST API: read, write and delete single
//! documents, and follow them in real time.
//!
//! # Real-time Updates
//!
//! `DocumentReference::listen()` opens a `documents:listen` stream of raw `ListenResponse`
//! events. `DocumentReference::to_live()` wraps it into a [`LiveDocumentSnapshot`] that only
//! listens while it has subscribers.

pub mod listen;
pub mod live;
pub mod models;
pub mod reference;
pub mod snapshot;


pub use live::LiveDocumentSnapshot;
pub use reference::DocumentReference;
pub use snapshot::DocumentSnapshot;

use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

/// Errors that can occur during Firestore operations.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Firestore API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Client for interacting with Cloud Firestore.
pub struct FirebaseFirestore {
    client: ClientWithMiddleware,
    database: String,
    database_url: String,
}

impl FirebaseFirestore {
    /// Creates a new `FirebaseFirestore` instance for the `(default)` database.
    ///
    /// This is typically called via `FirebaseApp::firestore()`.
    pub fn new(client: ClientWithMiddleware, base_url: &str, project_id: &str) -> Self {
        let database = format!("projects/{}/databases/(default)", project_id);
        let database_url = format!("{}/{}", base_url.trim_end_matches('/'), database);
        Self {
            client,
            database,
            database_url,
        }
    }

    /// Gets a `DocumentReference` instance that refers to the document at the specified path.
    ///
    /// # Arguments
    ///
    /// * `document_path` - The slash-separated path to the document (e.g., "users/user1").
    pub fn doc(&self, document_path: &str) -> DocumentReference {
        DocumentReference {
            client: self.client.clone(),
            database_url: self.database_url.clone(),
            database: self.database.clone(),
            path: document_path.trim_matches('/').to_string(),
        }
    }
}
