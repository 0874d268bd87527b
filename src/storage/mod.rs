//! Cloud Storage for Firebase module.
//!
//! Client-side access to objects of one bucket through the Firebase Storage REST API, the
//! same surface the mobile SDKs use. Requests carry the signed-in user's ID token, so the
//! bucket's security rules apply.

pub mod models;
pub mod reference;

#[cfg(test)]
mod tests;

pub use models::StorageMetadata;
pub use reference::StorageReference;

use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

/// Errors that can occur during Storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Storage API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// The bucket URL is neither `gs://bucket` nor a bare bucket name.
    #[error("Invalid bucket URL: {0}")]
    InvalidUrl(String),
    /// A download exceeded the size limit given by the caller.
    #[error("Object is {size} bytes, more than the allowed {max}")]
    TooLarge { size: u64, max: u64 },
}

/// Resolves a bucket URL to a bucket name.
///
/// Accepts `gs://bucket`, `gs://bucket/` and a bare bucket name.
pub fn parse_bucket_url(url: &str) -> Result<String, StorageError> {
    let bucket = match url.strip_prefix("gs://") {
        Some(rest) => rest.trim_end_matches('/'),
        None if url.contains("://") => return Err(StorageError::InvalidUrl(url.to_string())),
        None => url,
    };
    if bucket.is_empty() || bucket.contains('/') {
        return Err(StorageError::InvalidUrl(url.to_string()));
    }
    Ok(bucket.to_string())
}

/// Client for one Cloud Storage bucket.
#[derive(Clone)]
pub struct FirebaseStorage {
    client: ClientWithMiddleware,
    base_url: String,
    bucket: String,
}

impl FirebaseStorage {
    /// Creates a new `FirebaseStorage` instance.
    ///
    /// This is typically called via `FirebaseApp::storage()`.
    pub fn new(client: ClientWithMiddleware, base_url: &str, bucket: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Returns the name of the bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Gets a `StorageReference` to the object at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of the object within the bucket (e.g., "images/profile.png").
    pub fn reference(&self, path: &str) -> StorageReference {
        StorageReference::new(
            self.client.clone(),
            self.base_url.clone(),
            self.bucket.clone(),
            path.trim_matches('/').to_string(),
        )
    }
}
