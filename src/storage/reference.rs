use crate::storage::models::StorageMetadata;
use crate::storage::StorageError;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;

/// Represents an object within a Firebase Storage bucket.
#[derive(Clone)]
pub struct StorageReference {
    client: ClientWithMiddleware,
    base_url: String,
    bucket: String,
    path: String,
}

impl std::fmt::Debug for StorageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageReference(gs://{}/{})", self.bucket, self.path)
    }
}

impl StorageReference {
    pub(crate) fn new(
        client: ClientWithMiddleware,
        base_url: String,
        bucket: String,
        path: String,
    ) -> Self {
        Self {
            client,
            base_url,
            bucket,
            path,
        }
    }

    /// Returns the last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns the full path of the object within the bucket.
    pub fn full_path(&self) -> &str {
        &self.path
    }

    /// Returns the name of the bucket containing the object.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// A reference to `relative` below this one.
    pub fn child(&self, relative: &str) -> StorageReference {
        let relative = relative.trim_matches('/');
        let path = if self.path.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.path, relative)
        };
        StorageReference::new(self.client.clone(), self.base_url.clone(), self.bucket.clone(), path)
    }

    fn object_url(&self) -> String {
        // The object name is a single path segment, so '/' must be encoded too.
        let encoded_name = url::form_urlencoded::byte_serialize(self.path.as_bytes()).collect::<String>();
        format!("{}/b/{}/o/{}", self.base_url, self.bucket, encoded_name)
    }

    /// Uploads `body` as the object's content.
    ///
    /// # Arguments
    ///
    /// * `body` - The data to upload.
    /// * `content_type` - The MIME type of the data.
    pub async fn put_bytes(
        &self,
        body: impl Into<reqwest::Body>,
        content_type: &str,
    ) -> Result<StorageMetadata, StorageError> {
        let url = format!("{}/b/{}/o", self.base_url, self.bucket);

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", self.path.as_str())])
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::ApiError(format!(
                "Upload failed {}: {}",
                status, text
            )));
        }

        Ok(response.json().await?)
    }

    /// Downloads the object's content, failing when it is larger than `max_size` bytes.
    pub async fn get_bytes(&self, max_size: u64) -> Result<bytes::Bytes, StorageError> {
        let response = self
            .client
            .get(self.object_url())
            .query(&[("alt", "media")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::ApiError(format!(
                "Download failed {}: {}",
                status, text
            )));
        }

        if let Some(size) = response.content_length() {
            if size > max_size {
                return Err(StorageError::TooLarge { size, max: max_size });
            }
        }

        let bytes = response.bytes().await?;
        let size = bytes.len() as u64;
        if size > max_size {
            return Err(StorageError::TooLarge { size, max: max_size });
        }
        Ok(bytes)
    }

    /// Gets the object's metadata.
    pub async fn metadata(&self) -> Result<StorageMetadata, StorageError> {
        let response = self.client.get(self.object_url()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::ApiError(format!(
                "Get metadata failed {}: {}",
                status, text
            )));
        }

        Ok(response.json().await?)
    }

    /// Deletes the object.
    pub async fn delete(&self) -> Result<(), StorageError> {
        let response = self.client.delete(self.object_url()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::ApiError(format!(
                "Delete failed {}: {}",
                status, text
            )));
        }

        Ok(())
    }
}
