//! Google Cloud Storage blobs over the JSON API.
//!
//! Downloads use `alt=media`, uploads use the simple media upload. The
//! caller supplies an OAuth bearer token; acquiring one is out of scope.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::blob::BlobStore;
use crate::error::StorageError;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Objects in one GCS bucket.
#[derive(Debug, Clone)]
pub struct GcsBlobStore {
    inner: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl GcsBlobStore {
    /// Create a client for `bucket`.
    pub fn new(bucket: impl Into<String>, token: Option<String>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            bucket: bucket.into(),
            token,
        }
    }

    /// Point at another endpoint (emulators, proxies).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    fn base(&self) -> Result<Url, StorageError> {
        Url::parse(&self.endpoint).map_err(|e| StorageError::InvalidLocation(e.to_string()))
    }

    /// `GET` URL for an object's content.
    pub fn download_url(&self, object: &str) -> Result<Url, StorageError> {
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidLocation(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", object_name(object)]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    /// `POST` URL for a simple media upload.
    pub fn upload_url(&self, object: &str) -> Result<Url, StorageError> {
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidLocation(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name(object));
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn object_name(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Turn a non-success response into a [`StorageError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
    context: String,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(context));
    }
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(300).collect();
    Err(StorageError::Status {
        status: status.as_u16(),
        context,
        message,
    })
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.download_url(path)?;
        debug!(url = %url, "GET object");

        let response = self.authorize(self.inner.get(url)).send().await?;
        let response = check_status(response, self.describe(path)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let url = self.upload_url(path)?;
        debug!(url = %url, bytes = content.len(), "POST object");

        let request = self
            .inner
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(content.to_vec());
        let response = self.authorize(request).send().await?;
        check_status(response, self.describe(path)).await?;
        Ok(())
    }

    fn describe(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, object_name(path))
    }
}
