use crate::config::StorageConfig;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors returned by the object storage client
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Invalid storage base URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Write access to an object store that serves uploads by URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `filename` and return its public URL
    async fn put_object(
        &self,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// Supabase Storage client using the REST object endpoint
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    bucket: String,
}

impl SupabaseStorage {
    /// Create a new client
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let invalid = |message: String| StorageError::InvalidUrl {
            url: config.base_url.clone(),
            message,
        };
        let base_url = Url::parse(&config.base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;

        info!(bucket = %config.bucket, "Supabase storage client initialized");

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            bucket: config.bucket.clone(),
        })
    }

    /// URL an object is written to and served from.
    ///
    /// Each path segment is percent-encoded, so the object key survives as a
    /// single segment whatever characters the filename carries.
    pub fn object_url(&self, filename: &str) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object", self.bucket.as_str(), filename]);
        }
        url.to_string()
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put_object(
        &self,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let url = self.object_url(filename);

        debug!(url = %url, "Uploading object");

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(filename = %filename, "Object uploaded successfully");

        Ok(url)
    }
}

/// Build the stored name for an upload: `{unix_secs}_{stem}.jpg`.
///
/// Spaces become dashes and the original extension is dropped. Path
/// separators are replaced so a client-supplied name stays inside the bucket.
/// Other characters are kept; [`SupabaseStorage::object_url`] encodes them.
pub fn storage_filename(original_name: &str, unix_secs: i64) -> String {
    let stem = match original_name.rfind('.') {
        Some(idx) if idx > 0 => &original_name[..idx],
        _ => original_name,
    };

    format!("{}_{}.jpg", unix_secs, sanitize_stem(stem))
}

/// Sanitize a filename stem for use as an object key
fn sanitize_stem(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}
