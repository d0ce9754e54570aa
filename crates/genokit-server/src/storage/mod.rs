//! Object storage for genotype files
//!
//! Files land under `pending/` and move to `completed/` once processed.
//! The move is a copy followed by a delete; the pair is not atomic.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use config::StorageConfig;
pub use memory::InMemoryObjectStore;

pub const PENDING_PREFIX: &str = "pending/";
pub const COMPLETED_PREFIX: &str = "completed/";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Failed to {operation} s3://{bucket}/{key}: {message}")]
    Request {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },
}

impl StorageError {
    fn request(operation: &'static str, bucket: &str, key: &str, err: impl std::error::Error) -> Self {
        StorageError::Request {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Key under `completed/` for a key under `pending/`
pub fn completed_key(key: &str) -> Option<String> {
    key.strip_prefix(PENDING_PREFIX)
        .filter(|name| !name.is_empty())
        .map(|name| format!("{COMPLETED_PREFIX}{name}"))
}

/// The slice of object storage the pipeline relies on
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Every key under the prefix
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    async fn copy_then_delete(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        self.copy(bucket, source_key, dest_key).await?;
        self.delete(bucket, source_key).await
    }
}

/// S3 (or S3-compatible) object store
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the shared AWS config plus storage overrides
    pub fn from_config(sdk_config: &aws_config::SdkConfig, config: &StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some((access_key, secret_key)) = config.static_credentials() {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "genokit-storage",
            ));
        }

        info!(region = %config.region, endpoint = ?config.endpoint, "Storage client initialized");

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::request("download", bucket, key, e)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::request("read body of", bucket, key, e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(StorageError::request("check", bucket, key, e)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        debug!("Listing objects in s3://{}/{}", bucket, prefix);

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::request("list", bucket, prefix, e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter(|k| !k.ends_with('/'))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        let copy_source = format!("{}/{}", bucket, source_key);

        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| StorageError::request("copy", bucket, source_key, e))?;

        debug!("Copied s3://{}/{} to s3://{}/{}", bucket, source_key, bucket, dest_key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::request("delete", bucket, key, e))?;

        debug!("Deleted s3://{}/{}", bucket, key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_key() {
        assert_eq!(completed_key("pending/S1.txt"), Some("completed/S1.txt".to_string()));
        assert_eq!(completed_key("pending/2024/S1.txt"), Some("completed/2024/S1.txt".to_string()));
        assert_eq!(completed_key("completed/S1.txt"), None);
        assert_eq!(completed_key("inbox/pending/S1.txt"), None);
        assert_eq!(completed_key("pending/"), None);
    }
}
