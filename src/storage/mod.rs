// Storage layer (S3-compatible)
//
// Every pipeline step exchanges its inputs and outputs through the object
// store; services receive `minio://bucket/key` URLs and write their result
// tables back to the same bucket.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub mod memory;
pub mod s3_client;

pub use memory::MemoryStore;
pub use s3_client::MinioStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object URL: {0}")]
    InvalidUrl(String),

    #[error("Object {key} is in bucket '{bucket}', store serves '{expected}'")]
    WrongBucket { bucket: String, key: String, expected: String },

    #[error("Object store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Plain HTTP link to the object for end users
    fn public_url(&self, key: &str) -> String;
}

/// Location of an object, rendered as `minio://<bucket>/<key>`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectUrl {
    pub bucket: String,
    pub key: String,
}

impl ObjectUrl {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Accepts `minio://bucket/key`, `s3://bucket/key` or a bare key in `default_bucket`
    pub fn parse(raw: &str, default_bucket: &str) -> Result<Self, StorageError> {
        let raw = raw.trim();
        let rest = raw
            .strip_prefix("minio://")
            .or_else(|| raw.strip_prefix("s3://"));

        match rest {
            Some(rest) => {
                let (bucket, key) = rest
                    .split_once('/')
                    .ok_or_else(|| StorageError::InvalidUrl(raw.to_string()))?;
                if bucket.is_empty() || key.is_empty() {
                    return Err(StorageError::InvalidUrl(raw.to_string()));
                }
                Ok(Self::new(bucket, key))
            }
            None if raw.contains("://") || raw.is_empty() => Err(StorageError::InvalidUrl(raw.to_string())),
            None => Ok(Self::new(default_bucket, raw.trim_start_matches('/'))),
        }
    }

    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "minio://{}/{}", self.bucket, self.key)
    }
}

/// Facade over the configured object store
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
}

impl Storage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory(bucket: &str) -> Self {
        Self::new(Arc::new(MemoryStore::new(bucket)))
    }

    pub fn from_config(config: &crate::config::StorageConfig) -> Result<Self, StorageError> {
        match config.provider.as_str() {
            "memory" => Ok(Self::in_memory(&config.bucket)),
            "minio" | "s3" => Ok(Self::new(Arc::new(MinioStore::new(config)?))),
            other => Err(StorageError::Backend(format!("Unsupported storage provider: {}", other))),
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    pub fn parse_url(&self, raw: &str) -> Result<ObjectUrl, StorageError> {
        ObjectUrl::parse(raw, self.store.bucket())
    }

    /// Upload under `<prefix>/<uuid>_<filename>` and return the object URL
    pub async fn upload_file(&self, prefix: &str, filename: &str, data: Vec<u8>) -> Result<ObjectUrl, StorageError> {
        let safe_name: String = filename
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        let key = format!(
            "{}/{}_{}",
            prefix.trim_matches('/'),
            &uuid::Uuid::new_v4().simple().to_string()[..8],
            safe_name
        );
        self.put(&key, data).await
    }

    /// Upload at exactly `key`
    pub async fn put(&self, key: &str, data: Vec<u8>) -> Result<ObjectUrl, StorageError> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream();
        debug!(key = %key, size = data.len(), "Uploading object");
        self.store.put(key, data, content_type.essence_str()).await?;
        Ok(ObjectUrl::new(self.store.bucket(), key))
    }

    pub async fn download(&self, url: &ObjectUrl) -> Result<Vec<u8>, StorageError> {
        if url.bucket != self.store.bucket() {
            return Err(StorageError::WrongBucket {
                bucket: url.bucket.clone(),
                key: url.key.clone(),
                expected: self.store.bucket().to_string(),
            });
        }
        self.store.get(&url.key).await
    }

    pub async fn download_text(&self, url: &ObjectUrl) -> Result<String, StorageError> {
        let bytes = self.download(url).await?;
        String::from_utf8(bytes).map_err(|e| StorageError::Backend(format!("{} is not UTF-8: {}", url, e)))
    }

    pub fn download_link(&self, url: &ObjectUrl) -> String {
        self.store.public_url(&url.key)
    }
}
