// MinIO / S3 client backed by rust-s3

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::{debug, error};

use super::{ObjectStore, StorageError};
use crate::config::StorageConfig;

pub struct MinioStore {
    bucket: Box<Bucket>,
    bucket_name: String,
    public_endpoint: String,
}

impl MinioStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("Invalid MinIO credentials: {}", e)))?;

        // MinIO serves buckets path-style
        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket: Box::new(bucket),
            bucket_name: config.bucket.clone(),
            public_endpoint: config.public_endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for MinioStore {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "MinIO upload failed");
                StorageError::Backend(e.to_string())
            })?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Backend(format!("Upload of {} returned HTTP {}", key, status)));
        }
        debug!(key = %key, status, "Object uploaded");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(|e| {
            let message = e.to_string();
            if message.contains("404") || message.contains("NoSuchKey") {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Backend(message)
            }
        })?;

        match response.status_code() {
            200..=299 => Ok(response.bytes().to_vec()),
            404 => Err(StorageError::NotFound(key.to_string())),
            status => Err(StorageError::Backend(format!("Download of {} returned HTTP {}", key, status))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_endpoint, self.bucket_name, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            provider: "minio".to_string(),
            endpoint: "http://minio:9000".to_string(),
            public_endpoint: "https://files.example.org/".to_string(),
            bucket: "neoagent".to_string(),
            region: "us-east-1".to_string(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
        }
    }

    #[test]
    fn test_public_url_uses_public_endpoint() {
        let store = MinioStore::new(&config()).unwrap();
        assert_eq!(store.bucket(), "neoagent");
        assert_eq!(
            store.public_url("runs/abc/report.pdf"),
            "https://files.example.org/neoagent/runs/abc/report.pdf"
        );
    }
}
