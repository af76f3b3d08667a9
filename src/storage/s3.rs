// backup-runner/src/storage/s3.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::{StorageBackend, prefixed_name};

#[derive(Debug, Clone, Deserialize)]
pub struct S3DiskConfig {
    pub key: String,
    pub secret: String,
    pub region: String,
    pub bucket: String,
    /// Custom endpoint for S3-compatible services (DigitalOcean Spaces, MinIO, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub use_path_style_endpoint: bool,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub root: Option<String>,
}

/// S3-compatible object storage.
pub struct S3Storage {
    client: s3::Client,
    bucket: String,
    root: Option<String>,
}

impl S3Storage {
    pub async fn connect(config: &S3DiskConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.key,
                &config.secret,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style_endpoint)
            .build();

        Ok(Self {
            client: s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            root: config.root.clone(),
        })
    }

    fn key_for(&self, name: &str) -> String {
        prefixed_name(self.root.as_deref(), name)
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn upload(&self, name: &str, local_file: &Path) -> Result<()> {
        let key = self.key_for(name);
        info!(bucket = %self.bucket, key = %key, "Uploading {}", local_file.display());

        let body = ByteStream::from_path(local_file)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", local_file.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload file {} to S3 bucket {} with key {}",
                    local_file.display(),
                    self.bucket,
                    key
                )
            })?;

        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.key_for(name);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to delete {} from S3 bucket {}", key, self.bucket))?;

        info!(bucket = %self.bucket, key = %key, "Deleted object");
        Ok(())
    }
}
