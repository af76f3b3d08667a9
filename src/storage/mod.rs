//! Storage backends that receive the finished archive.
//!
//! The job descriptor carries an untyped `disk_config` map; [`DiskConfig`]
//! gives it a shape when a stage actually needs the backend, so a bad
//! storage configuration fails that stage instead of the whole job fetch.

pub(crate) mod local;
pub(crate) mod s3;
pub(crate) mod sftp;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

pub use local::{LocalDiskConfig, LocalStorage};
pub use s3::{S3DiskConfig, S3Storage};
pub use sftp::{SftpDiskConfig, SftpStorage};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Streams `local_file` to the backend under `name`.
    async fn upload(&self, name: &str, local_file: &Path) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DiskConfig {
    S3(S3DiskConfig),
    Sftp(SftpDiskConfig),
    Local(LocalDiskConfig),
}

impl DiskConfig {
    pub fn from_map(config: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let driver = config
            .get("driver")
            .and_then(|d| d.as_str())
            .unwrap_or("<missing>")
            .to_string();
        serde_json::from_value(serde_json::Value::Object(config.clone()))
            .with_context(|| format!("Invalid disk configuration for driver '{driver}'"))
    }
}

/// Builds storage backends from a job's disk configuration.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self, config: &DiskConfig) -> Result<Box<dyn StorageBackend>>;
}

/// Connects to the real backend named by the configuration.
pub struct DriverConnector;

#[async_trait]
impl StorageConnector for DriverConnector {
    async fn connect(&self, config: &DiskConfig) -> Result<Box<dyn StorageBackend>> {
        Ok(match config {
            DiskConfig::S3(cfg) => Box::new(S3Storage::connect(cfg).await?),
            DiskConfig::Sftp(cfg) => Box::new(SftpStorage::new(cfg)?),
            DiskConfig::Local(cfg) => Box::new(LocalStorage::new(cfg)),
        })
    }
}

/// Joins an optional `root` prefix with a blob name using `/`.
pub(crate) fn prefixed_name(root: Option<&str>, name: &str) -> String {
    match root.map(|r| r.trim_matches('/')).filter(|r| !r.is_empty()) {
        Some(root) => format!("{root}/{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_s3_config() -> anyhow::Result<()> {
        let config = DiskConfig::from_map(&map(json!({
            "driver": "s3",
            "key": "AKIA",
            "secret": "shh",
            "region": "eu-central-1",
            "bucket": "backups",
            "endpoint": "https://fra1.digitaloceanspaces.com",
            "use_path_style_endpoint": true
        })))?;

        match config {
            DiskConfig::S3(s3) => {
                assert_eq!(s3.bucket, "backups");
                assert!(s3.use_path_style_endpoint);
                assert_eq!(s3.root, None);
            }
            other => panic!("unexpected config {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_sftp_config_with_key_file() -> anyhow::Result<()> {
        let config = DiskConfig::from_map(&map(json!({
            "driver": "sftp",
            "host": "backup.example.com",
            "username": "deploy",
            "privateKey": "/home/deploy/.ssh/id_ed25519",
            "use_ssh_key": true,
            "root": "/backups"
        })))?;

        match config {
            DiskConfig::Sftp(sftp) => {
                assert_eq!(sftp.port, 22);
                assert!(sftp.use_ssh_key);
                assert_eq!(sftp.private_key.as_deref(), Some("/home/deploy/.ssh/id_ed25519"));
            }
            other => panic!("unexpected config {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_unknown_driver_is_an_error() {
        let err = DiskConfig::from_map(&map(json!({ "driver": "ftp", "host": "x" }))).unwrap_err();
        assert!(err.to_string().contains("'ftp'"));
    }

    #[test]
    fn test_prefixed_name() {
        assert_eq!(prefixed_name(None, "a.tar.gz"), "a.tar.gz");
        assert_eq!(prefixed_name(Some("/nightly/"), "a.tar.gz"), "nightly/a.tar.gz");
        assert_eq!(prefixed_name(Some(""), "a.tar.gz"), "a.tar.gz");
    }
}
