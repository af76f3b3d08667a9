// backup-runner/src/storage/sftp.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{StorageBackend, prefixed_name};

#[derive(Debug, Clone, Deserialize)]
pub struct SftpDiskConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Key material, or a path to the key file when `use_ssh_key` is set.
    #[serde(default, rename = "privateKey")]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub use_ssh_key: bool,
    #[serde(default)]
    pub root: Option<String>,
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Clone)]
enum SftpAuth {
    Password(String),
    Key {
        private_key: String,
        passphrase: Option<String>,
    },
}

/// Remote directory reached over SSH. libssh2 is blocking, so every call
/// opens its own session on a blocking thread.
#[derive(Clone)]
pub struct SftpStorage {
    address: String,
    username: String,
    auth: SftpAuth,
    root: Option<String>,
}

impl SftpStorage {
    pub fn new(config: &SftpDiskConfig) -> Result<Self> {
        let auth = match (&config.private_key, &config.password) {
            (Some(key), _) => {
                let private_key = if config.use_ssh_key {
                    std::fs::read_to_string(key)
                        .with_context(|| format!("Failed to read SSH private key from {key}"))?
                } else {
                    key.clone()
                };
                SftpAuth::Key {
                    private_key,
                    passphrase: config.passphrase.clone(),
                }
            }
            (None, Some(password)) => SftpAuth::Password(password.clone()),
            (None, None) => anyhow::bail!(
                "SFTP disk configuration for {} needs either a password or a privateKey",
                config.host
            ),
        };

        Ok(Self {
            address: format!("{}:{}", config.host, config.port),
            username: config.username.clone(),
            auth,
            root: config.root.clone(),
        })
    }

    fn remote_path(&self, name: &str) -> PathBuf {
        let path = prefixed_name(self.root.as_deref(), name);
        match &self.root {
            Some(root) if root.starts_with('/') => PathBuf::from(format!("/{path}")),
            _ => PathBuf::from(path),
        }
    }

    fn open_session(&self) -> Result<ssh2::Session> {
        let tcp = TcpStream::connect(&self.address)
            .with_context(|| format!("Failed to connect to SFTP server {}", self.address))?;
        let mut sess = ssh2::Session::new()?;
        sess.set_tcp_stream(tcp);
        sess.handshake()
            .with_context(|| format!("SSH handshake with {} failed", self.address))?;

        let auth_result = match &self.auth {
            SftpAuth::Password(password) => sess.userauth_password(&self.username, password),
            SftpAuth::Key {
                private_key,
                passphrase,
            } => sess.userauth_pubkey_memory(&self.username, None, private_key, passphrase.as_deref()),
        };
        auth_result
            .map_err(|e| anyhow::anyhow!("SSH authentication failed for {}: {}", self.username, e))?;

        if !sess.authenticated() {
            anyhow::bail!("SSH authentication failed for {}", self.username);
        }
        Ok(sess)
    }

    fn upload_blocking(&self, remote: &Path, local_file: &Path) -> Result<()> {
        let sess = self.open_session()?;
        let sftp = sess.sftp()?;

        let mut source = std::fs::File::open(local_file)
            .with_context(|| format!("Failed to open {}", local_file.display()))?;
        let mut remote_file = sftp
            .create(remote)
            .with_context(|| format!("Failed to create remote file {}", remote.display()))?;
        std::io::copy(&mut source, &mut remote_file)
            .with_context(|| format!("Failed to write remote file {}", remote.display()))?;
        Ok(())
    }

    fn delete_blocking(&self, remote: &Path) -> Result<()> {
        let sess = self.open_session()?;
        let sftp = sess.sftp()?;
        sftp.unlink(remote)
            .with_context(|| format!("Failed to delete remote file {}", remote.display()))?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SftpStorage {
    async fn upload(&self, name: &str, local_file: &Path) -> Result<()> {
        let remote = self.remote_path(name);
        info!(address = %self.address, "Uploading {} to {}", local_file.display(), remote.display());

        let storage = self.clone();
        let local_file = local_file.to_path_buf();
        tokio::task::spawn_blocking(move || storage.upload_blocking(&remote, &local_file)).await?
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let remote = self.remote_path(name);
        let storage = self.clone();
        tokio::task::spawn_blocking(move || storage.delete_blocking(&remote)).await?
    }
}
