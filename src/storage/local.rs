use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

use super::StorageBackend;

#[derive(Debug, Clone, Deserialize)]
pub struct LocalDiskConfig {
    pub root: PathBuf,
}

/// A directory on the machine running the backup, typically a mounted volume.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(config: &LocalDiskConfig) -> Self {
        Self {
            root: config.root.clone(),
        }
    }

    /// Location of `name` under the root. Only plain relative names are
    /// accepted, so nothing outside the root can be written or deleted.
    fn target(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !plain {
            anyhow::bail!("Refusing backup name '{name}': it must stay inside {}", self.root.display());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(&self, name: &str, local_file: &Path) -> Result<()> {
        let target = self.target(name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create storage directory {}", self.root.display()))?;

        tokio::fs::copy(local_file, &target).await.with_context(|| {
            format!("Failed to copy {} to {}", local_file.display(), target.display())
        })?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let target = self.target(name)?;
        tokio::fs::remove_file(&target)
            .await
            .with_context(|| format!("Failed to delete {}", target.display()))
    }
}
