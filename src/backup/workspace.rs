use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::archive::ARCHIVE_EXTENSION;

/// Scratch directory for one run: manifest, dumps and the archive.
///
/// Removed by [`Workspace::close`] on the normal path and by drop on every
/// early return.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("backup-runner-");

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.path().join("manifest.txt")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join(format!("backup.{ARCHIVE_EXTENSION}"))
    }

    /// Deletes the directory, reporting failures that drop would swallow.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}
