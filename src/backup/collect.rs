// backup-runner/src/backup/collect.rs
use anyhow::anyhow;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::error_log::{ErrorLog, Stage};
use super::exclusion::{ExclusionRules, canonical};
use super::manifest::Manifest;

/// Walks the job's include paths and appends every non-excluded file to the manifest.
pub struct ManifestBuilder<'a> {
    rules: &'a ExclusionRules,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(rules: &'a ExclusionRules) -> Self {
        Self { rules }
    }

    /// Returns how many entries were appended. A missing or unreadable
    /// include path is recorded and the remaining paths are still walked.
    pub fn fill<S: AsRef<str>>(
        &self,
        include_paths: &[S],
        manifest: &mut Manifest,
        errors: &mut ErrorLog,
    ) -> usize {
        let before = manifest.len();

        for include in include_paths {
            let root = Path::new(include.as_ref());
            let metadata = match std::fs::metadata(root) {
                Ok(metadata) => metadata,
                Err(e) => {
                    errors.record(
                        Stage::Manifest,
                        anyhow!(e).context(format!("Cannot read include path {}", root.display())),
                    );
                    continue;
                }
            };

            if metadata.is_file() {
                self.accept(root, manifest, errors);
            } else if metadata.is_dir() {
                self.walk(root, manifest, errors);
            } else {
                debug!("Skipping special file {}", root.display());
            }
        }

        let added = manifest.len() - before;
        info!(entries = added, "Collected files for the archive");
        added
    }

    fn walk(&self, root: &Path, manifest: &mut Manifest, errors: &mut ErrorLog) {
        // Hidden files and VCS directories are walked like everything else.
        // Excluded directories are pruned, never entered.
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || !self.rules.should_exclude(e.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let location = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    errors.record(
                        Stage::Manifest,
                        anyhow!(e).context(format!("Failed to walk {location}")),
                    );
                    continue;
                }
            };

            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if is_file {
                self.accept(entry.path(), manifest, errors);
            }
        }
    }

    fn accept(&self, candidate: &Path, manifest: &mut Manifest, errors: &mut ErrorLog) {
        if self.rules.should_exclude(candidate) {
            debug!("Excluded {}", candidate.display());
            return;
        }
        errors.rescue(Stage::Manifest, manifest.add_file(&canonical(candidate)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn entries(manifest: Manifest) -> Vec<PathBuf> {
        manifest
            .into_entries()
            .unwrap()
            .collect::<std::io::Result<Vec<_>>>()
            .unwrap()
    }

    fn fixture() -> std::io::Result<(TempDir, PathBuf)> {
        let temp_dir = TempDir::new()?;
        let data = temp_dir.path().join("data");
        fs::create_dir_all(data.join("logs"))?;
        fs::create_dir_all(data.join(".git"))?;
        fs::create_dir_all(data.join("uploads/2024"))?;
        fs::write(data.join("index.php"), b"<?php")?;
        fs::write(data.join(".env"), b"APP_KEY=1")?;
        fs::write(data.join(".git/HEAD"), b"ref: refs/heads/main")?;
        fs::write(data.join("logs/app.log"), b"log")?;
        fs::write(data.join("uploads/2024/photo.jpg"), b"jpg")?;
        fs::write(data.join("uploads/2024/photo.tmp"), b"tmp")?;
        Ok((temp_dir, data))
    }

    #[test]
    fn test_missing_include_path_is_recorded_and_skipped() -> anyhow::Result<()> {
        let (temp_dir, data) = fixture()?;
        let mut manifest = Manifest::create(&temp_dir.path().join("manifest.txt"))?;
        let mut errors = ErrorLog::new();
        let rules = ExclusionRules::default();

        let missing = temp_dir.path().join("missing");
        let includes = [data.to_string_lossy().into_owned(), missing.to_string_lossy().into_owned()];
        let added = ManifestBuilder::new(&rules).fill(&includes, &mut manifest, &mut errors);

        assert_eq!(added, 6);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.records()[0].stage, Stage::Manifest);
        assert!(errors.records()[0].message.contains("missing"));
        assert_eq!(entries(manifest).len(), 6);
        Ok(())
    }

    #[test]
    fn test_exclusions_apply_to_walked_entries() -> anyhow::Result<()> {
        let (temp_dir, data) = fixture()?;
        let mut manifest = Manifest::create(&temp_dir.path().join("manifest.txt"))?;
        let mut errors = ErrorLog::new();
        let rules = ExclusionRules::from_patterns(&[
            data.join("logs").to_string_lossy().into_owned(),
            "*.tmp".to_string(),
        ])?;

        ManifestBuilder::new(&rules).fill(&[data.to_string_lossy()], &mut manifest, &mut errors);

        let canonical = fs::canonicalize(&data)?;
        let mut found = entries(manifest);
        found.sort();
        assert_eq!(
            found,
            vec![
                canonical.join(".env"),
                canonical.join(".git/HEAD"),
                canonical.join("index.php"),
                canonical.join("uploads/2024/photo.jpg"),
            ]
        );
        assert!(errors.is_empty());
        Ok(())
    }

    #[test]
    fn test_single_file_include_and_duplicates() -> anyhow::Result<()> {
        let (temp_dir, data) = fixture()?;
        let mut manifest = Manifest::create(&temp_dir.path().join("manifest.txt"))?;
        let mut errors = ErrorLog::new();
        let rules = ExclusionRules::default();

        let index = data.join("index.php").to_string_lossy().into_owned();
        let added =
            ManifestBuilder::new(&rules).fill(&[index.clone(), index], &mut manifest, &mut errors);

        assert_eq!(added, 2);
        let found = entries(manifest);
        assert_eq!(found[0], found[1]);
        assert!(found[0].is_absolute());
        Ok(())
    }

    #[test]
    fn test_excluded_single_file_include() -> anyhow::Result<()> {
        let (temp_dir, data) = fixture()?;
        let mut manifest = Manifest::create(&temp_dir.path().join("manifest.txt"))?;
        let mut errors = ErrorLog::new();
        let rules = ExclusionRules::from_patterns(&["*.php"])?;

        let added = ManifestBuilder::new(&rules).fill(
            &[data.join("index.php").to_string_lossy()],
            &mut manifest,
            &mut errors,
        );

        assert_eq!(added, 0);
        assert!(errors.is_empty());
        Ok(())
    }

    #[test]
    fn test_excluded_directory_is_never_entered() -> anyhow::Result<()> {
        let (temp_dir, data) = fixture()?;
        fs::create_dir_all(data.join("node_modules/pkg"))?;
        fs::write(data.join("node_modules/pkg/index.js"), b"js")?;
        let mut manifest = Manifest::create(&temp_dir.path().join("manifest.txt"))?;
        let mut errors = ErrorLog::new();
        // Only the directory itself matches; its files would not on their own.
        let rules = ExclusionRules::from_patterns(&["*/node_modules/"])?;
        assert!(!rules.should_exclude(&data.join("node_modules/pkg/index.js")));

        ManifestBuilder::new(&rules).fill(&[data.to_string_lossy()], &mut manifest, &mut errors);

        let found = entries(manifest);
        assert_eq!(found.len(), 6);
        assert!(!found.iter().any(|p| p.to_string_lossy().contains("node_modules")));
        assert!(errors.is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_excluded_directory_is_not_an_error() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let (temp_dir, data) = fixture()?;
        let private = data.join("private");
        fs::create_dir_all(&private)?;
        fs::write(private.join("secret.txt"), b"s")?;
        fs::set_permissions(&private, fs::Permissions::from_mode(0o000))?;
        let mut manifest = Manifest::create(&temp_dir.path().join("manifest.txt"))?;
        let mut errors = ErrorLog::new();
        let rules = ExclusionRules::from_patterns(&[private.to_string_lossy()])?;

        ManifestBuilder::new(&rules).fill(&[data.to_string_lossy()], &mut manifest, &mut errors);
        fs::set_permissions(&private, fs::Permissions::from_mode(0o755))?;

        assert!(errors.is_empty(), "{}", errors.joined());
        assert_eq!(entries(manifest).len(), 6);
        Ok(())
    }
}
