// backup-runner/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tar::Builder;
use tracing::{info, warn};

/// Extension of every uploaded backup.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// What [`write_manifest_archive`] managed to store.
#[derive(Debug, Default)]
pub struct ArchiveOutcome {
    pub written: usize,
    /// One error per manifest entry that could not be stored.
    pub failures: Vec<anyhow::Error>,
}

/// Creates a GZipped TAR archive from manifest entries.
///
/// Each file is stored under its absolute path without the leading
/// separator, so unpacking into a directory `D` recreates `D/<path>`.
/// An unreadable entry is skipped and reported in the outcome; the archive
/// is always finished so the stored files stay readable. Only failing to
/// create or finish the archive itself is an error.
pub fn write_manifest_archive<I>(
    entries: I,
    archive_dest_path: &Path,
    compression: Compression,
) -> Result<ArchiveOutcome>
where
    I: IntoIterator<Item = std::io::Result<PathBuf>>,
{
    info!("Creating tar.gz archive at {}", archive_dest_path.display());

    let archive_file = File::create(archive_dest_path).with_context(|| {
        format!(
            "Failed to create archive file: {}",
            archive_dest_path.display()
        )
    })?;
    let enc = GzEncoder::new(archive_file, compression);
    let mut tar_builder = Builder::new(enc);

    let mut outcome = ArchiveOutcome::default();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                // The manifest reader cannot resume after an I/O error.
                outcome
                    .failures
                    .push(anyhow::Error::from(e).context("Failed to read the next manifest entry"));
                break;
            }
        };

        match tar_builder.append_path_with_name(&path, archive_name(&path)) {
            Ok(()) => outcome.written += 1,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                outcome.failures.push(
                    anyhow::Error::from(e)
                        .context(format!("Failed to append file {} to archive", path.display())),
                );
            }
        }
    }

    let encoder = tar_builder.into_inner().with_context(|| {
        format!(
            "Failed to get inner encoder from tar builder for archive: {}",
            archive_dest_path.display()
        )
    })?;

    encoder.finish().with_context(|| {
        format!(
            "Failed to finish Gzip encoding for archive: {}",
            archive_dest_path.display()
        )
    })?;

    info!(
        files = outcome.written,
        skipped = outcome.failures.len(),
        "Archive created at {}",
        archive_dest_path.display()
    );
    Ok(outcome)
}

/// Path inside the archive: `path` with root and prefix components dropped.
fn archive_name(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}
