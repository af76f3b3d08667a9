//! File-backed list of paths that go into the archive.
//!
//! One path per line, appended as entries are discovered, so the full list
//! never has to sit in memory. Reading is forward-only. Lines hold the raw
//! path bytes, so names that are not UTF-8 come back unchanged.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Split, Write};
use std::path::{Path, PathBuf};

pub struct Manifest {
    path: PathBuf,
    file: File,
    count: usize,
}

impl Manifest {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends one entry. Empty paths are skipped.
    pub fn add_file(&mut self, entry: &Path) -> Result<()> {
        let line = path_bytes(entry);
        if line.is_empty() {
            return Ok(());
        }
        if line.contains(&b'\n') {
            anyhow::bail!("Cannot add path with a newline to the manifest: {}", entry.display());
        }
        self.file
            .write_all(&line)
            .and_then(|_| self.file.write_all(b"\n"))
            .with_context(|| format!("Failed to append to manifest {}", self.path.display()))?;
        self.count += 1;
        Ok(())
    }

    /// Consumes the manifest and streams its entries back in insertion order.
    pub fn into_entries(mut self) -> Result<ManifestEntries> {
        self.file.flush()?;
        let reader = File::open(&self.path)
            .with_context(|| format!("Failed to open manifest {}", self.path.display()))?;
        Ok(ManifestEntries {
            lines: BufReader::new(reader).split(b'\n'),
        })
    }
}

pub struct ManifestEntries {
    lines: Split<BufReader<File>>,
}

impl Iterator for ManifestEntries {
    type Item = std::io::Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim_ascii().is_empty() => continue,
                Ok(line) => return Some(Ok(path_from_bytes(line))),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}
