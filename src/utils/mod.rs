pub mod logger;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Finds a client tool (e.g. `pg_dump`) in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).with_context(|| {
        format!("{name} executable not found in PATH. Please ensure the database client tools are installed and in your PATH.")
    })
}

/// Lowercase, ASCII-alphanumeric slug with single dashes, used for dump file names.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
