//! Include/exclude decisions for candidate backup paths.
//!
//! Rules come from the job's `exclude_files` list. A rule containing `*` is a
//! shell-style wildcard matched against the whole normalized path (`*` also
//! crosses directory separators). Anything else is a path prefix: a directory
//! rule excludes every descendant, a file rule excludes only that exact file.
//!
//! A prefix rule naming a path that does not exist is kept as a plain string
//! prefix. Whether that is wanted (excluding paths that appear later) has not
//! been confirmed.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

#[derive(Debug, Clone)]
pub enum ExclusionRule {
    Glob(Regex),
    Prefix { path: String, is_file: bool },
}

impl ExclusionRule {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains('*') {
            return Ok(ExclusionRule::Glob(wildcard_regex(raw)?));
        }

        Ok(ExclusionRule::Prefix {
            path: normalize(Path::new(raw)),
            is_file: Path::new(raw).is_file(),
        })
    }

    fn matches(&self, normalized: &str) -> bool {
        match self {
            ExclusionRule::Glob(matcher) => matcher.is_match(normalized),
            ExclusionRule::Prefix { path, is_file } => {
                if !normalized.starts_with(path.as_str()) {
                    return false;
                }
                // A file rule never reaches files that merely share its name as a prefix.
                !(*is_file && normalized != path.as_str())
            }
        }
    }
}

/// Ordered, immutable rule set for one run.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    rules: Vec<ExclusionRule>,
}

impl ExclusionRules {
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !p.trim().is_empty())
            .map(|p| ExclusionRule::parse(p).with_context(|| format!("Invalid exclude pattern '{p}'")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn should_exclude(&self, path: &Path) -> bool {
        should_exclude(path, &self.rules)
    }
}

pub fn should_exclude(path: &Path, rules: &[ExclusionRule]) -> bool {
    let normalized = normalize(path);
    rules.iter().any(|rule| rule.matches(&normalized))
}

/// `path` with symlinks resolved, or `path` itself when it cannot be resolved.
pub fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonical form of `path` as matched by the rules. Directories always end
/// with the separator.
pub fn normalize(path: &Path) -> String {
    let resolved = canonical(path);
    let mut normalized = resolved.to_string_lossy().into_owned();

    if resolved.is_dir() && !normalized.ends_with(MAIN_SEPARATOR) {
        normalized.push(MAIN_SEPARATOR);
    }
    normalized
}

/// Anchored regex for a `*` wildcard pattern; everything else is literal.
fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Ok(Regex::new(&format!("^{body}$"))?)
}
