//! Non-fatal failures collected over a run.

use std::fmt;
use tracing::warn;

pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

/// Pipeline stage that produced an error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dump,
    Manifest,
    Archive,
    SizeProbe,
    Upload,
    Workspace,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dump => "dump",
            Stage::Manifest => "manifest",
            Stage::Archive => "archive",
            Stage::SizeProbe => "size",
            Stage::Upload => "upload",
            Stage::Workspace => "workspace",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub stage: Stage,
    pub message: String,
}

/// Append-only, arrival-ordered. Nothing is deduplicated or dropped.
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` using its alternate format so anyhow context chains survive.
    pub fn record(&mut self, stage: Stage, error: impl fmt::Display) {
        let mut message = format!("{error:#}");
        if message.trim().is_empty() {
            message = UNKNOWN_ERROR.to_string();
        }
        warn!(%stage, "{}", message);
        self.records.push(ErrorRecord { stage, message });
    }

    /// Unwraps `result`, recording the error and yielding `None` on failure.
    pub fn rescue<T, E: fmt::Display>(&mut self, stage: Stage, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.record(stage, e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Messages joined with newlines, in arrival order.
    pub fn joined(&self) -> String {
        self.records
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_keeps_arrival_order_and_duplicates() {
        let mut log = ErrorLog::new();
        log.record(Stage::Dump, "db2 failed");
        log.record(Stage::Upload, "bucket missing");
        log.record(Stage::Dump, "db2 failed");

        assert_eq!(log.len(), 3);
        assert_eq!(log.records()[1].stage, Stage::Upload);
        assert_eq!(log.joined(), "db2 failed\nbucket missing\ndb2 failed");
    }

    #[test]
    fn test_blank_message_gets_placeholder() {
        let mut log = ErrorLog::new();
        log.record(Stage::Archive, "");
        log.record(Stage::Archive, "   ");
        assert_eq!(log.records()[0].message, UNKNOWN_ERROR);
        assert_eq!(log.records()[1].message, UNKNOWN_ERROR);
    }

    #[test]
    fn test_rescue_keeps_context_chain() {
        let mut log = ErrorLog::new();
        let failed: anyhow::Result<u64> = Err(anyhow::anyhow!("permission denied"))
            .context("Failed to open /srv/data/secret.key");

        assert_eq!(log.rescue(Stage::Archive, failed), None);
        assert_eq!(log.rescue(Stage::Archive, Ok::<_, anyhow::Error>(7)), Some(7));
        assert_eq!(
            log.joined(),
            "Failed to open /srv/data/secret.key: permission denied"
        );
    }

    #[test]
    fn test_empty_log() {
        let log = ErrorLog::new();
        assert!(log.is_empty());
        assert_eq!(log.joined(), "");
    }
}
