use thiserror::Error;

/// How a failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the remaining stages.
    Fatal,
    /// Recorded, and the pipeline moves on.
    Recoverable,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to fetch backup job from {url}: {message}")]
    JobFetch { url: String, message: String },

    #[error("Cannot start dump: unsupported database type '{0}'")]
    UnsupportedDatabase(String),

    #[error("Failed to prepare temporary workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("Failed to send backup report to {url}: {message}")]
    Report { url: String, message: String },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn severity(&self) -> Severity {
        match self {
            AppError::JobFetch { .. }
            | AppError::UnsupportedDatabase(_)
            | AppError::Workspace(_) => Severity::Fatal,
            AppError::Report { .. } | AppError::Anyhow(_) => Severity::Recoverable,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
