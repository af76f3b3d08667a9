// backup-runner/src/backup/logic.rs
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::archive::{ARCHIVE_EXTENSION, write_manifest_archive};
use super::collect::ManifestBuilder;
use super::db_dump::{DumpCoordinator, DumpEngine};
use super::error_log::{ErrorLog, Stage};
use super::exclusion::ExclusionRules;
use super::manifest::Manifest;
use super::workspace::Workspace;
use crate::config::AppConfig;
use crate::errors::{AppError, Result, Severity};
use crate::job::{BackupReport, ControlPlane, JobDescriptor};
use crate::storage::{DiskConfig, StorageBackend, StorageConnector};

/// What happened to the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    /// The job could not be fetched, so there was nowhere to report to.
    NotSent,
    Delivered,
    Failed(String),
}

#[derive(Debug)]
pub struct RunSummary {
    pub fatal: Option<String>,
    pub report: Option<BackupReport>,
    pub report_status: ReportStatus,
    pub deleted_backups: usize,
    /// Failures while deleting stale backups. These happen after the report.
    pub cleanup_errors: ErrorLog,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
            && self.report.as_ref().is_some_and(|r| r.is_success)
            && self.report_status == ReportStatus::Delivered
            && self.cleanup_errors.is_empty()
    }
}

impl From<AppError> for RunSummary {
    fn from(error: AppError) -> Self {
        RunSummary {
            fatal: Some(error.to_string()),
            report: None,
            report_status: ReportStatus::NotSent,
            deleted_backups: 0,
            cleanup_errors: ErrorLog::new(),
        }
    }
}

/// Drives one backup job from fetch to cleanup.
pub struct BackupPipeline<'a> {
    config: &'a AppConfig,
    control_plane: &'a dyn ControlPlane,
    dumper: &'a dyn DumpEngine,
    storage: &'a dyn StorageConnector,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        control_plane: &'a dyn ControlPlane,
        dumper: &'a dyn DumpEngine,
        storage: &'a dyn StorageConnector,
    ) -> Self {
        Self {
            config,
            control_plane,
            dumper,
            storage,
        }
    }

    pub async fn run(&self, job_url: &str) -> RunSummary {
        info!("Fetching backup job from {}", job_url);
        let job = match self.control_plane.fetch_job(job_url).await {
            Ok(job) => job,
            Err(e) => {
                error!("{}", e);
                return RunSummary::from(e);
            }
        };
        info!(job = %job.name, databases = job.databases.len(), paths = job.include_files.len(), "Starting backup");
        if !job.backups_to_delete.is_empty() {
            debug!(stale = ?job.backups_to_delete, "Job lists stale backups; waiting for the report response");
        }

        let started = Instant::now();
        let mut errors = ErrorLog::new();
        let outcome = self.execute(&job, &mut errors).await;

        let (report, fatal) = match outcome {
            Ok(size) => {
                if errors.is_empty() {
                    info!("Backup complete");
                } else {
                    error!("Backup complete with {} error(s)", errors.len());
                }
                let report = BackupReport {
                    is_success: errors.is_empty(),
                    error: errors.joined(),
                    duration: Some(started.elapsed().as_secs_f64().round() as u64),
                    size: Some(size),
                };
                (report, None)
            }
            Err(fatal) => {
                error!("Backup aborted: {}", fatal);
                let mut message = fatal.to_string();
                if !errors.is_empty() {
                    message.push('\n');
                    message.push_str(&errors.joined());
                }
                let report = BackupReport {
                    is_success: false,
                    error: message,
                    duration: None,
                    size: None,
                };
                (report, Some(fatal.to_string()))
            }
        };

        info!("Sending backup report");
        let response = self.control_plane.send_report(&job.patch_url, &report).await;

        let mut summary = RunSummary {
            fatal,
            report: Some(report),
            report_status: ReportStatus::Delivered,
            deleted_backups: 0,
            cleanup_errors: ErrorLog::new(),
        };

        match response {
            Ok(response) if summary.fatal.is_none() => {
                let (deleted, cleanup_errors) =
                    self.delete_stale_backups(&job, &response.backups_to_delete).await;
                summary.deleted_backups = deleted;
                summary.cleanup_errors = cleanup_errors;
            }
            Ok(_) => {}
            Err(e) => {
                error!("{}", e);
                summary.report_status = ReportStatus::Failed(e.to_string());
            }
        }

        summary
    }

    /// Runs every stage up to the upload. `Err` only for fatal errors; the
    /// workspace is gone by the time this returns.
    async fn execute(&self, job: &JobDescriptor, errors: &mut ErrorLog) -> Result<u64> {
        let compression = flate2::Compression::new(self.config.compression_level);
        let workspace = Workspace::create(self.config.temp_dir.as_deref())?;
        let mut manifest = Manifest::create(&workspace.manifest_path())?;
        debug!("Workspace at {}", workspace.path().display());

        info!("Dumping databases");
        let dumps = DumpCoordinator::new(self.dumper, compression, workspace.path())
            .dump_all(
                &job.database_type,
                &job.databases,
                &job.database_password,
                &mut manifest,
                errors,
            )
            .await;
        escalate(errors, Stage::Dump, dumps)?;

        info!("Collecting files");
        let rules = errors
            .rescue(Stage::Manifest, ExclusionRules::from_patterns(&job.exclude_files))
            .unwrap_or_default();
        if !rules.is_empty() {
            debug!(rules = rules.len(), "Loaded exclusion rules");
        }
        ManifestBuilder::new(&rules).fill(&job.include_files, &mut manifest, errors);
        if manifest.is_empty() {
            warn!("Nothing to archive, manifest {} is empty", manifest.path().display());
        }

        info!("Writing archive");
        let archive_path = workspace.archive_path();
        if let Some(entries) = errors.rescue(Stage::Archive, manifest.into_entries()) {
            let destination = archive_path.clone();
            let written = tokio::task::spawn_blocking(move || {
                write_manifest_archive(entries, &destination, compression)
            })
            .await
            .map_err(anyhow::Error::from)
            .and_then(|result| result);
            if let Some(outcome) = errors.rescue(Stage::Archive, written) {
                for failure in outcome.failures {
                    errors.record(Stage::Archive, failure);
                }
            }
        }

        info!("Calculating archive size");
        let size = match tokio::fs::metadata(&archive_path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                errors.record(Stage::SizeProbe, e);
                0
            }
        };

        if archive_path.exists() {
            info!(bytes = size, "Uploading archive");
            let uploaded = self.upload(job, &archive_path).await;
            errors.rescue(Stage::Upload, uploaded);
        } else {
            warn!("No archive was produced, skipping upload");
        }

        info!("Deleting temporary directory");
        errors.rescue(Stage::Workspace, workspace.close());

        Ok(size)
    }

    async fn upload(&self, job: &JobDescriptor, archive_path: &Path) -> anyhow::Result<()> {
        let backend = self.connect(job).await?;
        backend.upload(&backup_file_name(&job.name), archive_path).await
    }

    async fn connect(&self, job: &JobDescriptor) -> anyhow::Result<Box<dyn StorageBackend>> {
        let disk = DiskConfig::from_map(&job.disk_config)?;
        self.storage.connect(&disk).await
    }

    /// Deletes each named backup. A failure, including failing to reach the
    /// backend, only affects that name.
    async fn delete_stale_backups(&self, job: &JobDescriptor, names: &[String]) -> (usize, ErrorLog) {
        let mut errors = ErrorLog::new();
        let mut backend: Option<Box<dyn StorageBackend>> = None;
        let mut deleted = 0;

        for name in names {
            info!("Deleting old backup {}", name);
            if backend.is_none() {
                backend = errors.rescue(Stage::Cleanup, self.connect(job).await);
            }
            let Some(storage) = backend.as_ref() else {
                continue;
            };
            if errors
                .rescue(Stage::Cleanup, storage.delete(&backup_file_name(name)).await)
                .is_some()
            {
                deleted += 1;
            }
        }

        (deleted, errors)
    }
}

/// Name a backup has in storage.
fn backup_file_name(name: &str) -> String {
    format!("{name}.{ARCHIVE_EXTENSION}")
}

/// Fatal errors propagate; recoverable ones are recorded under `stage`.
fn escalate<T>(errors: &mut ErrorLog, stage: Stage, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.severity() == Severity::Fatal => Err(e),
        Err(e) => {
            errors.record(stage, e);
            Ok(None)
        }
    }
}
