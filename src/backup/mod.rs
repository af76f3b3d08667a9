pub(crate) mod archive;
pub(crate) mod collect;
pub(crate) mod db_dump;
pub(crate) mod error_log;
pub(crate) mod exclusion;
mod logic;
pub(crate) mod manifest;
pub(crate) mod workspace;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::job::HttpControlPlane;
use crate::storage::DriverConnector;
use db_dump::CommandDumper;

pub use logic::{BackupPipeline, ReportStatus, RunSummary};

/// Public entry point for the backup process.
///
/// Runs the job published at `job_url` against the real control plane,
/// dump tools and storage drivers.
pub async fn run_backup_flow(app_config: &AppConfig, job_url: &str) -> RunSummary {
    let control_plane = match HttpControlPlane::new(app_config.http_timeout()) {
        Ok(client) => client,
        Err(e) => return RunSummary::from(AppError::from(e)),
    };
    let dumper = CommandDumper::new(app_config.dump.clone());

    BackupPipeline::new(app_config, &control_plane, &dumper, &DriverConnector)
        .run(job_url)
        .await
}
