//! Backup Runner
//!
//! Fetches a backup job from the control plane, dumps databases, archives
//! files, uploads the archive and reports back.

// backup-runner/src/main.rs
mod backup;
mod config;
mod errors;
mod job;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;

use backup::{ReportStatus, RunSummary};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to ./config.json when present)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the backup job published at URL
    #[command(alias = "backup:run")]
    Run {
        /// Job descriptor URL
        url: String,
    },
}

/// Main entry point for the backup runner
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_app(cli).await {
        Ok(summary) if summary.is_success() => {
            if summary.deleted_backups > 0 {
                println!("🗑️ Removed {} old backup(s).", summary.deleted_backups);
            }
            println!("✅ Backup completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(summary) => {
            print_failure(&summary);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<RunSummary> {
    let app_config = AppConfig::resolve(cli.config.as_deref())
        .context("Failed to load application configuration")?;

    let log_level = cli.log_level.as_deref().unwrap_or(&app_config.log_level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting backup-runner v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { url } => {
            println!("🚀 Starting Backup Process...");
            Ok(backup::run_backup_flow(&app_config, &url).await)
        }
    }
}

fn print_failure(summary: &RunSummary) {
    if let Some(fatal) = &summary.fatal {
        eprintln!("❌ Backup aborted: {}", fatal);
    } else if let Some(report) = summary.report.as_ref().filter(|r| !r.is_success) {
        eprintln!("❌ Backup finished with errors:\n{}", report.error);
    }
    if let ReportStatus::Failed(message) = &summary.report_status {
        eprintln!("❌ Report was not delivered: {}", message);
    }
    for record in summary.cleanup_errors.records() {
        eprintln!("❌ {}: {}", record.stage, record.message);
    }
}
