// backup-runner/src/backup/db_dump.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::info;

use super::error_log::{ErrorLog, Stage};
use super::manifest::Manifest;
use crate::config::DumpSettings;
use crate::errors::AppError;
use crate::utils::{find_executable, slugify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    MySql,
    PostgreSql,
}

impl FromStr for DatabaseType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mysql" => Ok(DatabaseType::MySql),
            "pgsql" => Ok(DatabaseType::PostgreSql),
            other => Err(AppError::UnsupportedDatabase(other.to_string())),
        }
    }
}

/// Everything a dump engine needs for one database.
#[derive(Debug, Clone)]
pub struct DumpRequest<'a> {
    pub database_type: DatabaseType,
    pub database: &'a str,
    pub password: &'a str,
    pub compression: Compression,
    pub output_dir: &'a Path,
    /// Disambiguates databases whose names slug to the same file.
    pub ordinal: Option<usize>,
}

impl DumpRequest<'_> {
    /// `<slug>.sql.gz`, or `<slug>-<ordinal>.sql.gz`, inside the output directory.
    pub fn output_path(&self) -> PathBuf {
        let slug = slugify(self.database);
        let stem = if slug.is_empty() { "database" } else { slug.as_str() };
        match self.ordinal {
            Some(n) => self.output_dir.join(format!("{stem}-{n}.sql.gz")),
            None => self.output_dir.join(format!("{stem}.sql.gz")),
        }
    }
}

#[async_trait]
pub trait DumpEngine: Send + Sync {
    /// Dumps one database and returns the path of the compressed output.
    async fn dump(&self, request: &DumpRequest<'_>) -> Result<PathBuf>;
}

/// Dumps databases by running `mysqldump` / `pg_dump` and gzipping their output.
pub struct CommandDumper {
    settings: DumpSettings,
}

impl CommandDumper {
    pub fn new(settings: DumpSettings) -> Self {
        Self { settings }
    }

    fn command(&self, request: &DumpRequest<'_>) -> Result<Command> {
        let command = match request.database_type {
            DatabaseType::MySql => {
                let mut command = Command::new(find_executable("mysqldump")?);
                command
                    .arg(format!("--user={}", self.settings.mysql_user))
                    .arg(format!("--host={}", self.settings.host))
                    .arg(format!("--port={}", self.settings.port.unwrap_or(3306)))
                    .arg("--single-transaction")
                    .arg("--skip-comments")
                    .arg("--extended-insert")
                    .arg(request.database)
                    .env("MYSQL_PWD", request.password);
                command
            }
            DatabaseType::PostgreSql => {
                let mut command = Command::new(find_executable("pg_dump")?);
                command
                    .arg("-U")
                    .arg(&self.settings.pgsql_user)
                    .arg("-h")
                    .arg(&self.settings.host)
                    .arg("-p")
                    .arg(self.settings.port.unwrap_or(5432).to_string())
                    .arg(request.database)
                    .env("PGPASSWORD", request.password);
                command
            }
        };
        Ok(command)
    }
}

#[async_trait]
impl DumpEngine for CommandDumper {
    async fn dump(&self, request: &DumpRequest<'_>) -> Result<PathBuf> {
        let command = self.command(request)?;
        let output_path = request.output_path();
        let compression = request.compression;
        let database = request.database.to_string();

        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            gzip_command_output(command, &output_path, compression, &database)?;
            Ok(output_path)
        })
        .await?
    }
}

/// Runs `command` and streams its stdout through gzip into `output_path`.
///
/// Stderr is drained on its own thread so a chatty tool cannot stall on a
/// full pipe. Fails with the captured stderr on a non-zero exit.
fn gzip_command_output(
    mut command: Command,
    output_path: &Path,
    compression: Compression,
    database: &str,
) -> Result<()> {
    let output_file = File::create(output_path)
        .with_context(|| format!("Failed to create dump file: {}", output_path.display()))?;
    let mut encoder = GzEncoder::new(output_file, compression);

    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to execute dump command for database: {database}"))?;

    let stderr_reader = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut captured = Vec::new();
            let _ = stderr.read_to_end(&mut captured);
            captured
        })
    });

    let copied = match child.stdout.take() {
        Some(mut stdout) => std::io::copy(&mut stdout, &mut encoder).map(|_| ()),
        None => Err(std::io::Error::other("dump command has no stdout")),
    };
    if let Err(e) = copied {
        let _ = child.kill();
        let _ = child.wait();
        return Err(anyhow::Error::from(e)
            .context(format!("Failed to compress dump of database: {database}")));
    }

    let status = child.wait()?;
    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(anyhow::anyhow!(
            "Dump of database {} failed with status: {}\nStderr: {}",
            database,
            status,
            String::from_utf8_lossy(&stderr).trim()
        ));
    }
    encoder
        .finish()
        .with_context(|| format!("Failed to finish gzip stream for {}", output_path.display()))?;
    Ok(())
}

/// Runs the job's database dumps into the workspace.
pub struct DumpCoordinator<'a> {
    engine: &'a dyn DumpEngine,
    compression: Compression,
    output_dir: &'a Path,
}

impl<'a> DumpCoordinator<'a> {
    pub fn new(engine: &'a dyn DumpEngine, compression: Compression, output_dir: &'a Path) -> Self {
        Self {
            engine,
            compression,
            output_dir,
        }
    }

    /// Dumps every database, appending each output to the manifest.
    ///
    /// An unknown database type is fatal and nothing is dumped. A failure of
    /// one database is recorded and the others still run.
    pub async fn dump_all(
        &self,
        database_type: &str,
        databases: &[String],
        password: &str,
        manifest: &mut Manifest,
        errors: &mut ErrorLog,
    ) -> crate::errors::Result<usize> {
        if databases.is_empty() {
            return Ok(0);
        }
        let database_type: DatabaseType = database_type.parse()?;

        let mut dumped = 0;
        let mut taken = HashSet::new();
        for (index, database) in databases.iter().enumerate() {
            info!(%database, "Dumping database");
            let mut request = DumpRequest {
                database_type,
                database,
                password,
                compression: self.compression,
                output_dir: self.output_dir,
                ordinal: None,
            };
            let mut ordinal = index + 1;
            while taken.contains(&request.output_path()) {
                request.ordinal = Some(ordinal);
                ordinal += 1;
            }
            taken.insert(request.output_path());

            let result = self
                .engine
                .dump(&request)
                .await
                .with_context(|| format!("Failed to dump database {database}"))
                .and_then(|path| manifest.add_file(&path));
            if errors.rescue(Stage::Dump, result).is_some() {
                dumped += 1;
            }
        }

        info!(dumped, requested = databases.len(), "Database dumps finished");
        Ok(dumped)
    }
}
