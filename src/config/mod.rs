// backup-runner/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub log_level: String,
    pub http_timeout_secs: u64,
    /// Root for the per-run workspace. The OS temp directory when unset.
    pub temp_dir: Option<PathBuf>,
    /// gzip level (0-9) used for database dumps and the archive.
    pub compression_level: u32,
    pub dump: DumpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub mysql_user: String,
    pub pgsql_user: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_level: "info".to_string(),
            http_timeout_secs: 30,
            temp_dir: None,
            compression_level: 6,
            dump: DumpSettings::default(),
        }
    }
}

impl Default for DumpSettings {
    fn default() -> Self {
        DumpSettings {
            host: "127.0.0.1".to_string(),
            port: None,
            mysql_user: "root".to_string(),
            pgsql_user: "postgres".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let config: AppConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` when given, otherwise `./config.json` if it exists,
    /// otherwise the built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_json(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load_from_json(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            anyhow::bail!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            );
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be greater than zero");
        }
        if self.dump.host.trim().is_empty() {
            anyhow::bail!("dump.host cannot be empty in config.json.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_config_keeps_defaults() -> anyhow::Result<()> {
        let file = write_config(r#"{ "log_level": "debug", "dump": { "port": 5433 } }"#);
        let config = AppConfig::load_from_json(file.path())?;

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.compression_level, 6);
        assert_eq!(config.dump.port, Some(5433));
        assert_eq!(config.dump.host, "127.0.0.1");
        assert_eq!(config.dump.pgsql_user, "postgres");
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_compression() {
        let file = write_config(r#"{ "compression_level": 12 }"#);
        let err = AppConfig::load_from_json(file.path()).unwrap_err();
        assert!(err.to_string().contains("compression_level"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let file = write_config(r#"{ "log_levle": "debug" }"#);
        assert!(AppConfig::load_from_json(file.path()).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = AppConfig::resolve(Some(Path::new("/nonexistent/backup-runner.json")));
        assert!(result.is_err());
    }
}
