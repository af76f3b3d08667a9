//! Backup job descriptor and the control-plane contract.

pub(crate) mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Result;

pub use client::HttpControlPlane;

/// Full configuration for one backup run, as served by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub patch_url: Url,
    /// Storage driver plus its settings. Interpreted by `storage::DiskConfig`
    /// when a stage needs the backend.
    pub disk_config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub database_type: String,
    #[serde(default)]
    pub database_password: String,
    #[serde(default)]
    pub databases: Vec<String>,
    #[serde(default)]
    pub include_files: Vec<String>,
    #[serde(default)]
    pub exclude_files: Vec<String>,
    #[serde(default)]
    pub backups_to_delete: Vec<String>,
}

/// Payload of the final `PATCH` to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupReport {
    pub is_success: bool,
    pub error: String,
    /// Whole seconds. Omitted on a fatal abort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Archive size in bytes. Omitted on a fatal abort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportResponse {
    #[serde(default)]
    pub backups_to_delete: Vec<String>,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch_job(&self, job_url: &str) -> Result<JobDescriptor>;

    async fn send_report(&self, patch_url: &Url, report: &BackupReport) -> Result<ReportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor_json() -> serde_json::Value {
        json!({
            "name": "nightly-shop",
            "patch_url": "https://control.test/api/backups/7",
            "disk_config": { "driver": "local", "root": "/srv/backups" },
            "database_type": "pgsql",
            "database_password": "secret",
            "databases": ["shop", "analytics"],
            "include_files": ["/var/www/shop"],
            "exclude_files": ["/var/www/shop/cache", "*.log"],
            "backups_to_delete": ["nightly-shop-old"]
        })
    }

    #[test]
    fn test_parse_full_descriptor() -> anyhow::Result<()> {
        let job: JobDescriptor = serde_json::from_value(descriptor_json())?;

        assert_eq!(job.name, "nightly-shop");
        assert_eq!(job.patch_url.path(), "/api/backups/7");
        assert_eq!(job.disk_config["driver"], "local");
        assert_eq!(job.databases, vec!["shop", "analytics"]);
        assert_eq!(job.exclude_files.len(), 2);
        assert_eq!(job.backups_to_delete, vec!["nightly-shop-old"]);
        Ok(())
    }

    #[test]
    fn test_optional_lists_default_to_empty() -> anyhow::Result<()> {
        let job: JobDescriptor = serde_json::from_value(json!({
            "name": "files-only",
            "patch_url": "https://control.test/api/backups/8",
            "disk_config": { "driver": "s3" }
        }))?;

        assert!(job.databases.is_empty());
        assert!(job.include_files.is_empty());
        assert!(job.database_type.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_required_fields_are_rejected() {
        let mut value = descriptor_json();
        value.as_object_mut().unwrap().remove("patch_url");
        assert!(serde_json::from_value::<JobDescriptor>(value).is_err());

        let mut value = descriptor_json();
        value.as_object_mut().unwrap().remove("disk_config");
        assert!(serde_json::from_value::<JobDescriptor>(value).is_err());

        let mut value = descriptor_json();
        value["patch_url"] = json!("not a url");
        assert!(serde_json::from_value::<JobDescriptor>(value).is_err());
    }

    #[test]
    fn test_fatal_report_omits_duration_and_size() -> anyhow::Result<()> {
        let report = BackupReport {
            is_success: false,
            error: "boom".to_string(),
            duration: None,
            size: None,
        };
        assert_eq!(
            serde_json::to_value(&report)?,
            json!({ "is_success": false, "error": "boom" })
        );

        let report = BackupReport {
            is_success: true,
            error: String::new(),
            duration: Some(12),
            size: Some(2048),
        };
        assert_eq!(
            serde_json::to_value(&report)?,
            json!({ "is_success": true, "error": "", "duration": 12, "size": 2048 })
        );
        Ok(())
    }

    #[test]
    fn test_report_response_without_list() -> anyhow::Result<()> {
        let response: ReportResponse = serde_json::from_value(json!({ "id": 7 }))?;
        assert!(response.backups_to_delete.is_empty());
        Ok(())
    }
}
