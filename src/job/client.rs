// backup-runner/src/job/client.rs
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use super::{BackupReport, ControlPlane, JobDescriptor, ReportResponse};
use crate::errors::{AppError, Result};

/// Control plane reached over HTTP with JSON bodies.
pub struct HttpControlPlane {
    http: reqwest::Client,
}

impl HttpControlPlane {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("backup-runner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_job(&self, job_url: &str) -> Result<JobDescriptor> {
        let fetch_error = |message: String| AppError::JobFetch {
            url: job_url.to_string(),
            message,
        };

        let url = Url::parse(job_url).map_err(|e| fetch_error(format!("invalid URL: {e}")))?;
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?;

        let body = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| fetch_error(format!("invalid job descriptor: {e}")))
    }

    async fn send_report(&self, patch_url: &Url, report: &BackupReport) -> Result<ReportResponse> {
        let report_error = |message: String| AppError::Report {
            url: patch_url.to_string(),
            message,
        };

        let response = self
            .http
            .patch(patch_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(report)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| report_error(e.to_string()))?;

        let body = response.text().await.map_err(|e| report_error(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(ReportResponse::default());
        }
        serde_json::from_str(&body).map_err(|e| report_error(format!("invalid response: {e}")))
    }
}
