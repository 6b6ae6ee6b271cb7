//! Artifact publisher step handler
//!
//! Uploads the coverage report to the external collector through the
//! `ReportSink` seam. The step's `fail_on_error` switch decides whether an
//! upload failure halts the pipeline or is logged and tolerated.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{Step, StepAction};
use capstan_core::domain::report::{CoverageFormat, CoverageReport, PublishAck};
use capstan_core::error::{EngineError, EngineResult};

use crate::context::RunContext;
use crate::steps::{StepHandler, StepOutput};

/// Seam for the upload to the external collector
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Uploads the report, authenticating with the scoped credential
    async fn upload(
        &self,
        report: &CoverageReport,
        destination: &str,
        credential: Option<&Credential>,
        verbose: bool,
    ) -> EngineResult<PublishAck>;
}

/// Production sink uploading over HTTP
///
/// Authenticates with the scoped credential when one was acquired,
/// falling back to the ambient upload token. The token value itself is
/// never logged.
pub struct HttpReportSink {
    client: reqwest::Client,
    upload_token: Option<String>,
}

impl HttpReportSink {
    pub fn new(upload_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_token,
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn upload(
        &self,
        report: &CoverageReport,
        destination: &str,
        credential: Option<&Credential>,
        verbose: bool,
    ) -> EngineResult<PublishAck> {
        let body = std::fs::read(&report.path).map_err(|e| {
            EngineError::Publish(format!(
                "cannot read report file {}: {}",
                report.path.display(),
                e
            ))
        })?;

        let mut request = self.client.post(destination).body(body);
        if verbose {
            request = request.query(&[("verbose", "true")]);
        }
        if let Some(credential) = credential {
            request = request.bearer_auth(&credential.token);
        } else if let Some(token) = &self.upload_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Publish(format!("upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Publish(format!(
                "collector returned {}: {}",
                status,
                body.trim()
            )));
        }

        // Collectors answer with a report id; tolerate ones that don't
        let report_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
            .unwrap_or_default();

        Ok(PublishAck {
            report_id,
            destination: destination.to_string(),
        })
    }
}

pub struct StandardPublishHandler {
    sink: std::sync::Arc<dyn ReportSink>,
}

impl StandardPublishHandler {
    pub fn new(sink: std::sync::Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    async fn try_publish(
        &self,
        ctx: &RunContext,
        report_file: &PathBuf,
        destination: &str,
        verbose: bool,
        credential: Option<&Credential>,
    ) -> EngineResult<PublishAck> {
        let path = if report_file.is_absolute() {
            report_file.clone()
        } else {
            ctx.source_dir().join(report_file)
        };

        if !path.exists() {
            return Err(EngineError::Publish(format!(
                "report file {} does not exist",
                path.display()
            )));
        }

        let report = CoverageReport {
            path,
            formats: vec![CoverageFormat::Xml],
        };

        self.sink
            .upload(&report, destination, credential, verbose)
            .await
    }
}

#[async_trait]
impl StepHandler for StandardPublishHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        let StepAction::Publish {
            report_file,
            destination,
            verbose,
            fail_on_error,
        } = &step.action
        else {
            return Err(EngineError::Io(format!(
                "publish handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        // The collector authenticates one upload with one token; the
        // step's first declared scope is the upload scope
        let credential = credentials.first();

        match self
            .try_publish(ctx, report_file, destination, *verbose, credential)
            .await
        {
            Ok(ack) => {
                info!("Report published to {}", ack.destination);
                ctx.log_info(format!("Coverage report published to {}", ack.destination));
                Ok(StepOutput {
                    publish_ack: Some(ack),
                    ..StepOutput::default()
                })
            }
            Err(err) if err.is_publish() && !fail_on_error => {
                warn!("Publish failed but is tolerated: {}", err);
                ctx.log_warning(format!("Publish failed (tolerated): {}", err));
                Ok(StepOutput {
                    tolerated: Some(err.to_string()),
                    ..StepOutput::default()
                })
            }
            Err(err) => Err(err),
        }
    }
}
