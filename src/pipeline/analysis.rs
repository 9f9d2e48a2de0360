//! Analysis client: one multipart POST to the external analysis service.
//!
//! The call is fired once. It is never retried automatically; a failed
//! analysis is surfaced to the caller, who decides whether to re-upload.

use crate::config::ReportConfig;
use crate::error::HtpError;
use crate::model::AnalysisResult;
use crate::pipeline::upload::UploadedImage;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Thin HTTP client for `POST {base}/analyze`.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: Option<String>,
    detail: Option<serde_json::Value>,
}

impl AnalysisClient {
    /// Build a client for the configured base URL.
    pub fn new(config: &ReportConfig) -> Result<Self, HtpError> {
        Self::with_base_url(&config.analysis_base_url, config.analysis_timeout_secs)
    }

    pub fn with_base_url(base_url: &str, timeout_secs: u64) -> Result<Self, HtpError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HtpError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    /// Full endpoint URL without the query string.
    pub fn endpoint(&self) -> String {
        format!("{}/analyze", self.base_url)
    }

    /// Submit the image and parse the analysis result.
    pub async fn analyze(
        &self,
        image: &UploadedImage,
        confidence_threshold: f32,
    ) -> Result<AnalysisResult, HtpError> {
        let url = self.endpoint();
        let start = Instant::now();
        info!(
            "Submitting {} ({}) to {} with threshold {:.2}",
            image.file_name(),
            image.size_label(),
            url,
            confidence_threshold
        );

        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.mime().as_mime_str())
            .map_err(|e| HtpError::Internal(format!("multipart part: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .query(&[("confidence_threshold", confidence_threshold.to_string())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!("Analysis rejected: HTTP {}: {}", status.as_u16(), message);
            return Err(HtpError::AnalysisRejected {
                status: status.as_u16(),
                message,
            });
        }

        let result: AnalysisResult =
            serde_json::from_slice(&body).map_err(|e| HtpError::MalformedAnalysis {
                detail: e.to_string(),
            })?;

        for violation in result.contract_violations() {
            warn!("Analysis {}: {}", result.analysis_id, violation);
        }

        debug!(
            "Analysis {} parsed in {:?} ({} bytes)",
            result.analysis_id,
            start.elapsed(),
            body.len()
        );
        Ok(result)
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> HtpError {
        if e.is_timeout() {
            HtpError::AnalysisTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            HtpError::AnalysisTransport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Extract a human-readable message from an error body.
///
/// Prefers `message`, then a string `detail`, then a generic fallback.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ServiceErrorBody>(body) {
        Ok(ServiceErrorBody {
            message: Some(m), ..
        }) if !m.trim().is_empty() => m,
        Ok(ServiceErrorBody {
            detail: Some(serde_json::Value::String(d)),
            ..
        }) if !d.trim().is_empty() => d,
        _ => "Analysis failed".to_string(),
    }
}
