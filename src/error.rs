//! Error types for the htp-report library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HtpError`]: **Fatal for the current step**: the file was rejected,
//!   the analysis service refused the drawing, the narrative pair could not be
//!   produced, or the PDF could not be rendered. Returned as `Err(HtpError)`
//!   from every entry point.
//!
//! * [`NarrativeFailure`]: **One audience** of the narrative pair went wrong
//!   (transport error, no JSON in the reply, a missing field). Failures are
//!   collected for both audiences and surfaced together inside
//!   [`HtpError::NarrativeGeneration`], because the pair is all-or-nothing.
//!
//! [`HtpError::category`] maps every variant onto the user-facing taxonomy
//! (validation / analysis / narrative / export) so a front end can decide
//! which recovery action to offer.

use crate::model::Audience;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the htp-report library.
#[derive(Debug, Error)]
pub enum HtpError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Declared MIME type is outside the allow-list.
    #[error("Please upload a valid image file (JPEG, PNG, BMP, or TIFF); got '{mime}'")]
    UnsupportedMimeType { mime: String },

    /// File is larger than the upload ceiling.
    #[error("File size must be less than 10MB (got {size} bytes, limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// Confidence threshold is outside the accepted range.
    #[error("Confidence threshold must be between {min:.2} and {max:.2}, got {value}")]
    ThresholdOutOfRange { value: f32, min: f32, max: f32 },

    /// An action needs a selected image but none is held.
    #[error("No image selected. Choose a drawing to analyse first.")]
    NoFileSelected,

    // ── Analysis errors ───────────────────────────────────────────────────
    /// The analysis service answered with a non-success status.
    #[error("Analysis failed (HTTP {status}): {message}")]
    AnalysisRejected { status: u16, message: String },

    /// The request never produced a response.
    #[error("Could not reach the analysis service at '{url}': {reason}")]
    AnalysisTransport { url: String, reason: String },

    /// The analysis call exceeded the configured timeout.
    #[error("Analysis timed out after {secs}s for '{url}'")]
    AnalysisTimeout { url: String, secs: u64 },

    /// The service answered 2xx but the body is not an analysis result.
    #[error("Analysis service returned an unreadable result: {detail}")]
    MalformedAnalysis { detail: String },

    /// A narrative or export was requested before an analysis result exists.
    #[error("No analysis result available. Analyse a drawing first.")]
    AnalysisNotReady,

    // ── Narrative errors ──────────────────────────────────────────────────
    /// The configured provider needs an API key that is not set.
    #[error("No API key for text-generation provider '{provider}'.\nSet {var} in the environment.")]
    MissingApiKey { provider: String, var: String },

    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The text-generation API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// One or both narrative reports could not be produced.
    #[error("Unable to generate AI insights: {}", summarise_failures(failures))]
    NarrativeGeneration { failures: Vec<NarrativeFailure> },

    /// A narrative retry was requested while no narrative failure is pending.
    #[error("Nothing to retry: narrative generation has not failed (state: {state})")]
    NothingToRetry { state: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Export was requested before the narrative pair is ready.
    #[error("AI insights are not ready yet. Please wait before downloading the report.")]
    NarrativeNotReady,

    /// Painting, rasterising or assembling the PDF failed.
    #[error("Report rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or place the library next to the binary.\n"
    )]
    PdfiumBindingFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write report '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which step of the pipeline an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Rejected locally before any network call; pick another file.
    Validation,
    /// The analysis step failed; the drawing must be uploaded again.
    Analysis,
    /// The narrative step failed; it can be retried with the same analysis.
    Narrative,
    /// The PDF could not be produced; prior state is kept.
    Export,
    /// The library was configured incorrectly.
    Config,
    /// Anything else.
    Internal,
}

impl HtpError {
    /// Classify this error for recovery decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            HtpError::FileNotFound { .. }
            | HtpError::PermissionDenied { .. }
            | HtpError::UnsupportedMimeType { .. }
            | HtpError::FileTooLarge { .. }
            | HtpError::ThresholdOutOfRange { .. }
            | HtpError::NoFileSelected => ErrorCategory::Validation,

            HtpError::AnalysisRejected { .. }
            | HtpError::AnalysisTransport { .. }
            | HtpError::AnalysisTimeout { .. }
            | HtpError::MalformedAnalysis { .. }
            | HtpError::AnalysisNotReady => ErrorCategory::Analysis,

            HtpError::MissingApiKey { .. }
            | HtpError::ProviderNotConfigured { .. }
            | HtpError::LlmApiError { .. }
            | HtpError::NarrativeGeneration { .. }
            | HtpError::NothingToRetry { .. } => ErrorCategory::Narrative,

            HtpError::NarrativeNotReady
            | HtpError::RenderFailed { .. }
            | HtpError::PdfiumBindingFailed(_)
            | HtpError::OutputWriteFailed { .. } => ErrorCategory::Export,

            HtpError::InvalidConfig(_) => ErrorCategory::Config,
            HtpError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the user can recover by retrying the narrative step alone.
    pub fn is_narrative_retryable(&self) -> bool {
        matches!(
            self,
            HtpError::LlmApiError { .. } | HtpError::NarrativeGeneration { .. }
        )
    }
}

/// Why one audience's narrative report could not be produced.
///
/// Collected per audience and surfaced together in
/// [`HtpError::NarrativeGeneration`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum NarrativeFailure {
    /// The model call itself failed.
    #[error("{audience} report: model call failed: {detail}")]
    Transport { audience: Audience, detail: String },

    /// The reply contained no balanced `{...}` object.
    #[error("{audience} report: reply contained no JSON object")]
    NoJsonObject { audience: Audience },

    /// The extracted object is not valid JSON.
    #[error("{audience} report: malformed JSON: {detail}")]
    MalformedJson { audience: Audience, detail: String },

    /// A required field is absent, blank, or of the wrong type.
    #[error("{audience} report missing required field '{field}'")]
    MissingField { audience: Audience, field: String },

    /// `detailedAnalysis` came back as structured data instead of prose.
    #[error("{audience} report: detailedAnalysis is structured data, not prose")]
    StructuredAnalysis { audience: Audience },
}

impl NarrativeFailure {
    /// The audience this failure belongs to.
    pub fn audience(&self) -> Audience {
        match self {
            NarrativeFailure::Transport { audience, .. }
            | NarrativeFailure::NoJsonObject { audience }
            | NarrativeFailure::MalformedJson { audience, .. }
            | NarrativeFailure::MissingField { audience, .. }
            | NarrativeFailure::StructuredAnalysis { audience } => *audience,
        }
    }
}

fn summarise_failures(failures: &[NarrativeFailure]) -> String {
    if failures.is_empty() {
        return "unknown failure".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_display() {
        let e = HtpError::FileTooLarge {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("10MB"), "got: {msg}");
        assert_eq!(e.category(), ErrorCategory::Validation);
    }

    #[test]
    fn analysis_rejected_display() {
        let e = HtpError::AnalysisRejected {
            status: 422,
            message: "No house detected".into(),
        };
        assert!(e.to_string().contains("422"));
        assert!(e.to_string().contains("No house detected"));
        assert_eq!(e.category(), ErrorCategory::Analysis);
    }

    #[test]
    fn narrative_generation_lists_every_audience() {
        let e = HtpError::NarrativeGeneration {
            failures: vec![
                NarrativeFailure::MissingField {
                    audience: Audience::Clinician,
                    field: "summary".into(),
                },
                NarrativeFailure::NoJsonObject {
                    audience: Audience::Parent,
                },
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("Professional report missing required field 'summary'"), "got: {msg}");
        assert!(msg.contains("Parent report"), "got: {msg}");
        assert!(e.is_narrative_retryable());
        assert_eq!(e.category(), ErrorCategory::Narrative);
    }

    #[test]
    fn missing_api_key_names_variable() {
        let e = HtpError::MissingApiKey {
            provider: "gemini".into(),
            var: "GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("GEMINI_API_KEY"));
        assert!(!e.is_narrative_retryable());
    }

    #[test]
    fn retry_without_failure_is_a_narrative_error() {
        let e = HtpError::NothingToRetry { state: "PDF ready".into() };
        assert_eq!(e.category(), ErrorCategory::Narrative);
        assert!(!e.is_narrative_retryable());
        assert!(e.to_string().contains("PDF ready"));
    }

    #[test]
    fn export_errors_are_export_category() {
        assert_eq!(HtpError::NarrativeNotReady.category(), ErrorCategory::Export);
        assert_eq!(
            HtpError::RenderFailed { detail: "x".into() }.category(),
            ErrorCategory::Export
        );
    }

    #[test]
    fn failure_reports_its_audience() {
        let f = NarrativeFailure::StructuredAnalysis {
            audience: Audience::Parent,
        };
        assert_eq!(f.audience(), Audience::Parent);
    }
}
