//! Top-level entry points: analyse, narrate, export.
//!
//! Each function runs one step of the pipeline and can be called on its own;
//! [`run`] chains all three for the CLI and for callers that just want PDFs
//! from an image on disk. State between steps (which analysis belongs to
//! which narrative, what may be retried) is the caller's business, or
//! [`crate::session::ReportSession`]'s.

use crate::config::{validate_threshold, ReportConfig};
use crate::error::HtpError;
use crate::model::{AnalysisResult, Audience, NarrativePair, NarrativeReport};
use crate::pipeline::analysis::AnalysisClient;
use crate::pipeline::document::build_document;
use crate::pipeline::pdf::{render_pdf, report_filename, RenderSettings};
use crate::pipeline::upload::{load_image, UploadedImage};
use crate::pipeline::{llm, narrative};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// One rendered report, ready to be saved or sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReport {
    pub audience: Audience,
    /// `HTP-Analysis-Report-{Professional|Parent}-{YYYY-MM-DD}.pdf`
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Which reports to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceSelection {
    Professional,
    Parent,
    /// Professional first, then parent.
    #[default]
    Both,
}

impl AudienceSelection {
    pub fn audiences(&self) -> &'static [Audience] {
        match self {
            AudienceSelection::Professional => &[Audience::Clinician],
            AudienceSelection::Parent => &[Audience::Parent],
            AudienceSelection::Both => &Audience::ALL,
        }
    }
}

/// Everything one end-to-end [`run`] produced.
#[derive(Debug, Clone)]
pub struct ReportRun {
    pub analysis: AnalysisResult,
    pub narratives: NarrativePair,
    pub reports: Vec<ExportedReport>,
}

/// Submit `image` to the analysis service at the configured threshold.
pub async fn analyze(image: &UploadedImage, config: &ReportConfig) -> Result<AnalysisResult, HtpError> {
    analyze_with_threshold(image, config.confidence_threshold, config).await
}

/// Submit `image` with an explicit `threshold`, overriding the config.
///
/// # Errors
/// `ThresholdOutOfRange` before any network call; otherwise whatever the
/// analysis client reports (rejected, transport, timeout, malformed body).
pub async fn analyze_with_threshold(
    image: &UploadedImage,
    threshold: f32,
    config: &ReportConfig,
) -> Result<AnalysisResult, HtpError> {
    let threshold = validate_threshold(threshold)?;
    let client = AnalysisClient::new(config)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_start(image.file_name());
    }

    let result = client.analyze(image, threshold).await?;

    info!(
        "Analysis {} complete: house {} ({:.1}% confidence)",
        result.short_id(),
        result.house_size_category,
        result.overall_confidence_score * 100.0
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(&result.analysis_id, result.processing_time_seconds);
    }
    Ok(result)
}

/// Generate the clinician and parent reports for `analysis`.
///
/// All-or-nothing: either both reports are returned or
/// [`HtpError::NarrativeGeneration`] lists every audience that failed.
/// Calling this again is the retry; nothing from an earlier attempt is kept.
pub async fn generate_narratives(
    analysis: &AnalysisResult,
    config: &ReportConfig,
) -> Result<NarrativePair, HtpError> {
    let generator = llm::resolve_generator(config)?;
    narrative::generate_pair(generator.as_ref(), analysis, config.progress_callback.as_ref()).await
}

/// Render the `audience` report to PDF, dated today (UTC).
pub async fn export_report(
    analysis: &AnalysisResult,
    report: &NarrativeReport,
    audience: Audience,
    config: &ReportConfig,
) -> Result<ExportedReport, HtpError> {
    export_report_on(analysis, report, audience, Utc::now().date_naive(), config).await
}

/// Render the `audience` report to PDF with an explicit report `date`.
pub async fn export_report_on(
    analysis: &AnalysisResult,
    report: &NarrativeReport,
    audience: Audience,
    date: NaiveDate,
    config: &ReportConfig,
) -> Result<ExportedReport, HtpError> {
    let start = Instant::now();
    if let Some(ref cb) = config.progress_callback {
        cb.on_export_start(audience);
    }

    // ── Step 1: Synthesize the styled document ──────────────────────────
    let document = build_document(analysis, report, audience, date);
    debug!("{} document: {} blocks", audience, document.blocks.len());

    // ── Step 2: Layout, rasterise, paginate, assemble ───────────────────
    let pdf = render_pdf(document, RenderSettings::from_config(config)).await?;

    let exported = ExportedReport {
        audience,
        filename: report_filename(audience, date),
        bytes: pdf.bytes,
        page_count: pdf.page_count,
    };

    info!(
        "Exported {} ({} page(s), {} bytes) in {:?}",
        exported.filename,
        exported.page_count,
        exported.bytes.len(),
        start.elapsed()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_export_complete(
            audience,
            &exported.filename,
            exported.page_count,
            exported.bytes.len(),
        );
    }
    Ok(exported)
}

/// Export every report in `selection`, in order.
///
/// Stops at the first failure; reports already rendered are dropped with it.
pub async fn export_selection(
    analysis: &AnalysisResult,
    narratives: &NarrativePair,
    selection: AudienceSelection,
    config: &ReportConfig,
) -> Result<Vec<ExportedReport>, HtpError> {
    let mut reports = Vec::with_capacity(selection.audiences().len());
    for &audience in selection.audiences() {
        reports.push(export_report(analysis, narratives.get(audience), audience, config).await?);
    }
    Ok(reports)
}

/// Write `report` into `dir` under its own filename.
///
/// Atomic: the bytes go to a temporary file in `dir` first, which is then
/// renamed over the target, so readers never see a partial PDF.
pub async fn export_to_dir(report: &ExportedReport, dir: impl AsRef<Path>) -> Result<PathBuf, HtpError> {
    let dir = dir.as_ref().to_path_buf();
    let target = dir.join(&report.filename);

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| HtpError::OutputWriteFailed {
            path: target.clone(),
            source: e,
        })?;

    let bytes = report.bytes.clone();
    let path = target.clone();
    tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &bytes))
        .await
        .map_err(|e| HtpError::Internal(format!("Write task panicked: {e}")))??;

    info!("Wrote {}", target.display());
    Ok(target)
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), HtpError> {
    let write_err = |source: std::io::Error| HtpError::OutputWriteFailed {
        path: target.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Load the image at `image_path`, analyse it, generate both narratives, and
/// render the reports in `selection`.
///
/// Nothing is written to disk; pass the reports to [`export_to_dir`].
pub async fn run(
    image_path: impl AsRef<Path>,
    selection: AudienceSelection,
    config: &ReportConfig,
) -> Result<ReportRun, HtpError> {
    let total_start = Instant::now();

    // ── Step 1: Validate and load ───────────────────────────────────────
    let image = load_image(image_path).await?;

    // ── Step 2: Analyse ─────────────────────────────────────────────────
    let analysis = analyze(&image, config).await?;

    // ── Step 3: Narrate (both audiences, concurrently) ──────────────────
    let narratives = generate_narratives(&analysis, config).await?;

    // ── Step 4: Export ──────────────────────────────────────────────────
    let reports = export_selection(&analysis, &narratives, selection, config).await?;

    info!(
        "Run complete for {}: {} report(s) in {:?}",
        image.file_name(),
        reports.len(),
        total_start.elapsed()
    );
    Ok(ReportRun {
        analysis,
        narratives,
        reports,
    })
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    image_path: impl AsRef<Path>,
    selection: AudienceSelection,
    config: &ReportConfig,
) -> Result<ReportRun, HtpError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HtpError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(run(image_path, selection, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(audience: Audience) -> ExportedReport {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        ExportedReport {
            audience,
            filename: report_filename(audience, date),
            bytes: b"%PDF-1.7 test".to_vec(),
            page_count: 1,
        }
    }

    #[test]
    fn selection_order_is_professional_then_parent() {
        assert_eq!(
            AudienceSelection::Both.audiences(),
            &[Audience::Clinician, Audience::Parent]
        );
        assert_eq!(AudienceSelection::Parent.audiences(), &[Audience::Parent]);
        assert_eq!(AudienceSelection::default(), AudienceSelection::Both);
    }

    #[tokio::test]
    async fn export_to_dir_writes_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = report(Audience::Parent);
        let path = export_to_dir(&report, dir.path().join("out")).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "HTP-Analysis-Report-Parent-2026-03-09.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), report.bytes);
        // Only the target remains; the temporary file was renamed.
        assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn export_to_dir_overwrites_existing_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = report(Audience::Clinician);
        export_to_dir(&report, dir.path()).await.unwrap();
        report.bytes = b"%PDF-1.7 second".to_vec();
        let path = export_to_dir(&report, dir.path()).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.7 second");
    }

    #[tokio::test]
    async fn export_to_unwritable_dir_is_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = export_to_dir(&report(Audience::Parent), blocker.join("sub"))
            .await
            .unwrap_err();
        assert!(matches!(err, HtpError::OutputWriteFailed { .. }));
    }

    #[tokio::test]
    async fn out_of_range_threshold_fails_before_network() {
        let image = UploadedImage::from_bytes("h.png", "image/png", vec![1, 2, 3]).unwrap();
        // Nothing listens on this port; the threshold check must come first.
        let config = ReportConfig::builder()
            .analysis_base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let err = analyze_with_threshold(&image, 0.95, &config).await.unwrap_err();
        assert!(matches!(err, HtpError::ThresholdOutOfRange { .. }));
    }
}
