//! # htp-report
//!
//! Turn a child's House-Tree-Person (HTP) house drawing into two narrative
//! PDF reports: one for the clinician, one for the parents.
//!
//! ## Why this crate?
//!
//! The computer-vision analysis of a drawing produces a dense structured
//! record: size class, area ratio, detected and missing features, per-feature
//! confidences, indicators grouped by psychological domain. Nobody reads that
//! directly. This crate sends the drawing to the analysis service, asks a
//! text-generation model to write the record up twice (professional register
//! and plain language), validates both replies against one strict schema, and
//! renders each into a paginated A4 PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Upload     MIME allow-list, 10 MiB ceiling, no network
//!  ├─ 2. Analyse    one multipart POST to {base}/analyze
//!  ├─ 3. Narrate    clinician + parent prompts, concurrent, all-or-nothing
//!  ├─ 4. Document   styled blocks per audience
//!  ├─ 5. Render     layout → pdfium canvas (CPU-bound, spawn_blocking)
//!  └─ 6. Export     canvas sliced into A4 pages, one PDF per audience
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use htp_report::{run, export_to_dir, AudienceSelection, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Default provider is Gemini; the key comes from GEMINI_API_KEY.
//!     let config = ReportConfig::builder()
//!         .analysis_base_url("http://localhost:8000")
//!         .build()?;
//!     let run = run("house.png", AudienceSelection::Both, &config).await?;
//!     for report in &run.reports {
//!         let path = export_to_dir(report, "reports").await?;
//!         eprintln!("{} ({} pages)", path.display(), report.page_count);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For interactive front ends, [`ReportSession`] holds one user's state and
//! discards replies that a newer request has superseded.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `htp-report` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! htp-report = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! Exporting needs a pdfium shared library. Set `PDFIUM_LIB_PATH`, place the
//! library next to the binary, or install it on the system search path.
//! Analysis and narrative generation work without it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod sample;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ReportConfig, ReportConfigBuilder};
pub use error::{ErrorCategory, HtpError, NarrativeFailure};
pub use model::{AnalysisResult, Audience, NarrativePair, NarrativeReport, RagPageReference};
pub use pipeline::llm::TextGenerator;
pub use pipeline::upload::{load_image, UploadedImage};
pub use progress::{NoopProgressCallback, ProgressCallback, ReportProgressCallback};
pub use report::{
    analyze, export_report, export_selection, export_to_dir, generate_narratives, run, run_sync,
    AudienceSelection, ExportedReport, ReportRun,
};
pub use sample::sample_analysis;
pub use session::{Applied, ReportSession, SessionError, SessionState};
