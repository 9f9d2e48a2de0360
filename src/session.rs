//! Explicit per-user session state for the upload → analyse → narrate →
//! export flow.
//!
//! A [`ReportSession`] owns everything one user has in flight: the selected
//! image, the threshold, the analysis result, the narrative pair, the last
//! exported report and the last error. Nothing is global, so any number of
//! sessions can live side by side.
//!
//! ## Request fencing
//!
//! Every async step is split in two:
//!
//! * `begin_*` checks preconditions, moves the session into its busy state
//!   and returns a ticket carrying a sequence number plus owned copies of
//!   the inputs. The ticket can be moved into a spawned task.
//! * `finish_*` applies the outcome only if the ticket is still the latest
//!   one issued for its slot. Anything older returns [`Applied::Stale`]
//!   and changes nothing.
//!
//! Selecting a new image, clearing, or starting a new analysis invalidates
//! every outstanding ticket, so a slow reply for a previous drawing can
//! never overwrite results for the current one.
//!
//! The `analyze`, `generate_narrative`, `retry_narrative` and `export`
//! drivers do begin + work + finish in one call for callers that do not
//! need to overlap requests. `analyze_and_narrate` chains the first two, so
//! a fresh analysis goes straight on to narrative generation.

use crate::config::{validate_threshold, ReportConfig};
use crate::error::{ErrorCategory, HtpError};
use crate::model::{AnalysisResult, Audience, NarrativePair, NarrativeReport};
use crate::pipeline::upload::{load_image, UploadedImage};
use crate::report::{self, ExportedReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Where a session is in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    FileSelected,
    Analyzing,
    AnalyzedNoNarrative,
    GeneratingNarrative,
    NarrativeReady,
    NarrativeFailed,
    GeneratingPdf,
    PdfReady,
    PdfFailed,
}

impl SessionState {
    /// A request is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Analyzing | SessionState::GeneratingNarrative | SessionState::GeneratingPdf
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether a `finish_*` call changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// A newer request superseded this one; the outcome was discarded.
    Stale,
}

/// The error a session is currently showing.
///
/// Kept as category plus message because [`HtpError`] is not `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&HtpError> for SessionError {
    fn from(e: &HtpError) -> Self {
        Self {
            category: e.category(),
            message: e.to_string(),
        }
    }
}

/// Issued by [`ReportSession::begin_analysis`].
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    seq: u64,
    pub image: UploadedImage,
    pub threshold: f32,
}

/// Issued by [`ReportSession::begin_narrative`].
#[derive(Debug, Clone)]
pub struct NarrativeTicket {
    seq: u64,
    pub analysis: AnalysisResult,
}

/// Issued by [`ReportSession::begin_export`].
#[derive(Debug, Clone)]
pub struct ExportTicket {
    seq: u64,
    pub audience: Audience,
    pub analysis: AnalysisResult,
    pub report: NarrativeReport,
}

/// Latest sequence number per slot; `None` means nothing is in flight.
#[derive(Debug, Default)]
struct Slots {
    analysis: Option<u64>,
    narrative: Option<u64>,
    export: Option<u64>,
}

/// One user's state machine.
#[derive(Debug)]
pub struct ReportSession {
    config: ReportConfig,
    state: SessionState,
    threshold: f32,
    image: Option<UploadedImage>,
    analysis: Option<AnalysisResult>,
    narratives: Option<NarrativePair>,
    last_export: Option<ExportedReport>,
    error: Option<SessionError>,
    next_seq: u64,
    in_flight: Slots,
}

impl ReportSession {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            threshold: config.confidence_threshold,
            config,
            state: SessionState::Idle,
            image: None,
            analysis: None,
            narratives: None,
            last_export: None,
            error: None,
            next_seq: 0,
            in_flight: Slots::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn narratives(&self) -> Option<&NarrativePair> {
        self.narratives.as_ref()
    }

    pub fn last_export(&self) -> Option<&ExportedReport> {
        self.last_export.as_ref()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// Narrative failed and the analysis it needs is still held.
    pub fn can_retry_narrative(&self) -> bool {
        self.state == SessionState::NarrativeFailed && self.analysis.is_some()
    }

    /// Both inputs to an export are held and nothing else is running.
    pub fn can_export(&self) -> bool {
        self.analysis.is_some() && self.narratives.is_some() && !self.state.is_busy()
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Change the threshold used by the next analysis.
    pub fn set_threshold(&mut self, threshold: f32) -> Result<(), HtpError> {
        self.threshold = validate_threshold(threshold)?;
        Ok(())
    }

    /// Hold a validated image; everything derived from a previous image is
    /// dropped and outstanding requests are invalidated.
    pub fn select_image(&mut self, image: UploadedImage) {
        debug!("Selected {} ({})", image.file_name(), image.size_label());
        self.invalidate_all();
        self.analysis = None;
        self.narratives = None;
        self.last_export = None;
        self.error = None;
        self.image = Some(image);
        self.state = SessionState::FileSelected;
    }

    /// Validate and select the file at `path`.
    ///
    /// A rejected file leaves the session as it was apart from the error.
    pub async fn select_file(&mut self, path: impl AsRef<Path>) -> Result<(), HtpError> {
        match load_image(path).await {
            Ok(image) => {
                self.select_image(image);
                Ok(())
            }
            Err(e) => {
                self.error = Some(SessionError::from(&e));
                Err(e)
            }
        }
    }

    /// Back to `Idle` from any state.
    pub fn clear(&mut self) {
        self.invalidate_all();
        self.image = None;
        self.analysis = None;
        self.narratives = None;
        self.last_export = None;
        self.error = None;
        self.state = SessionState::Idle;
    }

    // ── Analysis ─────────────────────────────────────────────────────────

    /// Start analysing the selected image. Prior results are cleared first.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, HtpError> {
        let image = self.image.clone().ok_or(HtpError::NoFileSelected)?;
        self.invalidate_all();
        let seq = self.issue();
        self.in_flight.analysis = Some(seq);

        self.analysis = None;
        self.narratives = None;
        self.last_export = None;
        self.error = None;
        self.state = SessionState::Analyzing;

        Ok(AnalysisTicket {
            seq,
            image,
            threshold: self.threshold,
        })
    }

    /// Apply an analysis outcome.
    ///
    /// On failure the selection is dropped and the session returns to
    /// `Idle`; the drawing has to be selected again.
    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, HtpError>,
    ) -> Result<Applied, HtpError> {
        if self.in_flight.analysis != Some(ticket.seq) {
            warn!("Discarding stale analysis result (request #{})", ticket.seq);
            return Ok(Applied::Stale);
        }
        self.in_flight.analysis = None;

        match outcome {
            Ok(result) => {
                info!("Session holds analysis {}", result.short_id());
                self.analysis = Some(result);
                self.state = SessionState::AnalyzedNoNarrative;
                Ok(Applied::Applied)
            }
            Err(e) => {
                self.error = Some(SessionError::from(&e));
                self.image = None;
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    // ── Narrative ────────────────────────────────────────────────────────

    /// Start (or restart) narrative generation for the held analysis.
    pub fn begin_narrative(&mut self) -> Result<NarrativeTicket, HtpError> {
        let analysis = self.analysis.clone().ok_or(HtpError::AnalysisNotReady)?;
        self.in_flight.export = None;
        let seq = self.issue();
        self.in_flight.narrative = Some(seq);

        self.narratives = None;
        self.last_export = None;
        self.error = None;
        self.state = SessionState::GeneratingNarrative;

        Ok(NarrativeTicket { seq, analysis })
    }

    /// Apply a narrative outcome. Failure keeps the analysis for a retry.
    pub fn finish_narrative(
        &mut self,
        ticket: NarrativeTicket,
        outcome: Result<NarrativePair, HtpError>,
    ) -> Result<Applied, HtpError> {
        if self.in_flight.narrative != Some(ticket.seq) {
            warn!("Discarding stale narrative pair (request #{})", ticket.seq);
            return Ok(Applied::Stale);
        }
        self.in_flight.narrative = None;

        match outcome {
            Ok(pair) => {
                self.narratives = Some(pair);
                self.state = SessionState::NarrativeReady;
                Ok(Applied::Applied)
            }
            Err(e) => {
                self.error = Some(SessionError::from(&e));
                self.state = SessionState::NarrativeFailed;
                Err(e)
            }
        }
    }

    // ── Export ───────────────────────────────────────────────────────────

    /// Start rendering the `audience` report.
    ///
    /// Without a narrative pair this fails with `NarrativeNotReady` and the
    /// session is left exactly as it was.
    pub fn begin_export(&mut self, audience: Audience) -> Result<ExportTicket, HtpError> {
        let analysis = self.analysis.clone().ok_or(HtpError::AnalysisNotReady)?;
        let report = self
            .narratives
            .as_ref()
            .map(|pair| pair.get(audience).clone())
            .ok_or(HtpError::NarrativeNotReady)?;

        let seq = self.issue();
        self.in_flight.export = Some(seq);
        self.error = None;
        self.state = SessionState::GeneratingPdf;

        Ok(ExportTicket {
            seq,
            audience,
            analysis,
            report,
        })
    }

    /// Apply an export outcome. Failure keeps file, analysis and narrative.
    pub fn finish_export(
        &mut self,
        ticket: ExportTicket,
        outcome: Result<ExportedReport, HtpError>,
    ) -> Result<Applied, HtpError> {
        if self.in_flight.export != Some(ticket.seq) {
            warn!("Discarding stale {} export (request #{})", ticket.audience, ticket.seq);
            return Ok(Applied::Stale);
        }
        self.in_flight.export = None;

        match outcome {
            Ok(exported) => {
                self.last_export = Some(exported);
                self.state = SessionState::PdfReady;
                Ok(Applied::Applied)
            }
            Err(e) => {
                self.error = Some(SessionError::from(&e));
                self.state = SessionState::PdfFailed;
                Err(e)
            }
        }
    }

    // ── Drivers ──────────────────────────────────────────────────────────

    /// Analyse the selected image.
    pub async fn analyze(&mut self) -> Result<&AnalysisResult, HtpError> {
        let ticket = self.begin_analysis()?;
        let outcome = report::analyze_with_threshold(&ticket.image, ticket.threshold, &self.config).await;
        self.finish_analysis(ticket, outcome)?;
        self.analysis.as_ref().ok_or(HtpError::AnalysisNotReady)
    }

    /// Analyse the selected image, then generate both narrative reports from
    /// the result. A narrative failure keeps the analysis for a retry.
    pub async fn analyze_and_narrate(&mut self) -> Result<&NarrativePair, HtpError> {
        self.analyze().await?;
        self.generate_narrative().await
    }

    /// Generate both narrative reports for the held analysis.
    pub async fn generate_narrative(&mut self) -> Result<&NarrativePair, HtpError> {
        let ticket = self.begin_narrative()?;
        let outcome = report::generate_narratives(&ticket.analysis, &self.config).await;
        self.finish_narrative(ticket, outcome)?;
        self.narratives.as_ref().ok_or(HtpError::NarrativeNotReady)
    }

    /// Re-run both narrative prompts after a failure.
    pub async fn retry_narrative(&mut self) -> Result<&NarrativePair, HtpError> {
        if !self.can_retry_narrative() {
            return Err(match self.analysis {
                None => HtpError::AnalysisNotReady,
                Some(_) => HtpError::NothingToRetry {
                    state: self.state.to_string(),
                },
            });
        }
        self.generate_narrative().await
    }

    /// Render the `audience` report.
    pub async fn export(&mut self, audience: Audience) -> Result<&ExportedReport, HtpError> {
        let ticket = self.begin_export(audience)?;
        let outcome =
            report::export_report(&ticket.analysis, &ticket.report, ticket.audience, &self.config).await;
        self.finish_export(ticket, outcome)?;
        self.last_export.as_ref().ok_or(HtpError::NarrativeNotReady)
    }

    fn issue(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn invalidate_all(&mut self) {
        self.in_flight = Slots::default();
    }
}
