//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::ReportConfigBuilder::progress_callback`] to receive
//! events as the analysis, narrative and export steps run.
//!
//! # Example
//!
//! ```rust
//! use htp_report::{ReportProgressCallback, ReportConfig, Audience};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     narratives: AtomicUsize,
//! }
//!
//! impl ReportProgressCallback for CountingCallback {
//!     fn on_narrative_complete(&self, audience: Audience, chars: usize) {
//!         self.narratives.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{audience} narrative ready ({chars} chars)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { narratives: AtomicUsize::new(0) });
//!
//! let config = ReportConfig::builder()
//!     .progress_callback(counter as Arc<dyn ReportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::Audience;
use std::sync::Arc;

/// Called by the pipeline as each step starts and finishes.
///
/// The two narrative calls run concurrently, so `on_narrative_*` may be
/// invoked from different tasks at the same time. All methods default to
/// no-ops.
pub trait ReportProgressCallback: Send + Sync {
    /// Called before the image is sent to the analysis service.
    fn on_analysis_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Called when the analysis service returned a parsed result.
    fn on_analysis_complete(&self, analysis_id: &str, processing_secs: f64) {
        let _ = (analysis_id, processing_secs);
    }

    /// Called once before both narrative prompts are issued.
    fn on_narrative_start(&self) {}

    /// Called when one audience's report has been parsed and validated.
    fn on_narrative_complete(&self, audience: Audience, chars: usize) {
        let _ = (audience, chars);
    }

    /// Called when one audience's report failed.
    ///
    /// `error` is owned so implementations can move it into spawned tasks.
    fn on_narrative_error(&self, audience: Audience, error: String) {
        let _ = (audience, error);
    }

    /// Called before a report is rendered.
    fn on_export_start(&self, audience: Audience) {
        let _ = audience;
    }

    /// Called when a PDF has been produced.
    fn on_export_complete(&self, audience: Audience, filename: &str, pages: usize, bytes: usize) {
        let _ = (audience, filename, pages, bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReportConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        errors: Mutex<Vec<String>>,
        pages: AtomicUsize,
    }

    impl ReportProgressCallback for TrackingCallback {
        fn on_narrative_complete(&self, _audience: Audience, _chars: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_narrative_error(&self, audience: Audience, error: String) {
            self.errors
                .lock()
                .unwrap()
                .push(format!("{audience}: {error}"));
        }

        fn on_export_complete(&self, _a: Audience, _f: &str, pages: usize, _b: usize) {
            self.pages.fetch_add(pages, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_analysis_start("house.png");
        cb.on_analysis_complete("id", 1.0);
        cb.on_narrative_start();
        cb.on_narrative_complete(Audience::Parent, 10);
        cb.on_narrative_error(Audience::Clinician, "boom".into());
        cb.on_export_start(Audience::Parent);
        cb.on_export_complete(Audience::Parent, "x.pdf", 2, 100);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_narrative_complete(Audience::Clinician, 100);
        tracker.on_narrative_error(Audience::Parent, "missing summary".into());
        tracker.on_export_complete(Audience::Clinician, "a.pdf", 3, 1000);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.errors.lock().unwrap().as_slice(),
            ["Parent: missing summary"]
        );
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn arc_dyn_callback_moves_into_spawned_task() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        tokio::spawn(async move {
            cb.on_narrative_error(Audience::Parent, "timeout".to_string());
        })
        .await
        .expect("spawn must succeed");
    }
}
