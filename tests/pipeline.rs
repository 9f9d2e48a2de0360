//! Integration tests for the analyse → narrate flow and the session state
//! machine.
//!
//! The analysis service is mocked with `mockito`; the text-generation model
//! is replaced by a scripted [`TextGenerator`]. No network access or API key
//! is needed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use htp_report::{
    analyze, generate_narratives, AnalysisResult, Applied, Audience, ErrorCategory, HtpError,
    NarrativeFailure, ReportConfig, ReportProgressCallback, ReportSession, SessionState,
    TextGenerator, UploadedImage,
};
use mockito::{Matcher, Server, ServerGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const ANALYSIS_BODY: &str = r#"{
    "analysis_id": "7f3c9a12-5e4b-4d8e-9a61-2b7c0d1e4f55",
    "overall_confidence_score": 0.834,
    "processing_time_seconds": 2.4,
    "house_size_category": "Normal",
    "house_area_ratio": 0.287,
    "house_placement": ["center"],
    "door_present": true,
    "door_characteristics": {"present": true, "size_category": "normal", "position": "center"},
    "window_count": 2,
    "chimney_present": true,
    "detected_features": ["house", "roof", "door", "window", "chimney"],
    "missing_features": [],
    "risk_factors": [],
    "positive_indicators": ["Open and welcoming", "Emotional warmth"],
    "detection_confidence": {"house": 0.97, "door": 0.88, "window": 0.81, "chimney": 0.74},
    "psychological_indicators": {"social": ["Accessible to others"]},
    "psychological_interpretation": "A balanced, well-proportioned house."
}"#;

fn report_json(title: &str) -> String {
    serde_json::json!({
        "title": title,
        "summary": "The drawing shows a balanced house.",
        "detailedAnalysis": "The house is drawn at a typical size.\n\nThe open door suggests accessibility.",
        "recommendations": ["Encourage free drawing", "  ", "Talk about the picture together"],
        "disclaimers": "This is a screening aid, not a diagnosis."
    })
    .to_string()
}

fn drawing() -> UploadedImage {
    UploadedImage::from_bytes("house.png", "image/png", b"\x89PNG\r\n\x1a\nDATA".to_vec()).unwrap()
}

async fn analysis_server(threshold: &str) -> (ServerGuard, mockito::Mock) {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/analyze")
        .match_query(Matcher::UrlEncoded(
            "confidence_threshold".into(),
            threshold.into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ANALYSIS_BODY)
        .create_async()
        .await;
    (server, mock)
}

/// Replies from a script, one entry per call, split by audience.
#[derive(Default)]
struct ScriptedGenerator {
    clinician: Mutex<VecDeque<Result<String, String>>>,
    parent: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn push(&self, audience: Audience, reply: Result<String, String>) -> &Self {
        let queue = match audience {
            Audience::Clinician => &self.clinician,
            Audience::Parent => &self.parent,
        };
        queue.lock().unwrap().push_back(reply);
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, HtpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queue = if prompt.contains("to parents") {
            &self.parent
        } else {
            &self.clinician
        };
        let reply = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".into()));
        reply.map_err(|message| HtpError::LlmApiError { message })
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl ReportProgressCallback for EventLog {
    fn on_analysis_start(&self, file_name: &str) {
        self.0.lock().unwrap().push(format!("analysis_start:{file_name}"));
    }
    fn on_analysis_complete(&self, _id: &str, _secs: f64) {
        self.0.lock().unwrap().push("analysis_complete".into());
    }
    fn on_narrative_start(&self) {
        self.0.lock().unwrap().push("narrative_start".into());
    }
    fn on_narrative_complete(&self, audience: Audience, _chars: usize) {
        self.0.lock().unwrap().push(format!("narrative_ok:{audience}"));
    }
    fn on_narrative_error(&self, audience: Audience, _error: String) {
        self.0.lock().unwrap().push(format!("narrative_err:{audience}"));
    }
}

fn config(base_url: &str, generator: Arc<ScriptedGenerator>) -> ReportConfig {
    ReportConfig::builder()
        .analysis_base_url(base_url)
        .analysis_timeout_secs(5)
        .generator(generator)
        .build()
        .unwrap()
}

// ── Entry points ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn analysis_then_narratives() {
    let (server, mock) = analysis_server("0.25").await;
    let gen = Arc::new(ScriptedGenerator::default());
    gen.push(Audience::Clinician, Ok(format!("Here you go:\n{}", report_json("Clinical Report"))))
        .push(Audience::Parent, Ok(report_json("Understanding the Drawing")));

    let events = Arc::new(EventLog::default());
    let mut config = config(&server.url(), gen.clone());
    config.progress_callback = Some(events.clone() as Arc<dyn ReportProgressCallback>);

    let analysis = analyze(&drawing(), &config).await.expect("analysis");
    mock.assert_async().await;
    assert_eq!(analysis.house_size_category, "Normal");
    assert_eq!(analysis.window_count, 2);

    let pair = generate_narratives(&analysis, &config).await.expect("narratives");
    assert_eq!(pair.clinician.title, "Clinical Report");
    assert_eq!(pair.parent.title, "Understanding the Drawing");
    // Blank recommendations are dropped.
    assert_eq!(pair.parent.recommendations.len(), 2);
    assert_eq!(gen.calls.load(Ordering::SeqCst), 2);

    let log = events.0.lock().unwrap().clone();
    assert_eq!(log[0], "analysis_start:house.png");
    assert_eq!(log[1], "analysis_complete");
    assert_eq!(log[2], "narrative_start");
    assert!(log.contains(&"narrative_ok:Professional".to_string()));
    assert!(log.contains(&"narrative_ok:Parent".to_string()));
}

#[tokio::test]
async fn server_rejection_carries_its_message() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/analyze")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail": "Image too small to analyse"}"#)
        .create_async()
        .await;

    let config = config(&server.url(), Arc::new(ScriptedGenerator::default()));
    let err = analyze(&drawing(), &config).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Analysis);
    assert!(err.to_string().contains("Image too small to analyse"));
}

#[tokio::test]
async fn structured_detailed_analysis_fails_the_pair() {
    let gen = Arc::new(ScriptedGenerator::default());
    let structured = serde_json::json!({
        "title": "t",
        "summary": "s",
        "detailedAnalysis": {"house": "normal"},
        "recommendations": ["r"],
        "disclaimers": "d"
    })
    .to_string();
    gen.push(Audience::Clinician, Ok(structured))
        .push(Audience::Parent, Ok(report_json("Parents")));

    let config = config("http://127.0.0.1:9", gen);
    let analysis: AnalysisResult = serde_json::from_str(ANALYSIS_BODY).unwrap();
    let err = generate_narratives(&analysis, &config).await.unwrap_err();
    let HtpError::NarrativeGeneration { failures } = err else {
        panic!("expected NarrativeGeneration, got {err:?}");
    };
    assert_eq!(
        failures,
        vec![NarrativeFailure::StructuredAnalysis {
            audience: Audience::Clinician
        }]
    );
}

// ── Session ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_retries_narrative_with_same_analysis() {
    let (server, mock) = analysis_server("0.4").await;
    let gen = Arc::new(ScriptedGenerator::default());
    // First attempt: parent reply is missing fields. Second attempt: both fine.
    gen.push(Audience::Clinician, Ok(report_json("Clinical v1")))
        .push(Audience::Parent, Ok(r#"{"title": "incomplete"}"#.into()))
        .push(Audience::Clinician, Ok(report_json("Clinical v2")))
        .push(Audience::Parent, Ok(report_json("Parents v2")));

    let mut session = ReportSession::new(config(&server.url(), gen.clone()));
    session.set_threshold(0.4).unwrap();
    session.select_image(drawing());
    session.analyze().await.expect("analysis");
    mock.assert_async().await;
    assert_eq!(session.state(), SessionState::AnalyzedNoNarrative);

    let err = session.generate_narrative().await.unwrap_err();
    assert!(err.is_narrative_retryable());
    assert_eq!(session.state(), SessionState::NarrativeFailed);
    assert!(session.narratives().is_none());

    // Export is refused and nothing changes.
    let err = session.export(Audience::Parent).await.unwrap_err();
    assert!(matches!(err, HtpError::NarrativeNotReady));
    assert_eq!(session.state(), SessionState::NarrativeFailed);

    let pair = session.retry_narrative().await.expect("retry");
    assert_eq!(pair.clinician.title, "Clinical v2");
    assert_eq!(pair.parent.title, "Parents v2");
    assert_eq!(session.state(), SessionState::NarrativeReady);
    // Both prompts were issued again, nothing from the first attempt kept.
    assert_eq!(gen.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn session_hands_fresh_analysis_to_the_narrative_step() {
    let (server, mock) = analysis_server("0.25").await;
    let gen = Arc::new(ScriptedGenerator::default());
    gen.push(Audience::Clinician, Ok(report_json("Clinical")))
        .push(Audience::Parent, Err("quota exceeded".into()))
        .push(Audience::Clinician, Ok(report_json("Clinical")))
        .push(Audience::Parent, Ok(report_json("Parents")));

    let mut session = ReportSession::new(config(&server.url(), gen.clone()));
    session.select_image(drawing());
    let err = session.analyze_and_narrate().await.unwrap_err();
    mock.assert_async().await;
    assert!(err.is_narrative_retryable());
    assert_eq!(session.state(), SessionState::NarrativeFailed);
    assert_eq!(session.analysis().unwrap().window_count, 2);

    let pair = session.retry_narrative().await.expect("retry");
    assert_eq!(pair.parent.title, "Parents");
    assert_eq!(session.state(), SessionState::NarrativeReady);
    assert_eq!(gen.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn session_analysis_failure_requires_new_upload() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/analyze")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(r#"{"message": "Model not loaded"}"#)
        .create_async()
        .await;

    let mut session = ReportSession::new(config(&server.url(), Arc::new(ScriptedGenerator::default())));
    session.select_image(drawing());
    assert!(session.analyze().await.is_err());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.image().is_none());
    assert!(session.error().unwrap().message.contains("Model not loaded"));
    assert!(matches!(session.analyze().await, Err(HtpError::NoFileSelected)));
}

#[tokio::test]
async fn overlapping_analyses_keep_the_latest() {
    let (server, _mock) = analysis_server("0.25").await;
    let config = config(&server.url(), Arc::new(ScriptedGenerator::default()));
    let mut session = ReportSession::new(config.clone());
    session.select_image(drawing());

    let first = session.begin_analysis().unwrap();
    let second = session.begin_analysis().unwrap();

    let run = |ticket_image: UploadedImage, threshold: f32, config: ReportConfig| {
        tokio::spawn(async move {
            htp_report::report::analyze_with_threshold(&ticket_image, threshold, &config).await
        })
    };
    let a = run(first.image.clone(), first.threshold, config.clone());
    let b = run(second.image.clone(), second.threshold, config.clone());
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // The newer request lands first; the older one arrives late.
    assert_eq!(session.finish_analysis(second, b).unwrap(), Applied::Applied);
    assert_eq!(session.finish_analysis(first, a).unwrap(), Applied::Stale);
    assert_eq!(session.state(), SessionState::AnalyzedNoNarrative);
}

#[tokio::test]
async fn selecting_a_new_file_discards_pending_narrative() {
    let (server, _mock) = analysis_server("0.25").await;
    let gen = Arc::new(ScriptedGenerator::default());
    gen.push(Audience::Clinician, Ok(report_json("Old")))
        .push(Audience::Parent, Ok(report_json("Old")));
    let config = config(&server.url(), gen);

    let mut session = ReportSession::new(config.clone());
    session.select_image(drawing());
    session.analyze().await.unwrap();

    let ticket = session.begin_narrative().unwrap();
    let pending = {
        let analysis = ticket.analysis.clone();
        let config = config.clone();
        tokio::spawn(async move { generate_narratives(&analysis, &config).await })
    };

    session.select_image(drawing());
    let outcome = pending.await.unwrap();
    assert!(outcome.is_ok());
    assert_eq!(session.finish_narrative(ticket, outcome).unwrap(), Applied::Stale);
    assert_eq!(session.state(), SessionState::FileSelected);
    assert!(session.narratives().is_none());
}
