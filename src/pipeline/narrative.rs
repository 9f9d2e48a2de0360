//! Narrative generation: one analysis in, a clinician/parent report pair out.
//!
//! Both prompts are issued concurrently and awaited together. The pair is
//! all-or-nothing: if either audience fails, every failure is returned in
//! [`HtpError::NarrativeGeneration`] and no report is exposed.

use crate::error::{HtpError, NarrativeFailure};
use crate::model::{AnalysisResult, Audience, NarrativePair, NarrativeReport};
use crate::pipeline::extract::parse_narrative;
use crate::pipeline::llm::TextGenerator;
use crate::progress::ProgressCallback;
use crate::prompts::narrative_prompt;
use std::time::Instant;
use tracing::{info, warn};

/// Generate both narrative reports for `analysis`.
///
/// Retrying means calling this again: both prompts are rebuilt and both
/// calls re-issued.
pub async fn generate_pair(
    generator: &dyn TextGenerator,
    analysis: &AnalysisResult,
    progress: Option<&ProgressCallback>,
) -> Result<NarrativePair, HtpError> {
    let start = Instant::now();
    if let Some(cb) = progress {
        cb.on_narrative_start();
    }
    info!(
        "Generating narrative pair for analysis {} with {}",
        analysis.short_id(),
        generator.name()
    );

    let (clinician, parent) = futures::join!(
        generate_one(generator, Audience::Clinician, analysis, progress),
        generate_one(generator, Audience::Parent, analysis, progress),
    );

    match (clinician, parent) {
        (Ok(clinician), Ok(parent)) => {
            info!("Narrative pair ready in {:?}", start.elapsed());
            Ok(NarrativePair { clinician, parent })
        }
        (c, p) => {
            let failures: Vec<NarrativeFailure> =
                [c.err(), p.err()].into_iter().flatten().collect();
            Err(HtpError::NarrativeGeneration { failures })
        }
    }
}

async fn generate_one(
    generator: &dyn TextGenerator,
    audience: Audience,
    analysis: &AnalysisResult,
    progress: Option<&ProgressCallback>,
) -> Result<NarrativeReport, NarrativeFailure> {
    let prompt = narrative_prompt(audience, analysis);

    let outcome = match generator.generate(&prompt).await {
        Ok(raw) => parse_narrative(audience, &raw),
        Err(e) => Err(NarrativeFailure::Transport {
            audience,
            detail: e.to_string(),
        }),
    };

    match &outcome {
        Ok(report) => {
            if let Some(cb) = progress {
                cb.on_narrative_complete(audience, report.detailed_analysis.len());
            }
        }
        Err(failure) => {
            warn!("{}", failure);
            if let Some(cb) = progress {
                cb.on_narrative_error(audience, failure.to_string());
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample_analysis;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report_json(title: &str) -> String {
        serde_json::json!({
            "title": title,
            "summary": "Short.",
            "detailedAnalysis": "One.\n\nTwo.",
            "recommendations": ["Keep drawing"],
            "disclaimers": "Not a diagnosis."
        })
        .to_string()
    }

    /// Answers by audience, detected from the prompt wording.
    struct ByAudience {
        clinician: Result<String, String>,
        parent: Result<String, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for ByAudience {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, prompt: &str) -> Result<String, HtpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = if prompt.contains("to parents") {
                &self.parent
            } else {
                &self.clinician
            };
            answer
                .clone()
                .map_err(|message| HtpError::LlmApiError { message })
        }
    }

    #[tokio::test]
    async fn both_succeed() {
        let gen = ByAudience {
            clinician: Ok(format!("Sure! {}", report_json("Clinical"))),
            parent: Ok(report_json("For Parents")),
            calls: AtomicUsize::new(0),
        };
        let pair = generate_pair(&gen, &sample_analysis(), None).await.unwrap();
        assert_eq!(pair.clinician.title, "Clinical");
        assert_eq!(pair.parent.title, "For Parents");
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_bad_reply_fails_the_pair() {
        let gen = ByAudience {
            clinician: Ok(report_json("Clinical")),
            parent: Ok(r#"{"title": "x"}"#.into()),
            calls: AtomicUsize::new(0),
        };
        let err = generate_pair(&gen, &sample_analysis(), None).await.unwrap_err();
        match err {
            HtpError::NarrativeGeneration { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].audience(), Audience::Parent);
            }
            other => panic!("expected NarrativeGeneration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_failing_audience_is_listed() {
        let gen = ByAudience {
            clinician: Err("quota exceeded".into()),
            parent: Ok("no json here".into()),
            calls: AtomicUsize::new(0),
        };
        let err = generate_pair(&gen, &sample_analysis(), None).await.unwrap_err();
        let HtpError::NarrativeGeneration { failures } = err else {
            panic!("expected NarrativeGeneration");
        };
        assert!(matches!(failures[0], NarrativeFailure::Transport { audience: Audience::Clinician, .. }));
        assert_eq!(failures[1], NarrativeFailure::NoJsonObject { audience: Audience::Parent });
    }
}
