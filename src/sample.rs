//! Built-in sample analysis used by `htp-report --sample`.
//!
//! Lets the narrative and PDF stages be demonstrated without an image or a
//! running analysis service.

use crate::model::AnalysisResult;
use std::collections::BTreeMap;

/// A representative analysis of a sparse house drawing.
pub fn sample_analysis() -> AnalysisResult {
    let detection_confidence: BTreeMap<String, f64> = [
        ("wall", 0.85),
        ("window", 0.78),
        ("door", 0.45),
        ("roof", 0.42),
        ("chimney", 0.38),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let psychological_indicators: BTreeMap<String, Vec<String>> = [
        ("emotional_security", vec!["lack of emotional warmth"]),
        ("social_functioning", vec!["social difficulties", "isolation"]),
        ("environmental_comfort", vec!["minimal environmental detail"]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
    .collect();

    AnalysisResult {
        analysis_id: "sample-demo-001".into(),
        overall_confidence_score: 0.491,
        processing_time_seconds: 1.52,
        house_size_category: "Small".into(),
        house_area_ratio: 0.25,
        house_placement: vec!["center".into()],
        door_present: false,
        door_characteristics: None,
        window_count: 1,
        window_characteristics: None,
        chimney_present: false,
        chimney_characteristics: None,
        roof_characteristics: None,
        wall_characteristics: None,
        detected_features: vec!["wall".into(), "window".into()],
        missing_features: vec![
            "chimney".into(),
            "door".into(),
            "house".into(),
            "roof".into(),
        ],
        risk_factors: vec![
            "lack of emotional warmth".into(),
            "social difficulties".into(),
            "isolation".into(),
        ],
        positive_indicators: vec![],
        detection_confidence,
        psychological_indicators,
        psychological_interpretation: "Door Missing: insecurity, difficulty connecting with others; \
            Chimney Missing: lack of warmth in home environment"
            .into(),
        psychologist_interpretation: None,
        parent_interpretation: None,
        rag_page_references: vec![],
    }
}
