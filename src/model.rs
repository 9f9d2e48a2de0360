//! Data model shared by every pipeline stage.
//!
//! [`AnalysisResult`] mirrors the JSON contract of the external analysis
//! service (snake_case field names). [`NarrativeReport`] mirrors the JSON
//! object the text-generation model is asked to produce (camelCase keys).
//! Both are plain data: created per run, never persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Structured output of the external house-drawing analysis.
///
/// Optional records and collections default to empty so that older service
/// versions, which omit the richer characteristics, still deserialise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Opaque identifier assigned by the service.
    pub analysis_id: String,
    /// Overall confidence of the analysis, 0.0–1.0.
    pub overall_confidence_score: f64,
    /// Server-side processing time in seconds.
    pub processing_time_seconds: f64,

    /// Categorical size class, e.g. "Small", "Normal", "Large".
    pub house_size_category: String,
    /// House bounding-box area relative to the page, 0.0–1.0.
    pub house_area_ratio: f64,
    /// Placement tags such as "center" or "middle".
    #[serde(default)]
    pub house_placement: Vec<String>,

    pub door_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub door_characteristics: Option<DoorCharacteristics>,
    pub window_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_characteristics: Option<WindowCharacteristics>,
    pub chimney_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chimney_characteristics: Option<ChimneyCharacteristics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roof_characteristics: Option<RoofCharacteristics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_characteristics: Option<WallCharacteristics>,

    #[serde(default)]
    pub detected_features: Vec<String>,
    #[serde(default)]
    pub missing_features: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub positive_indicators: Vec<String>,

    /// Per-feature detection confidence, 0.0–1.0.
    #[serde(default)]
    pub detection_confidence: BTreeMap<String, f64>,
    /// Psychological domain → indicator phrases.
    #[serde(default)]
    pub psychological_indicators: BTreeMap<String, Vec<String>>,

    /// Legacy single-string interpretation, shown only when no narrative exists.
    #[serde(default)]
    pub psychological_interpretation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychologist_interpretation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_interpretation: Option<String>,

    /// Pages of the HTP interpretation guide the service considered relevant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rag_page_references: Vec<RagPageReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorCharacteristics {
    pub present: bool,
    pub size_category: String,
    pub position: String,
    #[serde(default)]
    pub accessibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCharacteristics {
    pub count: u32,
    #[serde(default)]
    pub size_variation: String,
    #[serde(default)]
    pub placement: String,
    #[serde(default)]
    pub interpretation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChimneyCharacteristics {
    pub present: bool,
    pub size: String,
    #[serde(default)]
    pub smoke_present: bool,
    #[serde(default)]
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoofCharacteristics {
    pub present: bool,
    #[serde(default)]
    pub shape: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallCharacteristics {
    pub present: bool,
    #[serde(default)]
    pub thickness: String,
    #[serde(default)]
    pub completeness: String,
}

/// A passage of the HTP interpretation guide matched to this drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagPageReference {
    pub reference_id: u32,
    pub pages: Vec<String>,
    /// Embedding distance; smaller is more relevant.
    pub distance: f64,
    pub chunk_preview: String,
}

impl RagPageReference {
    /// Relevance as a whole percentage: `100 - min(distance * 10, 100)`.
    pub fn relevance_percent(&self) -> u32 {
        let penalty = (self.distance * 10.0).clamp(0.0, 100.0);
        (100.0 - penalty).round() as u32
    }
}

impl AnalysisResult {
    /// Describe every breach of the upstream contract.
    ///
    /// The service promises disjoint detected/missing lists and confidences in
    /// `[0, 1]`. Nothing downstream relies on that, so breaches are reported
    /// for logging rather than rejected.
    pub fn contract_violations(&self) -> Vec<String> {
        let mut out = Vec::new();

        for feature in &self.detected_features {
            if self.missing_features.contains(feature) {
                out.push(format!("feature '{feature}' is both detected and missing"));
            }
        }

        if !(0.0..=1.0).contains(&self.overall_confidence_score) {
            out.push(format!(
                "overall_confidence_score {} outside [0, 1]",
                self.overall_confidence_score
            ));
        }
        if !(0.0..=1.0).contains(&self.house_area_ratio) {
            out.push(format!("house_area_ratio {} outside [0, 1]", self.house_area_ratio));
        }
        if self.processing_time_seconds < 0.0 {
            out.push(format!(
                "processing_time_seconds {} is negative",
                self.processing_time_seconds
            ));
        }
        for (feature, score) in &self.detection_confidence {
            if !(0.0..=1.0).contains(score) {
                out.push(format!("detection confidence for '{feature}' is {score}, outside [0, 1]"));
            }
        }

        out
    }

    /// First eight characters of the identifier, as printed in reports.
    pub fn short_id(&self) -> &str {
        match self.analysis_id.char_indices().nth(8) {
            Some((idx, _)) => &self.analysis_id[..idx],
            None => &self.analysis_id,
        }
    }
}

/// The two readers a narrative report is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Mental-health professionals.
    Clinician,
    /// The child's parents.
    Parent,
}

impl Audience {
    pub const ALL: [Audience; 2] = [Audience::Clinician, Audience::Parent];

    /// Label used in the exported filename.
    pub fn label(&self) -> &'static str {
        match self {
            Audience::Clinician => "Professional",
            Audience::Parent => "Parent",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One audience's prose report, as validated at the narrative boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeReport {
    pub title: String,
    pub summary: String,
    /// Multi-paragraph prose; paragraphs are separated by blank lines.
    pub detailed_analysis: String,
    /// Never empty once validated.
    pub recommendations: Vec<String>,
    pub disclaimers: String,
}

/// Both narrative reports derived from one analysis. Exists only whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePair {
    pub clinician: NarrativeReport,
    pub parent: NarrativeReport,
}

impl NarrativePair {
    pub fn get(&self, audience: Audience) -> &NarrativeReport {
        match audience {
            Audience::Clinician => &self.clinician,
            Audience::Parent => &self.parent,
        }
    }
}
