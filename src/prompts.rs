//! Prompts for the two narrative reports.
//!
//! Every prompt lives here so a change in wording touches one file, and so
//! tests can inspect the rendered prompt without calling a model.
//!
//! Both builders embed the analysis as readable text and demand the same
//! five-key JSON object; they differ in tone and in how much of the analysis
//! they expose.

use crate::model::{AnalysisResult, Audience};
use std::fmt::Write as _;

/// System message sent before either prompt.
pub const NARRATIVE_SYSTEM_PROMPT: &str = "You write psychological reports about House-Tree-Person (HTP) \
drawing analyses. You always answer with a single JSON object and nothing else. \
Prose fields contain plain paragraphs separated by blank lines, never nested JSON.";

/// Closing instruction shared by both prompts.
const JSON_CONTRACT: &str = r#"Format your response as JSON with these exact keys: "title", "summary", "detailedAnalysis", "recommendations" (as an array of strings), "disclaimers"

CRITICAL: The "detailedAnalysis" value must be a single string of well-written paragraphs separated by blank lines. It must NOT be a JSON object, an array, bullet points or any other structured data."#;

/// Build the prompt for `audience`.
pub fn narrative_prompt(audience: Audience, analysis: &AnalysisResult) -> String {
    match audience {
        Audience::Clinician => clinician_prompt(analysis),
        Audience::Parent => parent_prompt(analysis),
    }
}

/// Prompt for the report addressed to mental-health professionals.
pub fn clinician_prompt(a: &AnalysisResult) -> String {
    let mut p = String::with_capacity(4096);
    p.push_str(
        "You are an expert psychologist specializing in projective psychological assessments, \
particularly the House-Tree-Person (HTP) test.\n\n\
Analyze the following HTP test analysis results and provide a comprehensive psychological \
report for mental health professionals:\n\n**Analysis Data:**\n",
    );

    let _ = writeln!(p, "- House Size Category: {}", a.house_size_category);
    let _ = writeln!(p, "- Detected Features: {}", join_or(&a.detected_features, "None"));
    let _ = writeln!(p, "- Missing Features: {}", join_or(&a.missing_features, "None"));
    let _ = writeln!(p, "- Positive Indicators: {}", join_or(&a.positive_indicators, "None"));
    let _ = writeln!(
        p,
        "- Risk Factors / Areas for Attention: {}",
        join_or(&a.risk_factors, "None")
    );
    let _ = writeln!(
        p,
        "- Analysis Confidence Score: {:.1}%",
        a.overall_confidence_score * 100.0
    );
    let _ = writeln!(p, "- Door Present: {}", yes_no(a.door_present));
    let _ = writeln!(p, "- Window Count: {}", a.window_count);
    let _ = writeln!(p, "- Chimney Present: {}", yes_no(a.chimney_present));
    let _ = writeln!(p, "- House Area Ratio: {:.2}", a.house_area_ratio);
    let _ = writeln!(p, "- House Placement: {}", join_or(&a.house_placement, "Standard"));
    let _ = writeln!(p, "- Detection Confidence Scores: {}", confidence_summary(a));
    let _ = writeln!(p, "- Psychological Indicators: {}", indicator_summary(a));

    p.push_str(
        "\nPlease provide:\n\
1. TITLE: A professional title for this psychological assessment\n\
2. EXECUTIVE SUMMARY: A 2-3 sentence summary of key findings\n\
3. DETAILED ANALYSIS: A comprehensive analysis written as cohesive, flowing paragraphs. Cover:\n\
   - Interpretation of house characteristics and what they indicate about the individual\n\
   - Analysis of structural elements (doors, windows, chimney) and their psychological significance\n\
   - Interpretation of positive indicators and strengths\n\
   - Analysis of risk factors and areas requiring attention\n\
   - Overall psychological profile based on the HTP test\n\
   Write this section as natural, professional prose, as in a formal psychological report.\n\
4. RECOMMENDATIONS: 3-5 specific, actionable recommendations for further assessment or support\n\
5. DISCLAIMERS: Standard disclaimer about the nature of this assessment\n\n",
    );
    p.push_str(JSON_CONTRACT);
    p.push_str(
        "\n\nEnsure your analysis is professional, evidence-based, and appropriate for a \
psychological assessment context.",
    );
    p
}

/// Prompt for the report addressed to the child's parents.
pub fn parent_prompt(a: &AnalysisResult) -> String {
    let mut p = String::with_capacity(3072);
    p.push_str(
        "You are a child psychologist explaining a House-Tree-Person (HTP) drawing analysis \
to parents in simple, supportive language.\n\n\
Based on the following HTP drawing analysis results, provide a warm, encouraging \
interpretation that helps parents understand their child's drawing:\n\n\
**Child's Drawing Analysis:**\n",
    );

    let _ = writeln!(
        p,
        "- House size: {} ({:.1}% of the page)",
        a.house_size_category,
        a.house_area_ratio * 100.0
    );
    let _ = writeln!(
        p,
        "- What was drawn: {}",
        join_or(&a.detected_features, "Basic house elements")
    );
    let _ = writeln!(
        p,
        "- What was missing: {}",
        join_or(&a.missing_features, "Some typical house features")
    );
    let _ = writeln!(
        p,
        "- Positive aspects: {}",
        join_or(&a.positive_indicators, "Some healthy indicators")
    );
    let _ = writeln!(
        p,
        "- Areas to watch: {}",
        join_or(&a.risk_factors, "Some areas for attention")
    );
    let _ = writeln!(p, "- Door present: {}", yes_no(a.door_present));
    let _ = writeln!(p, "- Windows: {}", a.window_count);
    let _ = writeln!(p, "- Chimney: {}", yes_no(a.chimney_present));

    p.push_str(
        "\nWrite a supportive, parent-friendly explanation with:\n\
1. TITLE: A warm, reassuring title for parents\n\
2. SUMMARY: A 2-3 sentence overview in simple language\n\
3. DETAILED ANALYSIS: A narrative explanation written as flowing paragraphs that tells the story \
of what the child's drawing might mean. Use everyday language like \"might be feeling\" or \
\"could be showing\". Keep it to 400-500 words. Start with something encouraging like \
\"Looking at your child's house drawing, I can see...\" and end with hope and support.\n\
4. RECOMMENDATIONS: 3-5 gentle, practical suggestions for parents to support their child\n\
5. DISCLAIMERS: A simple note that this is not a diagnosis but one way to understand the child\n\n",
    );
    p.push_str(JSON_CONTRACT);
    p
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

/// `"door: 91.0%, window: 78.5%"`, or `"Not available"`.
fn confidence_summary(a: &AnalysisResult) -> String {
    if a.detection_confidence.is_empty() {
        return "Not available".to_string();
    }
    a.detection_confidence
        .iter()
        .map(|(feature, score)| format!("{feature}: {:.1}%", score * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"domain: a; b | other: c"`, or `"None"`.
fn indicator_summary(a: &AnalysisResult) -> String {
    let parts: Vec<String> = a
        .psychological_indicators
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(domain, v)| format!("{}: {}", domain.replace('_', " "), v.join("; ")))
        .collect();
    if parts.is_empty() {
        "None".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample_analysis;

    #[test]
    fn clinician_prompt_embeds_structured_fields() {
        let a = sample_analysis();
        let p = clinician_prompt(&a);
        assert!(p.contains("House Size Category: Small"));
        assert!(p.contains("Analysis Confidence Score: 49.1%"));
        assert!(p.contains("Missing Features: chimney, door, house, roof"));
        assert!(p.contains("Door Present: No"));
        assert!(p.contains("\"detailedAnalysis\""));
    }

    #[test]
    fn parent_prompt_uses_plain_language_fallbacks() {
        let mut a = sample_analysis();
        a.positive_indicators.clear();
        let p = parent_prompt(&a);
        assert!(p.contains("House size: Small (25.0% of the page)"));
        assert!(p.contains("Positive aspects: Some healthy indicators"));
        assert!(!p.contains("Detection Confidence"));
    }

    #[test]
    fn empty_confidence_map_reads_not_available() {
        let mut a = sample_analysis();
        a.detection_confidence.clear();
        a.psychological_indicators.clear();
        let p = clinician_prompt(&a);
        assert!(p.contains("Detection Confidence Scores: Not available"));
        assert!(p.contains("Psychological Indicators: None"));
    }

    #[test]
    fn prompt_dispatch_by_audience() {
        let a = sample_analysis();
        assert_eq!(narrative_prompt(Audience::Parent, &a), parent_prompt(&a));
        assert_eq!(narrative_prompt(Audience::Clinician, &a), clinician_prompt(&a));
    }
}
