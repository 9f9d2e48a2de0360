//! Narrative parsing: pull one JSON object out of free model text and
//! validate it into a [`NarrativeReport`].
//!
//! There is exactly one accepted shape. Anything else is a
//! [`NarrativeFailure`] naming the audience and the offending field.

use crate::error::NarrativeFailure;
use crate::model::{Audience, NarrativeReport};
use serde_json::{Map, Value};

/// Return the first balanced `{...}` substring of `text`.
///
/// Braces inside JSON string literals (including escaped quotes) are ignored.
/// An opening brace that is never closed is skipped in favour of the
/// earliest one that is. Returns `None` when no opening brace is ever closed.
/// The text is scanned once.
pub fn first_json_object(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let mut open: Vec<usize> = Vec::new();
    let mut best: Option<(usize, usize)> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(first) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                let Some(start) = open.pop() else { continue };
                if open.is_empty() {
                    // Nothing unclosed precedes it, so no earlier start can win.
                    return Some(&text[start..=i]);
                }
                if best.is_none_or(|(s, _)| start < s) {
                    best = Some((start, i));
                }
            }
            _ => {}
        }
    }
    best.map(|(start, end)| &text[start..=end])
}

/// Extract and validate one audience's report from raw model output.
pub fn parse_narrative(audience: Audience, raw: &str) -> Result<NarrativeReport, NarrativeFailure> {
    let json = first_json_object(raw).ok_or(NarrativeFailure::NoJsonObject { audience })?;

    let value: Value = serde_json::from_str(json).map_err(|e| NarrativeFailure::MalformedJson {
        audience,
        detail: e.to_string(),
    })?;
    let obj = value.as_object().ok_or(NarrativeFailure::NoJsonObject { audience })?;

    let title = required_text(audience, obj, "title")?;
    let summary = required_text(audience, obj, "summary")?;
    let detailed_analysis = detailed_analysis(audience, obj)?;
    let recommendations = recommendations(audience, obj)?;
    let disclaimers = required_text(audience, obj, "disclaimers")?;

    Ok(NarrativeReport {
        title,
        summary,
        detailed_analysis,
        recommendations,
        disclaimers,
    })
}

fn missing(audience: Audience, field: &str) -> NarrativeFailure {
    NarrativeFailure::MissingField {
        audience,
        field: field.to_string(),
    }
}

fn required_text(
    audience: Audience,
    obj: &Map<String, Value>,
    field: &str,
) -> Result<String, NarrativeFailure> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(audience, field)),
    }
}

/// `detailedAnalysis` must be prose. Objects, arrays, and strings that are
/// themselves a JSON object or array are rejected.
fn detailed_analysis(audience: Audience, obj: &Map<String, Value>) -> Result<String, NarrativeFailure> {
    match obj.get("detailedAnalysis") {
        Some(Value::Object(_)) | Some(Value::Array(_)) => {
            Err(NarrativeFailure::StructuredAnalysis { audience })
        }
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let trimmed = s.trim();
            let looks_structured = (trimmed.starts_with('{') || trimmed.starts_with('['))
                && matches!(
                    serde_json::from_str::<Value>(trimmed),
                    Ok(Value::Object(_)) | Ok(Value::Array(_))
                );
            if looks_structured {
                Err(NarrativeFailure::StructuredAnalysis { audience })
            } else {
                Ok(trimmed.to_string())
            }
        }
        _ => Err(missing(audience, "detailedAnalysis")),
    }
}

fn recommendations(audience: Audience, obj: &Map<String, Value>) -> Result<Vec<String>, NarrativeFailure> {
    let Some(Value::Array(items)) = obj.get("recommendations") else {
        return Err(missing(audience, "recommendations"));
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if s.trim().is_empty() => {}
            Value::String(s) => out.push(s.trim().to_string()),
            _ => return Err(missing(audience, "recommendations")),
        }
    }

    if out.is_empty() {
        return Err(missing(audience, "recommendations"));
    }
    Ok(out)
}
