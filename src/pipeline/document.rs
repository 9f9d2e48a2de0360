//! Report synthesis: turn an analysis and one narrative into a styled
//! document made of blocks.
//!
//! The document is a plain value. [`crate::pipeline::layout`] decides where
//! every block lands; nothing here knows about pixels or pdfium.

use crate::model::{AnalysisResult, Audience, NarrativeReport};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Build from a `0xRRGGBB` literal.
    pub const fn hex(v: u32) -> Self {
        Rgb((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }
}

pub const INK: Rgb = Rgb::hex(0x1f2937);
pub const MUTED: Rgb = Rgb::hex(0x6b7280);
pub const SUBTLE: Rgb = Rgb::hex(0x9ca3af);
pub const RULE: Rgb = Rgb::hex(0xe5e7eb);
pub const ORANGE: Rgb = Rgb::hex(0xf97316);
pub const CLINICIAN_ACCENT: Rgb = Rgb::hex(0x2563eb);
pub const PARENT_ACCENT: Rgb = Rgb::hex(0xdc2626);

/// Colour family of a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTone {
    Positive,
    Negative,
    Neutral,
}

impl BadgeTone {
    /// `(background, text, border)`.
    pub fn colours(&self) -> (Rgb, Rgb, Rgb) {
        match self {
            BadgeTone::Positive => (Rgb::hex(0xdcfce7), Rgb::hex(0x166534), Rgb::hex(0x86efac)),
            BadgeTone::Negative => (Rgb::hex(0xfee2e2), Rgb::hex(0x991b1b), Rgb::hex(0xfca5a5)),
            BadgeTone::Neutral => (Rgb::hex(0xf3f4f6), Rgb::hex(0x374151), Rgb::hex(0xd1d5db)),
        }
    }
}

/// One card in the "Detailed Size Analysis" section.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailCard {
    pub heading: String,
    pub lines: Vec<String>,
    pub caution: Option<String>,
}

/// One HTP-guide reference card.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCard {
    pub pages: String,
    pub relevance: String,
    pub preview: String,
}

/// A vertical unit of the report.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Header {
        title: String,
        subtitle: String,
        generated_on: String,
        accent: Rgb,
    },
    /// Label/value pairs laid out two per row.
    Metadata(Vec<(String, String)>),
    Summary {
        heading: String,
        body: String,
    },
    SectionTitle(String),
    /// Big value over a caption, three tiles per row.
    Stats(Vec<(String, String)>),
    DetailCards(Vec<DetailCard>),
    Badges {
        heading: String,
        tone: BadgeTone,
        items: Vec<String>,
    },
    /// Prose; paragraphs may contain single line breaks.
    Paragraphs(Vec<String>),
    NumberedList(Vec<String>),
    References {
        intro: String,
        cards: Vec<ReferenceCard>,
        note: String,
    },
    Disclaimer(String),
    Footer(Vec<String>),
}

/// A report ready for layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub audience: Audience,
    pub blocks: Vec<Block>,
}

/// Audience-specific headings.
struct Headings {
    kind: &'static str,
    summary: &'static str,
    analysis: &'static str,
    recommendations: &'static str,
    disclaimer: &'static str,
    accent: Rgb,
}

fn headings(audience: Audience) -> Headings {
    match audience {
        Audience::Clinician => Headings {
            kind: "Professional Psychological Assessment",
            summary: "Executive Summary",
            analysis: "Detailed Psychological Analysis",
            recommendations: "Recommendations",
            disclaimer: "Important Disclaimers",
            accent: CLINICIAN_ACCENT,
        },
        Audience::Parent => Headings {
            kind: "Parent-Friendly Report",
            summary: "Summary for Parents",
            analysis: "Understanding Your Child's Drawing",
            recommendations: "Ways to Support Your Child",
            disclaimer: "Important Note for Parents",
            accent: PARENT_ACCENT,
        },
    }
}

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());

/// Split prose into paragraphs on blank lines. Blank paragraphs are dropped.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let normalised = text.replace("\r\n", "\n");
    PARAGRAPH_BREAK
        .split(&normalised)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// "October 18, 2026".
pub fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn present(b: bool) -> String {
    if b { "Present" } else { "Absent" }.to_string()
}

/// Build the report for one audience.
///
/// Detected and missing features are rendered as two independent lists,
/// even when they overlap.
pub fn build_document(
    analysis: &AnalysisResult,
    report: &NarrativeReport,
    audience: Audience,
    date: NaiveDate,
) -> Document {
    let h = headings(audience);
    let mut blocks = Vec::with_capacity(20);

    blocks.push(Block::Header {
        title: report.title.clone(),
        subtitle: format!("{} - HTP (House-Tree-Person) Test Analysis", h.kind),
        generated_on: format!("Generated on {}", long_date(date)),
        accent: h.accent,
    });

    blocks.push(Block::Metadata(vec![
        ("Analysis ID:".into(), format!("{}...", analysis.short_id())),
        (
            "Confidence Score:".into(),
            format!("{:.1}%", analysis.overall_confidence_score * 100.0),
        ),
        (
            "Analysis Time:".into(),
            format!("{:.2}s", analysis.processing_time_seconds),
        ),
        ("House Size Category:".into(), analysis.house_size_category.clone()),
    ]));

    blocks.push(Block::Summary {
        heading: h.summary.into(),
        body: report.summary.clone(),
    });

    blocks.push(Block::SectionTitle("House Characteristics Overview".into()));
    blocks.push(Block::Stats(vec![
        (present(analysis.door_present), "Door".into()),
        (analysis.window_count.to_string(), "Windows".into()),
        (present(analysis.chimney_present), "Chimney".into()),
    ]));

    let cards = detail_cards(analysis);
    if !cards.is_empty() {
        blocks.push(Block::SectionTitle("Detailed Size Analysis".into()));
        blocks.push(Block::DetailCards(cards));
    }

    blocks.push(Block::SectionTitle("Detected Features & Analysis".into()));
    let groups = [
        ("Positive Features", BadgeTone::Positive, &analysis.detected_features),
        ("Missing Features", BadgeTone::Negative, &analysis.missing_features),
        ("Positive Indicators", BadgeTone::Positive, &analysis.positive_indicators),
        ("Areas for Attention", BadgeTone::Neutral, &analysis.risk_factors),
    ];
    for (heading, tone, items) in groups {
        if !items.is_empty() {
            blocks.push(Block::Badges {
                heading: heading.into(),
                tone,
                items: items.clone(),
            });
        }
    }

    blocks.push(Block::SectionTitle(h.analysis.into()));
    blocks.push(Block::Paragraphs(split_paragraphs(&report.detailed_analysis)));

    blocks.push(Block::SectionTitle(h.recommendations.into()));
    blocks.push(Block::NumberedList(report.recommendations.clone()));

    if !analysis.rag_page_references.is_empty() {
        blocks.push(Block::SectionTitle("Reference Sources from HTP Guide".into()));
        blocks.push(Block::References {
            intro: "The following page numbers from the HTP interpretation manual are \
relevant to this analysis:"
                .into(),
            cards: analysis
                .rag_page_references
                .iter()
                .map(|r| ReferenceCard {
                    pages: format!("Pages {}", r.pages.join(", ")),
                    relevance: format!("Relevance: {}%", r.relevance_percent()),
                    preview: format!("\"{}\"", r.chunk_preview.trim()),
                })
                .collect(),
            note: "These references correspond to specific sections in the HTP \
interpretation guide that are relevant to this analysis."
                .into(),
        });
    }

    blocks.push(Block::SectionTitle(h.disclaimer.into()));
    blocks.push(Block::Disclaimer(report.disclaimers.clone()));

    blocks.push(Block::Footer(vec![
        "This report was generated by HTP Analyzer - an AI-powered psychological assessment tool."
            .into(),
        "Please consult with a qualified mental health professional for clinical interpretation."
            .into(),
    ]));

    Document { audience, blocks }
}

fn detail_cards(a: &AnalysisResult) -> Vec<DetailCard> {
    let mut cards = Vec::new();

    if let Some(door) = &a.door_characteristics {
        let caution = match door.size_category.as_str() {
            "tiny" => Some("Tiny doors may indicate fearfulness or withdrawal"),
            "large" => Some("Large doors may indicate dependency needs"),
            _ => None,
        };
        cards.push(DetailCard {
            heading: "Door Characteristics".into(),
            lines: vec![
                format!("Size: {}", door.size_category),
                format!("Position: {}", door.position),
            ],
            caution: caution.map(String::from),
        });
    }

    if let Some(window) = &a.window_characteristics {
        let mut lines = vec![format!("Count: {}", window.count)];
        if !window.interpretation.is_empty() {
            lines.push(window.interpretation.join(", "));
        }
        cards.push(DetailCard {
            heading: "Window Characteristics".into(),
            lines,
            caution: None,
        });
    }

    if let Some(chimney) = a.chimney_characteristics.as_ref().filter(|c| c.present) {
        cards.push(DetailCard {
            heading: "Chimney Characteristics".into(),
            lines: vec![format!("Size: {}", chimney.size)],
            caution: (chimney.size == "large")
                .then(|| "Oversized chimney may indicate preoccupation with fantasy".to_string()),
        });
    }

    if let Some(roof) = a.roof_characteristics.as_ref().filter(|r| r.present) {
        cards.push(DetailCard {
            heading: "Roof Characteristics".into(),
            lines: vec![format!("Size: {}", roof.size)],
            caution: (roof.size == "large").then(|| {
                "Large roof may indicate excessive fantasy or intellectual preoccupation".to_string()
            }),
        });
    }

    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChimneyCharacteristics, DoorCharacteristics, RagPageReference};
    use crate::sample::sample_analysis;

    fn report() -> NarrativeReport {
        NarrativeReport {
            title: "Understanding the Drawing".into(),
            summary: "A small house.".into(),
            detailed_analysis: "First.\n\n\n  Second line one\nline two.\n \n".into(),
            recommendations: vec!["Talk".into(), "Draw".into()],
            disclaimers: "Not a diagnosis.".into(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    #[test]
    fn paragraphs_split_only_on_blank_lines() {
        let p = split_paragraphs("First.\n\n\n  Second line one\nline two.\n \n");
        assert_eq!(p, vec!["First.", "Second line one\nline two."]);
        assert!(split_paragraphs("  \n\n ").is_empty());
        assert_eq!(split_paragraphs("a\r\n\r\nb"), vec!["a", "b"]);
    }

    #[test]
    fn header_reflects_audience() {
        let doc = build_document(&sample_analysis(), &report(), Audience::Parent, date());
        match &doc.blocks[0] {
            Block::Header {
                subtitle,
                generated_on,
                accent,
                ..
            } => {
                assert_eq!(subtitle, "Parent-Friendly Report - HTP (House-Tree-Person) Test Analysis");
                assert_eq!(generated_on, "Generated on March 7, 2026");
                assert_eq!(*accent, PARENT_ACCENT);
            }
            other => panic!("expected header, got {other:?}"),
        }
        assert!(doc
            .blocks
            .contains(&Block::SectionTitle("Ways to Support Your Child".into())));
    }

    #[test]
    fn metadata_truncates_identifier() {
        let doc = build_document(&sample_analysis(), &report(), Audience::Clinician, date());
        let Block::Metadata(rows) = &doc.blocks[1] else {
            panic!("expected metadata");
        };
        assert_eq!(rows[0].1, "sample-d...");
        assert_eq!(rows[1].1, "49.1%");
        assert_eq!(rows[2].1, "1.52s");
    }

    #[test]
    fn overlapping_feature_lists_render_independently() {
        let mut a = sample_analysis();
        a.detected_features.push("door".into());
        let doc = build_document(&a, &report(), Audience::Clinician, date());
        let badges: Vec<_> = doc
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Badges { heading, items, .. } => Some((heading.as_str(), items.len())),
                _ => None,
            })
            .collect();
        assert_eq!(
            badges,
            vec![("Positive Features", 3), ("Missing Features", 4), ("Areas for Attention", 3)]
        );
    }

    #[test]
    fn size_cards_carry_cautions() {
        let mut a = sample_analysis();
        a.door_characteristics = Some(DoorCharacteristics {
            present: true,
            size_category: "tiny".into(),
            position: "center".into(),
            accessibility: String::new(),
        });
        a.chimney_characteristics = Some(ChimneyCharacteristics {
            present: false,
            size: "large".into(),
            smoke_present: false,
            position: String::new(),
        });
        let cards = detail_cards(&a);
        assert_eq!(cards.len(), 1, "absent chimney has no card");
        assert_eq!(
            cards[0].caution.as_deref(),
            Some("Tiny doors may indicate fearfulness or withdrawal")
        );
    }

    #[test]
    fn no_cards_no_section() {
        let doc = build_document(&sample_analysis(), &report(), Audience::Clinician, date());
        assert!(!doc
            .blocks
            .contains(&Block::SectionTitle("Detailed Size Analysis".into())));
    }

    #[test]
    fn references_are_optional() {
        let mut a = sample_analysis();
        a.rag_page_references.push(RagPageReference {
            reference_id: 1,
            pages: vec!["12".into(), "13".into()],
            distance: 1.26,
            chunk_preview: "Doors represent access ".into(),
        });
        let doc = build_document(&a, &report(), Audience::Clinician, date());
        let refs = doc.blocks.iter().find_map(|b| match b {
            Block::References { cards, .. } => Some(cards.clone()),
            _ => None,
        });
        let cards = refs.expect("references block");
        assert_eq!(cards[0].pages, "Pages 12, 13");
        assert_eq!(cards[0].relevance, "Relevance: 87%");
        assert_eq!(cards[0].preview, "\"Doors represent access\"");
    }
}
