//! Integration tests for report export: pagination arithmetic and a full
//! PDF round trip.
//!
//! The PDF tests need a pdfium shared library. They skip with a message when
//! none can be bound.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test export -- --nocapture

use chrono::{NaiveDate, Utc};
use htp_report::model::{ChimneyCharacteristics, DoorCharacteristics, RoofCharacteristics};
use htp_report::pipeline::document::build_document;
use htp_report::pipeline::layout::layout_document;
use htp_report::pipeline::paginate::{page_count, plan_slices, PageGeometry};
use htp_report::report::export_report_on;
use htp_report::{
    engine, export_report, export_to_dir, sample_analysis, AnalysisResult, Audience, NarrativeReport,
    RagPageReference, ReportConfig,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test if no pdfium library can be bound.
macro_rules! pdf_skip_unless_ready {
    () => {{
        if !engine::is_pdfium_available() {
            println!("SKIP: pdfium not found; set PDFIUM_LIB_PATH to run PDF tests");
            return;
        }
    }};
}

fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 14).unwrap()
}

/// A well-formed drawing: normal size, door, two windows, chimney.
fn normal_house() -> AnalysisResult {
    let mut a = sample_analysis();
    a.analysis_id = "c0ffee42-1111-2222-3333-444455556666".into();
    a.overall_confidence_score = 0.834;
    a.house_size_category = "Normal".into();
    a.house_area_ratio = 0.312;
    a.door_present = true;
    a.door_characteristics = Some(DoorCharacteristics {
        present: true,
        size_category: "normal".into(),
        position: "center".into(),
        accessibility: "open".into(),
    });
    a.window_count = 2;
    a.chimney_present = true;
    a.chimney_characteristics = Some(ChimneyCharacteristics {
        present: true,
        size: "small".into(),
        smoke_present: true,
        position: "right".into(),
    });
    a.roof_characteristics = Some(RoofCharacteristics {
        present: true,
        shape: "triangular".into(),
        size: "normal".into(),
    });
    a.detected_features = vec!["house".into(), "roof".into(), "door".into(), "window".into(), "chimney".into()];
    a.missing_features.clear();
    a.risk_factors.clear();
    a.positive_indicators = vec!["Emotional warmth".into(), "Openness to others".into()];
    a.rag_page_references = vec![RagPageReference {
        reference_id: 1,
        pages: vec!["42".into(), "43".into()],
        distance: 0.35,
        chunk_preview: "Smoke rising from the chimney is commonly read as warmth in the home.".into(),
    }];
    a
}

fn narrative(paragraphs: usize) -> NarrativeReport {
    let body = (0..paragraphs)
        .map(|i| {
            format!(
                "Paragraph {}. The house is drawn at a typical size with a clear door and two \
                 windows, which is generally associated with openness and a sense of security \
                 at home. The chimney with smoke adds a note of warmth.",
                i + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    NarrativeReport {
        title: "HTP Drawing Assessment".into(),
        summary: "A balanced, well-proportioned house with all core features present.".into(),
        detailed_analysis: body,
        recommendations: vec![
            "Continue to offer open-ended drawing time.".into(),
            "Revisit with tree and person drawings for a complete HTP picture.".into(),
        ],
        disclaimers: "This report is a screening aid and not a clinical diagnosis.".into(),
    }
}

// ── Pagination (no pdfium) ───────────────────────────────────────────────────

fn assert_tiles(width: u32, height: u32, geometry: &PageGeometry) {
    let slices = plan_slices(width, height, geometry).unwrap();
    let m = geometry.margin_mm;
    assert_eq!(slices.len(), page_count(width, height, geometry), "w={width} h={height} m={m}");

    let mut next = 0;
    for (i, s) in slices.iter().enumerate() {
        assert_eq!(s.index, i);
        assert_eq!(s.top_px, next, "gap/overlap w={width} h={height} m={m}");
        assert!(s.height_px > 0, "empty slice w={width} h={height} m={m}");
        next = s.bottom_px();
    }
    assert_eq!(next, height, "rows dropped w={width} h={height} m={m}");
}

#[test]
fn every_canvas_row_lands_on_exactly_one_page() {
    for margin in [0.0f32, 10.0, 20.0, 25.0] {
        let geometry = PageGeometry::a4(margin);
        for width in [400u32, 800, 1200, 1600, 2400] {
            for height in [1u32, 99, 1000, 2333, 6000, 12_345, 50_001] {
                assert_tiles(width, height, &geometry);
            }
        }
    }
}

#[test]
fn heights_near_whole_pages_keep_every_row() {
    for margin in [0.0f32, 10.0, 20.0, 25.0] {
        let geometry = PageGeometry::a4(margin);
        for width in [400u32, 800, 1200, 1600, 2400] {
            let rows = geometry.rows_per_page(width);
            for k in 1..=12u32 {
                let whole = k as f64 * rows;
                for height in [whole.floor(), whole.round(), whole.ceil()] {
                    let height = height as u32;
                    assert_tiles(width, height - 1, &geometry);
                    assert_tiles(width, height, &geometry);
                    assert_tiles(width, height + 1, &geometry);
                }
            }
        }
    }
}

#[test]
fn zero_margin_quarter_scale_canvas_keeps_its_last_row() {
    let geometry = PageGeometry::a4(0.0);
    let slices = plan_slices(400, 3960, &geometry).unwrap();
    assert_eq!(slices.last().unwrap().bottom_px(), 3960);
}

#[test]
fn page_count_grows_with_content() {
    let geometry = PageGeometry::a4(10.0);
    let short = layout_document(
        &build_document(&normal_house(), &narrative(1), Audience::Parent, report_date()),
        800.0,
    );
    let long = layout_document(
        &build_document(&normal_house(), &narrative(40), Audience::Parent, report_date()),
        800.0,
    );
    assert!(long.height > short.height);

    let pages = |h: f32| page_count(1600, (h * 2.0).round() as u32, &geometry);
    assert!(pages(long.height) > pages(short.height));
    assert!(pages(short.height) >= 1);
}

// ── PDF round trip (pdfium) ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn exports_clinician_pdf() {
    pdf_skip_unless_ready!();

    let config = ReportConfig::default();
    let report = export_report(&normal_house(), &narrative(3), Audience::Clinician, &config)
        .await
        .expect("export should succeed");

    let today = Utc::now().date_naive().format("%Y-%m-%d");
    assert_eq!(report.filename, format!("HTP-Analysis-Report-Professional-{today}.pdf"));
    assert!(report.bytes.starts_with(b"%PDF"));
    assert!(report.page_count >= 1);

    let pdfium = engine::pdfium().unwrap();
    let doc = pdfium.load_pdf_from_byte_slice(&report.bytes, None).unwrap();
    assert_eq!(doc.pages().len() as usize, report.page_count);
    println!("✓ {}: {} page(s), {} bytes", report.filename, report.page_count, report.bytes.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn long_parent_report_spans_several_pages_and_saves() {
    pdf_skip_unless_ready!();

    let config = ReportConfig::default();
    let report = export_report_on(
        &normal_house(),
        &narrative(30),
        Audience::Parent,
        report_date(),
        &config,
    )
    .await
    .expect("export should succeed");

    assert!(report.page_count > 1, "got {} page(s)", report.page_count);

    let dir = tempfile::tempdir().unwrap();
    let path = export_to_dir(&report, dir.path()).await.unwrap();
    assert!(path.ends_with("HTP-Analysis-Report-Parent-2026-05-14.pdf"));
    let saved = std::fs::read(&path).unwrap();
    assert_eq!(saved, report.bytes);
}

#[tokio::test(flavor = "multi_thread")]
async fn sparse_sample_exports_for_both_audiences() {
    pdf_skip_unless_ready!();

    let config = ReportConfig::default();
    let analysis = sample_analysis();
    for audience in Audience::ALL {
        let report = export_report_on(&analysis, &narrative(2), audience, report_date(), &config)
            .await
            .unwrap_or_else(|e| panic!("{audience} export failed: {e}"));
        assert!(report.filename.contains(audience.label()));
        assert!(!report.bytes.is_empty());
    }
}
