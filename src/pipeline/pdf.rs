//! PDF assembly: place each canvas slice on its own A4 page.

use crate::config::ReportConfig;
use crate::engine;
use crate::error::HtpError;
use crate::model::Audience;
use crate::pipeline::document::Document;
use crate::pipeline::layout::layout_document;
use crate::pipeline::paginate::{crop_slice, plan_slices, PageGeometry};
use crate::pipeline::render::rasterize;
use chrono::NaiveDate;
use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// A finished PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// `HTP-Analysis-Report-{Professional|Parent}-{YYYY-MM-DD}.pdf`.
pub fn report_filename(audience: Audience, date: NaiveDate) -> String {
    format!(
        "HTP-Analysis-Report-{}-{}.pdf",
        audience.label(),
        date.format("%Y-%m-%d")
    )
}

/// Canvas and page settings taken from [`ReportConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub canvas_width: f32,
    pub pixel_width: u32,
    pub geometry: PageGeometry,
}

impl RenderSettings {
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            canvas_width: config.canvas_width,
            pixel_width: config.canvas_pixel_width(),
            geometry: PageGeometry::a4(config.page_margin_mm),
        }
    }
}

/// Build a multi-page A4 document from `canvas`.
pub fn assemble_pdf(
    pdfium: &Pdfium,
    canvas: &RgbaImage,
    geometry: &PageGeometry,
) -> Result<RenderedPdf, HtpError> {
    let slices = plan_slices(canvas.width(), canvas.height(), geometry)?;

    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| assembly_error("create document", e))?;

    for slice in &slices {
        let image = DynamicImage::ImageRgba8(crop_slice(canvas, slice));
        let height_mm = geometry.rows_to_mm(slice.height_px, canvas.width());

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::from_mm(geometry.width_mm),
                PdfPoints::from_mm(geometry.height_mm),
            ))
            .map_err(|e| assembly_error("create page", e))?;

        // Bottom-left corner of the slice, so its top sits on the top margin.
        let x = PdfPoints::from_mm(geometry.margin_mm);
        let y = PdfPoints::from_mm(geometry.height_mm - geometry.margin_mm - height_mm);
        page.objects_mut()
            .create_image_object(
                x,
                y,
                &image,
                Some(PdfPoints::from_mm(geometry.content_width_mm())),
                Some(PdfPoints::from_mm(height_mm)),
            )
            .map_err(|e| assembly_error("place slice", e))?;

        debug!(
            "Page {}: rows {}..{} ({:.1} mm)",
            slice.index + 1,
            slice.top_px,
            slice.bottom_px(),
            height_mm
        );
    }

    let bytes = document
        .save_to_bytes()
        .map_err(|e| assembly_error("save document", e))?;

    Ok(RenderedPdf {
        bytes,
        page_count: slices.len(),
    })
}

/// Lay out, rasterise, paginate and assemble `doc`. Blocking.
pub fn render_pdf_blocking(doc: &Document, settings: &RenderSettings) -> Result<RenderedPdf, HtpError> {
    let start = Instant::now();
    let pdfium = engine::pdfium()?;

    let layout = layout_document(doc, settings.canvas_width);
    let canvas = rasterize(&pdfium, &layout, settings.pixel_width)?;
    let pdf = assemble_pdf(&pdfium, &canvas, &settings.geometry)?;

    info!(
        "{} report: {}x{} px canvas, {} page(s), {} bytes in {:?}",
        doc.audience,
        canvas.width(),
        canvas.height(),
        pdf.page_count,
        pdf.bytes.len(),
        start.elapsed()
    );
    Ok(pdf)
}

/// Async wrapper: runs [`render_pdf_blocking`] on the blocking pool.
pub async fn render_pdf(doc: Document, settings: RenderSettings) -> Result<RenderedPdf, HtpError> {
    tokio::task::spawn_blocking(move || render_pdf_blocking(&doc, &settings))
        .await
        .map_err(|e| HtpError::Internal(format!("Render task panicked: {e}")))?
}

fn assembly_error(stage: &str, e: impl std::fmt::Display) -> HtpError {
    HtpError::RenderFailed {
        detail: format!("{stage}: {e}"),
    }
}
