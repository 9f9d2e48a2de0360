//! Rasterisation: paint a [`Layout`] with pdfium and render it to one tall
//! RGBA canvas.
//!
//! The layout is painted onto scratch PDF pages using the standard
//! Helvetica faces, then rendered at the requested pixel width. Very tall
//! layouts are painted in bands and stacked, since viewers and pdfium cap
//! page height. All of this is blocking; callers run it inside
//! `spawn_blocking`.

use crate::error::HtpError;
use crate::pipeline::document::Rgb;
use crate::pipeline::layout::{DrawOp, Face, Layout};
use image::{imageops, Rgba, RgbaImage};
use pdfium_render::prelude::*;
use tracing::debug;

/// Tallest scratch page painted in one go, in points.
pub const MAX_BAND_POINTS: f32 = 14_000.0;

fn render_error(stage: &str, e: impl std::fmt::Display) -> HtpError {
    HtpError::RenderFailed {
        detail: format!("{stage}: {e}"),
    }
}

fn colour(c: Rgb) -> PdfColor {
    PdfColor::new(c.0, c.1, c.2, 255)
}

/// Canvas height in pixels for `layout` rendered `pixel_width` wide.
pub fn canvas_height(layout: &Layout, pixel_width: u32) -> u32 {
    let scale = pixel_width as f32 / layout.width;
    (layout.height * scale).round().max(1.0) as u32
}

/// Render `layout` to an RGBA canvas `pixel_width` pixels wide.
pub fn rasterize(pdfium: &Pdfium, layout: &Layout, pixel_width: u32) -> Result<RgbaImage, HtpError> {
    if layout.width <= 0.0 || layout.height <= 0.0 || pixel_width == 0 {
        return Err(HtpError::RenderFailed {
            detail: format!(
                "empty layout ({} x {} pt at {} px)",
                layout.width, layout.height, pixel_width
            ),
        });
    }

    let total_px = canvas_height(layout, pixel_width);
    let bands = plan_bands(layout, pixel_width);
    let mut painted = Vec::with_capacity(bands.len());
    for band in &bands {
        let image = paint_band(pdfium, layout, band.top, band.height, pixel_width)?;
        painted.push((band.top_px, image));
    }
    let canvas = stack_bands(pixel_width, total_px, &painted);

    debug!(
        "Rasterised {} ops into {}x{} px ({} band(s))",
        layout.ops.len(),
        pixel_width,
        total_px,
        bands.len()
    );
    Ok(canvas)
}

/// One scratch page's share of the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Top edge in layout points.
    pub top: f32,
    /// Height in layout points, at most [`MAX_BAND_POINTS`].
    pub height: f32,
    /// Row of the canvas where the rendered band is placed.
    pub top_px: u32,
}

/// Split `layout` into bands no taller than [`MAX_BAND_POINTS`].
pub fn plan_bands(layout: &Layout, pixel_width: u32) -> Vec<Band> {
    let scale = pixel_width as f32 / layout.width;
    let band_count = (layout.height / MAX_BAND_POINTS).ceil().max(1.0) as usize;
    (0..band_count)
        .map(|band| {
            let top = band as f32 * MAX_BAND_POINTS;
            Band {
                top,
                height: (layout.height - top).min(MAX_BAND_POINTS),
                top_px: (top * scale).round() as u32,
            }
        })
        .collect()
}

/// Stack rendered bands onto a white canvas. Pixels past the canvas edge
/// are clipped.
pub fn stack_bands(pixel_width: u32, total_px: u32, bands: &[(u32, RgbaImage)]) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(pixel_width, total_px, Rgba([255, 255, 255, 255]));
    for (top_px, image) in bands {
        imageops::replace(&mut canvas, image, 0, *top_px as i64);
    }
    canvas
}

/// Paint the part of `layout` between `top` and `top + height` on a scratch
/// page and render it.
fn paint_band(
    pdfium: &Pdfium,
    layout: &Layout,
    top: f32,
    height: f32,
    pixel_width: u32,
) -> Result<RgbaImage, HtpError> {
    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| render_error("create scratch document", e))?;

    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();
    let italic = document.fonts_mut().helvetica_oblique();

    let mut page = document
        .pages_mut()
        .create_page_at_end(PdfPagePaperSize::Custom(
            PdfPoints::new(layout.width),
            PdfPoints::new(height),
        ))
        .map_err(|e| render_error("create scratch page", e))?;

    let bottom = top + height;
    // PDF space grows upwards from the bottom edge of the band.
    let flip = |y: f32| height - (y - top);

    for op in &layout.ops {
        let (op_top, op_bottom) = op.vertical_span();
        if op_bottom < top || op_top > bottom {
            continue;
        }
        match op {
            DrawOp::Rect {
                x,
                y,
                w,
                h,
                fill,
                stroke,
            } => {
                let rect = PdfRect::new_from_values(flip(y + h), *x, flip(*y), x + w);
                page.objects_mut()
                    .create_path_object_rect(
                        rect,
                        stroke.map(colour),
                        stroke.map(|_| PdfPoints::new(1.0)),
                        fill.map(colour),
                    )
                    .map_err(|e| render_error("draw rect", e))?;
            }
            DrawOp::Text {
                x,
                baseline,
                text,
                face,
                size,
                color,
            } => {
                let font = match face {
                    Face::Regular => regular,
                    Face::Bold => bold,
                    Face::Italic => italic,
                };
                let mut object = page
                    .objects_mut()
                    .create_text_object(
                        PdfPoints::new(*x),
                        PdfPoints::new(flip(*baseline)),
                        text,
                        font,
                        PdfPoints::new(*size),
                    )
                    .map_err(|e| render_error("draw text", e))?;
                object
                    .set_fill_color(colour(*color))
                    .map_err(|e| render_error("colour text", e))?;
            }
        }
    }

    let bitmap = page
        .render_with_config(&PdfRenderConfig::new().set_target_width(pixel_width as i32))
        .map_err(|e| render_error("render band", e))?;

    Ok(bitmap.as_image().to_rgba8())
}
