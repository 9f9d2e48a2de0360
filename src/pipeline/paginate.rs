//! Pagination: slice one tall canvas into A4 page slices.
//!
//! The canvas is scaled to the page content width, so one page holds
//! `content_height_mm * canvas_width / content_width_mm` canvas rows. The page
//! count and the slice boundaries both derive from that one value. Boundaries
//! are `floor(k * rows_per_page)`, the last one is pinned to the canvas
//! height, and each boundary is shared by two neighbouring slices: every
//! canvas row lands on exactly one page.

use crate::error::HtpError;
use image::{imageops, RgbaImage};

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;

/// Portrait page with equal margins on every side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_mm: f32,
}

impl PageGeometry {
    pub fn a4(margin_mm: f32) -> Self {
        Self {
            width_mm: A4_WIDTH_MM,
            height_mm: A4_HEIGHT_MM,
            margin_mm,
        }
    }

    pub fn content_width_mm(&self) -> f32 {
        self.width_mm - 2.0 * self.margin_mm
    }

    pub fn content_height_mm(&self) -> f32 {
        self.height_mm - 2.0 * self.margin_mm
    }

    /// Canvas rows that fill one page's content area.
    pub fn rows_per_page(&self, canvas_width: u32) -> f64 {
        self.content_height_mm() as f64 * canvas_width as f64 / self.content_width_mm() as f64
    }

    /// Height on the page, in mm, of `rows` canvas rows.
    pub fn rows_to_mm(&self, rows: u32, canvas_width: u32) -> f32 {
        (rows as f64 * self.content_width_mm() as f64 / canvas_width as f64) as f32
    }
}

/// The canvas rows drawn on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    /// Zero-based page index.
    pub index: usize,
    pub top_px: u32,
    pub height_px: u32,
}

impl PageSlice {
    pub fn bottom_px(&self) -> u32 {
        self.top_px + self.height_px
    }
}

/// `max(1, ceil(canvas_height / rows_per_page))`, less one when rounding
/// would leave the last page with no rows.
pub fn page_count(canvas_width: u32, canvas_height: u32, geometry: &PageGeometry) -> usize {
    let rows = geometry.rows_per_page(canvas_width);
    if rows.is_nan() || rows <= 0.0 {
        return 1;
    }
    let pages = ((canvas_height as f64 / rows).ceil() as usize).max(1);
    if pages > 1 && ((pages - 1) as f64 * rows).floor() >= canvas_height as f64 {
        pages - 1
    } else {
        pages
    }
}

/// Plan the page slices for a `canvas_width` x `canvas_height` canvas.
pub fn plan_slices(
    canvas_width: u32,
    canvas_height: u32,
    geometry: &PageGeometry,
) -> Result<Vec<PageSlice>, HtpError> {
    if canvas_width == 0 || canvas_height == 0 {
        return Err(HtpError::RenderFailed {
            detail: format!("cannot paginate an empty canvas ({canvas_width}x{canvas_height})"),
        });
    }
    if geometry.content_width_mm() <= 0.0 || geometry.content_height_mm() <= 0.0 {
        return Err(HtpError::RenderFailed {
            detail: format!("page margins leave no content area: {geometry:?}"),
        });
    }

    let rows = geometry.rows_per_page(canvas_width);
    let pages = page_count(canvas_width, canvas_height, geometry);
    let boundary = |k: usize| -> u32 {
        if k >= pages {
            canvas_height
        } else {
            ((k as f64 * rows).floor() as u32).min(canvas_height)
        }
    };

    let slices = (0..pages)
        .map(|k| (boundary(k), boundary(k + 1)))
        // Rounding near an exact multiple of a page can leave a trailing
        // slice empty.
        .filter(|(top, bottom)| bottom > top)
        .enumerate()
        .map(|(index, (top, bottom))| PageSlice {
            index,
            top_px: top,
            height_px: bottom - top,
        })
        .collect();

    Ok(slices)
}

/// Copy one slice out of the canvas.
pub fn crop_slice(canvas: &RgbaImage, slice: &PageSlice) -> RgbaImage {
    imageops::crop_imm(canvas, 0, slice.top_px, canvas.width(), slice.height_px).to_image()
}
