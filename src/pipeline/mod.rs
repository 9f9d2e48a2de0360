//! Pipeline stages for analysing a drawing and exporting narrative reports.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ analysis ──▶ narrative ──▶ document ──▶ layout ──▶ render ──▶ paginate ──▶ pdf
//! (bytes)    (HTTP)       (LLM x2)      (blocks)     (ops)      (canvas)   (slices)     (A4)
//! ```
//!
//! 1. [`upload`]    MIME allow-list and size ceiling; no network
//! 2. [`analysis`]  one multipart POST to the analysis service
//! 3. [`narrative`] two concurrent prompts through [`llm`], parsed by
//!    [`extract`]; the pair is all-or-nothing
//! 4. [`document`]  styled blocks for one audience
//! 5. [`layout`]    pure text wrapping and box placement
//! 6. [`render`]    paint with pdfium and rasterise; blocking
//! 7. [`paginate`]  slice the canvas into page-height bands
//! 8. [`pdf`]       one A4 page per slice

pub mod analysis;
pub mod document;
pub mod extract;
pub mod layout;
pub mod llm;
pub mod narrative;
pub mod paginate;
pub mod pdf;
pub mod render;
pub mod upload;
