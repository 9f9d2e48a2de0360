//! PDFium binding.
//!
//! A `Pdfium` handle is neither `Send` nor `Sync`, so every blocking render
//! binds its own. Only the location that bound successfully is cached for the
//! process. Lookup order:
//!
//! 1. `PDFIUM_LIB_PATH`, either the library file itself or its directory.
//! 2. The platform library name in the current directory.
//! 3. The system library search path.

use crate::error::HtpError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Where the pdfium library was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    Path(PathBuf),
    System,
}

static RESOLVED_SOURCE: OnceLock<LibrarySource> = OnceLock::new();

/// Bind a pdfium handle for the calling thread.
///
/// The first successful call resolves the library and remembers where it
/// was found; later calls bind straight from there.
pub fn pdfium() -> Result<Pdfium, HtpError> {
    if let Some(source) = RESOLVED_SOURCE.get() {
        return bind_from_source(source);
    }
    let (pdfium, source) = resolve()?;
    let _ = RESOLVED_SOURCE.set(source);
    Ok(pdfium)
}

/// The library location cached by a successful [`pdfium`] call, if any.
pub fn resolved_source() -> Option<&'static LibrarySource> {
    RESOLVED_SOURCE.get()
}

/// Whether a pdfium library can be bound in this environment.
pub fn is_pdfium_available() -> bool {
    pdfium().is_ok()
}

fn bind_from_source(source: &LibrarySource) -> Result<Pdfium, HtpError> {
    match source {
        LibrarySource::Path(path) => bind_pdfium_from_path(path),
        LibrarySource::System => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| HtpError::PdfiumBindingFailed(format!("system library: {e}"))),
    }
}

/// Bind a fresh pdfium instance following the lookup order above, without
/// consulting or updating the cache.
pub fn bind_pdfium() -> Result<Pdfium, HtpError> {
    resolve().map(|(pdfium, _)| pdfium)
}

fn resolve() -> Result<(Pdfium, LibrarySource), HtpError> {
    let mut tried = Vec::new();

    if let Some(path) = env_library_path() {
        match bind_pdfium_from_path(&path) {
            Ok(pdfium) => return Ok((pdfium, LibrarySource::Path(path))),
            Err(e) => tried.push(e.to_string()),
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match bind_pdfium_from_path(&local) {
        Ok(pdfium) => return Ok((pdfium, LibrarySource::Path(local))),
        Err(e) => tried.push(e.to_string()),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => {
            info!("Bound pdfium from the system library path");
            Ok((Pdfium::new(bindings), LibrarySource::System))
        }
        Err(e) => {
            tried.push(format!("system library: {e}"));
            Err(HtpError::PdfiumBindingFailed(tried.join("; ")))
        }
    }
}

/// Bind to a pdfium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, HtpError> {
    debug!("Trying pdfium at {}", path.display());
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| HtpError::PdfiumBindingFailed(format!("{}: {e}", path.display())))
}

fn env_library_path() -> Option<PathBuf> {
    let raw = std::env::var("PDFIUM_LIB_PATH").ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Some(Pdfium::pdfium_platform_library_name_at_path(&path))
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_path_is_a_binding_error() {
        let err = bind_pdfium_from_path(Path::new("/nonexistent/libpdfium.so"))
            .err()
            .expect("binding must fail");
        assert!(matches!(err, HtpError::PdfiumBindingFailed(ref m) if m.contains("/nonexistent")));
    }

    #[test]
    fn later_threads_bind_from_the_cached_source() {
        if pdfium().is_err() {
            return;
        }
        assert!(resolved_source().is_some());
        for _ in 0..2 {
            let bound = std::thread::spawn(|| pdfium().map(|p| p.create_new_pdf().is_ok()))
                .join()
                .unwrap();
            assert!(matches!(bound, Ok(true)));
        }
    }
}
