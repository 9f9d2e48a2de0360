//! Upload validation: accept one drawing and hold it as opaque bytes.
//!
//! Validation looks only at the declared MIME type and the size, the same
//! two facts a browser file input exposes. Both checks run before the file
//! is read, so an oversized file is never loaded and no network call is
//! made for a rejected file.

use crate::error::HtpError;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest accepted upload: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Image types the analysis service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Bmp,
    Tiff,
}

impl ImageMime {
    /// Parse a declared MIME type against the allow-list.
    ///
    /// `image/jpg` is accepted as an alias of `image/jpeg`.
    pub fn from_mime_str(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/bmp" => Some(ImageMime::Bmp),
            "image/tiff" => Some(ImageMime::Tiff),
            _ => None,
        }
    }

    /// Canonical MIME string sent with the multipart part.
    pub fn as_mime_str(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Bmp => "image/bmp",
            ImageMime::Tiff => "image/tiff",
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            image::ImageFormat::Png => Some(ImageMime::Png),
            image::ImageFormat::Bmp => Some(ImageMime::Bmp),
            image::ImageFormat::Tiff => Some(ImageMime::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime_str())
    }
}

/// A drawing that passed validation, held in memory until submission.
///
/// Only obtainable through [`UploadedImage::from_bytes`] or [`load_image`].
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    file_name: String,
    mime: ImageMime,
    bytes: Vec<u8>,
}

impl UploadedImage {
    /// Validate an in-memory candidate.
    pub fn from_bytes(
        file_name: impl Into<String>,
        declared_mime: &str,
        bytes: Vec<u8>,
    ) -> Result<Self, HtpError> {
        let mime = validate_candidate(declared_mime, bytes.len() as u64)?;
        Ok(Self {
            file_name: file_name.into(),
            mime,
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size in MiB with two decimals, as shown next to the file name.
    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.bytes.len() as f64 / (1024.0 * 1024.0))
    }
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Check the declared type and size of a candidate file. Performs no I/O.
pub fn validate_candidate(declared_mime: &str, size: u64) -> Result<ImageMime, HtpError> {
    let mime = ImageMime::from_mime_str(declared_mime).ok_or_else(|| HtpError::UnsupportedMimeType {
        mime: declared_mime.to_string(),
    })?;

    if size > MAX_UPLOAD_BYTES {
        return Err(HtpError::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }

    Ok(mime)
}

/// Declared MIME type of a path, derived from its extension.
pub fn declared_mime_for_path(path: &Path) -> String {
    match image::ImageFormat::from_path(path)
        .ok()
        .and_then(ImageMime::from_image_format)
    {
        Some(mime) => mime.as_mime_str().to_string(),
        None => {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            format!("application/x-{}", if ext.is_empty() { "unknown" } else { &ext })
        }
    }
}

/// Validate and load a drawing from disk.
///
/// Type and size are checked from the extension and file metadata before
/// any bytes are read.
pub async fn load_image(path: impl AsRef<Path>) -> Result<UploadedImage, HtpError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path).await.map_err(|e| io_error(path, e))?;
    if !meta.is_file() {
        return Err(HtpError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let declared = declared_mime_for_path(path);
    let mime = validate_candidate(&declared, meta.len())?;

    let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;

    // The file may have grown between metadata and read.
    validate_candidate(&declared, bytes.len() as u64)?;

    if let Ok(sniffed) = image::guess_format(&bytes) {
        if ImageMime::from_image_format(sniffed) != Some(mime) {
            warn!(
                "{}: declared {} but content looks like {:?}",
                path.display(),
                mime,
                sniffed
            );
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "drawing".to_string());

    debug!("Accepted {} ({}, {} bytes)", file_name, mime, bytes.len());

    Ok(UploadedImage {
        file_name,
        mime,
        bytes,
    })
}

fn io_error(path: &Path, e: std::io::Error) -> HtpError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => HtpError::PermissionDenied { path },
        _ => HtpError::FileNotFound { path },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn allow_list_accepts_known_types() {
        for mime in ["image/jpeg", "image/jpg", "image/png", "image/bmp", "image/tiff", "IMAGE/PNG"] {
            assert!(validate_candidate(mime, 1024).is_ok(), "{mime} should pass");
        }
    }

    #[test]
    fn rejects_types_outside_allow_list() {
        for mime in ["image/gif", "image/webp", "application/pdf", "text/plain", ""] {
            let err = validate_candidate(mime, 10).unwrap_err();
            assert!(matches!(err, HtpError::UnsupportedMimeType { .. }), "{mime}");
        }
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        assert!(validate_candidate("image/png", MAX_UPLOAD_BYTES).is_ok());
        let err = validate_candidate("image/png", MAX_UPLOAD_BYTES + 1).unwrap_err();
        assert!(matches!(err, HtpError::FileTooLarge { .. }));
    }

    #[test]
    fn from_bytes_keeps_canonical_mime() {
        let img = UploadedImage::from_bytes("house.jpg", "image/jpg", vec![1, 2, 3]).unwrap();
        assert_eq!(img.mime().as_mime_str(), "image/jpeg");
        assert_eq!(img.len(), 3);
        assert_eq!(img.file_name(), "house.jpg");
    }

    #[test]
    fn declared_mime_follows_extension() {
        assert_eq!(declared_mime_for_path(Path::new("a/house.PNG")), "image/png");
        assert_eq!(declared_mime_for_path(Path::new("house.tif")), "image/tiff");
        assert_eq!(declared_mime_for_path(Path::new("house.gif")), "application/x-gif");
        assert_eq!(declared_mime_for_path(Path::new("house")), "application/x-unknown");
    }

    #[tokio::test]
    async fn load_image_rejects_wrong_extension_without_reading() {
        let mut tmp = tempfile::Builder::new().suffix(".gif").tempfile().unwrap();
        tmp.write_all(b"GIF89a").unwrap();
        let err = load_image(tmp.path()).await.unwrap_err();
        assert!(matches!(err, HtpError::UnsupportedMimeType { .. }));
    }

    #[tokio::test]
    async fn load_image_reads_valid_png() {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        tmp.write_all(&buf).unwrap();

        let loaded = load_image(tmp.path()).await.expect("valid png");
        assert_eq!(loaded.mime(), ImageMime::Png);
        assert_eq!(loaded.bytes(), buf.as_slice());
    }

    #[tokio::test]
    async fn load_image_missing_file() {
        let err = load_image("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, HtpError::FileNotFound { .. }));
    }
}
