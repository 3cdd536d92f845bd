// src/engine/loader.rs
//
// Image source loader: input files as the host hands them over, and the
// decoded, immutable bitmaps the render pipeline draws from.

use crate::engine::decoder::decode_oriented;
use crate::error::PixelShiftError;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

type LoaderResult<T> = std::result::Result<T, PixelShiftError>;

/// A selected file: name, declared mime type and raw bytes.
#[derive(Clone)]
pub struct InputFile {
    pub name: String,
    pub mime: String,
    data: Arc<Vec<u8>>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: Arc::new(data),
        }
    }

    /// Read a file from disk, guessing the mime type from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PixelShiftError::file_not_found(path.display().to_string())
            } else {
                PixelShiftError::file_read_failed(path.display().to_string(), e)
            }
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = mime_from_extension(path).unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime, data))
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Only `image/*` files are accepted into a selection.
    pub fn is_image(&self) -> bool {
        self.mime.to_ascii_lowercase().starts_with("image/")
    }

    /// Name before the last `.`, or the whole name when there is none.
    pub fn stem(&self) -> &str {
        file_stem(&self.name)
    }

    /// Decode into a bitmap. This is the one place a file turns into pixels.
    pub fn decode(&self) -> LoaderResult<Bitmap> {
        let (image, detected) = decode_oriented(self.bytes())?;
        Ok(Bitmap::with_format(image, detected))
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.data.len())
            .finish()
    }
}

/// A decoded image. Immutable once created; shared by `Arc` between renders.
#[derive(Clone)]
pub struct Bitmap {
    image: DynamicImage,
    detected: Option<ImageFormat>,
}

impl Bitmap {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            detected: None,
        }
    }

    fn with_format(image: DynamicImage, detected: Option<ImageFormat>) -> Self {
        Self { image, detected }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Container format sniffed from magic bytes during decode
    pub fn detected_format(&self) -> Option<ImageFormat> {
        self.detected
    }

    /// Width / height
    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height().max(1) as f64
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("detected", &self.detected)
            .finish()
    }
}

/// `photo.final.jpg` -> `photo.final`, `README` -> `README`
pub fn file_stem(name: &str) -> &str {
    // A leading dot names a dotfile, not an extension
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => return None,
    })
}
