// src/engine/text.rs
//
// Watermark text: a registry of caller-supplied fonts and ab_glyph rasterization.

use crate::error::PixelShiftError;
use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{Rgb, Rgba, RgbaImage};
use std::path::Path;

type TextResult<T> = std::result::Result<T, PixelShiftError>;

/// Well-known locations of a sans-serif face, tried by [`FontBook::with_system_fallback`].
const SYSTEM_SANS_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Font families available to the watermark renderer.
///
/// Lookup is case-insensitive. An unknown family resolves to the first
/// registered face, the same way a CSS font stack ends in `sans-serif`.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: Vec<(String, FontArc)>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book seeded with the first system sans-serif face found, if any.
    pub fn with_system_fallback() -> Self {
        let mut book = Self::new();
        for candidate in SYSTEM_SANS_CANDIDATES {
            if book.register_file("sans-serif", candidate).is_ok() {
                tracing::debug!(target: "pixelshift::text", path = candidate, "loaded fallback font");
                break;
            }
        }
        book
    }

    pub fn register(&mut self, family: impl Into<String>, data: Vec<u8>) -> TextResult<()> {
        let family = family.into();
        let font = FontArc::try_from_vec(data)
            .map_err(|e| PixelShiftError::invalid_font(family.clone(), e.to_string()))?;
        self.faces
            .retain(|(name, _)| !name.eq_ignore_ascii_case(&family));
        self.faces.push((family, font));
        Ok(())
    }

    pub fn register_file(
        &mut self,
        family: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> TextResult<()> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| PixelShiftError::file_read_failed(path.display().to_string(), e))?;
        self.register(family, data)
    }

    pub fn resolve(&self, family: &str) -> Option<&FontArc> {
        self.faces
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(family))
            .or_else(|| self.faces.first())
            .map(|(_, font)| font)
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().map(|(name, _)| name.as_str())
    }
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.families()).finish()
    }
}

/// Measured extent of a single line of text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl TextMetrics {
    pub fn height(&self) -> f32 {
        self.ascent - self.descent
    }

    /// Integer box the rasterized line occupies
    pub fn box_size(&self) -> (u32, u32) {
        (
            (self.width.ceil() as u32).max(1),
            (self.height().ceil() as u32).max(1),
        )
    }
}

fn glyph_advances(font: &FontArc, text: &str, px: f32) -> Vec<(GlyphId, f32)> {
    let scaled = font.as_scaled(PxScale::from(px));
    let mut cursor = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    let mut placed = Vec::with_capacity(text.len());
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            cursor += scaled.kern(p, id);
        }
        placed.push((id, cursor));
        cursor += scaled.h_advance(id);
        prev = Some(id);
    }
    placed
}

/// Width (advances plus kerning) and vertical extent at `px`.
pub fn measure_text(font: &FontArc, text: &str, px: f32) -> TextMetrics {
    let scaled = font.as_scaled(PxScale::from(px));
    let width = match glyph_advances(font, text, px).last() {
        Some((id, x)) => x + scaled.h_advance(*id),
        None => 0.0,
    };
    TextMetrics {
        width,
        ascent: scaled.ascent(),
        descent: scaled.descent(),
    }
}

/// Rasterize one line into a transparent layer of `metrics.box_size()`.
///
/// Alpha is glyph coverage only; opacity is applied by the compositor.
pub fn rasterize_text(font: &FontArc, text: &str, px: f32, color: Rgb<u8>) -> RgbaImage {
    let (w, h) = measure_text(font, text, px).box_size();
    let mut layer = RgbaImage::new(w, h);
    draw_line(font, text, px, color, &mut layer, (0, 0));
    layer
}

/// Rasterize only the part of the text box that lands on a `bounds` surface
/// when the box's top-left sits at `origin`.
///
/// Returns the layer and the surface position of its top-left corner, or
/// `None` when the box misses the surface entirely.
pub fn rasterize_text_clipped(
    font: &FontArc,
    text: &str,
    px: f32,
    color: Rgb<u8>,
    origin: (i64, i64),
    bounds: (u32, u32),
) -> Option<(RgbaImage, u32, u32)> {
    let (w, h) = measure_text(font, text, px).box_size();
    let x0 = origin.0.max(0);
    let y0 = origin.1.max(0);
    let x1 = (origin.0 + w as i64).min(bounds.0 as i64);
    let y1 = (origin.1 + h as i64).min(bounds.1 as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let mut layer = RgbaImage::new((x1 - x0) as u32, (y1 - y0) as u32);
    draw_line(font, text, px, color, &mut layer, (x0 - origin.0, y0 - origin.1));
    Some((layer, x0 as u32, y0 as u32))
}

/// Draw glyphs into `layer`, which covers the text box from `offset` onwards.
fn draw_line(
    font: &FontArc,
    text: &str,
    px: f32,
    color: Rgb<u8>,
    layer: &mut RgbaImage,
    offset: (i64, i64),
) {
    let scale = PxScale::from(px);
    let baseline = font.as_scaled(scale).ascent();
    let (w, h) = (layer.width() as i64, layer.height() as i64);

    for (id, x) in glyph_advances(font, text, px) {
        let glyph = id.with_scale_and_position(scale, ab_glyph::point(x, baseline));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        let left = bounds.min.x as i64 - offset.0;
        let top = bounds.min.y as i64 - offset.1;
        let right = bounds.max.x as i64 - offset.0;
        let bottom = bounds.max.y as i64 - offset.1;
        if left >= w || top >= h || right < 0 || bottom < 0 {
            continue;
        }
        outlined.draw(|gx, gy, coverage| {
            let x = left + gx as i64;
            let y = top + gy as i64;
            if x < 0 || y < 0 || x >= w || y >= h {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let dst = layer.get_pixel_mut(x as u32, y as u32);
            // Overlapping glyph edges keep the stronger coverage
            if alpha > dst[3] {
                *dst = Rgba([color[0], color[1], color[2], alpha]);
            }
        });
    }
}
