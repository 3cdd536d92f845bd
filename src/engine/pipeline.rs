// src/engine/pipeline.rs
//
// Render pipeline: resize -> filter -> watermark, always in that order.

use crate::engine::filter::apply_filter;
use crate::engine::text::FontBook;
use crate::engine::watermark::apply_watermark;
use crate::engine::{Bitmap, MAX_DIMENSION, MAX_PIXELS};
use crate::error::PixelShiftError;
use crate::ops::OptionSnapshot;
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, RgbaImage};
use std::sync::Arc;
use tracing::debug;

type PipelineResult<T> = std::result::Result<T, PixelShiftError>;

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_pixelshift_error(self) -> PixelShiftError {
        PixelShiftError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

/// Target size for a source of `orig_w` x `orig_h`.
///
/// Both set: used verbatim (no fit, no crop). One set: the other follows the
/// source aspect ratio, rounded. Neither: source size. Never below 1px.
pub fn calc_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: Option<u32>,
    target_h: Option<u32>,
) -> (u32, u32) {
    let (w, h) = match (target_w, target_h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let ratio = w as f64 / orig_w.max(1) as f64;
            (w, (orig_h as f64 * ratio).round() as u32)
        }
        (None, Some(h)) => {
            let ratio = h as f64 / orig_h.max(1) as f64;
            ((orig_w as f64 * ratio).round() as u32, h)
        }
        (None, None) => (orig_w, orig_h),
    };
    (w.max(1), h.max(1))
}

/// Shrink so the longest edge is at most `max_edge`. Never enlarges.
pub fn apply_max_edge(width: u32, height: u32, max_edge: Option<u32>) -> (u32, u32) {
    let Some(limit) = max_edge.filter(|m| *m > 0) else {
        return (width, height);
    };
    let longest = width.max(height);
    if longest <= limit {
        return (width, height);
    }
    let scale = limit as f64 / longest as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// A surface larger than the decode limits cannot be allocated.
pub(crate) fn check_surface(width: u32, height: u32) -> PipelineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PixelShiftError::surface_allocation_failed(
            width,
            height,
            format!("edge exceeds {MAX_DIMENSION}px"),
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PixelShiftError::surface_allocation_failed(
            width,
            height,
            format!("{pixels} pixels exceeds {MAX_PIXELS}"),
        ));
    }
    Ok(())
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Lanczos3 resize of an RGBA buffer with premultiplied alpha.
///
/// Falls back to `image::imageops::resize` when fast_image_resize rejects the input.
pub fn resize_rgba(
    src: RgbaImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, ResizeError> {
    let (src_width, src_height) = src.dimensions();
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }
    if (src_width, src_height) == (dst_width, dst_height) {
        return Ok(src);
    }

    let fallback_src = src.clone();
    match resize_with_fir(src, dst_width, dst_height) {
        Ok(resized) => Ok(resized),
        Err(reason) => {
            debug!(
                target: "pixelshift::pipeline",
                %reason,
                "fast_image_resize failed, using image crate"
            );
            Ok(image::imageops::resize(
                &fallback_src,
                dst_width,
                dst_height,
                FilterType::Lanczos3,
            ))
        }
    }
}

/// Premultiplication is skipped for large sources that are fully opaque;
/// for small ones the scan costs more than the SIMD premultiply.
fn needs_premultiply(pixels: &[u8], width: u32, height: u32) -> bool {
    const SCAN_THRESHOLD_PIXELS: u64 = 1_000_000;
    if (width as u64) * (height as u64) < SCAN_THRESHOLD_PIXELS {
        return true;
    }
    pixels.iter().skip(3).step_by(4).any(|&a| a != 255)
}

fn resize_with_fir(
    src: RgbaImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, String> {
    let (src_width, src_height) = src.dimensions();
    let premultiply = needs_premultiply(src.as_raw(), src_width, src_height);
    let mut src_image =
        fir::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), PixelType::U8x4)
            .map_err(|e| format!("fir source image error: {e:?}"))?;
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x4);

    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, &default_resize_options())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    RgbaImage::from_raw(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| "resized buffer does not match target size".to_string())
}

/// The drawing surface after resize, filter and watermark.
#[derive(Clone, Debug)]
pub struct RenderResult {
    surface: RgbaImage,
}

impl RenderResult {
    pub fn new(surface: RgbaImage) -> Self {
        Self { surface }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.surface.dimensions()
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn into_surface(self) -> RgbaImage {
        self.surface
    }

    /// True when every pixel has alpha 255
    pub fn is_opaque(&self) -> bool {
        self.surface.as_raw().iter().skip(3).step_by(4).all(|&a| a == 255)
    }
}

/// Turns a decoded bitmap plus an option snapshot into a drawing surface.
#[derive(Clone, Debug, Default)]
pub struct Renderer {
    fonts: Arc<FontBook>,
}

impl Renderer {
    pub fn new(fonts: Arc<FontBook>) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Output surface size for `bitmap` under `snapshot`, before any pixels move.
    pub fn target_dimensions(&self, bitmap: &Bitmap, snapshot: &OptionSnapshot) -> (u32, u32) {
        let (w, h) = calc_resize_dimensions(
            bitmap.width(),
            bitmap.height(),
            snapshot.target_width,
            snapshot.target_height,
        );
        apply_max_edge(w, h, snapshot.max_edge)
    }

    pub fn render(&self, bitmap: &Bitmap, snapshot: &OptionSnapshot) -> PipelineResult<RenderResult> {
        let source = bitmap.dimensions();
        let (w, h) = self.target_dimensions(bitmap, snapshot);
        check_surface(w, h)?;

        let mut surface = resize_rgba(bitmap.image().to_rgba8(), w, h)
            .map_err(ResizeError::into_pixelshift_error)?;
        apply_filter(&mut surface, snapshot.filter);
        apply_watermark(&mut surface, &snapshot.watermark, &self.fonts)?;

        debug!(
            target: "pixelshift::pipeline",
            source_width = source.0,
            source_height = source.1,
            width = w,
            height = h,
            filter = snapshot.filter.as_str(),
            watermark = snapshot.watermark.is_enabled(),
            "rendered surface"
        );
        Ok(RenderResult::new(surface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Filter, WatermarkKind, WatermarkOptions};
    use image::{DynamicImage, Rgba};

    fn create_test_bitmap(width: u32, height: u32) -> Bitmap {
        Bitmap::new(DynamicImage::ImageRgba8(RgbaImage::from_fn(
            width,
            height,
            |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]),
        )))
    }

    mod resize_calc_tests {
        use super::*;

        #[test]
        fn test_both_dimensions_used_verbatim() {
            assert_eq!(calc_resize_dimensions(1000, 800, Some(500), Some(100)), (500, 100));
            assert_eq!(calc_resize_dimensions(6000, 4000, Some(800), Some(600)), (800, 600));
        }

        #[test]
        fn test_width_only_maintains_aspect_ratio() {
            assert_eq!(calc_resize_dimensions(1000, 500, Some(500), None), (500, 250));
            assert_eq!(calc_resize_dimensions(800, 600, Some(400), None), (400, 300));
        }

        #[test]
        fn test_height_only_maintains_aspect_ratio() {
            assert_eq!(calc_resize_dimensions(1000, 500, None, Some(250)), (500, 250));
        }

        #[test]
        fn test_none_returns_original() {
            assert_eq!(calc_resize_dimensions(1000, 500, None, None), (1000, 500));
        }

        #[test]
        fn test_rounding_behavior() {
            // 51 * 50 / 101 = 25.2
            assert_eq!(calc_resize_dimensions(101, 51, Some(50), None), (50, 25));
        }

        #[test]
        fn test_never_below_one_pixel() {
            assert_eq!(calc_resize_dimensions(10_000, 10, Some(10), None), (10, 1));
            assert_eq!(calc_resize_dimensions(10, 10_000, None, Some(10)), (1, 10));
        }

        #[test]
        fn test_max_edge_shrinks_longest_side() {
            assert_eq!(apply_max_edge(3840, 2160, Some(1920)), (1920, 1080));
            assert_eq!(apply_max_edge(1000, 4000, Some(1920)), (480, 1920));
        }

        #[test]
        fn test_max_edge_never_enlarges() {
            assert_eq!(apply_max_edge(640, 480, Some(1920)), (640, 480));
            assert_eq!(apply_max_edge(640, 480, None), (640, 480));
            assert_eq!(apply_max_edge(640, 480, Some(0)), (640, 480));
        }
    }

    mod resize_tests {
        use super::*;

        #[test]
        fn test_resize_rgba_dimensions() {
            let src = create_test_bitmap(64, 32).image().to_rgba8();
            let out = resize_rgba(src, 16, 8).unwrap();
            assert_eq!(out.dimensions(), (16, 8));
        }

        #[test]
        fn test_resize_same_size_is_unscaled_copy() {
            let src = create_test_bitmap(9, 7).image().to_rgba8();
            let out = resize_rgba(src.clone(), 9, 7).unwrap();
            assert_eq!(out, src);
        }

        #[test]
        fn test_resize_zero_target_is_error() {
            let src = create_test_bitmap(4, 4).image().to_rgba8();
            let err = resize_rgba(src, 0, 4).unwrap_err();
            assert_eq!(err.target_dims, (0, 4));
            assert!(matches!(
                err.into_pixelshift_error(),
                PixelShiftError::ResizeFailed { .. }
            ));
        }

        #[test]
        fn test_transparent_pixels_do_not_bleed_color() {
            // Half fully transparent red, half opaque blue
            let src = RgbaImage::from_fn(8, 8, |x, _| {
                if x < 4 {
                    Rgba([255, 0, 0, 0])
                } else {
                    Rgba([0, 0, 255, 255])
                }
            });
            let out = resize_rgba(src, 4, 4).unwrap();
            let edge = out.get_pixel(2, 2);
            assert!(edge[3] > 0);
            assert!(edge[0] < 40, "red leaked through premultiply: {edge:?}");
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_default_snapshot_is_identity() {
            let bitmap = create_test_bitmap(20, 10);
            let out = Renderer::default()
                .render(&bitmap, &OptionSnapshot::default())
                .unwrap();
            assert_eq!(out.surface(), &bitmap.image().to_rgba8());
            assert!(out.is_opaque());
        }

        #[test]
        fn test_render_resizes_and_filters() {
            let bitmap = create_test_bitmap(800, 600);
            let snapshot = OptionSnapshot {
                target_width: Some(400),
                filter: Filter::Grayscale,
                ..OptionSnapshot::default()
            };
            let out = Renderer::default().render(&bitmap, &snapshot).unwrap();
            assert_eq!(out.dimensions(), (400, 300));
            let p = out.surface().get_pixel(100, 100);
            assert_eq!(p[0], p[1]);
            assert_eq!(p[1], p[2]);
        }

        #[test]
        fn test_skipped_watermark_is_pixel_identical() {
            let bitmap = create_test_bitmap(50, 40);
            let plain = OptionSnapshot {
                filter: Filter::Sepia,
                ..OptionSnapshot::default()
            };
            let skipped = OptionSnapshot {
                watermark: WatermarkOptions {
                    kind: WatermarkKind::Image,
                    text: "not drawn".to_string(),
                    opacity: 1.0,
                    ..WatermarkOptions::default()
                },
                ..plain.clone()
            };
            let renderer = Renderer::default();
            let a = renderer.render(&bitmap, &plain).unwrap();
            let b = renderer.render(&bitmap, &skipped).unwrap();
            assert_eq!(a.surface(), b.surface());
        }

        #[test]
        fn test_oversized_target_is_surface_failure() {
            let bitmap = create_test_bitmap(4, 4);
            let snapshot = OptionSnapshot {
                target_width: Some(MAX_DIMENSION + 1),
                target_height: Some(4),
                ..OptionSnapshot::default()
            };
            let err = Renderer::default().render(&bitmap, &snapshot).unwrap_err();
            assert!(matches!(err, PixelShiftError::SurfaceAllocationFailed { .. }));
            assert!(err.aborts_batch());
        }

        #[test]
        fn test_text_watermark_without_font_fails_render() {
            let bitmap = create_test_bitmap(20, 20);
            let snapshot = OptionSnapshot {
                watermark: WatermarkOptions {
                    text: "©".to_string(),
                    ..WatermarkOptions::default()
                },
                ..OptionSnapshot::default()
            };
            let err = Renderer::new(Arc::new(FontBook::new()))
                .render(&bitmap, &snapshot)
                .unwrap_err();
            assert!(matches!(err, PixelShiftError::FontUnavailable { .. }));
        }

        #[test]
        fn test_is_opaque_detects_alpha() {
            let mut surface = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255]));
            assert!(RenderResult::new(surface.clone()).is_opaque());
            surface.put_pixel(2, 2, Rgba([1, 2, 3, 254]));
            assert!(!RenderResult::new(surface).is_opaque());
        }
    }
}
