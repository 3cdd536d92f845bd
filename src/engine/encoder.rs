// src/engine/encoder.rs
//
// Surface -> bytes. Direct encoders (image crate, libwebp simple API) plus an
// optional optimizer pass (mozjpeg, libwebp advanced, oxipng) that falls back
// to the direct path when it fails.

use crate::engine::common::run_with_panic_policy;
use crate::engine::loader::file_stem;
use crate::engine::pipeline::RenderResult;
use crate::error::PixelShiftError;
use crate::ops::ResolvedFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

type EncoderResult<T> = std::result::Result<T, PixelShiftError>;

/// Step and floor used when shrinking quality to meet a size target.
const QUALITY_STEP: u8 = 10;
const MIN_TARGET_QUALITY: u8 = 10;

/// Encoder tuning derived from a 0-100 quality value.
///
/// Bands: High (>=85), Balanced (70-84), Fast (50-69), Fastest (<50).
/// WebP filter_strength keeps its own 80/60 thresholds.
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_preprocessing(&self) -> i32 {
        0
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    /// mozjpeg smoothing; heavier at low quality to hide blocking
    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }
}

/// Packed RGB8 composited over opaque black, as a canvas without alpha shows it.
fn rgb_bytes(surface: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(surface.width() as usize * surface.height() as usize * 3);
    for px in surface.as_raw().chunks_exact(4) {
        let alpha = px[3] as u32;
        if alpha == 255 {
            out.extend_from_slice(&px[..3]);
        } else {
            out.extend(px[..3].iter().map(|&c| ((c as u32 * alpha + 127) / 255) as u8));
        }
    }
    out
}

fn has_alpha(surface: &RgbaImage) -> bool {
    surface.as_raw().iter().skip(3).step_by(4).any(|&a| a != 255)
}

fn check_surface_size(surface: &RgbaImage, format: &'static str) -> EncoderResult<()> {
    if surface.width() == 0 || surface.height() == 0 {
        return Err(PixelShiftError::encode_failed(
            format,
            "surface width or height is zero",
        ));
    }
    Ok(())
}

/// Baseline JPEG through the image crate.
pub fn encode_jpeg_direct(surface: &RgbaImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:direct", || {
        check_surface_size(surface, "jpeg")?;
        let (w, h) = surface.dimensions();
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
            .encode(&rgb_bytes(surface), w, h, ExtendedColorType::Rgb8)
            .map_err(|e| PixelShiftError::encode_failed("jpeg", e.to_string()))?;
        Ok(buf)
    })
}

/// Progressive JPEG through mozjpeg with optimized coding and scans.
pub fn encode_jpeg_optimized(surface: &RgbaImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:mozjpeg", || {
        check_surface_size(surface, "jpeg")?;
        let (w, h) = surface.dimensions();
        let settings = QualitySettings::new(quality.max(1));
        let pixels = rgb_bytes(surface);

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let mut output = Vec::with_capacity((w as usize * h as usize * 3 / 10).max(4096));
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                PixelShiftError::encode_failed("jpeg", format!("mozjpeg: failed to start: {e:?}"))
            })?;
            for row in pixels.chunks(w as usize * 3) {
                writer.write_scanlines(row).map_err(|e| {
                    PixelShiftError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }
            writer.finish().map_err(|e| {
                PixelShiftError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

/// Lossy WebP through libwebp's simple API. Alpha is kept when present.
pub fn encode_webp_direct(surface: &RgbaImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:direct", || {
        check_surface_size(surface, "webp")?;
        let (w, h) = surface.dimensions();
        let rgb;
        let encoder = if has_alpha(surface) {
            webp::Encoder::from_rgba(surface.as_raw(), w, h)
        } else {
            rgb = rgb_bytes(surface);
            webp::Encoder::from_rgb(&rgb, w, h)
        };
        let mem = encoder
            .encode_simple(false, quality.min(100) as f32)
            .map_err(|e| PixelShiftError::encode_failed("webp", format!("{e:?}")))?;
        Ok(mem.to_vec())
    })
}

/// Lossy WebP through libwebp's advanced config, tuned by [`QualitySettings`].
pub fn encode_webp_optimized(surface: &RgbaImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:advanced", || {
        check_surface_size(surface, "webp")?;
        let (w, h) = surface.dimensions();
        let rgb;
        let encoder = if has_alpha(surface) {
            webp::Encoder::from_rgba(surface.as_raw(), w, h)
        } else {
            rgb = rgb_bytes(surface);
            webp::Encoder::from_rgb(&rgb, w, h)
        };

        let mut config = webp::WebPConfig::new()
            .map_err(|_| PixelShiftError::encode_failed("webp", "failed to create WebPConfig"))?;
        let settings = QualitySettings::new(quality);
        config.quality = settings.quality();
        config.method = settings.webp_method();
        config.pass = settings.webp_pass();
        config.preprocessing = settings.webp_preprocessing();
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = encoder
            .encode_advanced(&config)
            .map_err(|e| PixelShiftError::encode_failed("webp", format!("{e:?}")))?;
        Ok(mem.to_vec())
    })
}

/// Lossless PNG. RGB when the surface is fully opaque, RGBA otherwise.
pub fn encode_png(surface: &RgbaImage) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        check_surface_size(surface, "png")?;
        let (w, h) = surface.dimensions();
        let mut buf = Vec::new();
        let encoder = PngEncoder::new(&mut buf);
        let result = if has_alpha(surface) {
            encoder.write_image(surface.as_raw(), w, h, ExtendedColorType::Rgba8)
        } else {
            encoder.write_image(&rgb_bytes(surface), w, h, ExtendedColorType::Rgb8)
        };
        result.map_err(|e| PixelShiftError::encode_failed("png", e.to_string()))?;
        Ok(buf)
    })
}

/// Lossless oxipng pass over an encoded PNG.
pub fn optimize_png(png: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:oxipng", || {
        let mut options = oxipng::Options::from_preset(4);
        options.strip = oxipng::StripChunks::Safe;
        oxipng::optimize_from_memory(png, &options)
            .map_err(|e| PixelShiftError::encode_failed("png", format!("oxipng: {e}")))
    })
}

/// Optimizing re-encoder for the lossy formats.
///
/// Implementations may fail freely; [`Encoder`] falls back to the direct
/// encoder and keeps the item.
pub trait Recompressor: Send + Sync {
    fn name(&self) -> &'static str;

    fn recompress(
        &self,
        surface: &RgbaImage,
        format: ResolvedFormat,
        quality: u8,
    ) -> EncoderResult<Vec<u8>>;
}

/// mozjpeg for JPEG, libwebp advanced for WebP.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossyOptimizer;

impl Recompressor for LossyOptimizer {
    fn name(&self) -> &'static str {
        "mozjpeg/libwebp"
    }

    fn recompress(
        &self,
        surface: &RgbaImage,
        format: ResolvedFormat,
        quality: u8,
    ) -> EncoderResult<Vec<u8>> {
        match format {
            ResolvedFormat::Jpeg => encode_jpeg_optimized(surface, quality),
            ResolvedFormat::WebP => encode_webp_optimized(surface, quality),
            ResolvedFormat::Png => Err(PixelShiftError::encode_failed(
                "png",
                "lossy optimizer does not handle png",
            )),
        }
    }
}

/// Bytes produced for one surface.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub format: ResolvedFormat,
    pub bytes: Vec<u8>,
    /// Quality actually used; None for PNG
    pub quality: Option<u8>,
    /// Whether the optimizer produced these bytes
    pub optimized: bool,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

#[derive(Clone)]
pub struct Encoder {
    recompressor: Option<Arc<dyn Recompressor>>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::with_recompressor(Arc::new(LossyOptimizer))
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("recompressor", &self.recompressor.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl Encoder {
    /// No optimizer: image crate JPEG, simple libwebp, unoptimized PNG.
    pub fn direct() -> Self {
        Self { recompressor: None }
    }

    pub fn with_recompressor(recompressor: Arc<dyn Recompressor>) -> Self {
        Self {
            recompressor: Some(recompressor),
        }
    }

    pub fn is_optimizing(&self) -> bool {
        self.recompressor.is_some()
    }

    /// Encode a rendered surface. `max_bytes` only affects the optimizer path.
    pub fn encode(
        &self,
        render: &RenderResult,
        format: ResolvedFormat,
        quality: u8,
        max_bytes: Option<u64>,
    ) -> EncoderResult<EncodedImage> {
        let surface = render.surface();
        let quality = quality.min(100);
        match format {
            ResolvedFormat::Png => self.encode_png(surface),
            ResolvedFormat::Jpeg | ResolvedFormat::WebP => {
                if let Some(recompressor) = &self.recompressor {
                    match self.optimize(recompressor.as_ref(), surface, format, quality, max_bytes)
                    {
                        Ok(encoded) => return Ok(encoded),
                        Err(err) => warn!(
                            target: "pixelshift::encoder",
                            optimizer = recompressor.name(),
                            format = format.as_str(),
                            error = %err,
                            "optimizer failed, falling back to direct encode"
                        ),
                    }
                }
                let bytes = match format {
                    ResolvedFormat::Jpeg => encode_jpeg_direct(surface, quality)?,
                    _ => encode_webp_direct(surface, quality)?,
                };
                Ok(EncodedImage {
                    format,
                    bytes,
                    quality: Some(quality),
                    optimized: false,
                })
            }
        }
    }

    fn encode_png(&self, surface: &RgbaImage) -> EncoderResult<EncodedImage> {
        let raw = encode_png(surface)?;
        if !self.is_optimizing() {
            return Ok(EncodedImage {
                format: ResolvedFormat::Png,
                bytes: raw,
                quality: None,
                optimized: false,
            });
        }
        match optimize_png(&raw) {
            Ok(optimized) if optimized.len() < raw.len() => Ok(EncodedImage {
                format: ResolvedFormat::Png,
                bytes: optimized,
                quality: None,
                optimized: true,
            }),
            Ok(_) => Ok(EncodedImage {
                format: ResolvedFormat::Png,
                bytes: raw,
                quality: None,
                optimized: false,
            }),
            Err(err) => {
                warn!(target: "pixelshift::encoder", error = %err, "oxipng failed, keeping unoptimized png");
                Ok(EncodedImage {
                    format: ResolvedFormat::Png,
                    bytes: raw,
                    quality: None,
                    optimized: false,
                })
            }
        }
    }

    /// Run the optimizer, stepping quality down until the output fits `max_bytes`.
    /// Returns the first fit, or the smallest attempt.
    fn optimize(
        &self,
        recompressor: &dyn Recompressor,
        surface: &RgbaImage,
        format: ResolvedFormat,
        quality: u8,
        max_bytes: Option<u64>,
    ) -> EncoderResult<EncodedImage> {
        let mut q = quality;
        let mut smallest: Option<EncodedImage> = None;
        loop {
            let bytes = run_with_panic_policy("encode:optimizer", || {
                recompressor.recompress(surface, format, q)
            })?;
            let attempt = EncodedImage {
                format,
                bytes,
                quality: Some(q),
                optimized: true,
            };
            let fits = max_bytes.map_or(true, |limit| attempt.len() as u64 <= limit);
            if fits {
                return Ok(attempt);
            }
            debug!(
                target: "pixelshift::encoder",
                quality = q,
                size = attempt.len(),
                limit = max_bytes,
                "output over size target"
            );
            if smallest.as_ref().map_or(true, |s| attempt.len() < s.len()) {
                smallest = Some(attempt);
            }
            if q < MIN_TARGET_QUALITY + QUALITY_STEP {
                break;
            }
            q -= QUALITY_STEP;
        }
        smallest.ok_or_else(|| {
            PixelShiftError::encode_failed(format.as_str(), "optimizer produced no output")
        })
    }
}

/// An encoded image with the filename and mime type it is delivered under.
#[derive(Clone, Debug)]
pub struct EncodedOutput {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl EncodedOutput {
    /// `<stem>-<suffix>.<ext>`
    pub fn new(original_name: &str, suffix: &str, encoded: EncodedImage) -> Self {
        Self {
            filename: output_filename(original_name, suffix, encoded.format),
            mime: encoded.mime(),
            bytes: encoded.bytes,
        }
    }
}

pub fn output_filename(original_name: &str, suffix: &str, format: ResolvedFormat) -> String {
    format!(
        "{}-{}.{}",
        file_stem(original_name),
        suffix,
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn create_test_surface(width: u32, height: u32) -> RenderResult {
        // Gradient with a little deterministic texture so lossy sizes vary with quality
        RenderResult::new(RgbaImage::from_fn(width, height, |x, y| {
            let n = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 37;
            Rgba([
                ((x * 255 / width.max(1)) as u8).wrapping_add(n as u8),
                ((y * 255 / height.max(1)) as u8).wrapping_sub(n as u8),
                ((x + y) % 256) as u8,
                255,
            ])
        }))
    }

    fn create_transparent_surface(width: u32, height: u32) -> RenderResult {
        RenderResult::new(RgbaImage::from_fn(width, height, |x, _| {
            Rgba([200, 30, 30, if x % 2 == 0 { 0 } else { 255 }])
        }))
    }

    struct FailingRecompressor;

    impl Recompressor for FailingRecompressor {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn recompress(&self, _: &RgbaImage, format: ResolvedFormat, _: u8) -> EncoderResult<Vec<u8>> {
            Err(PixelShiftError::encode_failed(format.as_str(), "simulated"))
        }
    }

    struct PanickingRecompressor;

    impl Recompressor for PanickingRecompressor {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn recompress(&self, _: &RgbaImage, _: ResolvedFormat, _: u8) -> EncoderResult<Vec<u8>> {
            panic!("worker died")
        }
    }

    mod direct_encode_tests {
        use super::*;

        #[test]
        fn test_jpeg_direct_magic_bytes() {
            let bytes = encode_jpeg_direct(create_test_surface(32, 16).surface(), 80).unwrap();
            assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        }

        #[test]
        fn test_jpeg_optimized_magic_bytes() {
            let bytes = encode_jpeg_optimized(create_test_surface(32, 16).surface(), 80).unwrap();
            assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        }

        #[test]
        fn test_webp_magic_bytes() {
            let surface = create_test_surface(32, 16);
            for bytes in [
                encode_webp_direct(surface.surface(), 80).unwrap(),
                encode_webp_optimized(surface.surface(), 80).unwrap(),
            ] {
                assert_eq!(&bytes[0..4], b"RIFF");
                assert_eq!(&bytes[8..12], b"WEBP");
            }
        }

        #[test]
        fn test_png_magic_bytes_and_lossless() {
            let surface = create_test_surface(20, 10);
            let bytes = encode_png(surface.surface()).unwrap();
            assert_eq!(&bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (20, 10));
            assert_eq!(&decoded.to_rgba8(), surface.surface());
        }

        #[test]
        fn test_png_keeps_transparency() {
            let surface = create_transparent_surface(6, 6);
            let bytes = encode_png(surface.surface()).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
            assert_eq!(decoded.get_pixel(0, 0)[3], 0);
            assert_eq!(decoded.get_pixel(1, 0)[3], 255);
        }

        #[test]
        fn test_webp_keeps_alpha_jpeg_drops_it() {
            let surface = create_transparent_surface(16, 16);
            let webp = encode_webp_optimized(surface.surface(), 90).unwrap();
            assert!(image::load_from_memory(&webp).unwrap().color().has_alpha());
            let jpeg = encode_jpeg_direct(surface.surface(), 90).unwrap();
            assert!(!image::load_from_memory(&jpeg).unwrap().color().has_alpha());
        }

        #[test]
        fn test_jpeg_composites_transparency_onto_black() {
            let surface = RgbaImage::from_fn(16, 16, |x, _| {
                if x < 8 {
                    Rgba([255, 0, 0, 0])
                } else {
                    Rgba([255, 0, 0, 128])
                }
            });
            for bytes in [
                encode_jpeg_direct(&surface, 95).unwrap(),
                encode_jpeg_optimized(&surface, 95).unwrap(),
            ] {
                let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
                let clear = decoded.get_pixel(2, 8);
                assert!(clear.0.iter().all(|&c| c < 16), "transparent red came out {clear:?}");
                let half = decoded.get_pixel(13, 8);
                assert!((100..=156).contains(&half[0]), "half-alpha red came out {half:?}");
            }
        }

        #[test]
        fn test_zero_sized_surface_is_error() {
            let empty = RgbaImage::new(0, 0);
            assert!(encode_jpeg_direct(&empty, 80).is_err());
            assert!(encode_png(&empty).is_err());
        }
    }

    mod quality_tests {
        use super::*;

        #[test]
        fn test_quality_band_mapping_boundaries() {
            assert_eq!(QualitySettings::new(85).band(), QualityBand::High);
            assert_eq!(QualitySettings::new(84).band(), QualityBand::Balanced);
            assert_eq!(QualitySettings::new(70).band(), QualityBand::Balanced);
            assert_eq!(QualitySettings::new(69).band(), QualityBand::Fast);
            assert_eq!(QualitySettings::new(49).band(), QualityBand::Fastest);
            assert_eq!(QualitySettings::new(255).quality(), 100.0);
        }

        #[test]
        fn test_webp_settings_are_stable() {
            let high = QualitySettings::new(90);
            assert_eq!(high.webp_sns_strength(), 50);
            assert_eq!(high.webp_filter_strength(), 20);
            assert_eq!(high.webp_filter_sharpness(), 2);
            let low = QualitySettings::new(40);
            assert_eq!(low.webp_sns_strength(), 80);
            assert_eq!(low.webp_filter_strength(), 40);
            assert_eq!(low.webp_filter_sharpness(), 0);
        }

        #[test]
        fn test_jpeg_size_non_increasing_as_quality_drops() {
            let surface = create_test_surface(128, 96);
            for encoder in [Encoder::default(), Encoder::direct()] {
                let sizes: Vec<usize> = [95u8, 75, 50, 25]
                    .iter()
                    .map(|&q| {
                        encoder
                            .encode(&surface, ResolvedFormat::Jpeg, q, None)
                            .unwrap()
                            .len()
                    })
                    .collect();
                assert!(
                    sizes.windows(2).all(|w| w[1] <= w[0]),
                    "{encoder:?}: {sizes:?}"
                );
            }
        }

        #[test]
        fn test_webp_size_non_increasing_as_quality_drops() {
            let surface = create_test_surface(128, 96);
            let sizes: Vec<usize> = [95u8, 75, 50, 25]
                .iter()
                .map(|&q| {
                    Encoder::default()
                        .encode(&surface, ResolvedFormat::WebP, q, None)
                        .unwrap()
                        .len()
                })
                .collect();
            assert!(sizes.windows(2).all(|w| w[1] <= w[0]), "{sizes:?}");
        }
    }

    mod encoder_tests {
        use super::*;

        #[test]
        fn test_png_ignores_quality() {
            let surface = create_test_surface(24, 24);
            let encoder = Encoder::default();
            let a = encoder.encode(&surface, ResolvedFormat::Png, 10, None).unwrap();
            let b = encoder.encode(&surface, ResolvedFormat::Png, 100, None).unwrap();
            assert_eq!(a.bytes, b.bytes);
            assert_eq!(a.quality, None);
            let decoded = image::load_from_memory(&a.bytes).unwrap();
            assert_eq!(decoded.dimensions(), surface.dimensions());
            assert_eq!(&decoded.to_rgba8(), surface.surface());
        }

        #[test]
        fn test_default_encoder_uses_optimizer() {
            let surface = create_test_surface(32, 32);
            let out = Encoder::default()
                .encode(&surface, ResolvedFormat::Jpeg, 80, None)
                .unwrap();
            assert!(out.optimized);
            assert_eq!(out.quality, Some(80));
            assert_eq!(out.mime(), "image/jpeg");
        }

        #[test]
        fn test_failing_optimizer_falls_back_to_direct() {
            let surface = create_test_surface(32, 32);
            let encoder = Encoder::with_recompressor(Arc::new(FailingRecompressor));
            for format in [ResolvedFormat::Jpeg, ResolvedFormat::WebP] {
                let out = encoder.encode(&surface, format, 70, None).unwrap();
                assert!(!out.optimized);
                assert_eq!(out.quality, Some(70));
                assert!(image::load_from_memory(&out.bytes).is_ok());
            }
        }

        #[test]
        fn test_panicking_optimizer_falls_back_to_direct() {
            let surface = create_test_surface(16, 16);
            let encoder = Encoder::with_recompressor(Arc::new(PanickingRecompressor));
            let out = encoder
                .encode(&surface, ResolvedFormat::Jpeg, 80, None)
                .unwrap();
            assert!(!out.optimized);
            assert_eq!(&out.bytes[0..2], &[0xFF, 0xD8]);
        }

        #[test]
        fn test_size_target_lowers_quality() {
            let surface = create_test_surface(128, 128);
            let encoder = Encoder::default();
            let full = encoder
                .encode(&surface, ResolvedFormat::Jpeg, 90, None)
                .unwrap();
            let limited = encoder
                .encode(
                    &surface,
                    ResolvedFormat::Jpeg,
                    90,
                    Some(full.len() as u64 - 1),
                )
                .unwrap();
            assert!(limited.quality.unwrap() < 90);
            assert!(limited.len() < full.len());
        }

        #[test]
        fn test_unreachable_size_target_returns_smallest_attempt() {
            let surface = create_test_surface(64, 64);
            let out = Encoder::default()
                .encode(&surface, ResolvedFormat::Jpeg, 55, Some(1))
                .unwrap();
            // 55, 45, 35, 25, 15 tried; 15 is the floor above 10
            assert_eq!(out.quality, Some(15));
            assert!(out.optimized);
        }

        #[test]
        fn test_size_target_ignored_by_direct_encoder() {
            let surface = create_test_surface(64, 64);
            let out = Encoder::direct()
                .encode(&surface, ResolvedFormat::Jpeg, 80, Some(1))
                .unwrap();
            assert_eq!(out.quality, Some(80));
        }
    }

    mod output_tests {
        use super::*;

        fn encoded(format: ResolvedFormat) -> EncodedImage {
            EncodedImage {
                format,
                bytes: vec![1, 2, 3],
                quality: None,
                optimized: false,
            }
        }

        #[test]
        fn test_output_name_uses_last_dot() {
            let out = EncodedOutput::new("trip.day1.png", "processed", encoded(ResolvedFormat::WebP));
            assert_eq!(out.filename, "trip.day1-processed.webp");
            assert_eq!(out.mime, "image/webp");
            assert_eq!(out.bytes, vec![1, 2, 3]);
        }

        #[test]
        fn test_dotfile_name_is_all_stem() {
            let out = EncodedOutput::new(".hidden", "processed", encoded(ResolvedFormat::Png));
            assert_eq!(out.filename, ".hidden-processed.png");
        }

        #[test]
        fn test_output_name_without_dot_keeps_full_stem() {
            let out = EncodedOutput::new("scan", "compressed", encoded(ResolvedFormat::Jpeg));
            assert_eq!(out.filename, "scan-compressed.jpg");
        }
    }
}
