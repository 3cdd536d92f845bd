// src/engine/decoder.rs
//
// Bytes to pixels. The container header is read and checked against the size
// limits before any pixel buffer exists; then the signature picks a codec:
// mozjpeg for JPEG, zune-png for PNG, libwebp for still WebP, image for the rest.

use crate::engine::common::run_with_panic_policy;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::PixelShiftError;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, Limits, RgbImage,
    RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_core::result::DecodingResult;
use zune_png::PngDecoder;

type DecoderResult<T> = std::result::Result<T, PixelShiftError>;

/// Reject sizes beyond `MAX_DIMENSION` per edge or `MAX_PIXELS` in total.
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PixelShiftError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PixelShiftError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Width and height as declared by the container header. Pixels are not touched.
pub fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    // No pixel buffer is allocated on this path
    reader.limits(Limits::no_limits());
    reader.into_dimensions().ok()
}

/// Magic-byte sniffing. `None` for anything the image crate does not recognize.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Decode `bytes` with the codec its signature selects.
///
/// A header that declares an oversized image is rejected up front. Headers
/// that cannot be read are left to the codec, which reports its own error.
pub fn decode_image(bytes: &[u8]) -> DecoderResult<(DynamicImage, Option<ImageFormat>)> {
    let Some(format) = detect_format(bytes) else {
        return Err(PixelShiftError::unsupported_format(
            "unrecognized image signature",
        ));
    };
    if let Some((width, height)) = header_dimensions(bytes) {
        check_dimensions(width, height)?;
    }

    let image = match format {
        ImageFormat::Jpeg => decode_jpeg(bytes)?,
        ImageFormat::Png => decode_png(bytes)?,
        ImageFormat::WebP => decode_webp(bytes)?,
        _ => decode_generic(bytes)?,
    };
    Ok((image, Some(format)))
}

/// `decode_image`, then turned upright per the EXIF Orientation tag.
pub fn decode_oriented(bytes: &[u8]) -> DecoderResult<(DynamicImage, Option<ImageFormat>)> {
    let (image, format) = decode_image(bytes)?;
    let image = match exif_orientation(bytes) {
        Some(orientation) => apply_orientation(image, orientation),
        None => image,
    };
    Ok((image, format))
}

fn decode_jpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:jpeg", || {
        // libjpeg pads a truncated stream with gray instead of failing
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(PixelShiftError::decode_failed("jpeg: missing EOI marker"));
        }
        let header = Decompress::new_mem(data)
            .map_err(|e| PixelShiftError::decode_failed(format!("jpeg: bad header: {e}")))?;
        let (width, height) = (header.width(), header.height());
        let (width, height) = (
            u32::try_from(width).unwrap_or(u32::MAX),
            u32::try_from(height).unwrap_or(u32::MAX),
        );
        check_dimensions(width, height)?;

        let mut started = header
            .rgb()
            .map_err(|e| PixelShiftError::decode_failed(format!("jpeg: {e}")))?;
        let pixels = started
            .read_scanlines_flat()
            .map_err(|e| PixelShiftError::decode_failed(format!("jpeg: {e}")))?;
        RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| PixelShiftError::decode_failed("jpeg: short scanline buffer"))
    })
}

fn decode_png(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        decoder
            .decode_headers()
            .map_err(|e| PixelShiftError::decode_failed(format!("png: {e:?}")))?;
        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| PixelShiftError::decode_failed("png: missing IHDR"))?;
        let (width, height) = (
            u32::try_from(width).unwrap_or(u32::MAX),
            u32::try_from(height).unwrap_or(u32::MAX),
        );
        check_dimensions(width, height)?;

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| PixelShiftError::decode_failed("png: missing colorspace"))?;
        let buf = match decoder
            .decode()
            .map_err(|e| PixelShiftError::decode_failed(format!("png: {e:?}")))?
        {
            DecodingResult::U8(buf) => buf,
            _ => return Err(PixelShiftError::decode_failed("png: expected 8-bit samples")),
        };

        let image = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => {
                RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(PixelShiftError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };
        image.ok_or_else(|| PixelShiftError::decode_failed("png: short pixel buffer"))
    })
}

fn decode_webp(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data)
            .ok_or_else(|| PixelShiftError::decode_failed("webp: unreadable bitstream header"))?;
        check_dimensions(features.width(), features.height())?;
        if features.has_animation() {
            // First frame only, the way an <img> snapshot would draw it
            return decode_generic(data);
        }
        WebPDecoder::new(data)
            .decode()
            .map(|decoded| decoded.to_image())
            .ok_or_else(|| PixelShiftError::decode_failed("webp: decode failed"))
    })
}

/// Everything else (GIF, BMP, TIFF, ...) through the image crate, with its
/// own allocation limits set to ours.
fn decode_generic(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| PixelShiftError::decode_failed(format!("image: {e}")))?;
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_DIMENSION);
        limits.max_image_height = Some(MAX_DIMENSION);
        limits.max_alloc = Some(MAX_PIXELS * 4);
        reader.limits(limits);
        let image = reader
            .decode()
            .map_err(|e| PixelShiftError::decode_failed(format!("image: {e}")))?;
        check_dimensions(image.width(), image.height())?;
        Ok(image)
    })
}

/// Apply an EXIF Orientation value (1-8). Other values leave the image as is.
pub fn apply_orientation(image: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// EXIF Orientation (1-8) of the primary image, if present.
pub fn exif_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = u16::try_from(field.value.get_uint(0)?).ok()?;
    (1..=8).contains(&orientation).then_some(orientation)
}
