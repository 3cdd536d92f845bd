#![no_main]

//! Fuzz target for the encoder: direct and optimizing paths for JPEG, PNG and
//! WebP, with and without a size target.

use arbitrary::{Arbitrary, Unstructured};
use image::{DynamicImage, RgbaImage};
use libfuzzer_sys::fuzz_target;
use pixelshift::engine::{Bitmap, Renderer};
use pixelshift::ops::{OptionSnapshot, ResolvedFormat};
use pixelshift::{Encoder, FontBook};
use std::sync::Arc;

#[derive(Arbitrary, Debug)]
struct EncodeSeed {
    format: u8,
    quality: u8,
    width: u8,
    height: u8,
    optimize: bool,
    max_bytes: Option<u16>,
}

fn build_image(data: &[u8], width: u8, height: u8) -> DynamicImage {
    // Limit dimensions to avoid OOM (max 128x128 = 64KB RGBA)
    let w = (width as u32 % 128).max(1);
    let h = (height as u32 % 128).max(1);
    let mut buffer = vec![0u8; (w * h * 4) as usize];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = data.get(i % data.len().max(1)).copied().unwrap_or(128);
    }

    let rgba = RgbaImage::from_raw(w, h, buffer)
        .unwrap_or_else(|| RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])));
    DynamicImage::ImageRgba8(rgba)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seed: EncodeSeed = match EncodeSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };

    let bitmap = Bitmap::new(build_image(data, seed.width, seed.height));
    let renderer = Renderer::new(Arc::new(FontBook::new()));
    let Ok(render) = renderer.render(&bitmap, &OptionSnapshot::default()) else {
        return;
    };

    let format = match seed.format % 3 {
        0 => ResolvedFormat::Jpeg,
        1 => ResolvedFormat::Png,
        _ => ResolvedFormat::WebP,
    };
    let encoder = if seed.optimize {
        Encoder::default()
    } else {
        Encoder::direct()
    };
    // Only panics matter; encode errors are expected for odd inputs
    let _ = encoder.encode(
        &render,
        format,
        seed.quality.min(100),
        seed.max_bytes.map(u64::from),
    );
});
