#![no_main]

//! Fuzz target for the render pipeline: resize, filter and logo watermark with
//! arbitrary options on a small arbitrary surface.

use arbitrary::{Arbitrary, Unstructured};
use image::{DynamicImage, RgbaImage};
use libfuzzer_sys::fuzz_target;
use pixelshift::engine::{Bitmap, Renderer};
use pixelshift::ops::{Anchor, Filter, OptionSnapshot, WatermarkKind};
use pixelshift::FontBook;
use std::sync::Arc;

#[derive(Arbitrary, Debug)]
struct RenderSeed {
    width: u8,
    height: u8,
    target_width: Option<u16>,
    target_height: Option<u16>,
    max_edge: Option<u16>,
    filter: u8,
    anchor: u8,
    logo: Option<(u8, u8)>,
    opacity: u8,
    size_percent: u8,
}

fn build_rgba(data: &[u8], width: u8, height: u8) -> RgbaImage {
    let w = (width as u32 % 64).max(1);
    let h = (height as u32 % 64).max(1);
    let mut buffer = vec![0u8; (w * h * 4) as usize];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = data.get(i % data.len().max(1)).copied().unwrap_or(0);
    }
    RgbaImage::from_raw(w, h, buffer)
        .unwrap_or_else(|| RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])))
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seed: RenderSeed = match RenderSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };

    let bitmap = Bitmap::new(DynamicImage::ImageRgba8(build_rgba(
        data,
        seed.width,
        seed.height,
    )));
    let anchors: Vec<Anchor> = Anchor::all().collect();

    let mut snapshot = OptionSnapshot {
        // Bounded so a surface stays small enough to fuzz quickly
        target_width: seed.target_width.map(|w| (w as u32 % 1024).max(1)),
        target_height: seed.target_height.map(|h| (h as u32 % 1024).max(1)),
        max_edge: seed.max_edge.map(|e| (e as u32 % 1024).max(1)),
        filter: Filter::ALL[seed.filter as usize % Filter::ALL.len()],
        ..OptionSnapshot::default()
    };
    if let Some((lw, lh)) = seed.logo {
        snapshot.watermark.kind = WatermarkKind::Image;
        snapshot.watermark.logo = Some(Arc::new(Bitmap::new(DynamicImage::ImageRgba8(
            build_rgba(data, lw, lh),
        ))));
        snapshot.watermark.anchor = anchors[seed.anchor as usize % anchors.len()];
        snapshot.watermark.opacity = seed.opacity as f32 / 255.0;
        snapshot.watermark.size_percent = (seed.size_percent as u32 % 100) + 1;
    }

    let renderer = Renderer::new(Arc::new(FontBook::new()));
    if let Ok(render) = renderer.render(&bitmap, &snapshot) {
        assert!(render.width() >= 1 && render.height() >= 1);
    }
});
