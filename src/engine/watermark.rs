// src/engine/watermark.rs
//
// Watermark placement and compositing.
//
// Text anchors by an alignment point (x + TextAlign, y + TextBaseline), a logo
// anchors by its top-left corner. Both land on the same 3x3 grid with a margin
// of 2% of the surface width on the outer edges.

use crate::engine::pipeline::{check_surface, resize_rgba, ResizeError};
use crate::engine::text::{measure_text, rasterize_text_clipped, FontBook};
use crate::error::PixelShiftError;
use crate::ops::{Anchor, HorizontalAnchor, VerticalAnchor, WatermarkKind, WatermarkOptions};
use image::{Rgba, RgbaImage};

type WatermarkResult<T> = std::result::Result<T, PixelShiftError>;

/// Margin as a fraction of surface width
pub const MARGIN_RATIO: f32 = 0.02;

/// Smallest font size a text watermark is drawn at
pub const MIN_FONT_PX: f32 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextBaseline {
    Top,
    Middle,
    Bottom,
}

/// Reference point a line of text is drawn against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextPlacement {
    pub x: f32,
    pub y: f32,
    pub align: TextAlign,
    pub baseline: TextBaseline,
}

impl TextPlacement {
    /// Top-left corner of a `box_w` x `box_h` text box drawn at this point.
    pub fn box_origin(&self, box_w: f32, box_h: f32) -> (f32, f32) {
        let x = match self.align {
            TextAlign::Left => self.x,
            TextAlign::Center => self.x - box_w / 2.0,
            TextAlign::Right => self.x - box_w,
        };
        let y = match self.baseline {
            TextBaseline::Top => self.y,
            TextBaseline::Middle => self.y - box_h / 2.0,
            TextBaseline::Bottom => self.y - box_h,
        };
        (x, y)
    }
}

pub fn margin(surface_width: u32) -> f32 {
    surface_width as f32 * MARGIN_RATIO
}

/// `max(10, W * size / 100)`
pub fn font_size_px(surface_width: u32, size_percent: u32) -> f32 {
    (surface_width as f32 * size_percent as f32 / 100.0).max(MIN_FONT_PX)
}

pub fn text_placement(anchor: Anchor, surface_width: u32, surface_height: u32) -> TextPlacement {
    let m = margin(surface_width);
    let (w, h) = (surface_width as f32, surface_height as f32);
    let (x, align) = match anchor.horizontal {
        HorizontalAnchor::Left => (m, TextAlign::Left),
        HorizontalAnchor::Center => (w / 2.0, TextAlign::Center),
        HorizontalAnchor::Right => (w - m, TextAlign::Right),
    };
    let (y, baseline) = match anchor.vertical {
        VerticalAnchor::Top => (m, TextBaseline::Top),
        VerticalAnchor::Middle => (h / 2.0, TextBaseline::Middle),
        VerticalAnchor::Bottom => (h - m, TextBaseline::Bottom),
    };
    TextPlacement {
        x,
        y,
        align,
        baseline,
    }
}

/// Logo box: width is a percentage of the surface width, height follows the logo aspect.
///
/// A box that would overrun the surface inside its margins is scaled down,
/// aspect kept, until it fits. Each side stays at least 1px.
pub fn logo_size(
    surface_width: u32,
    surface_height: u32,
    size_percent: u32,
    logo_aspect: f64,
) -> (u32, u32) {
    let w = (surface_width as f64 * size_percent as f64 / 100.0).round().max(1.0);
    let h = if logo_aspect > 0.0 {
        (w / logo_aspect).round().max(1.0)
    } else {
        w
    };
    let m = margin(surface_width) as f64;
    let max_w = (surface_width as f64 - 2.0 * m).max(1.0);
    let max_h = (surface_height as f64 - 2.0 * m).max(1.0);
    if w <= max_w && h <= max_h {
        return (w as u32, h as u32);
    }
    let scale = (max_w / w).min(max_h / h);
    let fit = |side: f64, max: f64| (side * scale).round().min(max.floor()).max(1.0) as u32;
    (fit(w, max_w), fit(h, max_h))
}

pub fn logo_origin(
    anchor: Anchor,
    surface_width: u32,
    surface_height: u32,
    logo_width: u32,
    logo_height: u32,
) -> (f32, f32) {
    let m = margin(surface_width);
    let (sw, sh) = (surface_width as f32, surface_height as f32);
    let (lw, lh) = (logo_width as f32, logo_height as f32);
    let x = match anchor.horizontal {
        HorizontalAnchor::Left => m,
        HorizontalAnchor::Center => (sw - lw) / 2.0,
        HorizontalAnchor::Right => sw - lw - m,
    };
    let y = match anchor.vertical {
        VerticalAnchor::Top => m,
        VerticalAnchor::Middle => (sh - lh) / 2.0,
        VerticalAnchor::Bottom => sh - lh - m,
    };
    (x, y)
}

/// Porter-Duff source-over of `fg` onto `bg`, with `fg` alpha scaled by `opacity`.
#[inline]
pub fn blend_over(bg: Rgba<u8>, fg: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fa = fg[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    if fa <= 0.0 {
        return bg;
    }
    let ba = bg[3] as f32 / 255.0;
    let out_a = fa + ba * (1.0 - fa);
    if out_a < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |f: u8, b: u8| -> u8 {
        let v = (f as f32 * fa + b as f32 * ba * (1.0 - fa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(fg[0], bg[0]),
        channel(fg[1], bg[1]),
        channel(fg[2], bg[2]),
        (out_a * 255.0).round() as u8,
    ])
}

/// Composite `layer` with its top-left at (`x`, `y`); out-of-bounds parts are clipped.
pub fn composite_layer(surface: &mut RgbaImage, layer: &RgbaImage, x: i64, y: i64, opacity: f32) {
    let (sw, sh) = (surface.width() as i64, surface.height() as i64);
    for (lx, ly, px) in layer.enumerate_pixels() {
        let tx = x + lx as i64;
        let ty = y + ly as i64;
        if tx < 0 || ty < 0 || tx >= sw || ty >= sh || px[3] == 0 {
            continue;
        }
        let dst = surface.get_pixel_mut(tx as u32, ty as u32);
        *dst = blend_over(*dst, *px, opacity);
    }
}

/// Draw the configured watermark onto `surface`. Disabled watermarks are a no-op.
pub fn apply_watermark(
    surface: &mut RgbaImage,
    options: &WatermarkOptions,
    fonts: &FontBook,
) -> WatermarkResult<()> {
    if !options.is_enabled() {
        return Ok(());
    }
    let (sw, sh) = surface.dimensions();
    match options.kind {
        WatermarkKind::Text => {
            let font = fonts
                .resolve(&options.font)
                .ok_or_else(|| PixelShiftError::font_unavailable(options.font.clone()))?;
            let px = font_size_px(sw, options.size_percent);
            let (bw, bh) = measure_text(font, &options.text, px).box_size();
            let (x, y) = text_placement(options.anchor, sw, sh).box_origin(bw as f32, bh as f32);
            // Only the part of the box that lands on the surface is rasterized
            let Some((layer, lx, ly)) = rasterize_text_clipped(
                font,
                &options.text,
                px,
                options.color,
                (x.round() as i64, y.round() as i64),
                (sw, sh),
            ) else {
                return Ok(());
            };
            composite_layer(surface, &layer, lx as i64, ly as i64, options.opacity);
        }
        WatermarkKind::Image => {
            let Some(logo) = options.logo.as_ref() else {
                return Ok(());
            };
            let (lw, lh) = logo_size(sw, sh, options.size_percent, logo.aspect_ratio());
            check_surface(lw, lh)?;
            let scaled = resize_rgba(logo.image().to_rgba8(), lw, lh)
                .map_err(ResizeError::into_pixelshift_error)?;
            let (x, y) = logo_origin(options.anchor, sw, sh, lw, lh);
            composite_layer(
                surface,
                &scaled,
                x.round() as i64,
                y.round() as i64,
                options.opacity,
            );
        }
    }
    Ok(())
}
