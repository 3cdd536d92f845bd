// src/engine/filter.rs
//
// Color filter presets expressed as chains of CSS filter functions.
// Each function is an affine color matrix on normalized RGB; results are
// clamped between steps, alpha is never touched.

use crate::ops::Filter;
use image::RgbaImage;
use rayon::prelude::*;

/// Rows for R, G, B; columns are the R, G, B coefficients and a constant offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatrix {
    rows: [[f32; 4]; 3],
}

impl ColorMatrix {
    pub fn grayscale(amount: f32) -> Self {
        let k = 1.0 - amount.clamp(0.0, 1.0);
        Self {
            rows: [
                [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k, 0.0],
                [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k, 0.0],
                [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k, 0.0],
            ],
        }
    }

    pub fn sepia(amount: f32) -> Self {
        let k = 1.0 - amount.clamp(0.0, 1.0);
        Self {
            rows: [
                [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k, 0.0],
                [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k, 0.0],
                [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k, 0.0],
            ],
        }
    }

    pub fn saturate(s: f32) -> Self {
        let s = s.max(0.0);
        Self {
            rows: [
                [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s, 0.0],
                [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s, 0.0],
                [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s, 0.0],
            ],
        }
    }

    pub fn invert(amount: f32) -> Self {
        let a = amount.clamp(0.0, 1.0);
        let d = 1.0 - 2.0 * a;
        Self {
            rows: [[d, 0.0, 0.0, a], [0.0, d, 0.0, a], [0.0, 0.0, d, a]],
        }
    }

    pub fn brightness(b: f32) -> Self {
        let b = b.max(0.0);
        Self {
            rows: [[b, 0.0, 0.0, 0.0], [0.0, b, 0.0, 0.0], [0.0, 0.0, b, 0.0]],
        }
    }

    pub fn contrast(c: f32) -> Self {
        let c = c.max(0.0);
        let o = 0.5 - 0.5 * c;
        Self {
            rows: [[c, 0.0, 0.0, o], [0.0, c, 0.0, o], [0.0, 0.0, c, o]],
        }
    }

    #[inline]
    fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (o, row) in out.iter_mut().zip(self.rows.iter()) {
            *o = (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2] + row[3]).clamp(0.0, 1.0);
        }
        out
    }
}

/// Filter functions in application order.
pub fn filter_chain(filter: Filter) -> Vec<ColorMatrix> {
    match filter {
        Filter::None => Vec::new(),
        Filter::Grayscale => vec![ColorMatrix::grayscale(1.0)],
        Filter::Sepia => vec![ColorMatrix::sepia(1.0)],
        Filter::Invert => vec![ColorMatrix::invert(1.0)],
        Filter::Vintage => vec![
            ColorMatrix::sepia(0.5),
            ColorMatrix::contrast(1.2),
            ColorMatrix::brightness(0.9),
        ],
        Filter::Cool => vec![ColorMatrix::contrast(1.1), ColorMatrix::brightness(1.05)],
        Filter::Warm => vec![ColorMatrix::sepia(0.3), ColorMatrix::saturate(1.2)],
        Filter::Dramatic => vec![ColorMatrix::contrast(1.4), ColorMatrix::saturate(1.3)],
    }
}

/// Apply a preset in place. `Filter::None` leaves the surface untouched.
pub fn apply_filter(surface: &mut RgbaImage, filter: Filter) {
    let chain = filter_chain(filter);
    if chain.is_empty() {
        return;
    }
    let width = surface.width() as usize;
    if width == 0 {
        return;
    }
    let row_len = width * 4;
    let buf: &mut [u8] = surface;
    buf.par_chunks_mut(row_len).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let mut rgb = [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ];
            for step in &chain {
                rgb = step.apply(rgb);
            }
            px[0] = (rgb[0] * 255.0).round() as u8;
            px[1] = (rgb[1] * 255.0).round() as u8;
            px[2] = (rgb[2] * 255.0).round() as u8;
        }
    });
}
