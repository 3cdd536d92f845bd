// src/engine.rs
//
// The core of pixelshift. One render pipeline shared by every tool:
// 1. Load: selected files become immutable bitmaps
// 2. Render: resize -> filter -> watermark onto a fresh RGBA surface
// 3. Encode: JPEG / PNG / WebP, optimizer first, direct encode as fallback
// 4. Deliver: one file directly, several as a zip, through a download sink
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected to prevent decompression bombs; the same limit
/// bounds render surfaces.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod archive;
mod batch;
mod common;
mod decoder;
mod encoder;
mod filter;
mod loader;
mod pipeline;
mod sink;
mod text;
mod watermark;

pub use archive::{dedupe_filenames, ArchivePackager, ZipPackager};
pub use batch::{
    BatchItem, BatchObserver, BatchReport, BatchRunner, BatchState, ItemFailure, NoopObserver,
    DEFAULT_PRODUCT, DEFAULT_YIELD_EVERY,
};
pub use common::run_with_panic_policy;
pub use decoder::{
    check_dimensions, decode_image, decode_oriented, detect_format, header_dimensions,
};
pub use encoder::{
    encode_jpeg_direct, encode_jpeg_optimized, encode_png, encode_webp_direct,
    encode_webp_optimized, optimize_png, output_filename, EncodedImage, EncodedOutput, Encoder,
    LossyOptimizer, QualitySettings, Recompressor,
};
pub use filter::{apply_filter, filter_chain, ColorMatrix};
pub use loader::{file_stem, Bitmap, InputFile};
pub use pipeline::{
    apply_max_edge, calc_resize_dimensions, resize_rgba, RenderResult, Renderer, ResizeError,
};
pub use sink::{DirectorySink, Download, DownloadSink, MemorySink};
pub use text::{measure_text, rasterize_text, rasterize_text_clipped, FontBook, TextMetrics};
pub use watermark::{
    apply_watermark, blend_over, font_size_px, logo_origin, logo_size, text_placement,
    TextAlign, TextBaseline, TextPlacement,
};
