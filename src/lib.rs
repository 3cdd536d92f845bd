// lib.rs
//
// pixelshift: batch image tools behind one render pipeline.
//
// Compress, convert, resize, filter and watermark a selection of images, then
// deliver a single file or a zip of all results. Every tool is a restricted
// view over the same option model and pipeline.

pub mod engine;
pub mod error;
pub mod ops;
pub mod session;

pub use engine::{
    BatchObserver, BatchReport, BatchState, DirectorySink, Download, DownloadSink, Encoder,
    FontBook, InputFile, MemorySink, NoopObserver,
};
pub use error::{ErrorCategory, PixelShiftError, Result};
pub use ops::{OptionModel, OptionSnapshot, Tool};
pub use session::{LoadReport, Session, SessionConfig};

/// Crate version, as reported by the CLI.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Output formats the encoder can write.
pub fn supported_output_formats() -> &'static [&'static str] {
    &["jpeg", "png", "webp"]
}
