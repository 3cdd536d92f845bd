// src/engine/batch.rs
//
// Batch orchestrator: Idle -> Running -> {Completed, Failed}.
//
// Items run strictly one after another on the caller's thread. A bad item is
// reported and skipped; only delivery-level failures abort the batch.

use crate::engine::archive::{dedupe_filenames, ArchivePackager, ZipPackager};
use crate::engine::encoder::{EncodedOutput, Encoder};
use crate::engine::loader::{Bitmap, InputFile};
use crate::engine::pipeline::Renderer;
use crate::engine::sink::{Download, DownloadSink};
use crate::error::PixelShiftError;
use crate::ops::{OptionSnapshot, Tool, WatermarkKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

type BatchResult<T> = std::result::Result<T, PixelShiftError>;

/// Items between cooperative yields
pub const DEFAULT_YIELD_EVERY: usize = 10;

/// Product name used in archive filenames
pub const DEFAULT_PRODUCT: &str = "PixelShift";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed(String),
}

/// One unit of work: the selected file and, when already decoded, its bitmap.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub file: InputFile,
    pub bitmap: Option<Arc<Bitmap>>,
}

impl BatchItem {
    pub fn new(file: InputFile) -> Self {
        Self { file, bitmap: None }
    }

    pub fn decoded(file: InputFile, bitmap: Arc<Bitmap>) -> Self {
        Self {
            file,
            bitmap: Some(bitmap),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: usize,
    pub name: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct BatchReport {
    pub tool: Tool,
    pub total: usize,
    pub processed: usize,
    pub failures: Vec<ItemFailure>,
    pub download: Download,
    /// Input bytes of the items that succeeded
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl BatchReport {
    /// Size reduction of the successful items, in percent. Negative when outputs grew.
    pub fn savings_percent(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        (1.0 - self.bytes_out as f64 / self.bytes_in as f64) * 100.0
    }
}

/// Progress, warning and yield hooks. All have no-op defaults.
pub trait BatchObserver {
    fn on_progress(&mut self, _completed: usize, _total: usize) {}

    fn on_warning(&mut self, _name: &str, _error: &PixelShiftError) {}

    fn yield_now(&mut self) {
        std::thread::yield_now();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

pub struct BatchRunner {
    renderer: Renderer,
    encoder: Encoder,
    packager: Arc<dyn ArchivePackager>,
    yield_every: usize,
    product: String,
    state: BatchState,
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("renderer", &self.renderer)
            .field("encoder", &self.encoder)
            .field("yield_every", &self.yield_every)
            .field("product", &self.product)
            .field("state", &self.state)
            .finish()
    }
}

impl BatchRunner {
    pub fn new(renderer: Renderer, encoder: Encoder) -> Self {
        Self {
            renderer,
            encoder,
            packager: Arc::new(ZipPackager),
            yield_every: DEFAULT_YIELD_EVERY,
            product: DEFAULT_PRODUCT.to_string(),
            state: BatchState::Idle,
        }
    }

    pub fn with_packager(mut self, packager: Arc<dyn ArchivePackager>) -> Self {
        self.packager = packager;
        self
    }

    /// 0 disables yielding
    pub fn with_yield_every(mut self, yield_every: usize) -> Self {
        self.yield_every = yield_every;
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn archive_name(&self, tool: Tool) -> String {
        format!("{}-{}.zip", self.product, tool.archive_operation())
    }

    /// Input rejections, checked before the state machine moves.
    fn admit(&self, tool: Tool, view: &OptionSnapshot, items: &[BatchItem]) -> BatchResult<()> {
        if items.is_empty() {
            return Err(PixelShiftError::NoImagesSelected);
        }
        tool.validate(view)?;
        let watermark = &view.watermark;
        if watermark.kind == WatermarkKind::Text
            && watermark.is_enabled()
            && self.renderer.fonts().resolve(&watermark.font).is_none()
        {
            return Err(PixelShiftError::font_unavailable(watermark.font.clone()));
        }
        Ok(())
    }

    /// Run one batch for `tool` over `items` with the options captured in `snapshot`.
    ///
    /// Input rejections return an error and leave the state untouched. Once
    /// running, the batch ends `Completed` with a report or `Failed` with the
    /// error that aborted it.
    pub fn run(
        &mut self,
        tool: Tool,
        snapshot: &OptionSnapshot,
        items: &[BatchItem],
        observer: &mut dyn BatchObserver,
        sink: &mut dyn DownloadSink,
    ) -> BatchResult<BatchReport> {
        let view = tool.view(snapshot);
        self.admit(tool, &view, items)?;

        self.state = BatchState::Running;
        let started = Instant::now();
        let total = items.len();
        info!(
            target: "pixelshift::batch",
            tool = tool.as_str(),
            total,
            "batch started"
        );

        let mut outputs: Vec<EncodedOutput> = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut bytes_in = 0u64;
        let mut bytes_out = 0u64;

        for (index, item) in items.iter().enumerate() {
            match self.process_item(tool, &view, item) {
                Ok(output) => {
                    bytes_in += item.file.size();
                    bytes_out += output.bytes.len() as u64;
                    debug!(
                        target: "pixelshift::batch",
                        index,
                        name = %item.file.name,
                        output = %output.filename,
                        bytes = output.bytes.len(),
                        "item processed"
                    );
                    outputs.push(output);
                }
                Err(err) if err.aborts_batch() => return self.fail(err),
                Err(err) => {
                    warn!(
                        target: "pixelshift::batch",
                        index,
                        name = %item.file.name,
                        error = %err,
                        "item skipped"
                    );
                    observer.on_warning(&item.file.name, &err);
                    failures.push(ItemFailure {
                        index,
                        name: item.file.name.clone(),
                        message: err.to_string(),
                    });
                }
            }

            let completed = index + 1;
            observer.on_progress(completed, total);
            if self.yield_every > 0 && completed % self.yield_every == 0 {
                observer.yield_now();
            }
        }

        if outputs.is_empty() {
            return self.fail(PixelShiftError::nothing_processed(total));
        }

        let processed = outputs.len();
        let download = match self.package(tool, outputs, total) {
            Ok(download) => download,
            Err(err) => return self.fail(err),
        };
        if let Err(err) = sink.deliver(&download) {
            return self.fail(err);
        }

        self.state = BatchState::Completed;
        info!(
            target: "pixelshift::batch",
            tool = tool.as_str(),
            total,
            processed,
            failed = failures.len(),
            download = %download.filename,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch completed"
        );

        Ok(BatchReport {
            tool,
            total,
            processed,
            failures,
            download,
            bytes_in,
            bytes_out,
        })
    }

    fn process_item(
        &self,
        tool: Tool,
        view: &OptionSnapshot,
        item: &BatchItem,
    ) -> BatchResult<EncodedOutput> {
        let bitmap = match &item.bitmap {
            Some(bitmap) => Arc::clone(bitmap),
            None => Arc::new(item.file.decode()?),
        };
        let render = self.renderer.render(&bitmap, view)?;
        let format = view.format.resolve(&item.file.mime);
        let encoded = self
            .encoder
            .encode(&render, format, view.quality, view.max_output_bytes)?;
        Ok(EncodedOutput::new(&item.file.name, tool.suffix(), encoded))
    }

    /// One selected item goes out directly; more than one always becomes an archive.
    fn package(
        &self,
        tool: Tool,
        mut outputs: Vec<EncodedOutput>,
        total: usize,
    ) -> BatchResult<Download> {
        if total == 1 {
            if let Some(output) = outputs.pop() {
                return Ok(Download {
                    filename: output.filename,
                    mime: output.mime,
                    bytes: output.bytes,
                    entries: 1,
                });
            }
        }
        dedupe_filenames(&mut outputs);
        let bytes = self.packager.package(&outputs)?;
        Ok(Download {
            filename: self.archive_name(tool),
            mime: Download::ZIP_MIME,
            bytes,
            entries: outputs.len(),
        })
    }

    fn fail(&mut self, err: PixelShiftError) -> BatchResult<BatchReport> {
        error!(target: "pixelshift::batch", error = %err, "batch failed");
        self.state = BatchState::Failed(err.to_string());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sink::MemorySink;
    use crate::engine::text::FontBook;
    use crate::ops::{OutputFormat, WatermarkOptions};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png_file(name: &str, width: u32, height: u32) -> InputFile {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8 * 9, y as u8 * 7, 80]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        InputFile::new(name, "image/png", buf)
    }

    fn broken_file(name: &str) -> InputFile {
        InputFile::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0x00, 0x01])
    }

    fn runner() -> BatchRunner {
        BatchRunner::new(Renderer::default(), Encoder::direct())
    }

    fn png_snapshot() -> OptionSnapshot {
        OptionSnapshot {
            format: OutputFormat::Png,
            ..OptionSnapshot::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Vec<(usize, usize)>,
        warnings: Vec<String>,
        yields: usize,
    }

    impl BatchObserver for Recorder {
        fn on_progress(&mut self, completed: usize, total: usize) {
            self.progress.push((completed, total));
        }

        fn on_warning(&mut self, name: &str, _error: &PixelShiftError) {
            self.warnings.push(name.to_string());
        }

        fn yield_now(&mut self) {
            self.yields += 1;
        }
    }

    #[derive(Default)]
    struct CountingPackager {
        calls: AtomicUsize,
        entries: AtomicUsize,
    }

    impl ArchivePackager for CountingPackager {
        fn package(&self, entries: &[EncodedOutput]) -> BatchResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entries.store(entries.len(), Ordering::SeqCst);
            ZipPackager.package(entries)
        }
    }

    struct FailingPackager;

    impl ArchivePackager for FailingPackager {
        fn package(&self, _: &[EncodedOutput]) -> BatchResult<Vec<u8>> {
            Err(PixelShiftError::archive_failed("disk full"))
        }
    }

    mod admission_tests {
        use super::*;

        #[test]
        fn test_empty_batch_is_rejected_without_state_change() {
            let mut runner = runner();
            let err = runner
                .run(
                    Tool::Suite,
                    &png_snapshot(),
                    &[],
                    &mut NoopObserver,
                    &mut MemorySink::new(),
                )
                .unwrap_err();
            assert!(matches!(err, PixelShiftError::NoImagesSelected));
            assert_eq!(err.to_string(), "Please select images first!");
            assert_eq!(runner.state(), &BatchState::Idle);
        }

        #[test]
        fn test_resizer_requires_dimensions() {
            let mut runner = runner();
            let items = vec![BatchItem::new(png_file("a.png", 4, 4))];
            let snapshot = OptionSnapshot {
                target_width: Some(10),
                ..OptionSnapshot::default()
            };
            let err = runner
                .run(
                    Tool::Resizer,
                    &snapshot,
                    &items,
                    &mut NoopObserver,
                    &mut MemorySink::new(),
                )
                .unwrap_err();
            assert_eq!(err.to_string(), "Please enter valid width and height!");
            assert_eq!(runner.state(), &BatchState::Idle);
        }

        #[test]
        fn test_text_watermark_without_font_is_rejected_up_front() {
            let mut runner = BatchRunner::new(Renderer::new(Arc::new(FontBook::new())), Encoder::direct());
            let items = vec![BatchItem::new(png_file("a.png", 4, 4))];
            let snapshot = OptionSnapshot {
                watermark: WatermarkOptions {
                    text: "mine".to_string(),
                    ..WatermarkOptions::default()
                },
                ..png_snapshot()
            };
            let mut sink = MemorySink::new();
            let err = runner
                .run(Tool::Suite, &snapshot, &items, &mut NoopObserver, &mut sink)
                .unwrap_err();
            assert!(matches!(err, PixelShiftError::FontUnavailable { .. }));
            assert_eq!(runner.state(), &BatchState::Idle);
            assert!(sink.downloads.is_empty());
        }
    }

    mod delivery_tests {
        use super::*;

        #[test]
        fn test_single_item_is_direct_download() {
            let packager = Arc::new(CountingPackager::default());
            let mut runner = runner().with_packager(packager.clone());
            let items = vec![BatchItem::new(png_file("cat.png", 8, 6))];
            let mut sink = MemorySink::new();
            let report = runner
                .run(Tool::Suite, &png_snapshot(), &items, &mut NoopObserver, &mut sink)
                .unwrap();
            assert_eq!(packager.calls.load(Ordering::SeqCst), 0);
            assert_eq!(report.download.filename, "cat-processed.png");
            assert!(!report.download.is_archive());
            assert_eq!(sink.downloads.len(), 1);
            assert_eq!(runner.state(), &BatchState::Completed);
        }

        #[test]
        fn test_multiple_items_make_one_archive_of_successes() {
            let packager = Arc::new(CountingPackager::default());
            let mut runner = runner().with_packager(packager.clone());
            let items = vec![
                BatchItem::new(png_file("a.png", 8, 6)),
                BatchItem::new(broken_file("b.jpg")),
                BatchItem::new(png_file("c.png", 5, 5)),
            ];
            let mut recorder = Recorder::default();
            let mut sink = MemorySink::new();
            let report = runner
                .run(Tool::Converter, &png_snapshot(), &items, &mut recorder, &mut sink)
                .unwrap();
            assert_eq!(packager.calls.load(Ordering::SeqCst), 1);
            assert_eq!(packager.entries.load(Ordering::SeqCst), 2);
            assert_eq!(report.processed, 2);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].name, "b.jpg");
            assert_eq!(recorder.warnings, vec!["b.jpg".to_string()]);
            assert_eq!(report.download.filename, "PixelShift-Images.zip");
            assert_eq!(report.download.entries, 2);
            assert_eq!(runner.state(), &BatchState::Completed);
        }

        #[test]
        fn test_duplicate_names_are_disambiguated_in_archive() {
            let mut runner = runner();
            let items = vec![
                BatchItem::new(png_file("same.png", 4, 4)),
                BatchItem::new(png_file("same.png", 6, 6)),
            ];
            let mut sink = MemorySink::new();
            runner
                .run(Tool::Suite, &png_snapshot(), &items, &mut NoopObserver, &mut sink)
                .unwrap();
            let archive =
                zip::ZipArchive::new(Cursor::new(sink.last().unwrap().bytes.clone())).unwrap();
            let mut names: Vec<&str> = archive.file_names().collect();
            names.sort();
            assert_eq!(names, vec!["same-processed-2.png", "same-processed.png"]);
        }

        #[test]
        fn test_archive_failure_fails_batch() {
            let mut runner = runner().with_packager(Arc::new(FailingPackager));
            let items = vec![
                BatchItem::new(png_file("a.png", 4, 4)),
                BatchItem::new(png_file("b.png", 4, 4)),
            ];
            let mut sink = MemorySink::new();
            let err = runner
                .run(Tool::Suite, &png_snapshot(), &items, &mut NoopObserver, &mut sink)
                .unwrap_err();
            assert!(err.to_string().starts_with("Error creating ZIP file"));
            assert!(matches!(runner.state(), BatchState::Failed(_)));
            assert!(sink.downloads.is_empty());
        }

        #[test]
        fn test_all_items_failing_fails_batch() {
            let mut runner = runner();
            let items = vec![
                BatchItem::new(broken_file("x.jpg")),
                BatchItem::new(broken_file("y.jpg")),
            ];
            let mut recorder = Recorder::default();
            let mut sink = MemorySink::new();
            let err = runner
                .run(Tool::Suite, &png_snapshot(), &items, &mut recorder, &mut sink)
                .unwrap_err();
            assert!(matches!(err, PixelShiftError::NothingProcessed { total: 2 }));
            assert_eq!(recorder.warnings.len(), 2);
            assert_eq!(recorder.progress.last(), Some(&(2, 2)));
            assert!(matches!(runner.state(), BatchState::Failed(_)));
            assert!(sink.downloads.is_empty());
        }

        #[test]
        fn test_predecoded_bitmap_skips_decode() {
            let mut runner = runner();
            // Bytes are garbage, but the bitmap is already there
            let bitmap = Arc::new(Bitmap::new(DynamicImage::ImageRgb8(RgbImage::new(3, 2))));
            let items = vec![BatchItem::decoded(
                InputFile::new("ready.png", "image/png", vec![0, 1, 2]),
                bitmap,
            )];
            let report = runner
                .run(
                    Tool::Suite,
                    &png_snapshot(),
                    &items,
                    &mut NoopObserver,
                    &mut MemorySink::new(),
                )
                .unwrap();
            assert_eq!(report.processed, 1);
        }
    }

    mod progress_tests {
        use super::*;

        #[test]
        fn test_progress_is_monotonic_and_yields_every_ten() {
            let mut runner = runner();
            let items: Vec<BatchItem> = (0..25)
                .map(|i| BatchItem::new(png_file(&format!("img{i}.png"), 2, 2)))
                .collect();
            let mut recorder = Recorder::default();
            runner
                .run(
                    Tool::Suite,
                    &png_snapshot(),
                    &items,
                    &mut recorder,
                    &mut MemorySink::new(),
                )
                .unwrap();
            let expected: Vec<(usize, usize)> = (1..=25).map(|i| (i, 25)).collect();
            assert_eq!(recorder.progress, expected);
            assert_eq!(recorder.yields, 2);
        }

        #[test]
        fn test_yield_interval_is_configurable() {
            let mut runner = runner().with_yield_every(2);
            let items: Vec<BatchItem> = (0..5)
                .map(|i| BatchItem::new(png_file(&format!("img{i}.png"), 2, 2)))
                .collect();
            let mut recorder = Recorder::default();
            runner
                .run(
                    Tool::Suite,
                    &png_snapshot(),
                    &items,
                    &mut recorder,
                    &mut MemorySink::new(),
                )
                .unwrap();
            assert_eq!(recorder.yields, 2);
        }
    }

    #[test]
    fn test_savings_percent() {
        let report = BatchReport {
            tool: Tool::Compressor,
            total: 1,
            processed: 1,
            failures: Vec::new(),
            download: Download {
                filename: "x.jpg".to_string(),
                mime: "image/jpeg",
                bytes: Vec::new(),
                entries: 1,
            },
            bytes_in: 1000,
            bytes_out: 250,
        };
        assert!((report.savings_percent() - 75.0).abs() < 1e-9);
        let empty = BatchReport {
            bytes_in: 0,
            ..report
        };
        assert_eq!(empty.savings_percent(), 0.0);
    }
}
