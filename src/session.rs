// src/session.rs
//
// Session: the selection, the option model, fonts and tool configuration for
// one user session. Entry point for hosts (CLI, UI bindings, tests).

use crate::engine::{
    ArchivePackager, BatchItem, BatchObserver, BatchReport, BatchRunner, BatchState, Bitmap,
    DownloadSink, Encoder, FontBook, InputFile, RenderResult, Renderer, ZipPackager,
    DEFAULT_PRODUCT, DEFAULT_YIELD_EVERY,
};
use crate::error::{PixelShiftError, Result};
use crate::ops::{OptionModel, OptionSnapshot, Tool};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tool, selection cap and batch pacing for a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub tool: Tool,
    pub max_items: usize,
    pub yield_every: usize,
    /// Prefix of archive names: `<product>-<Operation>.zip`
    pub product: String,
}

impl SessionConfig {
    pub fn for_tool(tool: Tool) -> Self {
        Self {
            tool,
            max_items: tool.max_items(),
            yield_every: DEFAULT_YIELD_EVERY,
            product: DEFAULT_PRODUCT.to_string(),
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_yield_every(mut self, yield_every: usize) -> Self {
        self.yield_every = yield_every;
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::for_tool(Tool::default())
    }
}

/// Outcome of adding files to the selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Files added to the selection, decodable or not
    pub accepted: usize,
    /// Names dropped because their mime type is not `image/*`
    pub skipped: Vec<String>,
    /// Files kept in the selection that failed to decode, with the reason
    pub decode_failures: Vec<(String, String)>,
}

pub struct Session {
    config: SessionConfig,
    options: OptionModel,
    fonts: Arc<FontBook>,
    encoder: Encoder,
    packager: Arc<dyn ArchivePackager>,
    selection: Vec<BatchItem>,
    preview_index: usize,
    state: BatchState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("selection", &self.selection.len())
            .field("fonts", &self.fonts)
            .field("encoder", &self.encoder)
            .field("state", &self.state)
            .finish()
    }
}

impl Session {
    /// New session with the system fallback font and the optimizing encoder.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            options: OptionModel::new(),
            fonts: Arc::new(FontBook::with_system_fallback()),
            encoder: Encoder::default(),
            packager: Arc::new(ZipPackager),
            selection: Vec::new(),
            preview_index: 0,
            state: BatchState::Idle,
        }
    }

    pub fn for_tool(tool: Tool) -> Self {
        Self::new(SessionConfig::for_tool(tool))
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_packager(mut self, packager: Arc<dyn ArchivePackager>) -> Self {
        self.packager = packager;
        self
    }

    pub fn with_fonts(mut self, fonts: FontBook) -> Self {
        self.fonts = Arc::new(fonts);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tool(&self) -> Tool {
        self.config.tool
    }

    pub fn options(&self) -> &OptionModel {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut OptionModel {
        &mut self.options
    }

    /// Snapshot restricted to what the session's tool exposes
    pub fn snapshot(&self) -> OptionSnapshot {
        self.config.tool.view(&self.options.snapshot())
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn register_font(&mut self, family: impl Into<String>, data: Vec<u8>) -> Result<()> {
        Arc::make_mut(&mut self.fonts).register(family, data)
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.selection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.selection
    }

    /// Add files to the selection.
    ///
    /// Non-image files are dropped. The whole call is rejected when nothing is
    /// an image or when the images would push the selection over the cap.
    /// Accepted files are decoded in parallel; a file that fails to decode
    /// stays selected and is reported here and again when the batch runs.
    pub fn add_files(&mut self, files: Vec<InputFile>) -> Result<LoadReport> {
        let (images, others): (Vec<InputFile>, Vec<InputFile>) =
            files.into_iter().partition(InputFile::is_image);
        if images.is_empty() {
            return Err(PixelShiftError::NoValidImages);
        }

        let current = self.selection.len();
        if current + images.len() > self.config.max_items {
            return Err(PixelShiftError::selection_limit_exceeded(
                current,
                images.len(),
                self.config.max_items,
            ));
        }

        let decoded: Vec<(InputFile, Result<Bitmap>)> = images
            .into_par_iter()
            .map(|file| {
                let bitmap = file.decode();
                (file, bitmap)
            })
            .collect();

        let mut report = LoadReport {
            accepted: decoded.len(),
            skipped: others.into_iter().map(|f| f.name).collect(),
            decode_failures: Vec::new(),
        };
        for (file, bitmap) in decoded {
            match bitmap {
                Ok(bitmap) => self
                    .selection
                    .push(BatchItem::decoded(file, Arc::new(bitmap))),
                Err(err) => {
                    warn!(
                        target: "pixelshift::session",
                        name = %file.name,
                        error = %err,
                        "selected file could not be decoded"
                    );
                    report.decode_failures.push((file.name.clone(), err.to_string()));
                    self.selection.push(BatchItem::new(file));
                }
            }
        }

        info!(
            target: "pixelshift::session",
            accepted = report.accepted,
            skipped = report.skipped.len(),
            undecodable = report.decode_failures.len(),
            selected = self.selection.len(),
            "files added"
        );
        Ok(report)
    }

    pub fn remove(&mut self, index: usize) -> Result<InputFile> {
        if index >= self.selection.len() {
            return Err(PixelShiftError::invalid_selection_index(
                index,
                self.selection.len(),
            ));
        }
        let item = self.selection.remove(index);
        if self.preview_index >= self.selection.len() {
            self.preview_index = self.selection.len().saturating_sub(1);
        }
        Ok(item.file)
    }

    /// Drop the selection, its bitmaps and the logo. Other options and fonts stay.
    pub fn clear(&mut self) {
        self.selection.clear();
        self.options.set_logo(None);
        self.preview_index = 0;
        self.state = BatchState::Idle;
        debug!(target: "pixelshift::session", "selection cleared");
    }

    /// Decode `file` and use it as the watermark logo.
    pub fn set_logo(&mut self, file: &InputFile) -> Result<()> {
        let bitmap = file.decode()?;
        self.options.set_logo(Some(Arc::new(bitmap)));
        Ok(())
    }

    pub fn clear_logo(&mut self) {
        self.options.set_logo(None);
    }

    pub fn preview_index(&self) -> usize {
        self.preview_index
    }

    pub fn set_preview_index(&mut self, index: usize) -> Result<()> {
        if index >= self.selection.len() {
            return Err(PixelShiftError::invalid_selection_index(
                index,
                self.selection.len(),
            ));
        }
        self.preview_index = index;
        Ok(())
    }

    fn renderer(&self) -> Renderer {
        Renderer::new(Arc::clone(&self.fonts))
    }

    /// Render the preview item with the current options. No encoding.
    pub fn preview(&self) -> Result<RenderResult> {
        let item = self
            .selection
            .get(self.preview_index)
            .ok_or(PixelShiftError::NoImagesSelected)?;
        let bitmap = match &item.bitmap {
            Some(bitmap) => Arc::clone(bitmap),
            None => Arc::new(item.file.decode()?),
        };
        self.renderer().render(&bitmap, &self.snapshot())
    }

    /// Run a batch over the whole selection with the options as they are now.
    #[tracing::instrument(
        target = "pixelshift::session",
        skip_all,
        fields(tool = self.config.tool.as_str(), items = self.selection.len())
    )]
    pub fn process(
        &mut self,
        observer: &mut dyn BatchObserver,
        sink: &mut dyn DownloadSink,
    ) -> Result<BatchReport> {
        let mut runner = BatchRunner::new(self.renderer(), self.encoder.clone())
            .with_packager(Arc::clone(&self.packager))
            .with_yield_every(self.config.yield_every)
            .with_product(self.config.product.clone());
        let snapshot = self.options.snapshot();
        let result = runner.run(self.config.tool, &snapshot, &self.selection, observer, sink);
        if *runner.state() != BatchState::Idle {
            self.state = runner.state().clone();
        }
        result
    }
}
