// src/ops.rs
//
// Option model: the transform configuration read at click time.
// Snapshots are cheap to clone - the expensive work happens in the render pipeline.

use crate::engine::Bitmap;
use crate::error::PixelShiftError;
use image::Rgb;
use std::str::FromStr;
use std::sync::Arc;

/// Default quality used by every tool (jpeg/webp only)
pub const DEFAULT_QUALITY: u8 = 80;

/// Longest edge the compressor view allows before downscaling
pub const COMPRESSOR_MAX_EDGE: u32 = 1920;

/// Size target handed to the lossy optimizer by the compressor view
pub const COMPRESSOR_MAX_OUTPUT_BYTES: u64 = 2 * 1024 * 1024;

/// Requested output format. `Source` keeps the original file's codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Source,
    Jpeg,
    Png,
    WebP,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.trim().to_lowercase().as_str() {
            "source" | "original" => Ok(OutputFormat::Source),
            "jpeg" | "jpg" | "image/jpeg" => Ok(OutputFormat::Jpeg),
            "png" | "image/png" => Ok(OutputFormat::Png),
            "webp" | "image/webp" => Ok(OutputFormat::WebP),
            other => Err(format!(
                "Unsupported format: {other}. Expected source, jpeg, png, or webp"
            )),
        }
    }
}

impl OutputFormat {
    /// Resolve against the original file's declared mime type.
    ///
    /// Anything outside the three supported codecs falls back to PNG.
    pub fn resolve(self, source_mime: &str) -> ResolvedFormat {
        match self {
            OutputFormat::Source => {
                ResolvedFormat::from_mime(source_mime).unwrap_or(ResolvedFormat::Png)
            }
            OutputFormat::Jpeg => ResolvedFormat::Jpeg,
            OutputFormat::Png => ResolvedFormat::Png,
            OutputFormat::WebP => ResolvedFormat::WebP,
        }
    }
}

/// A concrete codec the encoder can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolvedFormat {
    Jpeg,
    Png,
    WebP,
}

impl ResolvedFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" => Some(ResolvedFormat::Jpeg),
            "image/png" => Some(ResolvedFormat::Png),
            "image/webp" => Some(ResolvedFormat::WebP),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ResolvedFormat::Jpeg => "image/jpeg",
            ResolvedFormat::Png => "image/png",
            ResolvedFormat::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ResolvedFormat::Jpeg => "jpg",
            ResolvedFormat::Png => "png",
            ResolvedFormat::WebP => "webp",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedFormat::Jpeg => "jpeg",
            ResolvedFormat::Png => "png",
            ResolvedFormat::WebP => "webp",
        }
    }

    /// Whether quality influences the output
    pub fn is_lossy(self) -> bool {
        !matches!(self, ResolvedFormat::Png)
    }
}

/// Named filter presets. Mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    None,
    Grayscale,
    Sepia,
    Invert,
    Vintage,
    Cool,
    Warm,
    Dramatic,
}

impl Filter {
    pub const ALL: [Filter; 8] = [
        Filter::None,
        Filter::Grayscale,
        Filter::Sepia,
        Filter::Invert,
        Filter::Vintage,
        Filter::Cool,
        Filter::Warm,
        Filter::Dramatic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Filter::None => "none",
            Filter::Grayscale => "grayscale",
            Filter::Sepia => "sepia",
            Filter::Invert => "invert",
            Filter::Vintage => "vintage",
            Filter::Cool => "cool",
            Filter::Warm => "warm",
            Filter::Dramatic => "dramatic",
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "none" | "original" => Ok(Filter::None),
            "grayscale" | "greyscale" => Ok(Filter::Grayscale),
            "sepia" => Ok(Filter::Sepia),
            "invert" => Ok(Filter::Invert),
            "vintage" => Ok(Filter::Vintage),
            "cool" => Ok(Filter::Cool),
            "warm" => Ok(Filter::Warm),
            "dramatic" => Ok(Filter::Dramatic),
            other => Err(format!("Unknown filter: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WatermarkKind {
    #[default]
    Text,
    Image,
}

impl FromStr for WatermarkKind {
    type Err = String;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.trim().to_lowercase().as_str() {
            "text" => Ok(WatermarkKind::Text),
            "image" | "logo" => Ok(WatermarkKind::Image),
            other => Err(format!("Unknown watermark type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerticalAnchor {
    Top,
    Middle,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HorizontalAnchor {
    Left,
    Center,
    Right,
}

/// One of the 9 grid positions, written `<vertical>-<horizontal>` (e.g. `bottom-right`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub vertical: VerticalAnchor,
    pub horizontal: HorizontalAnchor,
}

impl Anchor {
    pub const fn new(vertical: VerticalAnchor, horizontal: HorizontalAnchor) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }

    pub fn all() -> impl Iterator<Item = Anchor> {
        [
            VerticalAnchor::Top,
            VerticalAnchor::Middle,
            VerticalAnchor::Bottom,
        ]
        .into_iter()
        .flat_map(|v| {
            [
                HorizontalAnchor::Left,
                HorizontalAnchor::Center,
                HorizontalAnchor::Right,
            ]
            .into_iter()
            .map(move |h| Anchor::new(v, h))
        })
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::new(VerticalAnchor::Middle, HorizontalAnchor::Center)
    }
}

impl FromStr for Anchor {
    type Err = String;

    fn from_str(position: &str) -> Result<Self, Self::Err> {
        let lowered = position.trim().to_lowercase();
        let (v, h) = lowered
            .split_once('-')
            .ok_or_else(|| format!("Invalid position: {position}"))?;
        let vertical = match v {
            "top" => VerticalAnchor::Top,
            "middle" => VerticalAnchor::Middle,
            "bottom" => VerticalAnchor::Bottom,
            _ => return Err(format!("Invalid vertical position: {v}")),
        };
        let horizontal = match h {
            "left" => HorizontalAnchor::Left,
            "center" => HorizontalAnchor::Center,
            "right" => HorizontalAnchor::Right,
            _ => return Err(format!("Invalid horizontal position: {h}")),
        };
        Ok(Anchor::new(vertical, horizontal))
    }
}

/// Parse `#RGB` or `#RRGGBB` (leading `#` optional).
pub fn parse_hex_color(hex: &str) -> Option<Rgb<u8>> {
    let hex = hex.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (slot, c) in rgb.iter_mut().zip(hex.chars()) {
                let nibble = c.to_digit(16)? as u8;
                *slot = nibble * 17;
            }
            Some(Rgb(rgb))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Rgb([r, g, b]))
        }
        _ => None,
    }
}

/// Watermark sub-configuration.
#[derive(Clone, Debug)]
pub struct WatermarkOptions {
    pub kind: WatermarkKind,
    pub text: String,
    /// Font family, resolved against the renderer's font book
    pub font: String,
    pub color: Rgb<u8>,
    /// Global alpha in [0, 1]
    pub opacity: f32,
    /// Size as a percentage of the surface width
    pub size_percent: u32,
    pub anchor: Anchor,
    pub logo: Option<Arc<Bitmap>>,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Text,
            text: String::new(),
            font: "Inter".to_string(),
            color: Rgb([255, 255, 255]),
            opacity: 0.5,
            size_percent: 10,
            anchor: Anchor::default(),
            logo: None,
        }
    }
}

impl WatermarkOptions {
    /// Derived: text mode needs non-empty text, image mode needs a logo.
    pub fn is_enabled(&self) -> bool {
        match self.kind {
            WatermarkKind::Text => !self.text.is_empty(),
            WatermarkKind::Image => self.logo.is_some(),
        }
    }
}

/// Full transform configuration at the moment of processing.
#[derive(Clone, Debug)]
pub struct OptionSnapshot {
    pub format: OutputFormat,
    /// 0-100, meaningful only when the format resolves to jpeg/webp
    pub quality: u8,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    /// Cap on the longest output edge, applied after the target-size rule
    pub max_edge: Option<u32>,
    /// Size target for the lossy optimizer
    pub max_output_bytes: Option<u64>,
    pub filter: Filter,
    pub watermark: WatermarkOptions,
}

impl Default for OptionSnapshot {
    fn default() -> Self {
        Self {
            format: OutputFormat::Source,
            quality: DEFAULT_QUALITY,
            target_width: None,
            target_height: None,
            max_edge: None,
            max_output_bytes: None,
            filter: Filter::None,
            watermark: WatermarkOptions::default(),
        }
    }
}

/// Mutable option state fed by raw UI input.
///
/// Every setter returns whether the value was accepted. Rejected input keeps
/// the previous value; validation with user-facing errors happens at batch
/// start (see [`Tool::validate`]).
#[derive(Clone, Debug, Default)]
pub struct OptionModel {
    current: OptionSnapshot,
}

impl OptionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> OptionSnapshot {
        self.current.clone()
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.current.format = format;
    }

    pub fn set_format_input(&mut self, input: &str) -> bool {
        match input.parse() {
            Ok(format) => {
                self.current.format = format;
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_quality_input(&mut self, input: &str) -> bool {
        match input.trim().parse::<i64>() {
            Ok(q) if (0..=100).contains(&q) => {
                self.current.quality = q as u8;
                true
            }
            _ => false,
        }
    }

    /// Empty input clears the dimension; non-positive or non-numeric input is ignored.
    pub fn set_width_input(&mut self, input: &str) -> bool {
        match parse_dimension(input) {
            Some(value) => {
                self.current.target_width = value;
                true
            }
            None => false,
        }
    }

    pub fn set_height_input(&mut self, input: &str) -> bool {
        match parse_dimension(input) {
            Some(value) => {
                self.current.target_height = value;
                true
            }
            None => false,
        }
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.current.filter = filter;
    }

    pub fn set_filter_input(&mut self, input: &str) -> bool {
        match input.parse() {
            Ok(filter) => {
                self.current.filter = filter;
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_watermark_kind_input(&mut self, input: &str) -> bool {
        match input.parse() {
            Ok(kind) => {
                self.current.watermark.kind = kind;
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_watermark_text(&mut self, text: impl Into<String>) {
        self.current.watermark.text = text.into();
    }

    pub fn set_watermark_font(&mut self, family: impl Into<String>) {
        self.current.watermark.font = family.into();
    }

    pub fn set_watermark_color_input(&mut self, input: &str) -> bool {
        match parse_hex_color(input) {
            Some(color) => {
                self.current.watermark.color = color;
                true
            }
            None => false,
        }
    }

    pub fn set_watermark_opacity_input(&mut self, input: &str) -> bool {
        match input.trim().parse::<f32>() {
            Ok(v) if v.is_finite() && (0.0..=1.0).contains(&v) => {
                self.current.watermark.opacity = v;
                true
            }
            _ => false,
        }
    }

    pub fn set_watermark_size_input(&mut self, input: &str) -> bool {
        match input.trim().parse::<i64>() {
            Ok(v) if (1..=100).contains(&v) => {
                self.current.watermark.size_percent = v as u32;
                true
            }
            _ => false,
        }
    }

    pub fn set_watermark_position_input(&mut self, input: &str) -> bool {
        match input.parse() {
            Ok(anchor) => {
                self.current.watermark.anchor = anchor;
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_logo(&mut self, logo: Option<Arc<Bitmap>>) {
        self.current.watermark.logo = logo;
    }

    /// Back to defaults (explicit session clear)
    pub fn reset(&mut self) {
        self.current = OptionSnapshot::default();
    }
}

/// `Some(None)` clears, `Some(Some(n))` sets, `None` rejects.
fn parse_dimension(input: &str) -> Option<Option<u32>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(None);
    }
    match trimmed.parse::<i64>() {
        Ok(v) if v > 0 && v <= u32::MAX as i64 => Some(Some(v as u32)),
        _ => None,
    }
}

/// The tool variants. Each is a restriction view over the general snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    Compressor,
    Converter,
    Resizer,
    Watermarker,
    #[default]
    Suite,
}

impl FromStr for Tool {
    type Err = PixelShiftError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "compressor" | "compress" => Ok(Tool::Compressor),
            "converter" | "convert" => Ok(Tool::Converter),
            "resizer" | "resize" => Ok(Tool::Resizer),
            "watermarker" | "watermark" => Ok(Tool::Watermarker),
            "suite" => Ok(Tool::Suite),
            other => Err(PixelShiftError::invalid_tool(other.to_string())),
        }
    }
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Compressor => "compressor",
            Tool::Converter => "converter",
            Tool::Resizer => "resizer",
            Tool::Watermarker => "watermarker",
            Tool::Suite => "suite",
        }
    }

    /// Filename suffix for outputs: `<stem>-<suffix>.<ext>`
    pub fn suffix(self) -> &'static str {
        match self {
            Tool::Compressor => "compressed",
            Tool::Converter => "converted",
            Tool::Resizer => "resized",
            Tool::Watermarker => "watermarked",
            Tool::Suite => "processed",
        }
    }

    /// Operation part of the archive name (`<Product>-<Operation>.zip`)
    pub fn archive_operation(self) -> &'static str {
        match self {
            Tool::Compressor => "Compressed",
            Tool::Converter => "Images",
            Tool::Resizer => "Resized",
            Tool::Watermarker => "Watermarked",
            Tool::Suite => "Processed",
        }
    }

    /// Selection cap
    pub fn max_items(self) -> usize {
        match self {
            Tool::Compressor | Tool::Suite => 500,
            Tool::Converter | Tool::Resizer | Tool::Watermarker => 50,
        }
    }

    /// Restrict a general snapshot to the options this tool exposes.
    pub fn view(self, snapshot: &OptionSnapshot) -> OptionSnapshot {
        let base = OptionSnapshot::default();
        match self {
            Tool::Suite => snapshot.clone(),
            Tool::Compressor => OptionSnapshot {
                format: OutputFormat::Jpeg,
                quality: snapshot.quality,
                max_edge: Some(COMPRESSOR_MAX_EDGE),
                max_output_bytes: Some(COMPRESSOR_MAX_OUTPUT_BYTES),
                ..base
            },
            Tool::Converter => OptionSnapshot {
                format: snapshot.format,
                quality: snapshot.quality,
                ..base
            },
            Tool::Resizer => OptionSnapshot {
                format: OutputFormat::Source,
                quality: 100,
                target_width: snapshot.target_width,
                target_height: snapshot.target_height,
                ..base
            },
            Tool::Watermarker => OptionSnapshot {
                format: OutputFormat::Png,
                watermark: snapshot.watermark.clone(),
                ..base
            },
        }
    }

    /// Batch-start validation on an already restricted snapshot.
    pub fn validate(self, snapshot: &OptionSnapshot) -> crate::error::Result<()> {
        if self == Tool::Resizer
            && (snapshot.target_width.is_none() || snapshot.target_height.is_none())
        {
            return Err(PixelShiftError::invalid_resize_dimensions(
                snapshot.target_width,
                snapshot.target_height,
            ));
        }
        if matches!(snapshot.target_width, Some(0)) || matches!(snapshot.target_height, Some(0)) {
            return Err(PixelShiftError::invalid_resize_dimensions(
                snapshot.target_width,
                snapshot.target_height,
            ));
        }
        if !(0.0..=1.0).contains(&snapshot.watermark.opacity) {
            return Err(PixelShiftError::invalid_argument(
                "opacity",
                snapshot.watermark.opacity.to_string(),
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}
