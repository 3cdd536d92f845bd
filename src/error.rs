// src/error.rs
//
// Unified error handling for pixelshift
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or options, rejected before any work starts
// - CodecError: Decode/encode/resize issues, caught at the batch item boundary
// - ResourceLimit: Dimension/pixel/allocation/file system limits
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by the session and the batch orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/dimension/file system limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Stable code string for hosts that surface errors to users.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "PIXELSHIFT_USER_ERROR",
            ErrorCategory::CodecError => "PIXELSHIFT_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "PIXELSHIFT_RESOURCE_LIMIT",
            ErrorCategory::InternalBug => "PIXELSHIFT_INTERNAL_BUG",
        }
    }
}

/// pixelshift error types
///
/// Messages are user-facing: the host shows them verbatim in notifications.
#[derive(Debug, Error)]
pub enum PixelShiftError {
    // File I/O Errors
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Selection Errors
    #[error("Please select images first!")]
    NoImagesSelected,

    #[error("No valid image files selected.")]
    NoValidImages,

    #[error("You can only select up to {max} images. You have {current} already.")]
    SelectionLimitExceeded {
        current: usize,
        attempted: usize,
        max: usize,
    },

    #[error("No image at index {index} (selection has {len})")]
    InvalidSelectionIndex { index: usize, len: usize },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Cannot allocate a {width}x{height} drawing surface: {reason}")]
    SurfaceAllocationFailed {
        width: u32,
        height: u32,
        reason: Cow<'static, str>,
    },

    // Option Errors
    #[error("Please enter valid width and height!")]
    InvalidResizeDimensions {
        width: Option<u32>,
        height: Option<u32>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("No font available for watermark family '{family}'")]
    FontUnavailable { family: Cow<'static, str> },

    #[error("Invalid font data for '{family}': {message}")]
    InvalidFont {
        family: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Unknown tool: '{name}'. Available: compressor, converter, resizer, watermarker, suite")]
    InvalidTool { name: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Batch Errors
    #[error("None of the {total} images could be processed")]
    NothingProcessed { total: usize },

    #[error("Error creating ZIP file: {message}")]
    ArchiveFailed { message: Cow<'static, str> },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for PixelShiftError {
    fn clone(&self) -> Self {
        match self {
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::NoImagesSelected => Self::NoImagesSelected,
            Self::NoValidImages => Self::NoValidImages,
            Self::SelectionLimitExceeded {
                current,
                attempted,
                max,
            } => Self::SelectionLimitExceeded {
                current: *current,
                attempted: *attempted,
                max: *max,
            },
            Self::InvalidSelectionIndex { index, len } => Self::InvalidSelectionIndex {
                index: *index,
                len: *len,
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::SurfaceAllocationFailed {
                width,
                height,
                reason,
            } => Self::SurfaceAllocationFailed {
                width: *width,
                height: *height,
                reason: reason.clone(),
            },
            Self::InvalidResizeDimensions { width, height } => Self::InvalidResizeDimensions {
                width: *width,
                height: *height,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::FontUnavailable { family } => Self::FontUnavailable {
                family: family.clone(),
            },
            Self::InvalidFont { family, message } => Self::InvalidFont {
                family: family.clone(),
                message: message.clone(),
            },
            Self::InvalidTool { name } => Self::InvalidTool { name: name.clone() },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::NothingProcessed { total } => Self::NothingProcessed { total: *total },
            Self::ArchiveFailed { message } => Self::ArchiveFailed {
                message: message.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl PixelShiftError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn selection_limit_exceeded(current: usize, attempted: usize, max: usize) -> Self {
        Self::SelectionLimitExceeded {
            current,
            attempted,
            max,
        }
    }

    pub fn invalid_selection_index(index: usize, len: usize) -> Self {
        Self::InvalidSelectionIndex { index, len }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn surface_allocation_failed(
        width: u32,
        height: u32,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::SurfaceAllocationFailed {
            width,
            height,
            reason: reason.into(),
        }
    }

    pub fn invalid_resize_dimensions(width: Option<u32>, height: Option<u32>) -> Self {
        Self::InvalidResizeDimensions { width, height }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn font_unavailable(family: impl Into<Cow<'static, str>>) -> Self {
        Self::FontUnavailable {
            family: family.into(),
        }
    }

    pub fn invalid_font(
        family: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidFont {
            family: family.into(),
            message: message.into(),
        }
    }

    pub fn invalid_tool(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidTool { name: name.into() }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn nothing_processed(total: usize) -> Self {
        Self::NothingProcessed { total }
    }

    pub fn archive_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::ArchiveFailed {
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable,
    /// CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Whether this error ends a running batch in the `Failed` state.
    ///
    /// Everything else is a per-item failure: recorded, skipped, batch continues.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            Self::ArchiveFailed { .. }
                | Self::SurfaceAllocationFailed { .. }
                | Self::FileWriteFailed { .. }
                | Self::NothingProcessed { .. }
        )
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            // UserError: rejected before the operation starts
            Self::FileNotFound { .. }
            | Self::NoImagesSelected
            | Self::NoValidImages
            | Self::SelectionLimitExceeded { .. }
            | Self::InvalidSelectionIndex { .. }
            | Self::InvalidResizeDimensions { .. }
            | Self::FontUnavailable { .. }
            | Self::InvalidFont { .. }
            | Self::InvalidTool { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            // CodecError: Format/encoding issues
            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. }
            | Self::NothingProcessed { .. }
            | Self::ArchiveFailed { .. } => ErrorCategory::CodecError,

            // ResourceLimit: Memory/dimension/file system limits
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::SurfaceAllocationFailed { .. }
            | Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            // InternalBug: Library bugs (should not happen)
            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PixelShiftError>;
