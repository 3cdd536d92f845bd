// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the codec panic policy and the shared result alias.

use crate::error::PixelShiftError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, PixelShiftError>;

/// Run a codec call, turning a panic into `InternalPanic`.
///
/// Native codec bindings (mozjpeg in particular) report some failures by
/// unwinding. Every decode/encode entry point goes through here.
pub fn run_with_panic_policy<T, F>(context: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(target: "pixelshift::codec", context, %detail, "codec panicked");
            Err(PixelShiftError::internal_panic(format!(
                "{context}: panic during processing: {detail}"
            )))
        }
    }
}
