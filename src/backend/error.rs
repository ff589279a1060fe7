// Typed backend failures
//
// Construction paths return anyhow::Result with context attached; the
// variants below are the failures callers are expected to inspect
// (via `downcast_ref::<BackendError>()`).

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("No GPU exposes both a graphics queue and presentation to this surface")]
    NoSuitableAdapter,

    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Surface reports no formats")]
    NoSurfaceFormat,

    #[error("Descriptor pool exhausted while allocating {what}")]
    DescriptorPoolExhausted { what: &'static str },

    #[error("Unsupported image layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    #[error("Uniform write of {size} bytes exceeds buffer size {capacity}")]
    UniformOverflow { size: usize, capacity: usize },

    #[error("Frame slot {index} out of range (max {max})")]
    SlotOutOfRange { index: usize, max: usize },

    #[error("Invalid SPIR-V in {path}: {reason}")]
    InvalidShader { path: String, reason: String },

    #[error("Empty upload payload for {what}")]
    EmptyUpload { what: &'static str },

    #[error("Unsupported window system for surface creation")]
    UnsupportedPlatform,
}

/// Maps a raw allocation result onto the typed exhaustion error where it applies.
pub fn descriptor_alloc_error(result: vk::Result, what: &'static str) -> anyhow::Error {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            BackendError::DescriptorPoolExhausted { what }.into()
        }
        other => anyhow::Error::new(other).context(format!("Failed to allocate {}", what)),
    }
}

/// Runs `cleanup` when `result` failed, then hands the result back. Used
/// where a later construction step fails after earlier objects exist.
pub fn destroy_on_error<T, E>(result: Result<T, E>, cleanup: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        cleanup();
    }
    result
}
