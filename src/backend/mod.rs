// Backend module - Vulkan abstraction layer
//
// Design: Thin wrappers around ash, one owner per Vulkan object
// Every wrapper holds an Arc to its parent, so drop order follows ownership

pub mod attachments;
pub mod buffer;
pub mod commands;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use device::VulkanDevice;
pub use error::BackendError;
pub use instance::{Instance, Surface};
pub use swapchain::Swapchain;
