// Command pool + one primary command buffer per swapchain image
//
// Buffers are reset individually and re-recorded every frame they are used.

use super::error::BackendError;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

pub struct CommandBuffers {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    device: Arc<VulkanDevice>,
}

impl CommandBuffers {
    pub fn new(device: Arc<VulkanDevice>, count: usize) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let mut commands = Self {
            pool,
            buffers: Vec::new(),
            device,
        };
        commands.reallocate(count)?;
        Ok(commands)
    }

    /// Free the current buffers and allocate `count` fresh ones.
    /// The device must be idle.
    pub fn reallocate(&mut self, count: usize) -> Result<()> {
        if !self.buffers.is_empty() {
            unsafe {
                self.device
                    .device
                    .free_command_buffers(self.pool, &self.buffers)
            };
            self.buffers.clear();
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);

        self.buffers = unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        log::debug!("Allocated {} command buffers", count);
        Ok(())
    }

    pub fn get(&self, image_index: usize) -> Result<vk::CommandBuffer, BackendError> {
        self.buffers
            .get(image_index)
            .copied()
            .ok_or(BackendError::SlotOutOfRange {
                index: image_index,
                max: self.buffers.len(),
            })
    }
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        // Freeing the pool frees its buffers
        unsafe { self.device.device.destroy_command_pool(self.pool, None) };
    }
}
