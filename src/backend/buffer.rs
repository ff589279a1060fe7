// Buffers: staging-mediated device-local uploads and per-frame uniforms
//
// Read-only geometry goes through a host-visible staging buffer and a
// blocking one-time copy. Uniform buffers stay persistently mapped, one
// per frame in flight, and are written directly (host-coherent, no flush).

use super::error::BackendError;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

fn host_visible() -> vk::MemoryPropertyFlags {
    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
}

/// Copy `data` into the front of a mapped region, rejecting writes past its end.
pub fn write_mapped(dst: &mut [u8], data: &[u8]) -> Result<(), BackendError> {
    if data.len() > dst.len() {
        return Err(BackendError::UniformOverflow {
            size: data.len(),
            capacity: dst.len(),
        });
    }
    dst[..data.len()].copy_from_slice(data);
    Ok(())
}

/// Host-visible scratch buffer, filled once and dropped after its copy.
pub struct StagingBuffer {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl StagingBuffer {
    pub fn new(device: Arc<VulkanDevice>, bytes: &[u8], what: &'static str) -> Result<Self> {
        if bytes.is_empty() {
            return Err(BackendError::EmptyUpload { what }.into());
        }

        let size = bytes.len() as vk::DeviceSize;
        let (buffer, memory) =
            device.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, host_visible())?;
        let staging = Self {
            buffer,
            memory,
            size,
            device,
        };

        // Coherent memory: visible to the following copy without a flush
        unsafe {
            let ptr = staging
                .device
                .device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
                .context("Failed to map staging memory")? as *mut u8;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            staging.device.device.unmap_memory(memory);
        }

        Ok(staging)
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

/// Device-local buffer populated once at creation, immutable afterwards.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    /// Stage `bytes`, copy them into a new device-local buffer with `usage`,
    /// and block until the copy retired.
    pub fn upload(
        device: Arc<VulkanDevice>,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
        what: &'static str,
    ) -> Result<Self> {
        let staging = StagingBuffer::new(device.clone(), bytes, what)?;
        let size = staging.size;

        let (buffer, memory) = device.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let gpu = Self {
            buffer,
            memory,
            device,
        };

        gpu.device.submit_one_time(|device, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, buffer, &[region]) };
            Ok(())
        })
        .with_context(|| format!("Failed to upload {}", what))?;

        log::debug!("Uploaded {} ({} bytes)", what, size);
        Ok(gpu)
    }

    pub fn vertex<T: bytemuck::Pod>(device: Arc<VulkanDevice>, vertices: &[T]) -> Result<Self> {
        Self::upload(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(vertices),
            "vertex buffer",
        )
    }

    pub fn index(device: Arc<VulkanDevice>, indices: &[u32]) -> Result<Self> {
        Self::upload(
            device,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(indices),
            "index buffer",
        )
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

struct MappedBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut u8,
}

/// One persistently mapped uniform buffer per frame in flight.
///
/// A slot is only written after that slot's fence wait, so the GPU never
/// reads a buffer the CPU is writing.
pub struct UniformBuffers {
    buffers: Vec<MappedBuffer>,
    size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl UniformBuffers {
    pub fn new(device: Arc<VulkanDevice>, size: vk::DeviceSize, frames_in_flight: usize) -> Result<Self> {
        let mut uniforms = Self {
            buffers: Vec::with_capacity(frames_in_flight),
            size,
            device,
        };

        for _ in 0..frames_in_flight {
            let (buffer, memory) = uniforms.device.create_buffer(
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                host_visible(),
            )?;
            let mapped = match unsafe {
                uniforms
                    .device
                    .device
                    .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
            } {
                Ok(ptr) => ptr as *mut u8,
                Err(e) => {
                    unsafe {
                        uniforms.device.device.destroy_buffer(buffer, None);
                        uniforms.device.device.free_memory(memory, None);
                    }
                    return Err(anyhow::Error::new(e).context("Failed to map uniform buffer"));
                }
            };
            uniforms.buffers.push(MappedBuffer { buffer, memory, mapped });
        }

        log::debug!("Created {} uniform buffers of {} bytes", frames_in_flight, size);
        Ok(uniforms)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    fn slot(&self, frame_index: usize) -> Result<&MappedBuffer, BackendError> {
        self.buffers.get(frame_index).ok_or(BackendError::SlotOutOfRange {
            index: frame_index,
            max: self.buffers.len(),
        })
    }

    /// Overwrite the start of `frame_index`'s buffer with `data`.
    pub fn update(&self, frame_index: usize, data: &[u8]) -> Result<(), BackendError> {
        let slot = self.slot(frame_index)?;
        // Mapped for the lifetime of `self`, exactly `size` bytes long
        let dst = unsafe { std::slice::from_raw_parts_mut(slot.mapped, self.size as usize) };
        write_mapped(dst, data)
    }

    pub fn update_pod<T: bytemuck::Pod>(&self, frame_index: usize, value: &T) -> Result<(), BackendError> {
        self.update(frame_index, bytemuck::bytes_of(value))
    }

    pub fn descriptor_info(&self, frame_index: usize) -> Result<vk::DescriptorBufferInfo, BackendError> {
        let slot = self.slot(frame_index)?;
        Ok(vk::DescriptorBufferInfo {
            buffer: slot.buffer,
            offset: 0,
            range: self.size,
        })
    }
}

impl Drop for UniformBuffers {
    fn drop(&mut self) {
        for slot in &self.buffers {
            unsafe {
                self.device.device.unmap_memory(slot.memory);
                self.device.device.destroy_buffer(slot.buffer, None);
                self.device.device.free_memory(slot.memory, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_write_round_trips() {
        let capacity = 256;
        for size in [0usize, 1, 3, 64, 200, 256] {
            let mut mapped = vec![0xAAu8; capacity];
            let data: Vec<u8> = (0..size).map(|i| (i * 7 % 251) as u8).collect();

            write_mapped(&mut mapped, &data).unwrap();

            assert_eq!(&mapped[..size], data.as_slice());
            // Bytes past the write stay untouched
            assert!(mapped[size..].iter().all(|&b| b == 0xAA));
        }
    }

    #[test]
    fn mapped_write_rejects_overflow() {
        let mut mapped = vec![0u8; 16];
        assert_eq!(
            write_mapped(&mut mapped, &[1u8; 17]),
            Err(BackendError::UniformOverflow {
                size: 17,
                capacity: 16
            })
        );
        assert!(mapped.iter().all(|&b| b == 0));
    }

    #[test]
    fn pod_values_round_trip_through_mapped_bytes() {
        let matrix = glam::Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let mut mapped = vec![0u8; 128];
        write_mapped(&mut mapped, bytemuck::bytes_of(&matrix)).unwrap();

        let back: glam::Mat4 = bytemuck::pod_read_unaligned(&mapped[..64]);
        assert_eq!(back, matrix);
    }
}
