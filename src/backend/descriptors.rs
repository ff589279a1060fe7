// Descriptor layouts, pools and sets
//
// Set 0 (global): one uniform buffer per frame in flight, visible to both stages.
// Set 1 (material): albedo + normal combined image samplers, fragment only.
// Pools are split by owner. Global sets live as long as the uniform buffers;
// material sets are never freed individually and go away with their pool.

use super::buffer::UniformBuffers;
use super::error::{descriptor_alloc_error, BackendError};
use super::texture::Texture;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

pub const GLOBAL_SET: u32 = 0;

pub const ALBEDO_BINDING: u32 = 0;
pub const NORMAL_BINDING: u32 = 1;

pub fn global_layout_bindings() -> [vk::DescriptorSetLayoutBinding; 1] {
    [vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        .build()]
}

pub fn material_layout_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    let sampler = |binding| {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()
    };
    [sampler(ALBEDO_BINDING), sampler(NORMAL_BINDING)]
}

pub fn global_pool_sizes(frames_in_flight: u32) -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: frames_in_flight,
    }]
}

pub fn material_pool_sizes(max_materials: u32) -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: max_materials.saturating_mul(2),
    }]
}

/// Owned descriptor set layout.
pub struct DescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    device: Arc<VulkanDevice>,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<VulkanDevice>, bindings: &[vk::DescriptorSetLayoutBinding]) -> Result<Self> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;
        Ok(Self { layout, device })
    }

    pub fn global(device: Arc<VulkanDevice>) -> Result<Self> {
        Self::new(device, &global_layout_bindings())
    }

    pub fn material(device: Arc<VulkanDevice>) -> Result<Self> {
        Self::new(device, &material_layout_bindings())
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

fn create_pool(
    device: &VulkanDevice,
    max_sets: u32,
    sizes: &[vk::DescriptorPoolSize],
) -> Result<vk::DescriptorPool> {
    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(sizes)
        .max_sets(max_sets);
    unsafe { device.device.create_descriptor_pool(&pool_info, None) }
        .context("Failed to create descriptor pool")
}

/// Set 0: exactly one set per frame in flight, each permanently bound to
/// that frame's uniform buffer.
pub struct GlobalDescriptors {
    pub layout: DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    device: Arc<VulkanDevice>,
}

impl GlobalDescriptors {
    pub fn new(device: Arc<VulkanDevice>, uniforms: &UniformBuffers) -> Result<Self> {
        let frames = uniforms.len() as u32;
        let layout = DescriptorSetLayout::global(device.clone())?;
        let pool = create_pool(&device, frames, &global_pool_sizes(frames))?;

        let mut global = Self {
            layout,
            pool,
            sets: Vec::new(),
            device,
        };

        let layouts = vec![global.layout.layout; frames as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        global.sets = unsafe { global.device.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| descriptor_alloc_error(e, "global descriptor sets"))?;

        for (frame, &set) in global.sets.iter().enumerate() {
            let buffer_info = [uniforms.descriptor_info(frame)?];
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build();
            unsafe { global.device.device.update_descriptor_sets(&[write], &[]) };
        }

        log::debug!("Allocated {} global descriptor sets", frames);
        Ok(global)
    }

    pub fn set(&self, frame_index: usize) -> Result<vk::DescriptorSet, BackendError> {
        self.sets
            .get(frame_index)
            .copied()
            .ok_or(BackendError::SlotOutOfRange {
                index: frame_index,
                max: self.sets.len(),
            })
    }
}

impl Drop for GlobalDescriptors {
    fn drop(&mut self) {
        // Sets are returned with the pool
        unsafe { self.device.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Set 1 pool with a fixed capacity of material instances.
pub struct MaterialDescriptorPool {
    pool: vk::DescriptorPool,
    max_sets: u32,
    allocated: u32,
    device: Arc<VulkanDevice>,
}

impl MaterialDescriptorPool {
    pub fn new(device: Arc<VulkanDevice>, max_materials: u32) -> Result<Self> {
        let pool = create_pool(&device, max_materials, &material_pool_sizes(max_materials))?;
        log::debug!("Material descriptor pool: {} sets", max_materials);
        Ok(Self {
            pool,
            max_sets: max_materials,
            allocated: 0,
            device,
        })
    }

    pub fn remaining(&self) -> u32 {
        self.max_sets - self.allocated
    }

    /// Allocate one set-1 instance and point it at the two textures.
    ///
    /// Fails with `BackendError::DescriptorPoolExhausted` once capacity is
    /// reached; the pool itself stays usable for existing sets.
    pub fn allocate(
        &mut self,
        layout: &DescriptorSetLayout,
        albedo: &Texture,
        normal: &Texture,
    ) -> Result<vk::DescriptorSet> {
        if self.allocated >= self.max_sets {
            return Err(BackendError::DescriptorPoolExhausted {
                what: "material descriptor set",
            }
            .into());
        }

        let layouts = [layout.layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let set = unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| descriptor_alloc_error(e, "material descriptor set"))?[0];
        self.allocated += 1;

        let albedo_info = [albedo.descriptor_info()];
        let normal_info = [normal.descriptor_info()];
        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(ALBEDO_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&albedo_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(NORMAL_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&normal_info)
                .build(),
        ];
        unsafe { self.device.device.update_descriptor_sets(&writes, &[]) };

        Ok(set)
    }
}

impl Drop for MaterialDescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_descriptor_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_binding_is_shared_uniform() {
        let [binding] = global_layout_bindings();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(
            binding.stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn material_bindings_are_fragment_samplers() {
        let bindings = material_layout_bindings();
        assert_eq!(bindings[0].binding, ALBEDO_BINDING);
        assert_eq!(bindings[1].binding, NORMAL_BINDING);
        for binding in bindings {
            assert_eq!(
                binding.descriptor_type,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            );
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
        }
    }

    #[test]
    fn pools_sized_by_owner() {
        assert_eq!(global_pool_sizes(2)[0].descriptor_count, 2);
        // Two samplers per material instance
        assert_eq!(material_pool_sizes(100)[0].descriptor_count, 200);
    }

    #[test]
    fn huge_material_count_saturates() {
        assert_eq!(material_pool_sizes(u32::MAX)[0].descriptor_count, u32::MAX);
        assert_eq!(material_pool_sizes(u32::MAX / 2 + 1)[0].descriptor_count, u32::MAX);
    }
}
