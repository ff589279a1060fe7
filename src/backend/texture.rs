// 2D textures: decode, stage, transition, copy, sample
//
// Upload path:
//   UNDEFINED -> TRANSFER_DST_OPTIMAL, copy from staging, -> SHADER_READ_ONLY_OPTIMAL
// all inside one blocking one-time submission.

use super::buffer::StagingBuffer;
use super::error::BackendError;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::path::Path;
use std::sync::Arc;

pub const WHITE: [u8; 4] = [255, 255, 255, 255];
/// Tangent-space +Z
pub const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

/// How texel values are interpreted when sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Albedo and other color data, decoded from sRGB
    Color,
    /// Normal maps and other linear data
    Linear,
}

impl TextureKind {
    pub fn format(self) -> vk::Format {
        match self {
            Self::Color => vk::Format::R8G8B8A8_SRGB,
            Self::Linear => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

/// Barrier masks for the two transitions an upload needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<TransitionMasks, BackendError> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (from, to) => Err(BackendError::UnsupportedLayoutTransition { from, to }),
    }
}

fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let masks = transition_masks(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

/// Decode any supported image file into tightly packed RGBA8.
pub fn decode_rgba8(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
    let image = image::open(path)
        .with_context(|| format!("Failed to decode texture {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    Ok((width, height, image.into_raw()))
}

/// Sampled, device-local 2D texture with its own view and sampler.
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Texture {
    pub fn from_file(device: Arc<VulkanDevice>, path: &Path, kind: TextureKind) -> Result<Self> {
        let (width, height, pixels) = decode_rgba8(path)?;
        log::info!("Loaded texture {} ({}x{})", path.display(), width, height);
        Self::from_rgba8(device, &path.display().to_string(), width, height, &pixels, kind)
    }

    /// 1x1 texture of a single color, used when a material has no map.
    pub fn solid(device: Arc<VulkanDevice>, name: &str, rgba: [u8; 4], kind: TextureKind) -> Result<Self> {
        Self::from_rgba8(device, name, 1, 1, &rgba, kind)
    }

    pub fn from_rgba8(
        device: Arc<VulkanDevice>,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        kind: TextureKind,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        anyhow::ensure!(
            pixels.len() == expected,
            "Texture '{}' has {} bytes, expected {} for {}x{} RGBA",
            name,
            pixels.len(),
            expected,
            width,
            height
        );

        let staging = StagingBuffer::new(device.clone(), pixels, "texture")?;
        let format = kind.format();
        let extent = vk::Extent2D { width, height };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();

        let (image, allocation) = device.create_image(name, &image_info)?;
        let mut texture = Self {
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: Some(allocation),
            device,
        };

        texture.device.submit_one_time(|device, cmd| {
            record_transition(
                device,
                cmd,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                })
                .build();
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            record_transition(
                device,
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })
        .with_context(|| format!("Failed to upload texture '{}'", name))?;

        texture.view = texture
            .device
            .create_image_view(image, format, vk::ImageAspectFlags::COLOR)?;
        texture.sampler = create_sampler(&texture.device)?;

        Ok(texture)
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

    unsafe { device.device.create_sampler(&sampler_info, None) }.context("Failed to create sampler")
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_image(self.image, allocation);
        }
    }
}
