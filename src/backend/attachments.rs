// Render targets sized to the swapchain: depth and multisampled color
//
// Neither receives uploads; they are written by the render pass only.
// Both must be rebuilt whenever the swapchain extent changes.
// At 1x there is no color image: the pass draws into the swapchain image.

use super::render_pass::RenderPass;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Depth,
    MsaaColor,
}

impl AttachmentKind {
    pub fn usage(self) -> vk::ImageUsageFlags {
        match self {
            Self::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            // Resolved at subpass end and never read back, so memory may stay lazy
            Self::MsaaColor => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
            }
        }
    }

    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            Self::Depth => vk::ImageAspectFlags::DEPTH,
            Self::MsaaColor => vk::ImageAspectFlags::COLOR,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Depth => "depth attachment",
            Self::MsaaColor => "msaa color attachment",
        }
    }
}

/// Create info for a single-mip, single-layer optimal-tiling 2D attachment.
pub fn attachment_image_info(
    kind: AttachmentKind,
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(kind.usage())
        .samples(samples)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .build()
}

/// One GPU image + memory + view used as a framebuffer attachment.
pub struct AttachmentImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

pub type DepthBuffer = AttachmentImage;
pub type MsaaColorBuffer = AttachmentImage;

impl AttachmentImage {
    /// Depth attachment in the device's selected depth format and sample count.
    pub fn depth(device: Arc<VulkanDevice>, extent: vk::Extent2D) -> Result<DepthBuffer> {
        let format = device.depth_format;
        if format == vk::Format::UNDEFINED {
            anyhow::bail!("Device has no usable depth format");
        }
        Self::new(device, AttachmentKind::Depth, format, extent)
    }

    /// Multisampled color attachment matching the swapchain format.
    pub fn msaa_color(
        device: Arc<VulkanDevice>,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<MsaaColorBuffer> {
        Self::new(device, AttachmentKind::MsaaColor, format, extent)
    }

    /// The multisampled color image a render pass needs, if it resolves at all.
    pub fn msaa_color_for(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> Result<Option<MsaaColorBuffer>> {
        if render_pass.layout.resolve.is_none() {
            log::debug!("Single-sample pass, no multisampled color image");
            return Ok(None);
        }
        Self::msaa_color(device, render_pass.color_format, extent).map(Some)
    }

    fn new(
        device: Arc<VulkanDevice>,
        kind: AttachmentKind,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let info = attachment_image_info(kind, format, extent, device.msaa_samples);
        let (image, allocation) = device.create_image(kind.label(), &info)?;

        let view = match device.create_image_view(image, format, kind.aspect()) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image, allocation);
                return Err(e).with_context(|| format!("Failed to create {} view", kind.label()));
            }
        };

        log::debug!(
            "Created {} {}x{} ({:?}, {:?})",
            kind.label(),
            extent.width,
            extent.height,
            format,
            device.msaa_samples
        );

        Ok(Self {
            image,
            view,
            allocation: Some(allocation),
            device,
        })
    }
}

impl Drop for AttachmentImage {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_image_view(self.view, None) };
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_image(self.image, allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_info_matches_extent_and_samples() {
        let extent = vk::Extent2D { width: 1280, height: 720 };
        let info = attachment_image_info(
            AttachmentKind::Depth,
            vk::Format::D32_SFLOAT,
            extent,
            vk::SampleCountFlags::TYPE_4,
        );

        assert_eq!(info.extent.width, 1280);
        assert_eq!(info.extent.height, 720);
        assert_eq!(info.extent.depth, 1);
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(info.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(info.mip_levels, 1);
    }

    #[test]
    fn kinds_use_matching_aspects() {
        assert_eq!(AttachmentKind::Depth.aspect(), vk::ImageAspectFlags::DEPTH);
        assert_eq!(AttachmentKind::MsaaColor.aspect(), vk::ImageAspectFlags::COLOR);
        assert!(AttachmentKind::MsaaColor
            .usage()
            .contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }
}
