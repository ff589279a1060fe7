// Render pass + per-image framebuffers
//
// Multisampled layout:
//   0 = multisampled color, 1 = multisampled depth, 2 = single-sample resolve (swapchain image)
// The subpass resolves 0 into 2 at its end.
// Single-sample layout (1x):
//   0 = swapchain image, 1 = depth
// No resolve and no separate color image.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

/// Attachment indices used by the one subpass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassLayout {
    pub color: u32,
    pub depth: u32,
    pub resolve: Option<u32>,
}

impl SubpassLayout {
    pub fn for_samples(samples: vk::SampleCountFlags) -> Self {
        let resolve = (samples != vk::SampleCountFlags::TYPE_1).then_some(2);
        Self {
            color: 0,
            depth: 1,
            resolve,
        }
    }

    pub fn attachment_count(&self) -> usize {
        if self.resolve.is_some() {
            3
        } else {
            2
        }
    }
}

/// Attachment descriptions in framebuffer binding order.
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Vec<vk::AttachmentDescription> {
    let depth = vk::AttachmentDescription::builder()
        .format(depth_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE) // Don't need to store depth
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();

    let present = vk::AttachmentDescription::builder()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    if SubpassLayout::for_samples(samples).resolve.is_none() {
        // Draw straight into the swapchain image
        let color = present.load_op(vk::AttachmentLoadOp::CLEAR).build();
        return vec![color, depth];
    }

    // Multisampled color: only its resolved copy survives the pass
    let msaa_color = vk::AttachmentDescription::builder()
        .format(color_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let resolve = present.load_op(vk::AttachmentLoadOp::DONT_CARE).build();

    vec![msaa_color, depth, resolve]
}

/// External -> subpass 0: wait for the presentation engine's read of the
/// image before writing color, and for the previous frame's depth use.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .build()
}

/// Compatibility contract shared by every pipeline and framebuffer.
pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    pub color_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub layout: SubpassLayout,
    device: Arc<VulkanDevice>,
}

impl RenderPass {
    pub fn new(device: Arc<VulkanDevice>, color_format: vk::Format) -> Result<Self> {
        let depth_format = device.depth_format;
        let samples = device.msaa_samples;
        let layout = SubpassLayout::for_samples(samples);
        let attachments = attachment_descriptions(color_format, depth_format, samples);

        let color_refs = [vk::AttachmentReference {
            attachment: layout.color,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: layout.depth,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_refs: Vec<vk::AttachmentReference> = layout
            .resolve
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .into_iter()
            .collect();

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        let subpass = subpass.build();

        let subpasses = [subpass];
        let dependencies = [external_dependency()];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.device.create_render_pass(&render_pass_info, None) }
            .context("Failed to create render pass")?;

        log::info!(
            "Created render pass: color {:?}, depth {:?}, {:?}, {} attachments",
            color_format,
            depth_format,
            samples,
            layout.attachment_count()
        );

        Ok(Self {
            render_pass,
            color_format,
            samples,
            layout,
            device,
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_render_pass(self.render_pass, None) };
    }
}

/// Views for each swapchain image's framebuffer, in render pass attachment
/// order. Without a multisampled color view the swapchain image is the color
/// attachment itself.
pub fn framebuffer_attachments(
    msaa_color: Option<vk::ImageView>,
    depth: vk::ImageView,
    swapchain_views: &[vk::ImageView],
) -> Vec<Vec<vk::ImageView>> {
    swapchain_views
        .iter()
        .map(|&swap_view| match msaa_color {
            Some(msaa) => vec![msaa, depth, swap_view],
            None => vec![swap_view, depth],
        })
        .collect()
}

/// Exactly one framebuffer per swapchain image, rebuilt with the swapchain.
pub struct Framebuffers {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        msaa_color: Option<vk::ImageView>,
        depth: vk::ImageView,
        swapchain_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        anyhow::ensure!(
            msaa_color.is_some() == render_pass.layout.resolve.is_some(),
            "Multisampled color view does not match the render pass layout"
        );

        let mut set = Self {
            framebuffers: Vec::with_capacity(swapchain_views.len()),
            extent,
            device,
        };

        for attachments in framebuffer_attachments(msaa_color, depth, swapchain_views) {
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { set.device.device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")?;
            set.framebuffers.push(framebuffer);
        }

        Ok(set)
    }

    pub fn get(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index).copied()
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        for &framebuffer in &self.framebuffers {
            unsafe { self.device.device.destroy_framebuffer(framebuffer, None) };
        }
    }
}
