// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, depth/stencil, blending.
// Viewport and scissor are baked in, so pipelines are rebuilt on resize.

use super::render_pass::RenderPass;
use super::shader::ShaderModule;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::ffi::CStr;
use std::mem::{offset_of, size_of};
use std::path::Path;
use std::sync::Arc;

const ENTRY_POINT: &CStr = c"main";

/// Interleaved position / normal / uv, matching locations 0-2 in mesh.vert.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex3D {
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, uv) as u32,
            },
        ]
    }
}

/// Per-draw data pushed straight into the vertex stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub model: Mat4,
}

pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: size_of::<PushConstants>() as u32,
    }
}

/// Full-extent viewport with the standard [0, 1] depth range.
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Shader stage paths a pipeline is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: std::path::PathBuf,
    pub fragment: std::path::PathBuf,
}

/// Pipeline + its layout. The layout declares set 0 (global), set 1
/// (material) and the model-matrix push constant.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl GraphicsPipeline {
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        shaders: &ShaderPaths,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self> {
        let vert = ShaderModule::from_file(device.clone(), Path::new(&shaders.vertex))?;
        let frag = ShaderModule::from_file(device.clone(), Path::new(&shaders.fragment))?;

        let push_constant_ranges = [push_constant_range()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        // Layout is owned from here so early returns release it
        let mut built = Self {
            pipeline: vk::Pipeline::null(),
            layout,
            device,
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert.module)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag.module)
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = [Vertex3D::binding_description()];
        let attributes = Vertex3D::attribute_descriptions();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [viewport_for(extent)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(render_pass.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS) // Closer objects win
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // Opaque, no blending
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            built
                .device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| e)
        .context("Failed to create graphics pipeline")?;

        built.pipeline = pipelines
            .into_iter()
            .next()
            .context("Driver returned no pipeline")?;

        log::info!(
            "Built pipeline {} + {} ({}x{})",
            shaders.vertex.display(),
            shaders.fragment.display(),
            extent.width,
            extent.height
        );

        // Shader modules drop here; the pipeline no longer needs them
        Ok(built)
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        let binding = Vertex3D::binding_description();
        assert_eq!(binding.stride, 32);

        let offsets: Vec<u32> = Vertex3D::attribute_descriptions()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24]);

        let locations: Vec<u32> = Vertex3D::attribute_descriptions()
            .iter()
            .map(|a| a.location)
            .collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }

    #[test]
    fn push_constant_holds_one_matrix() {
        let range = push_constant_range();
        assert_eq!(range.size, 64);
        assert_eq!(range.offset, 0);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn viewport_covers_extent() {
        let viewport = viewport_for(vk::Extent2D { width: 800, height: 600 });
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
