// Materials: a template owns the pipeline, an instance owns one set-1 binding
//
// Templates are shared by many instances. Pipelines bake the viewport, so
// templates are rebuilt whenever the swapchain extent changes.

use super::TemplateId;
use crate::backend::descriptors::DescriptorSetLayout;
use crate::backend::pipeline::{GraphicsPipeline, ShaderPaths};
use crate::backend::render_pass::RenderPass;
use crate::backend::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

pub struct MaterialTemplate {
    pub name: String,
    // Pipeline first: its layout was created from `material_layout`
    pub pipeline: GraphicsPipeline,
    pub material_layout: DescriptorSetLayout,
    pub shaders: ShaderPaths,
}

impl MaterialTemplate {
    pub fn new(
        device: Arc<VulkanDevice>,
        name: &str,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        global_layout: &DescriptorSetLayout,
        shaders: ShaderPaths,
    ) -> Result<Self> {
        let material_layout = DescriptorSetLayout::material(device.clone())?;
        let pipeline = GraphicsPipeline::new(
            device,
            render_pass,
            extent,
            &shaders,
            &[global_layout.layout, material_layout.layout],
        )
        .with_context(|| format!("Failed to build pipeline for material '{}'", name))?;

        log::info!("Material template '{}' ready", name);
        Ok(Self {
            name: name.to_string(),
            pipeline,
            material_layout,
            shaders,
        })
    }

    /// Rebuild the pipeline for a new render pass or extent. The set-1
    /// layout is kept so existing instances stay valid.
    pub fn rebuild(
        &mut self,
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        global_layout: &DescriptorSetLayout,
    ) -> Result<()> {
        self.pipeline = GraphicsPipeline::new(
            device,
            render_pass,
            extent,
            &self.shaders,
            &[global_layout.layout, self.material_layout.layout],
        )
        .with_context(|| format!("Failed to rebuild pipeline for material '{}'", self.name))?;
        log::debug!(
            "Material template '{}' rebuilt for {}x{}",
            self.name,
            extent.width,
            extent.height
        );
        Ok(())
    }
}

/// One set-1 descriptor set bound to an albedo and a normal texture.
#[derive(Debug, Clone, Copy)]
pub struct MaterialInstance {
    pub template: TemplateId,
    pub descriptor_set: vk::DescriptorSet,
}
