// Arena-backed owner of every GPU asset the scene can reference
//
// Field order is teardown order: descriptor sets go with their pool before
// the templates whose layouts they were allocated from, and meshes and
// textures are released last.

use super::material::{MaterialInstance, MaterialTemplate};
use super::mesh::Mesh;
use super::render_queue::{MaterialBinding, ResolveDraw};
use super::{MaterialId, MeshId, TemplateId, TextureId};
use crate::asset::LoadedMesh;
use crate::backend::descriptors::{DescriptorSetLayout, MaterialDescriptorPool};
use crate::backend::pipeline::ShaderPaths;
use crate::backend::render_pass::RenderPass;
use crate::backend::texture::{Texture, TextureKind, FLAT_NORMAL, WHITE};
use crate::backend::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use slotmap::SlotMap;
use std::path::Path;
use std::sync::Arc;

pub struct AssetStore {
    materials: SlotMap<MaterialId, MaterialInstance>,
    material_pool: MaterialDescriptorPool,
    templates: SlotMap<TemplateId, MaterialTemplate>,
    meshes: SlotMap<MeshId, Mesh>,
    textures: SlotMap<TextureId, Texture>,
    default_albedo: TextureId,
    default_normal: TextureId,
    device: Arc<VulkanDevice>,
}

impl AssetStore {
    pub fn new(device: Arc<VulkanDevice>, max_materials: u32) -> Result<Self> {
        let mut textures = SlotMap::with_key();
        let default_albedo = textures.insert(Texture::solid(
            device.clone(),
            "default albedo",
            WHITE,
            TextureKind::Color,
        )?);
        let default_normal = textures.insert(Texture::solid(
            device.clone(),
            "default normal",
            FLAT_NORMAL,
            TextureKind::Linear,
        )?);

        Ok(Self {
            materials: SlotMap::with_key(),
            material_pool: MaterialDescriptorPool::new(device.clone(), max_materials)?,
            templates: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            textures,
            default_albedo,
            default_normal,
            device,
        })
    }

    pub fn add_mesh(&mut self, loaded: &LoadedMesh) -> Result<MeshId> {
        let mesh = Mesh::new(self.device.clone(), &loaded.vertices, &loaded.indices)
            .with_context(|| format!("Failed to upload mesh '{}'", loaded.name))?;
        log::debug!(
            "Mesh '{}': {} vertices, {} indices",
            loaded.name,
            mesh.vertex_count,
            mesh.index_count
        );
        Ok(self.meshes.insert(mesh))
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    /// Load a texture, falling back to the matching default when the path is
    /// missing or the file cannot be decoded.
    pub fn load_texture(&mut self, path: Option<&Path>, kind: TextureKind) -> TextureId {
        let fallback = match kind {
            TextureKind::Color => self.default_albedo,
            TextureKind::Linear => self.default_normal,
        };
        let Some(path) = path else {
            return fallback;
        };

        match Texture::from_file(self.device.clone(), path, kind) {
            Ok(texture) => self.textures.insert(texture),
            Err(e) => {
                log::warn!("Using default texture for {}: {:#}", path.display(), e);
                fallback
            }
        }
    }

    pub fn add_template(
        &mut self,
        name: &str,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        global_layout: &DescriptorSetLayout,
        shaders: ShaderPaths,
    ) -> Result<TemplateId> {
        let template = MaterialTemplate::new(
            self.device.clone(),
            name,
            render_pass,
            extent,
            global_layout,
            shaders,
        )?;
        Ok(self.templates.insert(template))
    }

    /// Allocate a material instance. Pool exhaustion surfaces as
    /// `BackendError::DescriptorPoolExhausted` and leaves the store unchanged.
    pub fn create_material(
        &mut self,
        template: TemplateId,
        albedo: TextureId,
        normal: TextureId,
    ) -> Result<MaterialId> {
        let tmpl = self
            .templates
            .get(template)
            .context("Material template no longer exists")?;
        let albedo_tex = self.textures.get(albedo).context("Albedo texture no longer exists")?;
        let normal_tex = self.textures.get(normal).context("Normal texture no longer exists")?;

        let descriptor_set = self
            .material_pool
            .allocate(&tmpl.material_layout, albedo_tex, normal_tex)?;
        log::debug!(
            "Material instance of '{}' ({} sets left)",
            tmpl.name,
            self.material_pool.remaining()
        );

        Ok(self.materials.insert(MaterialInstance {
            template,
            descriptor_set,
        }))
    }

    /// Rebuild every template pipeline after a swapchain recreation.
    pub fn rebuild_pipelines(
        &mut self,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        global_layout: &DescriptorSetLayout,
    ) -> Result<()> {
        for template in self.templates.values_mut() {
            template.rebuild(self.device.clone(), render_pass, extent, global_layout)?;
        }
        Ok(())
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

impl ResolveDraw for AssetStore {
    fn mesh_alive(&self, mesh: MeshId) -> bool {
        self.meshes.contains_key(mesh)
    }

    fn material_binding(&self, material: MaterialId) -> Option<MaterialBinding> {
        let instance = self.materials.get(material)?;
        let template = self.templates.get(instance.template)?;
        Some(MaterialBinding {
            pipeline: template.pipeline.pipeline,
            layout: template.pipeline.layout,
            descriptor_set: instance.descriptor_set,
        })
    }
}
