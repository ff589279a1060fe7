// =============================================================================
// RENDERER - Frame orchestrator
// =============================================================================
//
// Owns every Vulkan object the frame loop touches and drives one tick:
//
// ┌──────────────────────────────────────────────────────────────────────────┐
// │ WAIT slot fence ─> ACQUIRE image ─> reset fence ─> UPDATE ubo ─>         │
// │ RECORD ─> SUBMIT ─> PRESENT ─> ADVANCE slot                               │
// └──────────────────────────────────────────────────────────────────────────┘
//
// The slot fence is reset only once acquire succeeded, so a tick that ends
// early leaves the fence signaled and the next tick can wait on it again.
//
// =============================================================================

pub mod frame;

use crate::asset::LoadedMesh;
use crate::backend::attachments::{AttachmentImage, DepthBuffer, MsaaColorBuffer};
use crate::backend::buffer::UniformBuffers;
use crate::backend::commands::CommandBuffers;
use crate::backend::descriptors::{GlobalDescriptors, GLOBAL_SET};
use crate::backend::pipeline::{PushConstants, ShaderPaths};
use crate::backend::render_pass::{Framebuffers, RenderPass};
use crate::backend::sync::FrameSynchronizer;
use crate::backend::texture::TextureKind;
use crate::backend::{BackendError, Instance, Surface, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::lighting::SceneUbo;
use crate::scene::assets::AssetStore;
use crate::scene::render_queue::RenderQueue;
use crate::scene::{RenderObject, Scene, TemplateId, Transform};
use anyhow::{Context, Result};
use ash::vk;
use frame::{begin_frame, classify_present, failure_status, FrameBegin, PresentOutcome};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

pub use frame::{FpsCounter, FrameStatus};

/// Everything the renderer takes from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    pub app_name: String,
    pub present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
    pub max_msaa_samples: u32,
    pub max_materials: u32,
    pub validation: bool,
    pub shaders: ShaderPaths,
}

impl RendererSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.window.title.clone(),
            present_mode: config.present_mode(),
            clear_color: config.graphics.clear_color,
            frames_in_flight: config.graphics.max_frames_in_flight.max(1),
            max_msaa_samples: config.graphics.max_msaa_samples,
            max_materials: config.graphics.max_materials,
            validation: config.debug.validation_layers,
            shaders: ShaderPaths {
                vertex: config.assets.vertex_shader.clone(),
                fragment: config.assets.fragment_shader.clone(),
            },
        }
    }
}

/// Clear values in render pass attachment order. The resolve target is not
/// cleared and needs no entry.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    extent.width as f32 / extent.height.max(1) as f32
}

/// Field order is teardown order: consumers go before what they consume.
pub struct Renderer {
    // ─────────────────────────────────────────────────────────────────────────
    // PER-FRAME
    // ─────────────────────────────────────────────────────────────────────────
    sync: FrameSynchronizer,
    commands: CommandBuffers,
    framebuffers: Framebuffers,

    // ─────────────────────────────────────────────────────────────────────────
    // SCENE RESOURCES
    // ─────────────────────────────────────────────────────────────────────────
    assets: AssetStore,
    global: GlobalDescriptors,
    uniforms: UniformBuffers,

    // ─────────────────────────────────────────────────────────────────────────
    // SWAPCHAIN-SIZED
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: RenderPass,
    /// None when the pass renders straight into the swapchain image
    msaa_color: Option<MsaaColorBuffer>,
    depth: DepthBuffer,
    swapchain: Swapchain,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Arc<VulkanDevice>,
    surface: Surface,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE
    // ─────────────────────────────────────────────────────────────────────────
    queue: RenderQueue,
    mesh_template: TemplateId,
    settings: RendererSettings,
    window_size: (u32, u32),
    /// Set by resize, out-of-date or suboptimal; consumed at the next tick
    needs_recreate: bool,
}

impl Renderer {
    pub fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        window_size: (u32, u32),
        settings: RendererSettings,
    ) -> Result<Self> {
        log::info!("Initializing renderer...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance, surface, device
        // ─────────────────────────────────────────────────────────────────────
        let instance = Instance::new(&settings.app_name, display, settings.validation)?;
        let surface = Surface::new(instance, display, window)?;
        let device = VulkanDevice::new(&surface, settings.max_msaa_samples)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Swapchain and everything sized by it
        // ─────────────────────────────────────────────────────────────────────
        let (width, height) = window_size;
        let swapchain = Swapchain::new(
            device.clone(),
            &surface,
            width,
            height,
            settings.present_mode,
            None,
        )?;
        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;
        let depth = AttachmentImage::depth(device.clone(), swapchain.extent)?;
        let msaa_color = AttachmentImage::msaa_color_for(device.clone(), &render_pass, swapchain.extent)?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            msaa_color.as_ref().map(|image| image.view),
            depth.view,
            &swapchain.image_views,
            swapchain.extent,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Uniforms, descriptors, material pipeline
        // ─────────────────────────────────────────────────────────────────────
        let uniforms = UniformBuffers::new(
            device.clone(),
            std::mem::size_of::<SceneUbo>() as vk::DeviceSize,
            settings.frames_in_flight,
        )?;
        let global = GlobalDescriptors::new(device.clone(), &uniforms)?;
        let mut assets = AssetStore::new(device.clone(), settings.max_materials)?;
        let mesh_template = assets.add_template(
            "mesh",
            &render_pass,
            swapchain.extent,
            &global.layout,
            settings.shaders.clone(),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Command buffers and sync objects
        // ─────────────────────────────────────────────────────────────────────
        let commands = CommandBuffers::new(device.clone(), swapchain.image_count())?;
        let sync = FrameSynchronizer::new(device.clone(), settings.frames_in_flight, swapchain.image_count())?;

        log::info!(
            "Renderer ready: {}x{}, {} images, {} frames in flight, {:?} MSAA",
            swapchain.extent.width,
            swapchain.extent.height,
            sync.image_count(),
            sync.frames_in_flight(),
            device.msaa_samples
        );

        Ok(Self {
            sync,
            commands,
            framebuffers,
            assets,
            global,
            uniforms,
            render_pass,
            msaa_color,
            depth,
            swapchain,
            device,
            surface,
            queue: RenderQueue::new(),
            mesh_template,
            settings,
            window_size,
            needs_recreate: false,
        })
    }

    pub fn is_minimized(&self) -> bool {
        self.window_size.0 == 0 || self.window_size.1 == 0
    }

    /// Record a new window size. The swapchain is rebuilt at the next tick.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
        self.needs_recreate = true;
    }

    /// Upload loaded meshes and add one object per mesh to `scene`.
    ///
    /// A mesh whose material cannot be allocated is still uploaded, but its
    /// object has no material and is left out of every frame.
    pub fn spawn_model(&mut self, scene: &mut Scene, meshes: &[LoadedMesh], transform: Transform) -> Result<usize> {
        let mut spawned = 0;
        for loaded in meshes {
            let mesh = self.assets.add_mesh(loaded)?;
            let albedo = self
                .assets
                .load_texture(loaded.albedo_path.as_deref(), TextureKind::Color);
            let normal = self
                .assets
                .load_texture(loaded.normal_path.as_deref(), TextureKind::Linear);

            let material = match self.assets.create_material(self.mesh_template, albedo, normal) {
                Ok(material) => Some(material),
                Err(e) if matches!(
                    e.downcast_ref::<BackendError>(),
                    Some(BackendError::DescriptorPoolExhausted { .. })
                ) =>
                {
                    log::error!("No material for mesh '{}': {}", loaded.name, e);
                    None
                }
                Err(e) => return Err(e),
            };

            scene.add(RenderObject {
                transform,
                mesh: Some(mesh),
                material,
            });
            spawned += 1;
        }

        log::info!(
            "Scene: {} objects, {} meshes, {} materials",
            scene.len(),
            self.assets.mesh_count(),
            self.assets.material_count()
        );
        Ok(spawned)
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Run one tick. `update` receives the swapchain aspect ratio and returns
    /// the scene uniforms; it is only called when a frame will be submitted.
    /// Errors never escape: they are logged and reported as `Fatal`.
    pub fn draw_frame<F>(&mut self, scene: &Scene, update: F) -> FrameStatus
    where
        F: FnOnce(f32) -> SceneUbo,
    {
        match self.tick(scene, update) {
            Ok(status) => status,
            Err(e) => {
                log::error!("Render error: {:#}", e);
                FrameStatus::Fatal
            }
        }
    }

    fn tick<F>(&mut self, scene: &Scene, update: F) -> Result<FrameStatus>
    where
        F: FnOnce(f32) -> SceneUbo,
    {
        if self.is_minimized() {
            return Ok(FrameStatus::Skip);
        }
        if self.needs_recreate {
            self.recreate_swapchain()?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1-2: Wait for the slot, acquire, re-arm the slot fence
        // ─────────────────────────────────────────────────────────────────────
        let swapchain = &self.swapchain;
        let begun = begin_frame(&mut self.sync, |semaphore| {
            swapchain.acquire_next_image(u64::MAX, semaphore)
        })?;
        let (slot, image_index) = match begun {
            FrameBegin::Ready { slot, image_index } => (slot, image_index),
            FrameBegin::Ended { status, recreate } => {
                self.needs_recreate |= recreate;
                return Ok(status);
            }
        };
        let image = image_index as usize;
        let image_available = self.sync.image_available(slot)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Update uniforms and build the draw list
        // ─────────────────────────────────────────────────────────────────────
        let ubo = update(aspect_ratio(self.swapchain.extent));
        self.uniforms.update_pod(slot, &ubo)?;
        self.queue.build(scene, &self.assets);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Record
        // ─────────────────────────────────────────────────────────────────────
        let cmd = self.commands.get(image)?;
        self.record(cmd, image, slot)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Submit
        // ─────────────────────────────────────────────────────────────────────
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished(image)?];
        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                self.sync.in_flight_fence(slot)?,
            )
        }
        .context("Failed to submit frame")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Present
        // ─────────────────────────────────────────────────────────────────────
        let presented = classify_present(self.swapchain.present(
            self.device.present_queue,
            image_index,
            &signal_semaphores,
        ));

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: Advance
        // ─────────────────────────────────────────────────────────────────────
        self.sync.advance_frame();

        if presented.needs_recreate() {
            log::debug!("Swapchain needs recreation after present ({:?})", presented);
            self.needs_recreate = true;
        }
        Ok(match presented {
            PresentOutcome::Failed(e) => {
                log::error!("Failed to present: {}", e);
                failure_status(e)
            }
            _ => FrameStatus::Ok,
        })
    }

    fn record(&self, cmd: vk::CommandBuffer, image: usize, slot: usize) -> Result<()> {
        let device = &self.device.device;
        let framebuffer = self
            .framebuffers
            .get(image)
            .ok_or(BackendError::SlotOutOfRange {
                index: image,
                max: self.framebuffers.len(),
            })?;
        let global_set = self.global.set(slot)?;
        let clear = clear_values(self.settings.clear_color);
        log::trace!("Recording {} draws into image {}", self.queue.commands().len(), image);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.framebuffers.extent,
                })
                .clear_values(&clear);
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

            let mut bound_pipeline = vk::Pipeline::null();
            for command in self.queue.commands() {
                let Some(mesh) = self.assets.mesh(command.mesh) else {
                    continue;
                };
                let binding = command.binding;

                if binding.pipeline != bound_pipeline {
                    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, binding.pipeline);
                    bound_pipeline = binding.pipeline;
                }
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    binding.layout,
                    GLOBAL_SET,
                    &[global_set, binding.descriptor_set],
                    &[],
                );

                let push = PushConstants { model: command.model };
                device.cmd_push_constants(
                    cmd,
                    binding.layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );

                device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertices.buffer], &[0]);
                device.cmd_bind_index_buffer(cmd, mesh.indices.buffer, 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
            }

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    /// Rebuild everything sized by the swapchain. Stays pending while the
    /// window is minimized.
    fn recreate_swapchain(&mut self) -> Result<()> {
        let (width, height) = self.window_size;
        if width == 0 || height == 0 {
            return Ok(());
        }

        // Nothing below may still be in use by the GPU
        self.device.wait_idle()?;

        let swapchain = Swapchain::new(
            self.device.clone(),
            &self.surface,
            width,
            height,
            self.settings.present_mode,
            Some(&self.swapchain),
        )
        .context("Failed to recreate swapchain")?;

        // Only a format change invalidates the render pass
        let render_pass = if swapchain.format != self.render_pass.color_format {
            log::info!("Swapchain format changed to {:?}", swapchain.format);
            Some(RenderPass::new(self.device.clone(), swapchain.format)?)
        } else {
            None
        };

        let depth = AttachmentImage::depth(self.device.clone(), swapchain.extent)?;
        let pass = render_pass.as_ref().unwrap_or(&self.render_pass);
        let msaa_color = AttachmentImage::msaa_color_for(self.device.clone(), pass, swapchain.extent)?;
        let framebuffers = Framebuffers::new(
            self.device.clone(),
            pass,
            msaa_color.as_ref().map(|image| image.view),
            depth.view,
            &swapchain.image_views,
            swapchain.extent,
        )?;

        // Old framebuffers go first, they reference the old views
        self.framebuffers = framebuffers;
        self.msaa_color = msaa_color;
        self.depth = depth;
        self.swapchain = swapchain;
        if let Some(render_pass) = render_pass {
            self.render_pass = render_pass;
        }

        let image_count = self.swapchain.image_count();
        self.commands.reallocate(image_count)?;
        self.sync.recreate_image_semaphores(image_count)?;
        self.assets
            .rebuild_pipelines(&self.render_pass, self.swapchain.extent, &self.global.layout)?;

        self.needs_recreate = false;
        log::info!(
            "Swapchain recreated: {}x{}, {} images",
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            image_count
        );
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer...");
        // Fields are destroyed right after this returns
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to drain device before teardown: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn settings_follow_config() {
        let config = Config::parse(
            r#"
            [window]
            title = "Hangar"

            [graphics]
            present_mode = "immediate"
            clear_color = [0.0, 0.5, 0.0, 1.0]
            max_frames_in_flight = 3

            [assets]
            vertex_shader = "build/a.spv"
            "#,
        )
        .unwrap();

        let settings = RendererSettings::from_config(&config);
        assert_eq!(settings.app_name, "Hangar");
        assert_eq!(settings.present_mode, vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.clear_color, [0.0, 0.5, 0.0, 1.0]);
        assert_eq!(settings.shaders.vertex, PathBuf::from("build/a.spv"));
        assert_eq!(settings.shaders.fragment, PathBuf::from("shaders/mesh.frag.spv"));
    }

    #[test]
    fn clear_values_cover_color_and_depth() {
        let values = clear_values([0.1, 0.1, 0.1, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.1, 0.1, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn aspect_ratio_tolerates_zero_height() {
        let wide = vk::Extent2D { width: 1920, height: 1080 };
        assert!((aspect_ratio(wide) - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(aspect_ratio(vk::Extent2D { width: 10, height: 0 }), 10.0);
    }
}
