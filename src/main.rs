// =============================================================================
// VXR ENGINE - Forward renderer with MSAA resolve
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, input, camera, scene)                   │
// │    └── Renderer (frame orchestrator)                            │
// │          ├── AssetStore (meshes, textures, materials)           │
// │          ├── Swapchain + MSAA color + depth + framebuffers      │
// │          └── FrameSynchronizer (fences, semaphores)             │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (one RedrawRequested):
// 1. Wait for the frame slot's previous submission
// 2. Acquire a swapchain image
// 3. Tick the clock, move the camera, write the scene uniforms
// 4. Record the render queue into the image's command buffer
// 5. Submit and present
//
// =============================================================================

mod asset;
mod backend;
mod camera;
mod config;
mod lighting;
mod renderer;
mod scene;

use anyhow::{Context, Result};
use camera::{Camera, CameraController, FrameClock, InputState};
use config::Config;
use glam::Vec3;
use lighting::{PointLight, SceneUbo, SpotLight};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use renderer::{FpsCounter, FrameStatus, Renderer, RendererSettings};
use scene::{Scene, Transform};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting {}", config.window.title);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Writes every log line to stderr and to the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

/// Level comes from the config; RUST_LOG, when set, overrides it.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();

    if config.debug.log_to_file {
        match File::create(&config.debug.log_file) {
            Ok(mut file) => {
                let _ = writeln!(file, "=== {} log ===", config.window.title);
                builder.target(Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer owns the surface and must go
/// before the window it was created from.
struct App {
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    config: Config,
    scene: Scene,
    camera: Camera,
    controller: CameraController,
    input: InputState,
    clock: FrameClock,
    fps: FpsCounter,
    is_fullscreen: bool,
}

impl App {
    fn new(config: Config) -> Self {
        let camera = Camera::with_perspective(
            config.camera.fov.to_radians(),
            config.camera.near,
            config.camera.far,
        );
        let controller = CameraController::new(config.camera.move_speed, config.camera.mouse_sensitivity);
        let is_fullscreen = config.window.fullscreen;

        Self {
            renderer: None,
            window: None,
            config,
            scene: Scene::new(),
            camera,
            controller,
            input: InputState::default(),
            clock: FrameClock::new(),
            fps: FpsCounter::new(Duration::from_secs(1)),
            is_fullscreen,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_renderer(&mut self, window: &Window) -> Result<()> {
        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();
        let size = window.inner_size();

        let renderer = Renderer::new(
            display,
            handle,
            (size.width, size.height),
            RendererSettings::from_config(&self.config),
        )?;
        self.renderer = Some(renderer);
        self.populate_scene()
    }

    /// Load the configured model (or the built-in cube) and light it.
    fn populate_scene(&mut self) -> Result<()> {
        let renderer = self.renderer.as_mut().context("Renderer not initialized")?;

        let meshes = match &self.config.assets.model {
            Some(path) => asset::load_model(path).unwrap_or_else(|e| {
                log::error!("Failed to load model {}: {}. Showing cube instead.", path.display(), e);
                vec![asset::cube::cube(1.0)]
            }),
            None => vec![asset::cube::cube(1.0)],
        };
        let spawned = renderer.spawn_model(&mut self.scene, &meshes, Transform::default())?;
        log::debug!("Spawned {} of {} meshes", spawned, meshes.len());

        let lighting = &mut self.scene.lighting;
        lighting.push_point(PointLight::new(
            Vec3::new(2.0, 1.5, 2.0),
            Vec3::new(1.0, 0.85, 0.7),
            8.0,
            2.0,
        ));
        lighting.push_point(PointLight::new(
            Vec3::new(-2.0, 0.5, -1.5),
            Vec3::new(0.4, 0.6, 1.0),
            6.0,
            1.5,
        ));
        lighting.push_spot(SpotLight::new(
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::NEG_Y,
            Vec3::ONE,
            20f32.to_radians().cos(),
            30f32.to_radians().cos(),
            12.0,
        ));

        self.clock.reset();
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let camera = &mut self.camera;
        let controller = &mut self.controller;
        let input = &mut self.input;
        let clock = &mut self.clock;
        let lighting = &self.scene.lighting;

        let status = renderer.draw_frame(&self.scene, |aspect| {
            let time = clock.tick();
            log::trace!("Frame {} ({:.2}ms)", time.frame_index, time.dt * 1000.0);
            controller.update(camera, input, time.dt);
            SceneUbo::new(camera.view(), camera.projection(aspect), *lighting)
        });

        match status {
            FrameStatus::Ok => self.update_fps(),
            FrameStatus::Skip => {}
            FrameStatus::Fatal => {
                log::error!("Renderer cannot continue, exiting");
                self.shutdown(event_loop);
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }
        let Some(sample) = self.fps.frame(Instant::now()) else {
            return;
        };

        if let Some(ref window) = self.window {
            let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms) [{}]",
                self.config.window.title, sample.fps, sample.frame_ms, mode
            ));
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }

    /// Drain and destroy the renderer, then stop the loop.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        log::debug!(
            "Final camera: {:?}, yaw {:.3}, pitch {:.3}",
            self.camera.position,
            self.camera.yaw(),
            self.camera.pitch()
        );
        self.renderer = None;
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_renderer(&window) {
            log::error!("Failed to initialize renderer: {:#}", e);
            self.renderer = None;
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };

                if event.state.is_pressed() {
                    self.input.keys_down.insert(key);
                    if event.repeat {
                        return;
                    }
                    match key {
                        KeyCode::Escape => {
                            log::info!("ESC pressed, exiting...");
                            self.shutdown(event_loop);
                        }
                        KeyCode::F11 => self.toggle_fullscreen(),
                        _ => {}
                    }
                } else {
                    self.input.keys_down.remove(&key);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor = (position.x, position.y);
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Middle,
                ..
            } => {
                self.input.middle_mouse = state == ElementState::Pressed;
            }

            WindowEvent::MouseWheel { delta, .. } => {
                self.input.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
            }

            // Keys released while unfocused never report
            WindowEvent::Focused(false) => {
                self.input.keys_down.clear();
                self.input.middle_mouse = false;
            }

            _ => {}
        }
    }

    /// Request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
