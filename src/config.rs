// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to its defaults field by field, so a config file
// only needs the keys it wants to change.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
    pub camera: CameraConfig,
}

/// Window settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "VXR Engine".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred present mode; FIFO is used when the surface lacks it
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Upper bound on MSAA samples; the device limit still applies
    pub max_msaa_samples: u32,
    /// Capacity of the material descriptor pool
    pub max_materials: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            max_frames_in_flight: 2,
            max_msaa_samples: 8,
            max_materials: 256,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vxr_engine.log".to_string(),
            show_fps: true,
        }
    }
}

/// Asset locations, relative to the working directory
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// Model to show; the built-in cube is used when unset
    pub model: Option<PathBuf>,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            model: None,
            vertex_shader: PathBuf::from("shaders/mesh.vert.spv"),
            fragment_shader: PathBuf::from("shaders/mesh.frag.spv"),
        }
    }
}

/// Camera settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub move_speed: f32,
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 0.1,
            far: 100.0,
            move_speed: 2.0,
            mouse_sensitivity: 0.0025,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.sanitize();
        Ok(config)
    }

    /// Clamp values the renderer cannot work with.
    fn sanitize(&mut self) {
        let graphics = &mut self.graphics;
        if graphics.max_frames_in_flight == 0 {
            log::warn!("max_frames_in_flight must be at least 1, using 1");
            graphics.max_frames_in_flight = 1;
        }
        if graphics.max_msaa_samples == 0 {
            graphics.max_msaa_samples = 1;
        }
        if graphics.max_materials == 0 {
            log::warn!("max_materials must be at least 1, using 1");
            graphics.max_materials = 1;
        }

        let camera = &mut self.camera;
        if camera.near <= 0.0 || camera.far <= camera.near {
            log::warn!(
                "Invalid camera clip range {}..{}, using defaults",
                camera.near,
                camera.far
            );
            let defaults = CameraConfig::default();
            camera.near = defaults.near;
            camera.far = defaults.far;
        }
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', using info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [graphics]
            present_mode = "fifo"
            max_materials = 8

            [assets]
            model = "models/ship/ship.obj"
            "#,
        )
        .unwrap();

        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.max_materials, 8);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.assets.model, Some(PathBuf::from("models/ship/ship.obj")));
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-ish\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn unusable_values_are_clamped() {
        let config = Config::parse(
            r#"
            [graphics]
            max_frames_in_flight = 0
            max_materials = 0

            [camera]
            near = 5.0
            far = 1.0
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.max_frames_in_flight, 1);
        assert_eq!(config.graphics.max_materials, 1);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.camera.far, 100.0);
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        let config = Config::parse("[debug]\nlog_level = \"DEBUG\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Debug);

        let config = Config::parse("[debug]\nlog_level = \"chatty\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[graphics\npresent_mode = 3").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("/definitely/not/here/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }
}
