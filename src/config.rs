// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to defaults, field by field. A missing or broken
// file is not an error for the application: it logs and runs with defaults.

use crate::backend::{DeviceConfig, ShaderDirectory};
use crate::renderer::RendererSettings;
use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
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
            title: "Hello, Triangle!".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred present mode; FIFO is used when the surface lacks it.
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honored in debug builds.
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "tri_renderer.log".to_string(),
            show_fps: true,
        }
    }
}

/// Where runtime assets live
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory holding triangle.vert.spv and triangle.frag.spv
    pub shader_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// Where the configuration came from. `Config::load` runs before logging
/// is up, so the outcome is kept and reported once it is.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at this path
    Defaults(PathBuf),
    /// The file exists but could not be used
    Fallback { path: PathBuf, error: anyhow::Error },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            Self::File(path) => log::info!("Loaded configuration from {:?}", path),
            Self::Defaults(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            Self::Fallback { path, error } => {
                log::warn!("Failed to load {:?}: {:#}. Using defaults.", path, error)
            }
        }
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults on any failure.
    /// Logs nothing: call `ConfigSource::log` once logging is initialized.
    pub fn load() -> (Self, ConfigSource) {
        Self::load_at(DEFAULT_CONFIG_PATH)
    }

    pub fn load_at<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref().to_path_buf();
        match Self::read(&path) {
            Ok(Some(config)) => (config, ConfigSource::File(path)),
            Ok(None) => (Config::default(), ConfigSource::Defaults(path)),
            Err(error) => (Config::default(), ConfigSource::Fallback { path, error }),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::read(path)?;

        let source = match config {
            Some(_) => ConfigSource::File(path.to_path_buf()),
            None => ConfigSource::Defaults(path.to_path_buf()),
        };
        source.log();

        Ok(config.unwrap_or_default())
    }

    /// `None` when there is no file at `path`.
    fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(Some(config))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Validation is never enabled in release builds.
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            app_name: self.window.title.clone(),
            enable_validation: self.validation_enabled(),
        }
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            preferred_present_mode: self.get_present_mode(),
            clear_color: self.graphics.clear_color,
        }
    }

    pub fn shader_source(&self) -> ShaderDirectory {
        ShaderDirectory::new(&self.assets.shader_dir)
    }
}
