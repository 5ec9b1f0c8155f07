// Renderer errors
//
// Three failure classes: unsatisfiable preconditions (no GPU, missing layer),
// device object creation failures, and shader asset failures. The library
// propagates them; the application decides they are fatal.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to load Vulkan library. Is Vulkan installed?")]
    Loading(#[from] ash::LoadingError),

    #[error("No Vulkan-capable GPU found")]
    NoDevices,

    #[error("No suitable GPU found among {0} candidate(s)")]
    NoSuitableDevice(usize),

    #[error("Validation layer {0} requested, but not available")]
    MissingValidationLayer(String),

    #[error("Surface reports no formats")]
    NoSurfaceFormat,

    #[error("Failed to create {what}: {result}")]
    Creation {
        what: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("{what} failed: {result}")]
    Command {
        what: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("Acquired image {index} but only {count} frame targets exist")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("Failed to read shader {path:?}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shader {name} is not valid SPIR-V")]
    InvalidSpirv {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// True for the precondition class: nothing was wrong with a call, the
    /// machine simply can't run the renderer.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Loading(_)
                | Self::NoDevices
                | Self::NoSuitableDevice(_)
                | Self::MissingValidationLayer(_)
                | Self::NoSurfaceFormat
        )
    }
}

/// Attach a description to a raw `vk::Result` failure.
pub(crate) trait VkResultExt<T> {
    fn creating(self, what: &'static str) -> Result<T>;
    fn during(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn creating(self, what: &'static str) -> Result<T> {
        self.map_err(|result| RenderError::Creation { what, result })
    }

    fn during(self, what: &'static str) -> Result<T> {
        self.map_err(|result| RenderError::Command { what, result })
    }
}
