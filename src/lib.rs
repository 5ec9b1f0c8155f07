//! A single-window Vulkan renderer that draws one triangle per frame.
//!
//! [`renderer::Renderer`] owns the presentation pipeline and is generic over
//! the [`backend::Gpu`] device seam; [`engine`] drives it from a winit event
//! loop using settings from [`config::Config`].

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod renderer;
pub mod window;

pub use config::Config;
pub use error::{RenderError, Result};
pub use renderer::{Renderer, RendererSettings};
