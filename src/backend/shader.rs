// Shader module loading
//
// The renderer never decides where shader binaries live. The embedding
// application passes a `ShaderSource`; modules built from it only exist
// until the pipeline has been created.

use super::gpu::Gpu;
use super::handle::Owned;
use crate::error::{RenderError, Result, VkResultExt};
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// File name of the compiled binary produced by build.rs.
    pub fn file_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "triangle.vert.spv",
            ShaderStage::Fragment => "triangle.frag.spv",
        }
    }
}

/// Provides compiled SPIR-V for each stage of the triangle pipeline.
pub trait ShaderSource {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>>;
}

/// Reads `triangle.{vert,frag}.spv` from a directory.
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    root: PathBuf,
}

impl ShaderDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, stage: ShaderStage) -> PathBuf {
        self.root.join(stage.file_name())
    }
}

impl ShaderSource for ShaderDirectory {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
        let path = self.path(stage);
        log::debug!("Loading shader {:?}", path);
        std::fs::read(&path).map_err(|source| RenderError::ShaderRead { path, source })
    }
}

/// Shader binaries already in memory (e.g. `include_bytes!` in the host app).
#[derive(Debug, Clone)]
pub struct InMemoryShaders {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl ShaderSource for InMemoryShaders {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
        Ok(match stage {
            ShaderStage::Vertex => self.vertex.clone(),
            ShaderStage::Fragment => self.fragment.clone(),
        })
    }
}

/// Load one stage and wrap it in a module that is destroyed on drop.
pub fn create_shader_module<G: Gpu>(
    gpu: &Arc<G>,
    source: &dyn ShaderSource,
    stage: ShaderStage,
) -> Result<Owned<G, vk::ShaderModule>> {
    let bytes = source.load(stage)?;

    // read_spv copies into u32 words, so the byte buffer needs no alignment
    let code = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|source| {
        RenderError::InvalidSpirv {
            name: stage.file_name().to_string(),
            source,
        }
    })?;

    let module = gpu.create_shader_module(&code).creating("shader module")?;
    Ok(Owned::new(gpu, module))
}
