// Render targets - one framebuffer per swapchain image
//
// Each framebuffer wraps exactly one image view, has the chain's extent and
// is compatible with the draw pipeline's render pass.

use super::gpu::Gpu;
use super::handle::Owned;
use super::pipeline::DrawPipeline;
use super::swapchain::PresentationChain;
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

pub struct FrameTargets<G: Gpu> {
    framebuffers: Vec<Owned<G, vk::Framebuffer>>,
}

impl<G: Gpu> FrameTargets<G> {
    pub fn new(
        gpu: &Arc<G>,
        chain: &PresentationChain<G>,
        pipeline: &DrawPipeline<G>,
    ) -> Result<Self> {
        log::info!("Creating {} framebuffers", chain.len());

        let extent = chain.extent();
        let framebuffers = chain
            .image_views()
            .map(|view| {
                let attachments = [view];
                let framebuffer_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(pipeline.render_pass())
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);

                let framebuffer = gpu
                    .create_framebuffer(&framebuffer_info)
                    .creating("framebuffer")?;
                Ok(Owned::new(gpu, framebuffer))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { framebuffers })
    }

    /// The framebuffer for the acquired swapchain image.
    pub fn get(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Owned::handle)
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}
