// Renderer - owns the whole presentation pipeline
//
// Construction order:
//   device -> presentation chain -> draw pipeline -> frame targets
//          -> command context -> sync objects
//
// Fields are declared in the reverse of that order so teardown releases
// every handle before the object it depends on.

use crate::backend::{
    CommandContext, DrawPipeline, DrawTarget, FrameOutcome, FrameState, FrameSynchronizer,
    FrameTargets, Gpu, PresentationChain, ShaderSource,
};
use crate::error::{RenderError, Result};
use ash::vk;
use std::sync::Arc;

/// Per-renderer choices that come from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    /// Used when the surface offers it; FIFO otherwise.
    pub preferred_present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

pub struct Renderer<G: Gpu> {
    frames: FrameSynchronizer<G>,
    commands: CommandContext<G>,
    targets: FrameTargets<G>,
    pipeline: DrawPipeline<G>,
    chain: PresentationChain<G>,
    settings: RendererSettings,
    gpu: Arc<G>,
}

impl<G: Gpu> Renderer<G> {
    /// Build everything needed to draw. `window_extent` is the window's pixel
    /// size, used only when the surface lets the swapchain pick its extent.
    pub fn new(
        gpu: Arc<G>,
        settings: RendererSettings,
        window_extent: vk::Extent2D,
        shaders: &dyn ShaderSource,
    ) -> Result<Self> {
        log::info!("Initializing renderer...");

        let chain = PresentationChain::new(&gpu, window_extent, settings.preferred_present_mode)?;
        // The render pass is needed by the frame targets, so the pipeline comes first
        let pipeline = DrawPipeline::new(&gpu, chain.format(), shaders)?;
        let targets = FrameTargets::new(&gpu, &chain, &pipeline)?;
        let commands = CommandContext::new(&gpu)?;
        let frames = FrameSynchronizer::new(&gpu)?;

        log::info!("Renderer initialized successfully!");

        Ok(Self {
            frames,
            commands,
            targets,
            pipeline,
            chain,
            settings,
            gpu,
        })
    }

    /// Draw and present one frame.
    pub fn render(&mut self) -> Result<FrameOutcome> {
        let Self {
            frames,
            commands,
            targets,
            pipeline,
            chain,
            settings,
            ..
        } = self;

        frames.render_frame(chain.swapchain(), commands.command_buffer(), |image_index| {
            let framebuffer = targets
                .get(image_index)
                .ok_or(RenderError::ImageIndexOutOfRange {
                    index: image_index,
                    count: targets.len(),
                })?;

            commands.record(&DrawTarget {
                render_pass: pipeline.render_pass(),
                framebuffer,
                pipeline: pipeline.pipeline(),
                extent: chain.extent(),
                clear_color: settings.clear_color,
            })
        })
    }

    /// Block until the device has finished all submitted work.
    pub fn shutdown(&self) -> Result<()> {
        log::info!("Waiting for device idle");
        self.gpu
            .wait_idle()
            .map_err(|result| RenderError::Command {
                what: "wait for device idle",
                result,
            })
    }

    pub fn state(&self) -> FrameState {
        self.frames.state()
    }

    pub fn image_view_count(&self) -> usize {
        self.chain.len()
    }

    pub fn frame_target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent()
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.chain.present_mode()
    }
}

impl<G: Gpu> Drop for Renderer<G> {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer resources...");

        // Nothing may be destroyed while the device can still use it
        if let Err(e) = self.shutdown() {
            log::error!("{}", e);
        }
    }
}
