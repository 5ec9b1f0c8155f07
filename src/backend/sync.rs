// Frame synchronization
//
// A single set of sync objects: the CPU waits on the fence before touching
// the command buffer, the device orders acquire -> render -> present with the
// two semaphores. Frame N+1 cannot start recording until frame N is done.

use super::gpu::Gpu;
use super::handle::Owned;
use crate::error::{RenderError, Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// Stage the color output waits at for the acquired image.
const WAIT_STAGES: [vk::PipelineStageFlags; 1] = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

/// Semaphores and the in-flight fence for the one frame slot.
pub struct SyncSet<G: Gpu> {
    in_flight_fence: Owned<G, vk::Fence>,
    render_finished: Owned<G, vk::Semaphore>,
    image_available: Owned<G, vk::Semaphore>,
}

impl<G: Gpu> SyncSet<G> {
    pub fn new(gpu: &Arc<G>) -> Result<Self> {
        log::info!("Creating sync objects");

        let image_available = Owned::new(gpu, gpu.create_semaphore().creating("semaphore")?);
        let render_finished = Owned::new(gpu, gpu.create_semaphore().creating("semaphore")?);
        // Start signaled so the very first wait returns immediately
        let in_flight_fence = Owned::new(gpu, gpu.create_fence(true).creating("fence")?);

        Ok(Self {
            in_flight_fence,
            render_finished,
            image_available,
        })
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    pub fn in_flight_fence(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Waiting,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    /// The chain no longer matches the surface; nothing was drawn.
    Skipped,
}

/// Drives one frame at a time through wait, acquire, record, submit and present.
pub struct FrameSynchronizer<G: Gpu> {
    sync: SyncSet<G>,
    state: FrameState,
    stale_warned: bool,
    gpu: Arc<G>,
}

impl<G: Gpu> FrameSynchronizer<G> {
    pub fn new(gpu: &Arc<G>) -> Result<Self> {
        Ok(Self {
            sync: SyncSet::new(gpu)?,
            state: FrameState::Idle,
            stale_warned: false,
            gpu: Arc::clone(gpu),
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn sync(&self) -> &SyncSet<G> {
        &self.sync
    }

    /// Run one frame. `record` fills `command_buffer` for the acquired image.
    ///
    /// An error leaves the state where the failing step was; callers treat
    /// every error as fatal.
    pub fn render_frame<F>(
        &mut self,
        swapchain: vk::SwapchainKHR,
        command_buffer: vk::CommandBuffer,
        record: F,
    ) -> Result<FrameOutcome>
    where
        F: FnOnce(u32) -> Result<()>,
    {
        let gpu = Arc::clone(&self.gpu);
        let fence = self.sync.in_flight_fence();

        self.state = FrameState::Waiting;
        gpu.wait_for_fence(fence).during("wait for in-flight fence")?;
        gpu.reset_fence(fence).during("reset in-flight fence")?;

        self.state = FrameState::Acquiring;
        let image_index = match gpu.acquire_next_image(swapchain, self.sync.image_available()) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.warn_stale("acquire reported a suboptimal swapchain");
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.warn_stale("swapchain is out of date, skipping frame");
                // Nothing will signal the fence otherwise; the next wait would hang
                gpu.queue_submit(gpu.graphics_queue(), &[], fence)
                    .during("re-arm in-flight fence")?;
                self.state = FrameState::Idle;
                return Ok(FrameOutcome::Skipped);
            }
            Err(result) => {
                return Err(RenderError::Command {
                    what: "acquire next image",
                    result,
                })
            }
        };

        self.state = FrameState::Recording;
        record(image_index)?;

        let wait_semaphores = [self.sync.image_available()];
        let signal_semaphores = [self.sync.render_finished()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&WAIT_STAGES)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        gpu.queue_submit(gpu.graphics_queue(), &[submit_info.build()], fence)
            .during("submit draw command buffer")?;
        self.state = FrameState::Submitted;

        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        self.state = FrameState::Presenting;

        match gpu.queue_present(gpu.present_queue(), &present_info) {
            Ok(false) => {}
            Ok(true) => self.warn_stale("present reported a suboptimal swapchain"),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.warn_stale("present reported an out-of-date swapchain")
            }
            Err(result) => {
                return Err(RenderError::Command {
                    what: "present",
                    result,
                })
            }
        }

        self.state = FrameState::Idle;
        Ok(FrameOutcome::Presented { image_index })
    }

    fn warn_stale(&mut self, what: &str) {
        if !self.stale_warned {
            log::warn!("{}; the presentation chain is not rebuilt", what);
            self.stale_warned = true;
        } else {
            log::debug!("{}", what);
        }
    }
}
