// Command recording
//
// One pool on the graphics family and one primary command buffer that is
// reset and re-recorded every frame. The buffer keeps nothing across frames.

use super::gpu::Gpu;
use super::handle::Owned;
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// Everything one frame's draw needs from the other components.
#[derive(Debug, Clone, Copy)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

pub struct CommandContext<G: Gpu> {
    command_buffer: vk::CommandBuffer,
    // Freeing the pool frees the buffer
    pool: Owned<G, vk::CommandPool>,
    gpu: Arc<G>,
}

impl<G: Gpu> CommandContext<G> {
    pub fn new(gpu: &Arc<G>) -> Result<Self> {
        log::info!("Creating command pool");

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(gpu.queue_families().graphics)
            // RESET: allow the buffer to be reset on its own every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = gpu.create_command_pool(&pool_info).creating("command pool")?;
        let pool = Owned::new(gpu, pool);

        log::info!("Allocating command buffer");
        let command_buffer = gpu
            .allocate_command_buffer(pool.handle(), vk::CommandBufferLevel::PRIMARY)
            .creating("command buffer")?;

        Ok(Self {
            command_buffer,
            pool,
            gpu: Arc::clone(gpu),
        })
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Reset the buffer and record the triangle draw into `target`.
    ///
    /// The caller must have observed the in-flight fence signaled; the
    /// device may still be reading the buffer otherwise.
    pub fn record(&self, target: &DrawTarget) -> Result<()> {
        let gpu = &self.gpu;
        let cmd = self.command_buffer;

        gpu.reset_command_buffer(cmd)
            .during("reset command buffer")?;
        gpu.begin_command_buffer(cmd)
            .during("begin command buffer")?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color,
            },
        }];

        let full_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(full_area)
            .clear_values(&clear_values);

        gpu.cmd_begin_render_pass(cmd, &render_pass_info);
        {
            gpu.cmd_bind_pipeline(cmd, target.pipeline);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: target.extent.width as f32,
                height: target.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            gpu.cmd_set_viewport(cmd, &viewport);
            gpu.cmd_set_scissor(cmd, &full_area);

            gpu.cmd_draw(cmd, 3, 1);
        }
        gpu.cmd_end_render_pass(cmd);

        gpu.end_command_buffer(cmd).during("record command buffer")
    }
}
