// Recording fake device for tests
//
// Device work completes the moment it is submitted, unless `hold_submissions`
// is set, in which case fences stay unsignaled until `complete_pending`.
// Waiting on an unsignaled fence returns TIMEOUT instead of hanging.

use super::gpu::{DeviceObject, Gpu, QueueFamilyIndices, SurfaceSupport};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(&'static str),
    Destroy(DeviceObject),
    WaitFence { fence: vk::Fence, signaled: bool },
    ResetFence(vk::Fence),
    Acquire { signal: vk::Semaphore },
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { framebuffer: vk::Framebuffer, width: u32, height: u32, clear: [f32; 4] },
    BindPipeline(vk::Pipeline),
    SetViewport { width: f32, height: f32 },
    SetScissor { width: u32, height: u32 },
    Draw { vertices: u32, instances: u32 },
    EndRenderPass,
    EndCommandBuffer(vk::CommandBuffer),
    Submit {
        fence: vk::Fence,
        wait: Vec<vk::Semaphore>,
        stages: Vec<vk::PipelineStageFlags>,
        signal: Vec<vk::Semaphore>,
        command_buffers: usize,
    },
    Present { image_index: u32, wait: Vec<vk::Semaphore> },
    WaitIdle,
}

/// What the renderer asked for when it built the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub stage_count: u32,
    pub vertex_bindings: u32,
    pub vertex_attributes: u32,
    pub topology: vk::PrimitiveTopology,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub polygon_mode: vk::PolygonMode,
    pub depth_bias: bool,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainSummary {
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub width: u32,
    pub height: u32,
    pub present_mode: vk::PresentModeKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_count: u32,
}

/// The render pass's single attachment and subpass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassSummary {
    pub attachment_count: u32,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub subpass_count: u32,
    pub bind_point: vk::PipelineBindPoint,
    /// (attachment index, layout) of each color reference in subpass 0
    pub color_refs: Vec<(u32, vk::ImageLayout)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageViewSummary {
    pub image: vk::Image,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    /// r, g, b, a
    pub swizzle: [vk::ComponentSwizzle; 4],
    pub aspect: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferSummary {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandPoolSummary {
    pub queue_family_index: u32,
    pub flags: vk::CommandPoolCreateFlags,
}

pub struct FakeGpu {
    pub support: SurfaceSupport,
    pub families: QueueFamilyIndices,
    /// Number of images the fake swapchain hands out.
    pub image_count: u32,
    pub calls: RefCell<Vec<Call>>,
    pub live: RefCell<Vec<DeviceObject>>,
    pub pipeline: RefCell<Option<PipelineSummary>>,
    pub swapchain: RefCell<Option<SwapchainSummary>>,
    pub render_pass: RefCell<Option<RenderPassSummary>>,
    pub image_views: RefCell<Vec<ImageViewSummary>>,
    pub framebuffers: RefCell<Vec<FramebufferSummary>>,
    pub command_pool: RefCell<Option<CommandPoolSummary>>,
    /// Object kind whose creation fails with ERROR_INITIALIZATION_FAILED.
    pub fail_creating: Cell<Option<&'static str>>,
    /// Result returned by the next acquire, instead of success.
    pub acquire_error: Cell<Option<vk::Result>>,
    pub present_error: Cell<Option<vk::Result>>,
    pub hold_submissions: Cell<bool>,
    fences: RefCell<HashMap<vk::Fence, bool>>,
    pending: RefCell<Vec<vk::Fence>>,
    next_image: Cell<u32>,
    next_handle: Cell<u64>,
}

impl FakeGpu {
    /// A surface with a 2-image minimum and a FIFO-only present mode.
    pub fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        };
        Self::with_support(
            SurfaceSupport {
                capabilities,
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
            2,
        )
    }

    pub fn with_support(support: SurfaceSupport, image_count: u32) -> Self {
        Self {
            support,
            families: QueueFamilyIndices { graphics: 0, present: 0 },
            image_count,
            calls: RefCell::new(Vec::new()),
            live: RefCell::new(Vec::new()),
            pipeline: RefCell::new(None),
            swapchain: RefCell::new(None),
            render_pass: RefCell::new(None),
            image_views: RefCell::new(Vec::new()),
            framebuffers: RefCell::new(Vec::new()),
            command_pool: RefCell::new(None),
            fail_creating: Cell::new(None),
            acquire_error: Cell::new(None),
            present_error: Cell::new(None),
            hold_submissions: Cell::new(false),
            fences: RefCell::new(HashMap::new()),
            pending: RefCell::new(Vec::new()),
            next_image: Cell::new(0),
            next_handle: Cell::new(1),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn destroyed(&self) -> Vec<DeviceObject> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Destroy(object) => Some(*object),
                _ => None,
            })
            .collect()
    }

    /// Signal every fence whose work was held back.
    pub fn complete_pending(&self) {
        let mut fences = self.fences.borrow_mut();
        for fence in self.pending.borrow_mut().drain(..) {
            fences.insert(fence, true);
        }
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.fences.borrow().get(&fence).copied().unwrap_or(false)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn raw(&self) -> u64 {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        raw
    }

    fn create<H: Handle + Copy + Into<DeviceObject>>(&self, kind: &'static str) -> VkResult<H> {
        if self.fail_creating.get() == Some(kind) {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let handle = H::from_raw(self.raw());
        self.live.borrow_mut().push(handle.into());
        self.record(Call::Create(kind));
        Ok(handle)
    }
}

impl Gpu for FakeGpu {
    fn queue_families(&self) -> QueueFamilyIndices {
        self.families
    }

    fn graphics_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0xA0)
    }

    fn present_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0xA0 + u64::from(self.families.present))
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5F)
    }

    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        Ok(self.support.clone())
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        *self.swapchain.borrow_mut() = Some(SwapchainSummary {
            min_image_count: info.min_image_count,
            format: info.image_format,
            color_space: info.image_color_space,
            width: info.image_extent.width,
            height: info.image_extent.height,
            present_mode: info.present_mode,
            sharing_mode: info.image_sharing_mode,
            queue_family_count: info.queue_family_index_count,
        });
        self.create("swapchain")
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok((0..self.image_count)
            .map(|_| vk::Image::from_raw(self.raw()))
            .collect())
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let range = info.subresource_range;
        self.image_views.borrow_mut().push(ImageViewSummary {
            image: info.image,
            view_type: info.view_type,
            format: info.format,
            swizzle: [
                info.components.r,
                info.components.g,
                info.components.b,
                info.components.a,
            ],
            aspect: range.aspect_mask,
            base_mip_level: range.base_mip_level,
            level_count: range.level_count,
            base_array_layer: range.base_array_layer,
            layer_count: range.layer_count,
        });
        self.create("image view")
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        // SAFETY: attachment and subpass arrays outlive the call.
        let summary = unsafe {
            let attachment = &*info.p_attachments;
            let subpass = &*info.p_subpasses;
            let color_refs = std::slice::from_raw_parts(
                subpass.p_color_attachments,
                subpass.color_attachment_count as usize,
            )
            .iter()
            .map(|r| (r.attachment, r.layout))
            .collect();
            RenderPassSummary {
                attachment_count: info.attachment_count,
                format: attachment.format,
                samples: attachment.samples,
                load_op: attachment.load_op,
                store_op: attachment.store_op,
                initial_layout: attachment.initial_layout,
                final_layout: attachment.final_layout,
                subpass_count: info.subpass_count,
                bind_point: subpass.pipeline_bind_point,
                color_refs,
            }
        };
        *self.render_pass.borrow_mut() = Some(summary);
        self.create("render pass")
    }

    fn create_shader_module(&self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        self.create("shader module")
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.create("pipeline layout")
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        // SAFETY: the renderer keeps every pointed-to state struct alive for
        // the duration of the call, exactly as the real driver requires.
        let summary = unsafe {
            let vertex_input = &*info.p_vertex_input_state;
            let assembly = &*info.p_input_assembly_state;
            let raster = &*info.p_rasterization_state;
            let multisample = &*info.p_multisample_state;
            let blend = &*info.p_color_blend_state;
            let attachment = &*blend.p_attachments;
            let dynamic = &*info.p_dynamic_state;
            PipelineSummary {
                stage_count: info.stage_count,
                vertex_bindings: vertex_input.vertex_binding_description_count,
                vertex_attributes: vertex_input.vertex_attribute_description_count,
                topology: assembly.topology,
                dynamic_states: std::slice::from_raw_parts(
                    dynamic.p_dynamic_states,
                    dynamic.dynamic_state_count as usize,
                )
                .to_vec(),
                cull_mode: raster.cull_mode,
                front_face: raster.front_face,
                polygon_mode: raster.polygon_mode,
                depth_bias: raster.depth_bias_enable == vk::TRUE,
                samples: multisample.rasterization_samples,
                blend_enable: attachment.blend_enable == vk::TRUE,
                color_write_mask: attachment.color_write_mask,
            }
        };
        *self.pipeline.borrow_mut() = Some(summary);
        self.create("pipeline")
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        // SAFETY: attachments outlive the call.
        let attachments = unsafe {
            std::slice::from_raw_parts(info.p_attachments, info.attachment_count as usize)
        }
        .to_vec();
        self.framebuffers.borrow_mut().push(FramebufferSummary {
            render_pass: info.render_pass,
            attachments,
            width: info.width,
            height: info.height,
            layers: info.layers,
        });
        self.create("framebuffer")
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        *self.command_pool.borrow_mut() = Some(CommandPoolSummary {
            queue_family_index: info.queue_family_index,
            flags: info.flags,
        });
        self.create("command pool")
    }

    fn allocate_command_buffer(
        &self,
        _pool: vk::CommandPool,
        _level: vk::CommandBufferLevel,
    ) -> VkResult<vk::CommandBuffer> {
        if self.fail_creating.get() == Some("command buffer") {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.record(Call::Create("command buffer"));
        Ok(vk::CommandBuffer::from_raw(self.raw()))
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.create("semaphore")
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence: vk::Fence = self.create("fence")?;
        self.fences.borrow_mut().insert(fence, signaled);
        Ok(fence)
    }

    fn destroy(&self, object: DeviceObject) {
        self.live.borrow_mut().retain(|live| *live != object);
        self.record(Call::Destroy(object));
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let signaled = self.fence_signaled(fence);
        self.record(Call::WaitFence { fence, signaled });
        if signaled {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.fences.borrow_mut().insert(fence, false);
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.record(Call::Acquire { signal });
        if let Some(err) = self.acquire_error.take() {
            return Err(err);
        }
        let index = self.next_image.get();
        self.next_image.set((index + 1) % self.image_count.max(1));
        Ok((index, false))
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        // SAFETY: clear values outlive the call.
        let clear = unsafe { (*info.p_clear_values).color.float32 };
        self.record(Call::BeginRenderPass {
            framebuffer: info.framebuffer,
            width: info.render_area.extent.width,
            height: info.render_area.extent.height,
            clear,
        });
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: &vk::Viewport) {
        self.record(Call::SetViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: &vk::Rect2D) {
        self.record(Call::SetScissor {
            width: scissor.extent.width,
            height: scissor.extent.height,
        });
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.record(Call::Draw {
            vertices: vertex_count,
            instances: instance_count,
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn queue_submit(
        &self,
        _queue: vk::Queue,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut wait = Vec::new();
        let mut stages = Vec::new();
        let mut signal = Vec::new();
        let mut command_buffers = 0;
        for submit in submits {
            // SAFETY: the submit arrays outlive the call.
            unsafe {
                let waits = submit.wait_semaphore_count as usize;
                wait.extend_from_slice(std::slice::from_raw_parts(submit.p_wait_semaphores, waits));
                stages.extend_from_slice(std::slice::from_raw_parts(
                    submit.p_wait_dst_stage_mask,
                    waits,
                ));
                signal.extend_from_slice(std::slice::from_raw_parts(
                    submit.p_signal_semaphores,
                    submit.signal_semaphore_count as usize,
                ));
            }
            command_buffers += submit.command_buffer_count as usize;
        }
        self.record(Call::Submit {
            fence,
            wait,
            stages,
            signal,
            command_buffers,
        });
        if self.hold_submissions.get() {
            self.pending.borrow_mut().push(fence);
        } else {
            self.fences.borrow_mut().insert(fence, true);
        }
        Ok(())
    }

    fn queue_present(&self, _queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        // SAFETY: the present arrays outlive the call.
        let (image_index, wait) = unsafe {
            (
                *info.p_image_indices,
                std::slice::from_raw_parts(
                    info.p_wait_semaphores,
                    info.wait_semaphore_count as usize,
                )
                .to_vec(),
            )
        };
        self.record(Call::Present { image_index, wait });
        match self.present_error.take() {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.record(Call::WaitIdle);
        self.complete_pending();
        Ok(())
    }
}
