// Device seam
//
// Every device-level call the renderer makes goes through `Gpu`. The Vulkan
// implementation is `VulkanDevice`; tests drive the same code through a
// recording fake. Handles stay plain `ash::vk` types on both sides.

use ash::prelude::VkResult;
use ash::vk;

/// Queue families chosen for the selected physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// True when one family handles both graphics and presentation.
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What the surface supports on the selected device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// A device object that can be handed back to `Gpu::destroy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceObject {
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    RenderPass(vk::RenderPass),
    ShaderModule(vk::ShaderModule),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Framebuffer(vk::Framebuffer),
    CommandPool(vk::CommandPool),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
}

macro_rules! device_object {
    ($($variant:ident => $handle:ty),* $(,)?) => {
        $(
            impl From<$handle> for DeviceObject {
                fn from(handle: $handle) -> Self {
                    DeviceObject::$variant(handle)
                }
            }
        )*
    };
}

device_object! {
    Swapchain => vk::SwapchainKHR,
    ImageView => vk::ImageView,
    RenderPass => vk::RenderPass,
    ShaderModule => vk::ShaderModule,
    PipelineLayout => vk::PipelineLayout,
    Pipeline => vk::Pipeline,
    Framebuffer => vk::Framebuffer,
    CommandPool => vk::CommandPool,
    Semaphore => vk::Semaphore,
    Fence => vk::Fence,
}

/// Logical-device operations used by the presentation pipeline.
///
/// All waits are indefinite. Implementations are driven from a single
/// thread and need no internal locking.
pub trait Gpu {
    // ─────────────────────────────────────────────────────────────────────
    // Device description
    // ─────────────────────────────────────────────────────────────────────
    fn queue_families(&self) -> QueueFamilyIndices;
    fn graphics_queue(&self) -> vk::Queue;
    fn present_queue(&self) -> vk::Queue;
    fn surface(&self) -> vk::SurfaceKHR;
    fn surface_support(&self) -> VkResult<SurfaceSupport>;

    // ─────────────────────────────────────────────────────────────────────
    // Object creation / destruction
    // ─────────────────────────────────────────────────────────────────────
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass>;
    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout>;
    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline>;
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer>;
    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool>;
    /// Command buffers are released together with their pool.
    fn allocate_command_buffer(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
    ) -> VkResult<vk::CommandBuffer>;
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy(&self, object: DeviceObject);

    // ─────────────────────────────────────────────────────────────────────
    // Frame protocol
    // ─────────────────────────────────────────────────────────────────────
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: &vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: &vk::Rect2D);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> VkResult<()>;
    /// Returns whether the swapchain is suboptimal.
    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool>;
    fn wait_idle(&self) -> VkResult<()>;
}
