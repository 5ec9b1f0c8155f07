// Backend module - Vulkan abstraction layer
//
// Every device call goes through the `Gpu` trait; handles are owned by
// `Owned` wrappers and released in reverse creation order.

pub mod command;
pub mod device;
pub mod framebuffer;
pub mod gpu;
pub mod handle;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub(crate) mod fake;

pub use command::{CommandContext, DrawTarget};
pub use device::{DeviceConfig, VulkanDevice};
pub use framebuffer::FrameTargets;
pub use gpu::{DeviceObject, Gpu, QueueFamilyIndices, SurfaceSupport};
pub use handle::Owned;
pub use pipeline::DrawPipeline;
pub use shader::{InMemoryShaders, ShaderDirectory, ShaderSource, ShaderStage};
pub use swapchain::PresentationChain;
pub use sync::{FrameOutcome, FrameState, FrameSynchronizer, SyncSet};
