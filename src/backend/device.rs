// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Window surface creation
// - Physical device selection (first device that can draw and present)
// - Logical device + queue creation
//
// `VulkanDevice` is the real implementation of the `Gpu` seam. The
// selection rules are plain functions over `DeviceCandidate` so they can be
// tested without a driver.

use super::gpu::{DeviceObject, Gpu, QueueFamilyIndices, SurfaceSupport};
use crate::error::{RenderError, Result, VkResultExt};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};
use winit::raw_window_handle_05::{RawDisplayHandle, RawWindowHandle};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Instance-level settings for device creation.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub app_name: String,
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub enable_validation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "tri-renderer".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Physical device selection
// ─────────────────────────────────────────────────────────────────────────────

/// What one queue family of a candidate can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// The facts device selection looks at, gathered per physical device.
#[derive(Debug, Clone, Default)]
pub struct DeviceCandidate {
    pub name: String,
    pub queue_families: Vec<QueueFamilySupport>,
    pub extensions: Vec<String>,
    pub format_count: usize,
    pub present_mode_count: usize,
}

/// First graphics-capable family and first present-capable family.
pub fn find_queue_families(families: &[QueueFamilySupport]) -> Option<QueueFamilyIndices> {
    let graphics = families.iter().position(|f| f.graphics)?;
    let present = families.iter().position(|f| f.present)?;
    Some(QueueFamilyIndices {
        graphics: graphics as u32,
        present: present as u32,
    })
}

pub fn is_device_suitable(candidate: &DeviceCandidate) -> bool {
    let families_complete = find_queue_families(&candidate.queue_families).is_some();

    let extensions_supported = required_device_extensions().iter().all(|required| {
        let required = required.to_string_lossy();
        candidate.extensions.iter().any(|ext| *ext == required)
    });

    // Surface support is only queried for devices that can present at all
    let swapchain_adequate =
        extensions_supported && candidate.format_count > 0 && candidate.present_mode_count > 0;

    families_complete && extensions_supported && swapchain_adequate
}

/// First suitable candidate and its index, in enumeration order.
///
/// Candidates are pulled lazily, so nothing past the chosen device is
/// queried. A candidate whose query failed counts as unsuitable.
pub fn select_physical_device<I>(candidates: I) -> Result<(usize, DeviceCandidate)>
where
    I: IntoIterator<Item = Result<DeviceCandidate>>,
{
    let mut seen = 0;
    for (index, candidate) in candidates.into_iter().enumerate() {
        seen += 1;
        match candidate {
            Ok(candidate) => {
                let suitable = is_device_suitable(&candidate);
                log::debug!("GPU candidate {:?}: suitable = {}", candidate.name, suitable);
                if suitable {
                    return Ok((index, candidate));
                }
            }
            Err(e) => log::warn!("Skipping GPU {}: {}", index, e),
        }
    }

    if seen == 0 {
        Err(RenderError::NoDevices)
    } else {
        Err(RenderError::NoSuitableDevice(seen))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance-level objects
// ─────────────────────────────────────────────────────────────────────────────

/// Instance, debug messenger and surface. Filled in step by step so an early
/// return releases exactly what was created.
struct InstanceContext {
    surface: vk::SurfaceKHR,
    surface_loader: khr::Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
    entry: Entry,
}

impl InstanceContext {
    fn new(config: &DeviceConfig, display: RawDisplayHandle) -> Result<Self> {
        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;

        if config.enable_validation {
            check_validation_layer(&entry)?;
        }

        // Also passed to instance creation, so vkCreateInstance and
        // vkDestroyInstance are reported too
        let mut debug_info = debug_messenger_info().build();

        // Step 2: Create instance
        let instance = create_instance(
            &entry,
            config,
            display,
            config.enable_validation.then_some(&mut debug_info),
        )?;
        let surface_loader = khr::Surface::new(&entry, &instance);

        let mut context = Self {
            surface: vk::SurfaceKHR::null(),
            surface_loader,
            debug_utils: None,
            instance,
            entry,
        };

        // Step 3: Setup debug messenger if validation enabled
        if config.enable_validation {
            context.debug_utils = Some(setup_debug_messenger(
                &context.entry,
                &context.instance,
                &debug_info,
            )?);
        }

        Ok(context)
    }

    fn create_surface(&mut self, display: RawDisplayHandle, window: RawWindowHandle) -> Result<()> {
        log::info!("Creating window surface");
        self.surface = unsafe {
            ash_window::create_surface(&self.entry, &self.instance, display, window, None)
        }
        .creating("window surface")?;
        Ok(())
    }

    /// Gather what device selection needs to know about `physical_device`.
    fn describe(&self, physical_device: vk::PhysicalDevice) -> Result<DeviceCandidate> {
        let properties = unsafe { self.instance.get_physical_device_properties(physical_device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let family_properties = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        };
        let mut queue_families = Vec::with_capacity(family_properties.len());
        for (index, family) in family_properties.iter().enumerate() {
            let present = unsafe {
                self.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index as u32,
                    self.surface,
                )
            }
            .during("query surface support")?;
            queue_families.push(QueueFamilySupport {
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            });
        }

        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(physical_device)
        }
        .during("enumerate device extensions")?
        .iter()
        .map(|ext| {
            unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect();

        let mut candidate = DeviceCandidate {
            name,
            queue_families,
            extensions,
            format_count: 0,
            present_mode_count: 0,
        };

        // Mirrors is_device_suitable: no swapchain extension, no surface query
        let has_swapchain = required_device_extensions()
            .iter()
            .all(|required| candidate.extensions.iter().any(|e| *e == required.to_string_lossy()));
        if has_swapchain {
            candidate.format_count = unsafe {
                self.surface_loader
                    .get_physical_device_surface_formats(physical_device, self.surface)
            }
            .during("query surface formats")?
            .len();
            candidate.present_mode_count = unsafe {
                self.surface_loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)
            }
            .during("query present modes")?
            .len();
        }

        Ok(candidate)
    }

    fn pick_physical_device(&self) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices =
            unsafe { self.instance.enumerate_physical_devices() }.during("enumerate GPUs")?;

        let (index, candidate) =
            select_physical_device(devices.iter().map(|&device| self.describe(device)))?;
        let families = find_queue_families(&candidate.queue_families)
            .ok_or(RenderError::NoSuitableDevice(devices.len()))?;

        log::info!("Selected GPU: {}", candidate.name);
        log::info!(
            "Queue families: graphics = {}, present = {}",
            families.graphics,
            families.present
        );

        Ok((devices[index], families))
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn check_validation_layer(entry: &Entry) -> Result<()> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .during("enumerate instance layers")?;

    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

    if available {
        Ok(())
    } else {
        Err(RenderError::MissingValidationLayer(
            VALIDATION_LAYER.to_string_lossy().into_owned(),
        ))
    }
}

fn create_instance(
    entry: &Entry,
    config: &DeviceConfig,
    display: RawDisplayHandle,
    debug_info: Option<&mut vk::DebugUtilsMessengerCreateInfoEXT>,
) -> Result<ash::Instance> {
    // Interior NULs can't cross the C boundary; drop them
    let app_name_cstr = CString::new(config.app_name.replace('\0', "")).unwrap_or_default();
    let engine_name = c"No Engine";

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    // Platform surface extensions for whatever windowing system winit runs on
    let mut extensions = ash_window::enumerate_required_extensions(display)
        .creating("instance extension list")?
        .to_vec();
    if config.enable_validation {
        extensions.push(DebugUtils::name().as_ptr());
    }

    let layer_names = if config.enable_validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let create_info = instance_info(&app_info, &extensions, &layer_names, debug_info);

    unsafe { entry.create_instance(&create_info, None) }.creating("Vulkan instance")
}

/// Chains the messenger info onto the instance info when one is given.
fn instance_info<'a>(
    app_info: &'a vk::ApplicationInfo,
    extensions: &'a [*const c_char],
    layers: &'a [*const c_char],
    debug_info: Option<&'a mut vk::DebugUtilsMessengerCreateInfoEXT>,
) -> vk::InstanceCreateInfoBuilder<'a> {
    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(layers);

    match debug_info {
        Some(debug_info) => create_info.push_next(debug_info),
        None => create_info,
    }
}

fn debug_messenger_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
    create_info: &vk::DebugUtilsMessengerCreateInfoEXT,
) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = DebugUtils::new(entry, instance);

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(create_info, None) }
        .creating("debug messenger")?;

    Ok((debug_utils, messenger))
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilyIndices,
) -> Result<ash::Device> {
    let queue_priorities = [1.0];
    let queue_create_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
                .build()
        })
        .collect();

    let extensions: Vec<_> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .creating("logical device")
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    swapchain_loader: khr::Swapchain,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    families: QueueFamilyIndices,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    // Destroyed after the logical device
    context: InstanceContext,
}

impl VulkanDevice {
    /// Create the instance, window surface and logical device.
    pub fn new(
        config: &DeviceConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", config.app_name);

        let mut context = InstanceContext::new(config, display)?;

        // Step 4: Create surface before device selection; presentation support depends on it
        context.create_surface(display, window)?;

        // Step 5: Pick physical device (GPU)
        let (physical_device, families) = context.pick_physical_device()?;

        // Step 6: Create logical device
        log::info!("Creating logical device");
        let device = create_logical_device(&context.instance, physical_device, families)?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = khr::Swapchain::new(&context.instance, &device);

        Ok(Self {
            swapchain_loader,
            graphics_queue,
            present_queue,
            families,
            device,
            physical_device,
            context,
        })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        unsafe {
            // Wait for device to finish
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        // `context` drops next: surface, messenger, instance
    }
}

impl Gpu for VulkanDevice {
    fn queue_families(&self) -> QueueFamilyIndices {
        self.families
    }

    fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.context.surface
    }

    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        let loader = &self.context.surface_loader;
        let surface = self.context.surface;
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(self.physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(self.physical_device, surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(self.physical_device, surface)?,
            })
        }
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&info, None) }
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(info),
                None,
            )
        }
        .map_err(|(_, result)| result)?;
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    fn allocate_command_buffer(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
    ) -> VkResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }?;
        buffers
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
    }

    fn destroy(&self, object: DeviceObject) {
        let device = &self.device;
        unsafe {
            match object {
                DeviceObject::Swapchain(h) => self.swapchain_loader.destroy_swapchain(h, None),
                DeviceObject::ImageView(h) => device.destroy_image_view(h, None),
                DeviceObject::RenderPass(h) => device.destroy_render_pass(h, None),
                DeviceObject::ShaderModule(h) => device.destroy_shader_module(h, None),
                DeviceObject::PipelineLayout(h) => device.destroy_pipeline_layout(h, None),
                DeviceObject::Pipeline(h) => device.destroy_pipeline(h, None),
                DeviceObject::Framebuffer(h) => device.destroy_framebuffer(h, None),
                DeviceObject::CommandPool(h) => device.destroy_command_pool(h, None),
                DeviceObject::Semaphore(h) => device.destroy_semaphore(h, None),
                DeviceObject::Fence(h) => device.destroy_fence(h, None),
            }
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(cmd, 0, std::slice::from_ref(viewport))
        }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: &vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(scissor)) }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, 0, 0) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> VkResult<()> {
        unsafe { self.device.queue_submit(queue, submits, fence) }
    }

    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        unsafe { self.swapchain_loader.queue_present(queue, info) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
