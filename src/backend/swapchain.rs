// Swapchain - Window presentation
//
// Negotiates format, present mode, extent and image count against what the
// surface reports, then owns the chain of images and one view per image.
// The chain is built once; a resized window leaves it stale.

use super::gpu::Gpu;
use super::handle::Owned;
use crate::error::{RenderError, Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Prefer sRGB BGRA8; otherwise take whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Use `preferred` when the surface offers it, FIFO (always supported) otherwise.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    available
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A current width of `u32::MAX` means the surface takes its size from the
/// swapchain, so the window's pixel size is clamped into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, unless that exceeds a nonzero maximum.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        caps.max_image_count
    } else {
        count
    }
}

pub struct PresentationChain<G: Gpu> {
    // Views reference the swapchain images: declared first so they drop first
    image_views: Vec<Owned<G, vk::ImageView>>,
    images: Vec<vk::Image>,
    swapchain: Owned<G, vk::SwapchainKHR>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl<G: Gpu> PresentationChain<G> {
    pub fn new(
        gpu: &Arc<G>,
        window_extent: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        log::info!("Creating swapchain");

        let support = gpu.surface_support().during("query surface support")?;
        let caps = &support.capabilities;

        let surface_format =
            choose_surface_format(&support.formats).ok_or(RenderError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_mode);
        let extent = choose_extent(caps, window_extent);
        let image_count = choose_image_count(caps);

        log::info!(
            "Swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let families = gpu.queue_families();
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(gpu.surface())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = gpu.create_swapchain(&create_info).creating("swapchain")?;
        let swapchain = Owned::new(gpu, swapchain);

        let images = gpu
            .swapchain_images(swapchain.handle())
            .during("get swapchain images")?;

        log::info!("Created swapchain with {} images", images.len());

        let mut chain = Self {
            image_views: Vec::with_capacity(images.len()),
            images,
            swapchain,
            format: surface_format.format,
            extent,
            present_mode,
        };

        // A failure part way through drops `chain`, releasing the views made so far
        for i in 0..chain.images.len() {
            let view = create_image_view(gpu, chain.images[i], chain.format)?;
            chain.image_views.push(view);
        }

        Ok(chain)
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain.handle()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> impl ExactSizeIterator<Item = vk::ImageView> + '_ {
        self.image_views.iter().map(Owned::handle)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

fn create_image_view<G: Gpu>(
    gpu: &Arc<G>,
    image: vk::Image,
    format: vk::Format,
) -> Result<Owned<G, vk::ImageView>> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = gpu.create_image_view(&create_info).creating("image view")?;
    Ok(Owned::new(gpu, view))
}
