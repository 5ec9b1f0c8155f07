// Window helpers
//
// The window is configured once from `[window]`; afterwards the renderer
// only needs its native handles and its current size in pixels.

use crate::config::WindowConfig;
use ash::vk;
use winit::dpi::PhysicalSize;
use winit::raw_window_handle_05::{
    HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use winit::window::{Fullscreen, Window, WindowAttributes};

pub fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    let mut attributes = WindowAttributes::default()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.width, config.height));

    if config.fullscreen {
        attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    attributes
}

/// Current drawable size in physical pixels.
pub fn pixel_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

pub fn raw_handles(window: &Window) -> (RawDisplayHandle, RawWindowHandle) {
    (window.raw_display_handle(), window.raw_window_handle())
}
