// =============================================================================
// ENGINE - window, event loop and frame pacing
// =============================================================================
//
// FRAME FLOW:
// 1. Platform events are translated into engine events and dispatched
// 2. The renderer draws and presents one frame per redraw
// 3. A redraw is requested again as soon as the loop goes idle
//
// Every renderer failure is fatal: it is logged with a backtrace and the
// process aborts.

use crate::backend::{FrameOutcome, VulkanDevice};
use crate::config::Config;
use crate::error::RenderError;
use crate::events::{Event, EventDispatcher, EventKind};
use crate::renderer::Renderer;
use crate::window;
use anyhow::{Context, Result};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

/// Run the engine until the window is closed.
pub fn run(config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut engine = Engine::new(config);
    event_loop
        .run_app(&mut engine)
        .context("Event loop terminated with an error")?;
    Ok(())
}

/// Log the error chain and a backtrace, then abort.
pub fn fatal(err: &anyhow::Error) -> ! {
    log::error!("Fatal: {:?}", err);
    if let Some(cause) = unmet_precondition(err) {
        log::error!("This machine cannot run the renderer: {}", cause);
    }
    log::error!("Backtrace:\n{}", std::backtrace::Backtrace::force_capture());
    log::logger().flush();
    std::process::abort()
}

/// The renderer error behind `err`, when it is a missing requirement
/// (no Vulkan, no usable GPU, no validation layer) rather than a failed call.
pub fn unmet_precondition(err: &anyhow::Error) -> Option<&RenderError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RenderError>())
        .filter(|cause| cause.is_precondition())
}

// =============================================================================
// FPS TRACKING
// =============================================================================

/// Frames per second over roughly one-second windows.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    frame_count: u32,
    last_update: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    const INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_update: now,
            last_frame: now,
        }
    }

    /// Count one frame. Once per interval returns (fps, last frame time in ms).
    pub fn tick(&mut self, now: Instant) -> Option<(f32, f32)> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_update);
        if elapsed < Self::INTERVAL {
            return None;
        }

        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_update = now;
        Some((fps, frame_time * 1000.0))
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub struct Engine {
    config: Config,
    events: EventDispatcher,
    running: Rc<Cell<bool>>,
    // Dropped before the window: the surface must not outlive it
    renderer: Option<Renderer<VulkanDevice>>,
    window: Option<Arc<Window>>,
    fps: FpsCounter,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let running = Rc::new(Cell::new(true));
        let mut events = EventDispatcher::new();

        let flag = Rc::clone(&running);
        events.subscribe(EventKind::Quit, move |_| {
            log::info!("Quit requested, shutting down...");
            flag.set(false);
        });
        events.subscribe(EventKind::WindowResized, |event| {
            if let Event::WindowResized { width, height } = event {
                log::info!(
                    "Window resized to {}x{}; the presentation chain is now stale",
                    width,
                    height
                );
            }
        });

        Self {
            config,
            events,
            running,
            renderer: None,
            window: None,
            fps: FpsCounter::new(Instant::now()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Subscribe additional callbacks before the loop starts.
    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let (display, raw_window) = window::raw_handles(window);
        let device = VulkanDevice::new(&self.config.device_config(), display, raw_window)
            .context("Failed to create Vulkan device")?;

        let shaders = self.config.shader_source();
        log::info!("Loading shaders from {:?}", shaders.root());

        let renderer = Renderer::new(
            Arc::new(device),
            self.config.renderer_settings(),
            window::pixel_extent(window),
            &shaders,
        )
        .context("Failed to create renderer")?;

        self.renderer = Some(renderer);
        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if let FrameOutcome::Presented { .. } = renderer.render()? {
            self.update_fps();
        }
        Ok(())
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        if let Some((fps, frame_ms)) = self.fps.tick(Instant::now()) {
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title, fps, frame_ms
                ));
            }
        }
    }

    fn emit(&mut self, event_loop: &ActiveEventLoop, event: Event) {
        self.events.emit(&event);
        if !self.is_running() {
            event_loop.exit();
        }
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                log::error!("{}", e);
            }
            // Dropping releases every device object, then the device itself
            drop(renderer);
            log::info!("Cleanup complete");
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for Engine {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = window::window_attributes(&self.config.window);
        let window = match event_loop.create_window(attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => fatal(&anyhow::Error::new(e).context("Failed to create window")),
        };

        if let Err(e) = self.init_vulkan(&window) {
            fatal(&e);
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.emit(event_loop, Event::Quit),

            WindowEvent::Resized(size) => self.emit(
                event_loop,
                Event::WindowResized {
                    width: size.width,
                    height: size.height,
                },
            ),

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    self.emit(event_loop, Event::Quit);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.is_running() {
                    if let Err(e) = self.render_frame() {
                        fatal(&e);
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if !self.is_running() {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
