// vulkan-quad - a minimal Vulkan renderer
//
// Stands up the full object chain (instance -> device -> swapchain ->
// pipeline), pre-records one draw command buffer per swapchain image and
// presents a colored quad in a loop. Window resizes rebuild the
// swapchain-dependent half of the chain; every Vulkan failure is fatal and
// maps to a nonzero process exit.

mod backend;
mod config;
mod renderer;

use anyhow::Result;
use config::Config;
use renderer::Renderer;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!(
        "Starting renderer: {}x{}, present mode {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // A fatal Vulkan error unwinds here as exit code 1; a plain window
    // close exits 0.
    match app.fatal_error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

/// Application state driven by the winit event loop.
struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    /// Set on window resize - triggers swapchain recreation before the
    /// next frame.
    needs_resize: bool,
    /// Set while the window has zero size - rendering is skipped.
    is_minimized: bool,

    fatal_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            needs_resize: false,
            is_minimized: false,
            fatal_error: None,
        }
    }

    fn fail(&mut self, error: anyhow::Error, event_loop: &ActiveEventLoop) {
        log::error!("error: {:#}", error);
        self.fatal_error = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        if self.is_minimized {
            return Ok(());
        }

        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if self.needs_resize {
            renderer.recreate_swapchain()?;
            self.needs_resize = false;
        }

        renderer.render_frame()
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(anyhow::anyhow!("Failed to create window: {e}"), event_loop);
                return;
            }
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(e, event_loop);
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    renderer.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(e, event_loop);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("Escape pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
