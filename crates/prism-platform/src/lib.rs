// SPDX-License-Identifier: CEPL-1.0
//! Native window for the presentation core, backed by winit.
//!
//! The event loop is pumped rather than run, so the render loop stays in
//! charge: each [`PresentationWindow::poll_events`] drains whatever is
//! pending and returns immediately.

pub use winit;

use anyhow::{anyhow, Result};
use prism_render::{PresentationWindow, RenderSize};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::time::Duration;
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::error::OsError;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

/// Pump rounds allowed before giving up on the window appearing.
const CREATE_ATTEMPTS: u32 = 200;

struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    size: RenderSize,
    close_requested: bool,
    create_error: Option<OsError>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let s = window.inner_size();
                self.size = RenderSize {
                    width: s.width.max(1),
                    height: s.height.max(1),
                };
                info!("window created ({}x{})", self.size.width, self.size.height);
                self.window = Some(window);
            }
            Err(e) => {
                warn!("window creation failed: {e}");
                self.create_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("close requested");
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(s) => {
                debug!("resized to {}x{}", s.width, s.height);
                self.size = RenderSize {
                    width: s.width,
                    height: s.height,
                };
            }
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl PlatformWindow {
    /// Opens a window and pumps the loop until it exists.
    pub fn new(width: u32, height: u32, title: &str) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(LogicalSize::new(width, height));

        let mut this = PlatformWindow {
            event_loop,
            state: WindowState {
                attributes,
                window: None,
                size: RenderSize { width, height },
                close_requested: false,
                create_error: None,
            },
        };

        for _ in 0..CREATE_ATTEMPTS {
            let status = this
                .event_loop
                .pump_app_events(Some(Duration::from_millis(5)), &mut this.state);
            if let Some(e) = this.state.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if this.state.window.is_some() {
                return Ok(this);
            }
            if let PumpStatus::Exit(code) = status {
                return Err(anyhow!("event loop exited ({code}) before the window opened"));
            }
        }
        Err(anyhow!("window did not appear after {CREATE_ATTEMPTS} pump rounds"))
    }

    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}

impl PresentationWindow for PlatformWindow {
    fn poll_events(&mut self) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(_) = status {
            self.state.close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn size(&self) -> RenderSize {
        self.state.size
    }
}
