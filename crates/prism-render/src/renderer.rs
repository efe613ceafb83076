// SPDX-License-Identifier: CEPL-1.0
use crate::command::{create_command_infrastructure, CommandInfrastructure};
use crate::config::RenderConfig;
use crate::device::{create_context, DeviceContext};
use crate::driver::{AppInfo, Driver};
use crate::error::{FrameError, InitError, SurfaceError};
use crate::frame::{FrameDriver, FrameOutcome, FramePhase, FrameResources};
use crate::render_pass::{create_render_pass, wants_render_pass};
use crate::surface::{create_surface, Surface};
use crate::swapchain::{create_swapchain, Swapchain, SwapchainConfig};
use crate::sync::{create_synchronizer, FrameSynchronizer};
use crate::targets::{create_render_targets, RenderTargetSet};
use crate::teardown::TeardownStack;
use crate::window::PresentationWindow;
use ash::vk;
use raw_window_handle::HandleError;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Cycles started.
    pub frames: u64,
    pub presented: u64,
    /// Cycles dropped at acquire.
    pub skipped: u64,
    /// Cycles whose present failed.
    pub present_failures: u64,
}

/// Owns the driver and every object built on it.
///
/// Construction runs in dependency order; dropping (or [`Renderer::shutdown`])
/// releases everything in reverse after draining the device.
pub struct Renderer<D: Driver> {
    driver: D,
    teardown: TeardownStack,
    context: DeviceContext,
    surface: Surface,
    swapchain: Swapchain,
    targets: RenderTargetSet,
    commands: CommandInfrastructure,
    sync: FrameSynchronizer,
    frames: FrameDriver,
    clear_color: [f32; 4],
}

impl<D: Driver> std::fmt::Debug for Renderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("context", &self.context)
            .field("swapchain", &self.swapchain.handle)
            .field("image_count", &self.swapchain.image_count)
            .field("phase", &self.frames.phase())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Drop for Renderer<D> {
    fn drop(&mut self) {
        self.frames.stop();
        self.teardown.unwind(&mut self.driver);
    }
}

fn handle_error(e: HandleError) -> InitError {
    warn!("window handle unavailable: {e}");
    InitError::Surface(SurfaceError::WindowHandleUnavailable)
}

impl<D: Driver> Renderer<D> {
    /// Builds the full chain for `window`.
    ///
    /// On failure everything already created is released, in reverse, before
    /// the error is returned.
    pub fn new<W>(mut driver: D, window: &W, config: &RenderConfig) -> Result<Self, InitError>
    where
        W: PresentationWindow + ?Sized,
    {
        let mut teardown = TeardownStack::new();
        match Self::build(&mut driver, &mut teardown, window, config) {
            Ok(parts) => {
                let (context, surface, swapchain, targets, commands, sync) = parts;
                let frames = FrameDriver::new(
                    sync.slots.len(),
                    swapchain.images.len(),
                    config.fence_starts_signaled,
                );
                info!(
                    "renderer ready: {} images, {} frame(s) in flight, fence {}",
                    swapchain.image_count,
                    frames.slots(),
                    if config.fence_starts_signaled {
                        "pre-signaled"
                    } else {
                        "unsignaled"
                    }
                );
                Ok(Renderer {
                    driver,
                    teardown,
                    context,
                    surface,
                    swapchain,
                    targets,
                    commands,
                    sync,
                    frames,
                    clear_color: config.clear_color,
                })
            }
            Err(e) => {
                error!(stage = %e.stage(), code = ?e.native_code(), "startup failed: {e}");
                teardown.unwind(&mut driver);
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn build<W>(
        driver: &mut D,
        teardown: &mut TeardownStack,
        window: &W,
        config: &RenderConfig,
    ) -> Result<
        (
            DeviceContext,
            Surface,
            Swapchain,
            RenderTargetSet,
            CommandInfrastructure,
            FrameSynchronizer,
        ),
        InitError,
    >
    where
        W: PresentationWindow + ?Sized,
    {
        let display = window.display_handle().map_err(handle_error)?.as_raw();
        let raw_window = window.window_handle().map_err(handle_error)?.as_raw();

        let app = AppInfo {
            name: config.app_name.clone(),
            ..AppInfo::default()
        };
        let context = create_context(driver, display, &app, teardown)?;
        let surface = create_surface(driver, &context, display, raw_window, teardown)?;

        let use_render_pass = wants_render_pass(config.render_pass, &surface.capabilities);
        if use_render_pass != config.render_pass {
            warn!("surface lacks TRANSFER_DST usage, clearing through a render pass");
        }

        let swapchain = create_swapchain(
            driver,
            &context,
            &surface,
            &SwapchainConfig {
                desired_image_count: config.desired_image_count,
                vsync_mode: config.vsync_mode,
                extent_hint: window.size(),
                transfer_dst: !use_render_pass,
            },
            teardown,
        )?;

        let render_pass = if use_render_pass {
            Some(create_render_pass(driver, swapchain.format.format, teardown)?)
        } else {
            None
        };
        let targets = create_render_targets(driver, &swapchain, render_pass, teardown)?;

        let slots = config.effective_frames_in_flight(swapchain.images.len());
        let commands = create_command_infrastructure(driver, &context, slots, teardown)?;
        let sync = create_synchronizer(driver, slots, config.fence_starts_signaled, teardown)?;

        Ok((context, surface, swapchain, targets, commands, sync))
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }

    pub fn commands(&self) -> &CommandInfrastructure {
        &self.commands
    }

    pub fn sync(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn phase(&self) -> FramePhase {
        self.frames.phase()
    }

    pub fn frames(&self) -> &FrameDriver {
        &self.frames
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_idle(&mut self) -> Result<(), vk::Result> {
        self.driver.device_wait_idle()
    }

    pub fn draw_frame(&mut self) -> Result<FrameOutcome, FrameError> {
        let res = FrameResources {
            queue: self.context.queue,
            swapchain: &self.swapchain,
            targets: &self.targets,
            commands: &self.commands,
            sync: &self.sync,
            clear_color: self.clear_color,
        };
        self.frames.draw_frame(&mut self.driver, &res)
    }

    /// Pumps events and draws until the window asks to close or `limit`
    /// cycles have run. The close request is checked once per full cycle.
    ///
    /// Transient frame failures are logged and counted; anything else ends
    /// the loop with an error.
    pub fn run<W>(&mut self, window: &mut W, limit: Option<u64>) -> Result<RunStats, FrameError>
    where
        W: PresentationWindow + ?Sized,
    {
        let mut stats = RunStats::default();
        loop {
            window.poll_events();

            stats.frames += 1;
            match self.draw_frame() {
                Ok(FrameOutcome::Presented { suboptimal, .. }) => {
                    stats.presented += 1;
                    if suboptimal {
                        tracing::debug!(frame = stats.frames, "swapchain suboptimal");
                    }
                }
                Err(e @ FrameError::AcquireFailed { frame, code }) => {
                    warn!(frame, ?code, "{e}; frame skipped");
                    stats.skipped += 1;
                }
                Err(e @ FrameError::PresentFailed { frame, code, .. }) => {
                    warn!(frame, ?code, "{e}");
                    stats.present_failures += 1;
                }
                Err(e) => {
                    error!(frame = stats.frames, code = ?e.native_code(), "{e}");
                    return Err(e);
                }
            }

            if window.should_close() {
                info!("close requested after {} frames", stats.frames);
                break;
            }
            if limit.is_some_and(|n| stats.frames >= n) {
                info!("frame limit {} reached", stats.frames);
                break;
            }
        }
        Ok(stats)
    }

    /// Drains the device and releases everything in reverse creation order.
    pub fn shutdown(mut self) {
        self.frames.stop();
        self.teardown.unwind(&mut self.driver);
        info!("renderer shut down");
    }
}
