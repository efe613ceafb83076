// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic presentation core.
//!
//! Builds the chain of GPU objects needed to put frames on screen, in
//! dependency order, and drives the acquire / record / submit / present
//! cycle. All native calls go through [`Driver`]; the window is consumed
//! through [`PresentationWindow`].

pub mod command;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod frame;
pub mod render_pass;
pub mod renderer;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod targets;
pub mod teardown;
pub mod window;

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;

pub use ash::vk;
pub use config::{RenderConfig, VsyncMode};
pub use driver::{AppInfo, ClearTarget, Driver, DriverResult, SubmitDesc, SwapchainDesc};
pub use error::{
    CommandError, DeviceError, FrameError, InitError, RenderTargetError, Stage, SurfaceError,
    SwapchainError, SyncError,
};
pub use frame::{FrameDriver, FrameOutcome, FramePhase};
pub use renderer::{Renderer, RunStats};
pub use teardown::{ObjectKind, Resource, TeardownStack};
pub use window::PresentationWindow;

/// Wait used for acquire and fence waits. Effectively unbounded.
pub const WAIT_FOREVER: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}
