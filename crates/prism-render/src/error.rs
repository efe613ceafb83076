// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("graphics API not available on this platform")]
    UnsupportedPlatform,
    #[error("instance creation failed ({0:?})")]
    ContextCreationFailed(vk::Result),
    #[error("physical device enumeration failed ({0:?})")]
    EnumerationFailed(vk::Result),
    #[error("no physical accelerator found")]
    NoAcceleratorFound,
    #[error("no queue family with graphics support")]
    NoGraphicsQueue,
    #[error("logical device creation failed ({0:?})")]
    DeviceCreationFailed(vk::Result),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("device context was never brought up")]
    NoContext,
    #[error("window handle unavailable")]
    WindowHandleUnavailable,
    #[error("surface creation failed ({0:?})")]
    SurfaceCreationFailed(vk::Result),
    #[error("queue family cannot present to this surface")]
    PresentationUnsupported,
    #[error("surface query failed ({0:?})")]
    QueryFailed(vk::Result),
    #[error("surface reports no pixel formats")]
    NoSurfaceFormats,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainError {
    #[error("present mode query failed ({0:?})")]
    QueryFailed(vk::Result),
    #[error("swapchain creation failed ({0:?})")]
    SwapchainCreationFailed(vk::Result),
    #[error("swapchain image retrieval failed ({0:?})")]
    ImageQueryFailed(vk::Result),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetError {
    #[error("render pass creation failed ({0:?})")]
    RenderPassCreationFailed(vk::Result),
    #[error("image view {index} creation failed ({code:?})")]
    ImageViewCreationFailed { index: usize, code: vk::Result },
    #[error("framebuffer {index} creation failed ({code:?})")]
    FramebufferCreationFailed { index: usize, code: vk::Result },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("command pool creation failed ({0:?})")]
    PoolCreationFailed(vk::Result),
    #[error("command buffer allocation failed ({0:?})")]
    BufferAllocationFailed(vk::Result),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("fence creation failed ({0:?})")]
    FenceCreationFailed(vk::Result),
    #[error("semaphore creation failed ({0:?})")]
    SemaphoreCreationFailed(vk::Result),
}

/// Construction stage, in build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    DeviceContext,
    Surface,
    Swapchain,
    RenderPass,
    RenderTargets,
    Commands,
    Sync,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::DeviceContext => "device context",
            Stage::Surface => "presentation surface",
            Stage::Swapchain => "swapchain",
            Stage::RenderPass => "render pass",
            Stage::RenderTargets => "render targets",
            Stage::Commands => "command infrastructure",
            Stage::Sync => "frame synchronizer",
        })
    }
}

/// Fatal startup failure. Whatever was built before it has been released.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error("device context: {0}")]
    Device(#[from] DeviceError),
    #[error("presentation surface: {0}")]
    Surface(#[from] SurfaceError),
    #[error("swapchain: {0}")]
    Swapchain(#[from] SwapchainError),
    #[error("render targets: {0}")]
    RenderTarget(#[from] RenderTargetError),
    #[error("command infrastructure: {0}")]
    Command(#[from] CommandError),
    #[error("frame synchronizer: {0}")]
    Sync(#[from] SyncError),
}

impl InitError {
    pub fn stage(&self) -> Stage {
        match self {
            InitError::Device(_) => Stage::DeviceContext,
            InitError::Surface(_) => Stage::Surface,
            InitError::Swapchain(_) => Stage::Swapchain,
            InitError::RenderTarget(RenderTargetError::RenderPassCreationFailed(_)) => {
                Stage::RenderPass
            }
            InitError::RenderTarget(_) => Stage::RenderTargets,
            InitError::Command(_) => Stage::Commands,
            InitError::Sync(_) => Stage::Sync,
        }
    }

    /// Native result code behind the failure, when the driver reported one.
    pub fn native_code(&self) -> Option<vk::Result> {
        match *self {
            InitError::Device(e) => match e {
                DeviceError::ContextCreationFailed(c)
                | DeviceError::EnumerationFailed(c)
                | DeviceError::DeviceCreationFailed(c) => Some(c),
                DeviceError::UnsupportedPlatform
                | DeviceError::NoAcceleratorFound
                | DeviceError::NoGraphicsQueue => None,
            },
            InitError::Surface(e) => match e {
                SurfaceError::SurfaceCreationFailed(c) | SurfaceError::QueryFailed(c) => Some(c),
                SurfaceError::NoContext
                | SurfaceError::WindowHandleUnavailable
                | SurfaceError::PresentationUnsupported
                | SurfaceError::NoSurfaceFormats => None,
            },
            InitError::Swapchain(
                SwapchainError::QueryFailed(c)
                | SwapchainError::SwapchainCreationFailed(c)
                | SwapchainError::ImageQueryFailed(c),
            ) => Some(c),
            InitError::RenderTarget(e) => match e {
                RenderTargetError::RenderPassCreationFailed(code)
                | RenderTargetError::ImageViewCreationFailed { code, .. }
                | RenderTargetError::FramebufferCreationFailed { code, .. } => Some(code),
            },
            InitError::Command(
                CommandError::PoolCreationFailed(c) | CommandError::BufferAllocationFailed(c),
            ) => Some(c),
            InitError::Sync(
                SyncError::FenceCreationFailed(c) | SyncError::SemaphoreCreationFailed(c),
            ) => Some(c),
        }
    }
}

/// Failure inside one frame cycle. `frame` is the 1-based cycle number.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame {frame}: acquire failed ({code:?})")]
    AcquireFailed { frame: u64, code: vk::Result },
    #[error("frame {frame}: present of image {image_index} failed ({code:?})")]
    PresentFailed {
        frame: u64,
        image_index: u32,
        code: vk::Result,
    },
    #[error("frame {frame}: command recording failed ({code:?})")]
    RecordFailed { frame: u64, code: vk::Result },
    #[error("frame {frame}: queue submit failed ({code:?})")]
    SubmitFailed { frame: u64, code: vk::Result },
    #[error("frame {frame}: fence wait failed ({code:?})")]
    FenceWaitFailed { frame: u64, code: vk::Result },
    #[error("frame {frame}: fence reset failed ({code:?})")]
    FenceResetFailed { frame: u64, code: vk::Result },
    #[error("frame driver is stopped")]
    Stopped,
}

impl FrameError {
    /// Transient failures skip or lose one frame; the loop keeps going.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FrameError::AcquireFailed { .. } | FrameError::PresentFailed { .. }
        )
    }

    pub fn native_code(&self) -> Option<vk::Result> {
        match *self {
            FrameError::AcquireFailed { code, .. }
            | FrameError::PresentFailed { code, .. }
            | FrameError::RecordFailed { code, .. }
            | FrameError::SubmitFailed { code, .. }
            | FrameError::FenceWaitFailed { code, .. }
            | FrameError::FenceResetFailed { code, .. } => Some(code),
            FrameError::Stopped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_follows_the_failing_step() {
        let e: InitError = RenderTargetError::RenderPassCreationFailed(
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        )
        .into();
        assert_eq!(e.stage(), Stage::RenderPass);

        let e: InitError = RenderTargetError::ImageViewCreationFailed {
            index: 1,
            code: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        }
        .into();
        assert_eq!(e.stage(), Stage::RenderTargets);
        assert_eq!(e.native_code(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
    }

    #[test]
    fn classification_only_errors_carry_no_code() {
        let e: InitError = DeviceError::NoAcceleratorFound.into();
        assert_eq!(e.native_code(), None);
        assert_eq!(e.stage(), Stage::DeviceContext);

        let e: InitError = SurfaceError::WindowHandleUnavailable.into();
        assert_eq!(e.native_code(), None);
        assert_eq!(e.stage(), Stage::Surface);
    }

    #[test]
    fn only_acquire_and_present_are_transient() {
        let code = vk::Result::ERROR_OUT_OF_DATE_KHR;
        assert!(FrameError::AcquireFailed { frame: 1, code }.is_transient());
        assert!(FrameError::PresentFailed {
            frame: 1,
            image_index: 0,
            code
        }
        .is_transient());
        assert!(!FrameError::SubmitFailed { frame: 1, code }.is_transient());
        assert!(!FrameError::Stopped.is_transient());
    }
}
