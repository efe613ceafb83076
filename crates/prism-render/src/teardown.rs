// SPDX-License-Identifier: CEPL-1.0
//! Ordered release of native objects.
//!
//! Every object that is successfully created is pushed here. Unwinding
//! drains the device first, then destroys in exact reverse creation order,
//! so a failed startup and a normal shutdown release things the same way.

use crate::driver::Driver;
use ash::vk::{self, Handle};
use std::fmt;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Instance,
    Device,
    Surface,
    Swapchain,
    ImageView,
    RenderPass,
    Framebuffer,
    CommandPool,
    CommandBuffer,
    Fence,
    Semaphore,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Instance => "instance",
            ObjectKind::Device => "device",
            ObjectKind::Surface => "surface",
            ObjectKind::Swapchain => "swapchain",
            ObjectKind::ImageView => "image view",
            ObjectKind::RenderPass => "render pass",
            ObjectKind::Framebuffer => "framebuffer",
            ObjectKind::CommandPool => "command pool",
            ObjectKind::CommandBuffer => "command buffer",
            ObjectKind::Fence => "fence",
            ObjectKind::Semaphore => "semaphore",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Instance(vk::Instance),
    Device(vk::Device),
    Surface(vk::SurfaceKHR),
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    RenderPass(vk::RenderPass),
    Framebuffer(vk::Framebuffer),
    CommandPool(vk::CommandPool),
    CommandBuffer {
        pool: vk::CommandPool,
        buffer: vk::CommandBuffer,
    },
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
}

impl Resource {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Resource::Instance(_) => ObjectKind::Instance,
            Resource::Device(_) => ObjectKind::Device,
            Resource::Surface(_) => ObjectKind::Surface,
            Resource::Swapchain(_) => ObjectKind::Swapchain,
            Resource::ImageView(_) => ObjectKind::ImageView,
            Resource::RenderPass(_) => ObjectKind::RenderPass,
            Resource::Framebuffer(_) => ObjectKind::Framebuffer,
            Resource::CommandPool(_) => ObjectKind::CommandPool,
            Resource::CommandBuffer { .. } => ObjectKind::CommandBuffer,
            Resource::Fence(_) => ObjectKind::Fence,
            Resource::Semaphore(_) => ObjectKind::Semaphore,
        }
    }

    pub fn raw(&self) -> u64 {
        match *self {
            Resource::Instance(h) => h.as_raw(),
            Resource::Device(h) => h.as_raw(),
            Resource::Surface(h) => h.as_raw(),
            Resource::Swapchain(h) => h.as_raw(),
            Resource::ImageView(h) => h.as_raw(),
            Resource::RenderPass(h) => h.as_raw(),
            Resource::Framebuffer(h) => h.as_raw(),
            Resource::CommandPool(h) => h.as_raw(),
            Resource::CommandBuffer { buffer, .. } => buffer.as_raw(),
            Resource::Fence(h) => h.as_raw(),
            Resource::Semaphore(h) => h.as_raw(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw() == 0
    }

    /// Hands the object back to the driver. Null handles are a no-op.
    pub fn destroy<D: Driver + ?Sized>(self, driver: &mut D) {
        if self.is_null() {
            return;
        }
        debug!("destroy {} 0x{:x}", self.kind(), self.raw());
        match self {
            Resource::Instance(h) => driver.destroy_instance(h),
            Resource::Device(h) => driver.destroy_device(h),
            Resource::Surface(h) => driver.destroy_surface(h),
            Resource::Swapchain(h) => driver.destroy_swapchain(h),
            Resource::ImageView(h) => driver.destroy_image_view(h),
            Resource::RenderPass(h) => driver.destroy_render_pass(h),
            Resource::Framebuffer(h) => driver.destroy_framebuffer(h),
            Resource::CommandPool(h) => driver.destroy_command_pool(h),
            Resource::CommandBuffer { pool, buffer } => driver.free_command_buffer(pool, buffer),
            Resource::Fence(h) => driver.destroy_fence(h),
            Resource::Semaphore(h) => driver.destroy_semaphore(h),
        }
    }
}

#[derive(Debug, Default)]
pub struct TeardownStack {
    entries: Vec<Resource>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: Resource) {
        debug!("create {} 0x{:x}", resource.kind(), resource.raw());
        self.entries.push(resource);
    }

    /// Moves everything recorded in `other` on top of this stack.
    pub fn absorb(&mut self, mut other: TeardownStack) {
        self.entries.append(&mut other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Resource] {
        &self.entries
    }

    fn holds_device(&self) -> bool {
        self.entries
            .iter()
            .any(|r| matches!(r, Resource::Device(d) if d.as_raw() != 0))
    }

    /// Destroys everything in reverse creation order, leaving the stack empty.
    ///
    /// When a logical device is on the stack, the device is drained before
    /// the first destroy.
    pub fn unwind<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        if self.entries.is_empty() {
            return;
        }
        if self.holds_device() {
            if let Err(code) = driver.device_wait_idle() {
                warn!("device_wait_idle before teardown failed: {code:?}");
            }
        }
        while let Some(resource) = self.entries.pop() {
            resource.destroy(driver);
        }
    }
}
