// SPDX-License-Identifier: CEPL-1.0
//! The native-API seam.
//!
//! Every call the core makes into the graphics driver goes through
//! [`Driver`]. Handles and enums are Vulkan's, failures are raw
//! `vk::Result` codes; the core maps them onto its own error kinds.
//!
//! A driver holds at most one instance and one logical device at a time.
//! Device-level calls act on that device.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

pub type DriverResult<T> = Result<T, vk::Result>;

#[derive(Clone, Debug)]
pub struct AppInfo {
    pub name: String,
    pub version: u32,
    pub api_version: u32,
}

impl Default for AppInfo {
    fn default() -> Self {
        AppInfo {
            name: "prism".to_owned(),
            version: vk::make_api_version(0, 0, 1, 0),
            api_version: vk::API_VERSION_1_0,
        }
    }
}

/// Everything the driver needs to build a swapchain. The core fills in
/// the policy fields (sharing, transform, composite, clipping).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: vk::SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    pub clipped: bool,
}

/// What a frame clears. With a render pass the clear is the pass's load op;
/// without one the image is transitioned, cleared, and left presentable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearTarget {
    pub image: vk::Image,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub color: [f32; 4],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

pub trait Driver {
    // Windowing glue that needs the loader.
    fn supports_presentation(&self) -> bool;
    fn required_instance_extensions(
        &self,
        display: RawDisplayHandle,
    ) -> DriverResult<Vec<&'static CStr>>;
    fn create_surface(
        &mut self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> DriverResult<vk::SurfaceKHR>;

    // Instance and device.
    fn create_instance(&mut self, app: &AppInfo, extensions: &[&CStr])
        -> DriverResult<vk::Instance>;
    fn enumerate_physical_devices(&mut self) -> DriverResult<Vec<vk::PhysicalDevice>>;
    fn queue_family_properties(
        &mut self,
        physical: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;
    fn create_device(
        &mut self,
        physical: vk::PhysicalDevice,
        queue_family_index: u32,
        extensions: &[&CStr],
    ) -> DriverResult<vk::Device>;
    fn device_queue(&mut self, queue_family_index: u32) -> vk::Queue;
    fn device_wait_idle(&mut self) -> DriverResult<()>;

    // Surface queries.
    fn surface_support(
        &mut self,
        physical: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<bool>;
    fn surface_capabilities(
        &mut self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(
        &mut self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(
        &mut self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<Vec<vk::PresentModeKHR>>;

    // Object creation.
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> DriverResult<vk::SwapchainKHR>;
    fn swapchain_images(&mut self, swapchain: vk::SwapchainKHR) -> DriverResult<Vec<vk::Image>>;
    fn create_image_view(&mut self, image: vk::Image, format: vk::Format)
        -> DriverResult<vk::ImageView>;
    fn create_render_pass(&mut self, format: vk::Format) -> DriverResult<vk::RenderPass>;
    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> DriverResult<vk::Framebuffer>;
    fn create_command_pool(
        &mut self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> DriverResult<vk::CommandPool>;
    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> DriverResult<Vec<vk::CommandBuffer>>;
    fn create_fence(&mut self, signaled: bool) -> DriverResult<vk::Fence>;
    fn create_semaphore(&mut self) -> DriverResult<vk::Semaphore>;

    // Object destruction. Callers never pass null handles.
    fn destroy_instance(&mut self, instance: vk::Instance);
    fn destroy_device(&mut self, device: vk::Device);
    fn destroy_surface(&mut self, surface: vk::SurfaceKHR);
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    fn destroy_image_view(&mut self, view: vk::ImageView);
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);
    fn destroy_command_pool(&mut self, pool: vk::CommandPool);
    fn free_command_buffer(&mut self, pool: vk::CommandPool, buffer: vk::CommandBuffer);
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    // Recording.
    fn begin_command_buffer(
        &mut self,
        buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> DriverResult<()>;
    fn cmd_set_viewport_scissor(&mut self, buffer: vk::CommandBuffer, extent: vk::Extent2D);
    fn cmd_clear_target(&mut self, buffer: vk::CommandBuffer, target: &ClearTarget);
    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> DriverResult<()>;

    // Queue and presentation.
    fn queue_submit(&mut self, queue: vk::Queue, submit: &SubmitDesc) -> DriverResult<()>;
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> DriverResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> DriverResult<()>;
    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> DriverResult<(u32, bool)>;
    /// Returns whether the swapchain is suboptimal.
    fn queue_present(
        &mut self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> DriverResult<bool>;
}
