// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan implementation of [`prism_render::Driver`] on top of `ash`.
//!
//! The loader is opened at runtime, so a machine without Vulkan still
//! starts; it simply reports no presentation support.

mod record;

use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use prism_render::{AppInfo, ClearTarget, Driver, DriverResult, SubmitDesc, SwapchainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use tracing::{debug, info, warn};

const NOT_READY: vk::Result = vk::Result::ERROR_INITIALIZATION_FAILED;

pub struct VkDriver {
    entry: Option<Entry>,
    instance: Option<Instance>,
    surface_loader: Option<surface::Instance>,
    device: Option<ash::Device>,
    swapchain_loader: Option<swapchain::Device>,
}

impl Default for VkDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl VkDriver {
    /// Opens the system Vulkan loader. Failure is logged, not returned.
    pub fn new() -> Self {
        // SAFETY: loading the library runs no Vulkan code besides its init.
        let entry = match unsafe { Entry::load() } {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Vulkan loader unavailable: {e}");
                None
            }
        };
        VkDriver {
            entry,
            instance: None,
            surface_loader: None,
            device: None,
            swapchain_loader: None,
        }
    }

    fn entry(&self) -> DriverResult<&Entry> {
        self.entry.as_ref().ok_or(vk::Result::ERROR_INCOMPATIBLE_DRIVER)
    }

    fn instance(&self) -> DriverResult<&Instance> {
        self.instance.as_ref().ok_or(NOT_READY)
    }

    fn surface_loader(&self) -> DriverResult<&surface::Instance> {
        self.surface_loader.as_ref().ok_or(NOT_READY)
    }

    fn device(&self) -> DriverResult<&ash::Device> {
        self.device.as_ref().ok_or(NOT_READY)
    }

    fn swapchain_loader(&self) -> DriverResult<&swapchain::Device> {
        self.swapchain_loader.as_ref().ok_or(NOT_READY)
    }

    fn with_device(&self, what: &str, f: impl FnOnce(&ash::Device)) {
        match &self.device {
            Some(d) => f(d),
            None => warn!("{what} after the device was destroyed"),
        }
    }
}

impl Drop for VkDriver {
    fn drop(&mut self) {
        // Normally empty by now; the renderer's teardown owns the objects.
        if let Some(device) = self.device.take() {
            warn!("device still alive when the driver dropped");
            // SAFETY: nothing else can reach the device any more.
            unsafe {
                device.device_wait_idle().ok();
                device.destroy_device(None);
            }
        }
        if let Some(instance) = self.instance.take() {
            // SAFETY: as above.
            unsafe { instance.destroy_instance(None) };
        }
    }
}

impl Driver for VkDriver {
    fn supports_presentation(&self) -> bool {
        self.entry.is_some()
    }

    fn required_instance_extensions(
        &self,
        display: RawDisplayHandle,
    ) -> DriverResult<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(display)?;
        // SAFETY: ash_window returns pointers to static NUL-terminated names.
        Ok(names
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect())
    }

    fn create_surface(
        &mut self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> DriverResult<vk::SurfaceKHR> {
        let entry = self.entry()?;
        let instance = self.instance()?;
        // SAFETY: the handles come from a live window that outlives the surface.
        unsafe { ash_window::create_surface(entry, instance, display, window, None) }
    }

    fn create_instance(
        &mut self,
        app: &AppInfo,
        extensions: &[&CStr],
    ) -> DriverResult<vk::Instance> {
        let entry = self
            .entry
            .as_ref()
            .ok_or(vk::Result::ERROR_INCOMPATIBLE_DRIVER)?;
        let app_name = CString::new(app.name.as_str()).map_err(|_| vk::Result::ERROR_UNKNOWN)?;

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app_name.as_ptr(),
            application_version: app.version,
            p_engine_name: app_name.as_ptr(),
            engine_version: app.version,
            api_version: app.api_version,
            ..Default::default()
        };

        let ext_vec: Vec<*const std::os::raw::c_char> =
            extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: ext_vec.len() as u32,
            pp_enabled_extension_names: ext_vec.as_ptr(),
            ..Default::default()
        };

        // SAFETY: every pointer in create_info outlives the call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        let handle = instance.handle();

        self.surface_loader = Some(surface::Instance::new(entry, &instance));
        self.instance = Some(instance);
        info!("Vulkan instance created for {:?}", app.name);
        Ok(handle)
    }

    fn enumerate_physical_devices(&mut self) -> DriverResult<Vec<vk::PhysicalDevice>> {
        // SAFETY: instance is live.
        unsafe { self.instance()?.enumerate_physical_devices() }
    }

    fn queue_family_properties(
        &mut self,
        physical: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        match &self.instance {
            // SAFETY: physical came from this instance.
            Some(i) => unsafe { i.get_physical_device_queue_family_properties(physical) },
            None => Vec::new(),
        }
    }

    fn create_device(
        &mut self,
        physical: vk::PhysicalDevice,
        queue_family_index: u32,
        extensions: &[&CStr],
    ) -> DriverResult<vk::Device> {
        let instance = self.instance.as_ref().ok_or(NOT_READY)?;

        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };

        let device_exts: Vec<_> = extensions.iter().map(|e| e.as_ptr()).collect();
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };

        // SAFETY: pointers in dinfo outlive the call; physical is from instance.
        let device = unsafe { instance.create_device(physical, &dinfo, None)? };
        let handle = device.handle();
        self.swapchain_loader = Some(swapchain::Device::new(instance, &device));
        self.device = Some(device);
        Ok(handle)
    }

    fn device_queue(&mut self, queue_family_index: u32) -> vk::Queue {
        match &self.device {
            // SAFETY: the device was created with one queue in this family.
            Some(d) => unsafe { d.get_device_queue(queue_family_index, 0) },
            None => vk::Queue::null(),
        }
    }

    fn device_wait_idle(&mut self) -> DriverResult<()> {
        // SAFETY: device is live.
        unsafe { self.device()?.device_wait_idle() }
    }

    fn surface_support(
        &mut self,
        physical: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<bool> {
        // SAFETY: all handles belong to this instance.
        unsafe {
            self.surface_loader()?.get_physical_device_surface_support(
                physical,
                queue_family_index,
                surface,
            )
        }
    }

    fn surface_capabilities(
        &mut self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<vk::SurfaceCapabilitiesKHR> {
        // SAFETY: as above.
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_capabilities(physical, surface)
        }
    }

    fn surface_formats(
        &mut self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<Vec<vk::SurfaceFormatKHR>> {
        // SAFETY: as above.
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_formats(physical, surface)
        }
    }

    fn surface_present_modes(
        &mut self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> DriverResult<Vec<vk::PresentModeKHR>> {
        // SAFETY: as above.
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_present_modes(physical, surface)
        }
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> DriverResult<vk::SwapchainKHR> {
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: desc.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: desc.usage,
            image_sharing_mode: desc.sharing_mode,
            pre_transform: desc.pre_transform,
            composite_alpha: desc.composite_alpha,
            present_mode: desc.present_mode,
            clipped: if desc.clipped { vk::TRUE } else { vk::FALSE },
            ..Default::default()
        };
        // SAFETY: surface is live and owned by this instance.
        let sc = unsafe { self.swapchain_loader()?.create_swapchain(&swap_info, None)? };
        debug!(
            "swapchain {}x{} fmt {:?} mode {:?}",
            desc.extent.width, desc.extent.height, desc.format.format, desc.present_mode
        );
        Ok(sc)
    }

    fn swapchain_images(&mut self, swapchain: vk::SwapchainKHR) -> DriverResult<Vec<vk::Image>> {
        // SAFETY: swapchain is live.
        unsafe { self.swapchain_loader()?.get_swapchain_images(swapchain) }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
    ) -> DriverResult<vk::ImageView> {
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: record::COLOR_RANGE,
            ..Default::default()
        };
        // SAFETY: image is a live swapchain image.
        unsafe { self.device()?.create_image_view(&iv_info, None) }
    }

    fn create_render_pass(&mut self, format: vk::Format) -> DriverResult<vk::RenderPass> {
        // Single color attachment, cleared on load, handed to present.
        let color_att = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };
        let att_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &att_ref,
            ..Default::default()
        };
        // Orders the layout transition after the acquire semaphore wait.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_att,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        // SAFETY: pointers in rp_info outlive the call.
        unsafe { self.device()?.create_render_pass(&rp_info, None) }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> DriverResult<vk::Framebuffer> {
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: &view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        // SAFETY: render pass and view are live on this device.
        unsafe { self.device()?.create_framebuffer(&fb_info, None) }
    }

    fn create_command_pool(
        &mut self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> DriverResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags,
            queue_family_index,
            ..Default::default()
        };
        // SAFETY: device is live.
        unsafe { self.device()?.create_command_pool(&pool_info, None) }
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> DriverResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        // SAFETY: pool is live on this device.
        unsafe { self.device()?.allocate_command_buffers(&alloc_info) }
    }

    fn create_fence(&mut self, signaled: bool) -> DriverResult<vk::Fence> {
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        // SAFETY: device is live.
        unsafe { self.device()?.create_fence(&fence_ci, None) }
    }

    fn create_semaphore(&mut self) -> DriverResult<vk::Semaphore> {
        let sem_ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        // SAFETY: device is live.
        unsafe { self.device()?.create_semaphore(&sem_ci, None) }
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        self.surface_loader = None;
        match self.instance.take() {
            // SAFETY: every child has been destroyed by the teardown stack.
            Some(i) if i.handle() == instance => unsafe { i.destroy_instance(None) },
            Some(i) => {
                warn!("asked to destroy a foreign instance");
                self.instance = Some(i);
            }
            None => warn!("instance destroyed twice"),
        }
    }

    fn destroy_device(&mut self, device: vk::Device) {
        self.swapchain_loader = None;
        match self.device.take() {
            // SAFETY: device is idle and all of its children are gone.
            Some(d) if d.handle() == device => unsafe { d.destroy_device(None) },
            Some(d) => {
                warn!("asked to destroy a foreign device");
                self.device = Some(d);
            }
            None => warn!("device destroyed twice"),
        }
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        match &self.surface_loader {
            // SAFETY: its swapchain has been destroyed already.
            Some(l) => unsafe { l.destroy_surface(surface, None) },
            None => warn!("surface outlived its instance"),
        }
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        match &self.swapchain_loader {
            // SAFETY: the device is idle and the image views are gone.
            Some(l) => unsafe { l.destroy_swapchain(swapchain, None) },
            None => warn!("swapchain outlived its device"),
        }
    }

    // SAFETY (all destroy_* below): the teardown stack calls these once,
    // after device_wait_idle, with children already released.
    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.with_device("destroy_image_view", |d| unsafe {
            d.destroy_image_view(view, None)
        });
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.with_device("destroy_render_pass", |d| unsafe {
            d.destroy_render_pass(render_pass, None)
        });
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.with_device("destroy_framebuffer", |d| unsafe {
            d.destroy_framebuffer(framebuffer, None)
        });
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.with_device("destroy_command_pool", |d| unsafe {
            d.destroy_command_pool(pool, None)
        });
    }

    fn free_command_buffer(&mut self, pool: vk::CommandPool, buffer: vk::CommandBuffer) {
        self.with_device("free_command_buffer", |d| unsafe {
            d.free_command_buffers(pool, &[buffer])
        });
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.with_device("destroy_fence", |d| unsafe { d.destroy_fence(fence, None) });
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.with_device("destroy_semaphore", |d| unsafe {
            d.destroy_semaphore(semaphore, None)
        });
    }

    fn begin_command_buffer(
        &mut self,
        buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> DriverResult<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: usage,
            ..Default::default()
        };
        // SAFETY: the pool allows implicit reset and the slot fence has
        // been waited, so the buffer is not pending.
        unsafe { self.device()?.begin_command_buffer(buffer, &begin) }
    }

    fn cmd_set_viewport_scissor(&mut self, buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        self.with_device("cmd_set_viewport_scissor", |d| {
            // SAFETY: buffer is recording.
            unsafe {
                d.cmd_set_viewport(buffer, 0, &[record::viewport(extent)]);
                d.cmd_set_scissor(buffer, 0, &[record::full_rect(extent)]);
            }
        });
    }

    fn cmd_clear_target(&mut self, buffer: vk::CommandBuffer, target: &ClearTarget) {
        // SAFETY: buffer is recording and the target is live on this device.
        self.with_device("cmd_clear_target", |d| unsafe {
            record::clear(d, buffer, target)
        });
    }

    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> DriverResult<()> {
        // SAFETY: buffer is recording.
        unsafe { self.device()?.end_command_buffer(buffer) }
    }

    fn queue_submit(&mut self, queue: vk::Queue, submit: &SubmitDesc) -> DriverResult<()> {
        let submit_info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &submit.wait_semaphore,
            p_wait_dst_stage_mask: &submit.wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &submit.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &submit.signal_semaphore,
            ..Default::default()
        };
        // SAFETY: pointers in submit_info outlive the call; the fence is
        // unsignaled by the frame driver before every submit.
        unsafe {
            self.device()?
                .queue_submit(queue, std::slice::from_ref(&submit_info), submit.fence)
        }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> DriverResult<()> {
        // SAFETY: fence is live.
        unsafe { self.device()?.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> DriverResult<()> {
        // SAFETY: fence is not in use by pending work.
        unsafe { self.device()?.reset_fences(&[fence]) }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> DriverResult<(u32, bool)> {
        // SAFETY: semaphore is unsignaled with no pending wait.
        unsafe {
            self.swapchain_loader()?.acquire_next_image(
                swapchain,
                timeout_ns,
                signal,
                vk::Fence::null(),
            )
        }
    }

    fn queue_present(
        &mut self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> DriverResult<bool> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        // SAFETY: pointers in present outlive the call.
        unsafe { self.swapchain_loader()?.queue_present(queue, &present) }
    }
}
