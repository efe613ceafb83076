// SPDX-License-Identifier: CEPL-1.0
//! In-memory driver and window for tests and development.
//!
//! Nothing touches a GPU. Handles are counters, submitted work completes
//! immediately, and everything the core does is written to a shared
//! [`Journal`] so tests can check ordering and leaks after the driver has
//! been moved into a renderer.

use crate::driver::{AppInfo, ClearTarget, Driver, DriverResult, SubmitDesc, SwapchainDesc};
use crate::teardown::ObjectKind;
use crate::window::PresentationWindow;
use crate::RenderSize;
use ash::vk::{self, Handle};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WindowHandle, XlibDisplayHandle, XlibWindowHandle,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::CStr;
use std::rc::Rc;

/// Driver entry points that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    RequiredExtensions,
    CreateInstance,
    EnumeratePhysicalDevices,
    CreateDevice,
    CreateSurface,
    SurfaceSupport,
    SurfaceCapabilities,
    SurfaceFormats,
    SurfacePresentModes,
    CreateSwapchain,
    SwapchainImages,
    CreateImageView,
    CreateRenderPass,
    CreateFramebuffer,
    CreateCommandPool,
    AllocateCommandBuffers,
    CreateFence,
    CreateSemaphore,
    BeginCommandBuffer,
    EndCommandBuffer,
    Submit,
    WaitFence,
    ResetFence,
    Acquire,
    Present,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Created(ObjectKind, u64),
    Destroyed(ObjectKind, u64),
    DeviceIdle,
    Acquired { image_index: u32 },
    AcquireFailed,
    Recorded { command_buffer: u64, image: u64 },
    Submitted { command_buffer: u64, fence: u64 },
    FenceWaited(u64),
    FenceReset(u64),
    Presented { image_index: u32 },
    PresentFailed { image_index: u32 },
}

#[derive(Debug, Default)]
pub struct Journal {
    pub events: Vec<Event>,
    /// Misuse the real driver would reject or hang on.
    pub violations: Vec<String>,
    live: BTreeMap<u64, ObjectKind>,
    pub last_swapchain: Option<SwapchainDesc>,
    pub last_app: Option<String>,
}

impl Journal {
    pub fn live_total(&self) -> usize {
        self.live.len()
    }

    pub fn live(&self, kind: ObjectKind) -> usize {
        self.live.values().filter(|&&k| k == kind).count()
    }

    pub fn created(&self) -> Vec<ObjectKind> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Created(k, _) => Some(*k),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<ObjectKind> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Destroyed(k, _) => Some(*k),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Events grouped per acquire attempt, starting at each acquire.
    pub fn frames(&self) -> Vec<&[Event]> {
        let starts: Vec<usize> = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Acquired { .. } | Event::AcquireFailed))
            .map(|(i, _)| i)
            .collect();
        starts
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let end = starts.get(n + 1).copied().unwrap_or(self.events.len());
                &self.events[s..end]
            })
            .collect()
    }
}

pub type SharedJournal = Rc<RefCell<Journal>>;

#[derive(Debug)]
pub struct DummyDriver {
    pub loader_available: bool,
    pub physical_devices: usize,
    pub queue_families: Vec<vk::QueueFlags>,
    pub present_support: bool,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Images handed out beyond the requested minimum.
    pub extra_images: u32,
    failures: Vec<(Op, u64, vk::Result)>,
    calls: RefCell<HashMap<Op, u64>>,
    journal: SharedJournal,
    next_handle: u64,
    fences: HashMap<u64, bool>,
    instance: vk::Instance,
    device: vk::Device,
    images: Vec<vk::Image>,
    next_image: usize,
}

impl Default for DummyDriver {
    fn default() -> Self {
        DummyDriver {
            loader_available: true,
            physical_devices: 1,
            queue_families: vec![vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER],
            present_support: true,
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 1,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: 640,
                    height: 480,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::UNDEFINED,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            extra_images: 0,
            failures: Vec::new(),
            calls: RefCell::default(),
            journal: SharedJournal::default(),
            next_handle: 0x1000,
            fences: HashMap::new(),
            instance: vk::Instance::null(),
            device: vk::Device::null(),
            images: Vec::new(),
            next_image: 0,
        }
    }
}

impl DummyDriver {
    pub fn journal(&self) -> SharedJournal {
        Rc::clone(&self.journal)
    }

    /// Makes the `nth` call (1-based) of `op` fail with `code`.
    pub fn fail_nth(mut self, op: Op, nth: u64, code: vk::Result) -> Self {
        self.failures.push((op, nth, code));
        self
    }

    /// Makes every call of `op` fail with `code`.
    pub fn fail_always(self, op: Op, code: vk::Result) -> Self {
        self.fail_nth(op, 0, code)
    }

    fn check(&self, op: Op) -> DriverResult<()> {
        let n = {
            let mut calls = self.calls.borrow_mut();
            let n = calls.entry(op).or_insert(0);
            *n += 1;
            *n
        };
        match self
            .failures
            .iter()
            .find(|(o, nth, _)| *o == op && (*nth == 0 || *nth == n))
        {
            Some(&(_, _, code)) => Err(code),
            None => Ok(()),
        }
    }

    fn mint<H: Handle>(&mut self, kind: ObjectKind) -> H {
        self.next_handle += 1;
        let raw = self.next_handle;
        let mut j = self.journal.borrow_mut();
        j.live.insert(raw, kind);
        j.events.push(Event::Created(kind, raw));
        H::from_raw(raw)
    }

    fn release(&mut self, kind: ObjectKind, raw: u64) {
        let mut j = self.journal.borrow_mut();
        match j.live.remove(&raw) {
            Some(k) if k == kind => {}
            Some(k) => j
                .violations
                .push(format!("destroyed {k} 0x{raw:x} as a {kind}")),
            None => j
                .violations
                .push(format!("destroyed unknown or dead {kind} 0x{raw:x}")),
        }
        j.events.push(Event::Destroyed(kind, raw));
    }

    fn violation(&self, msg: String) {
        self.journal.borrow_mut().violations.push(msg);
    }

    fn is_live(&self, raw: u64) -> bool {
        self.journal.borrow().live.contains_key(&raw)
    }

    fn require_device(&self, what: &str) -> DriverResult<()> {
        if self.device == vk::Device::null() {
            self.violation(format!("{what} without a logical device"));
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(())
    }
}

impl Driver for DummyDriver {
    fn supports_presentation(&self) -> bool {
        self.loader_available
    }

    fn required_instance_extensions(
        &self,
        _display: RawDisplayHandle,
    ) -> DriverResult<Vec<&'static CStr>> {
        self.check(Op::RequiredExtensions)?;
        Ok(vec![ash::khr::surface::NAME, ash::khr::xlib_surface::NAME])
    }

    fn create_surface(
        &mut self,
        _display: RawDisplayHandle,
        _window: RawWindowHandle,
    ) -> DriverResult<vk::SurfaceKHR> {
        if self.instance == vk::Instance::null() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        self.check(Op::CreateSurface)?;
        Ok(self.mint(ObjectKind::Surface))
    }

    fn create_instance(
        &mut self,
        app: &AppInfo,
        _extensions: &[&CStr],
    ) -> DriverResult<vk::Instance> {
        self.check(Op::CreateInstance)?;
        self.journal.borrow_mut().last_app = Some(app.name.clone());
        self.instance = self.mint(ObjectKind::Instance);
        Ok(self.instance)
    }

    fn enumerate_physical_devices(&mut self) -> DriverResult<Vec<vk::PhysicalDevice>> {
        self.check(Op::EnumeratePhysicalDevices)?;
        Ok((0..self.physical_devices)
            .map(|i| vk::PhysicalDevice::from_raw(0x10 + i as u64))
            .collect())
    }

    fn queue_family_properties(
        &mut self,
        _physical: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        self.queue_families
            .iter()
            .map(|&flags| vk::QueueFamilyProperties {
                queue_flags: flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    fn create_device(
        &mut self,
        _physical: vk::PhysicalDevice,
        queue_family_index: u32,
        extensions: &[&CStr],
    ) -> DriverResult<vk::Device> {
        self.check(Op::CreateDevice)?;
        if queue_family_index as usize >= self.queue_families.len() {
            self.violation(format!("device on missing queue family {queue_family_index}"));
        }
        if !extensions.contains(&ash::khr::swapchain::NAME) {
            self.violation("device created without the swapchain extension".into());
        }
        self.device = self.mint(ObjectKind::Device);
        Ok(self.device)
    }

    fn device_queue(&mut self, queue_family_index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x100 + queue_family_index as u64)
    }

    fn device_wait_idle(&mut self) -> DriverResult<()> {
        self.require_device("device_wait_idle")?;
        self.journal.borrow_mut().events.push(Event::DeviceIdle);
        Ok(())
    }

    fn surface_support(
        &mut self,
        _physical: vk::PhysicalDevice,
        _queue_family_index: u32,
        _surface: vk::SurfaceKHR,
    ) -> DriverResult<bool> {
        self.check(Op::SurfaceSupport)?;
        Ok(self.present_support)
    }

    fn surface_capabilities(
        &mut self,
        _physical: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> DriverResult<vk::SurfaceCapabilitiesKHR> {
        self.check(Op::SurfaceCapabilities)?;
        Ok(self.capabilities)
    }

    fn surface_formats(
        &mut self,
        _physical: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> DriverResult<Vec<vk::SurfaceFormatKHR>> {
        self.check(Op::SurfaceFormats)?;
        Ok(self.formats.clone())
    }

    fn surface_present_modes(
        &mut self,
        _physical: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> DriverResult<Vec<vk::PresentModeKHR>> {
        self.check(Op::SurfacePresentModes)?;
        Ok(self.present_modes.clone())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> DriverResult<vk::SwapchainKHR> {
        self.require_device("create_swapchain")?;
        self.check(Op::CreateSwapchain)?;
        let caps = self.capabilities;
        if desc.min_image_count < caps.min_image_count
            || (caps.max_image_count > 0 && desc.min_image_count > caps.max_image_count)
        {
            self.violation(format!(
                "swapchain length {} outside {}..{}",
                desc.min_image_count, caps.min_image_count, caps.max_image_count
            ));
        }
        let count = desc.min_image_count + self.extra_images;
        self.images = (0..count)
            .map(|i| vk::Image::from_raw(0x9000 + i as u64))
            .collect();
        self.next_image = 0;
        self.journal.borrow_mut().last_swapchain = Some(*desc);
        Ok(self.mint(ObjectKind::Swapchain))
    }

    fn swapchain_images(&mut self, _swapchain: vk::SwapchainKHR) -> DriverResult<Vec<vk::Image>> {
        self.check(Op::SwapchainImages)?;
        Ok(self.images.clone())
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        _format: vk::Format,
    ) -> DriverResult<vk::ImageView> {
        self.require_device("create_image_view")?;
        self.check(Op::CreateImageView)?;
        if !self.images.contains(&image) {
            self.violation(format!("view over foreign image 0x{:x}", image.as_raw()));
        }
        Ok(self.mint(ObjectKind::ImageView))
    }

    fn create_render_pass(&mut self, _format: vk::Format) -> DriverResult<vk::RenderPass> {
        self.require_device("create_render_pass")?;
        self.check(Op::CreateRenderPass)?;
        Ok(self.mint(ObjectKind::RenderPass))
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> DriverResult<vk::Framebuffer> {
        self.require_device("create_framebuffer")?;
        self.check(Op::CreateFramebuffer)?;
        if !self.is_live(render_pass.as_raw()) || !self.is_live(view.as_raw()) {
            self.violation("framebuffer over dead render pass or view".into());
        }
        Ok(self.mint(ObjectKind::Framebuffer))
    }

    fn create_command_pool(
        &mut self,
        _queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> DriverResult<vk::CommandPool> {
        self.require_device("create_command_pool")?;
        self.check(Op::CreateCommandPool)?;
        if !flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER) {
            self.violation("command pool without RESET_COMMAND_BUFFER".into());
        }
        Ok(self.mint(ObjectKind::CommandPool))
    }

    fn allocate_command_buffers(
        &mut self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> DriverResult<Vec<vk::CommandBuffer>> {
        self.require_device("allocate_command_buffers")?;
        self.check(Op::AllocateCommandBuffers)?;
        Ok((0..count)
            .map(|_| self.mint(ObjectKind::CommandBuffer))
            .collect())
    }

    fn create_fence(&mut self, signaled: bool) -> DriverResult<vk::Fence> {
        self.check(Op::CreateFence)?;
        let fence: vk::Fence = self.mint(ObjectKind::Fence);
        self.fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn create_semaphore(&mut self) -> DriverResult<vk::Semaphore> {
        self.check(Op::CreateSemaphore)?;
        Ok(self.mint(ObjectKind::Semaphore))
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        if self.device != vk::Device::null() {
            self.violation("instance destroyed while its device is alive".into());
        }
        self.release(ObjectKind::Instance, instance.as_raw());
        self.instance = vk::Instance::null();
    }

    fn destroy_device(&mut self, device: vk::Device) {
        let children = {
            let j = self.journal.borrow();
            j.live
                .values()
                .filter(|k| !matches!(k, ObjectKind::Instance | ObjectKind::Device | ObjectKind::Surface))
                .count()
        };
        if children > 0 {
            self.violation(format!("device destroyed with {children} live children"));
        }
        self.release(ObjectKind::Device, device.as_raw());
        self.device = vk::Device::null();
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        if self.journal.borrow().live.values().any(|k| *k == ObjectKind::Swapchain) {
            self.violation("surface destroyed before its swapchain".into());
        }
        self.release(ObjectKind::Surface, surface.as_raw());
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        if self.journal.borrow().live.values().any(|k| *k == ObjectKind::ImageView) {
            self.violation("swapchain destroyed before its image views".into());
        }
        self.release(ObjectKind::Swapchain, swapchain.as_raw());
        self.images.clear();
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.release(ObjectKind::ImageView, view.as_raw());
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        if self.journal.borrow().live.values().any(|k| *k == ObjectKind::Framebuffer) {
            self.violation("render pass destroyed before its framebuffers".into());
        }
        self.release(ObjectKind::RenderPass, render_pass.as_raw());
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.release(ObjectKind::Framebuffer, framebuffer.as_raw());
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.release(ObjectKind::CommandPool, pool.as_raw());
    }

    fn free_command_buffer(&mut self, _pool: vk::CommandPool, buffer: vk::CommandBuffer) {
        self.release(ObjectKind::CommandBuffer, buffer.as_raw());
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.fences.remove(&fence.as_raw());
        self.release(ObjectKind::Fence, fence.as_raw());
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.release(ObjectKind::Semaphore, semaphore.as_raw());
    }

    fn begin_command_buffer(
        &mut self,
        buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> DriverResult<()> {
        self.check(Op::BeginCommandBuffer)?;
        if !usage.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE) {
            self.violation("command buffer begun without SIMULTANEOUS_USE".into());
        }
        if !self.is_live(buffer.as_raw()) {
            self.violation(format!("recording into dead buffer 0x{:x}", buffer.as_raw()));
        }
        Ok(())
    }

    fn cmd_set_viewport_scissor(&mut self, _buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        if extent.width == 0 || extent.height == 0 {
            self.violation("zero-sized viewport".into());
        }
    }

    fn cmd_clear_target(&mut self, buffer: vk::CommandBuffer, target: &ClearTarget) {
        if (target.render_pass == vk::RenderPass::null())
            != (target.framebuffer == vk::Framebuffer::null())
        {
            self.violation("render pass and framebuffer must come together".into());
        }
        self.journal.borrow_mut().events.push(Event::Recorded {
            command_buffer: buffer.as_raw(),
            image: target.image.as_raw(),
        });
    }

    fn end_command_buffer(&mut self, _buffer: vk::CommandBuffer) -> DriverResult<()> {
        self.check(Op::EndCommandBuffer)
    }

    fn queue_submit(&mut self, _queue: vk::Queue, submit: &SubmitDesc) -> DriverResult<()> {
        self.check(Op::Submit)?;
        let fence = submit.fence.as_raw();
        match self.fences.get(&fence) {
            Some(true) => self.violation(format!("submit with signaled fence 0x{fence:x}")),
            Some(false) => {}
            None => self.violation(format!("submit with unknown fence 0x{fence:x}")),
        }
        // Work completes the moment it is submitted.
        self.fences.insert(fence, true);
        self.journal.borrow_mut().events.push(Event::Submitted {
            command_buffer: submit.command_buffer.as_raw(),
            fence,
        });
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, _timeout_ns: u64) -> DriverResult<()> {
        self.check(Op::WaitFence)?;
        let raw = fence.as_raw();
        if self.fences.get(&raw) != Some(&true) {
            self.violation(format!("wait on fence 0x{raw:x} that never signals"));
            return Err(vk::Result::TIMEOUT);
        }
        self.journal.borrow_mut().events.push(Event::FenceWaited(raw));
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> DriverResult<()> {
        self.check(Op::ResetFence)?;
        self.fences.insert(fence.as_raw(), false);
        self.journal
            .borrow_mut()
            .events
            .push(Event::FenceReset(fence.as_raw()));
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> DriverResult<(u32, bool)> {
        if let Err(code) = self.check(Op::Acquire) {
            self.journal.borrow_mut().events.push(Event::AcquireFailed);
            return Err(code);
        }
        if signal == vk::Semaphore::null() {
            self.violation("acquire without a semaphore".into());
        }
        let image_index = (self.next_image % self.images.len().max(1)) as u32;
        self.next_image += 1;
        self.journal
            .borrow_mut()
            .events
            .push(Event::Acquired { image_index });
        Ok((image_index, false))
    }

    fn queue_present(
        &mut self,
        _queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> DriverResult<bool> {
        if let Err(code) = self.check(Op::Present) {
            self.journal
                .borrow_mut()
                .events
                .push(Event::PresentFailed { image_index });
            return Err(code);
        }
        self.journal
            .borrow_mut()
            .events
            .push(Event::Presented { image_index });
        Ok(false)
    }
}

/// Window stand-in that asks to close after a fixed number of polls.
#[derive(Debug)]
pub struct DummyWindow {
    pub size: RenderSize,
    pub close_after_polls: Option<u64>,
    pub polls: u64,
}

impl Default for DummyWindow {
    fn default() -> Self {
        DummyWindow {
            size: RenderSize {
                width: 640,
                height: 480,
            },
            close_after_polls: None,
            polls: 0,
        }
    }
}

impl DummyWindow {
    pub fn closing_after(polls: u64) -> Self {
        DummyWindow {
            close_after_polls: Some(polls),
            ..Default::default()
        }
    }
}

impl HasWindowHandle for DummyWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Xlib(XlibWindowHandle::new(1));
        // SAFETY: the dummy driver never dereferences window handles.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for DummyWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let raw = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
        // SAFETY: as above, the handle is only passed through.
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

impl PresentationWindow for DummyWindow {
    fn poll_events(&mut self) {
        self.polls += 1;
    }

    fn should_close(&self) -> bool {
        self.close_after_polls.is_some_and(|n| self.polls >= n)
    }

    fn size(&self) -> RenderSize {
        self.size
    }
}
