// SPDX-License-Identifier: CEPL-1.0
use crate::driver::{AppInfo, Driver};
use crate::error::DeviceError;
use crate::teardown::{Resource, TeardownStack};
use ash::khr::swapchain;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::CStr;
use tracing::info;

/// Device extensions every context enables.
pub const DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// Driver connection, the chosen accelerator, and its logical device and queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceContext {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
}

/// First queue family that accepts graphics work.
pub fn select_graphics_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

/// Brings up instance, accelerator, logical device and queue.
///
/// Each created object goes onto `teardown`; on error the caller unwinds.
pub fn create_context<D: Driver + ?Sized>(
    driver: &mut D,
    display: RawDisplayHandle,
    app: &AppInfo,
    teardown: &mut TeardownStack,
) -> Result<DeviceContext, DeviceError> {
    if !driver.supports_presentation() {
        return Err(DeviceError::UnsupportedPlatform);
    }

    let extensions = driver
        .required_instance_extensions(display)
        .map_err(DeviceError::ContextCreationFailed)?;
    let instance = driver
        .create_instance(app, &extensions)
        .map_err(DeviceError::ContextCreationFailed)?;
    teardown.push(Resource::Instance(instance));

    let physical_device = driver
        .enumerate_physical_devices()
        .map_err(DeviceError::EnumerationFailed)?
        .first()
        .copied()
        .ok_or(DeviceError::NoAcceleratorFound)?;

    let families = driver.queue_family_properties(physical_device);
    let queue_family_index =
        select_graphics_queue_family(&families).ok_or(DeviceError::NoGraphicsQueue)?;

    let device = driver
        .create_device(physical_device, queue_family_index, &DEVICE_EXTENSIONS)
        .map_err(DeviceError::DeviceCreationFailed)?;
    teardown.push(Resource::Device(device));

    let queue = driver.device_queue(queue_family_index);

    info!(
        "device ready (queue family {queue_family_index}, {} instance extensions)",
        extensions.len()
    );

    Ok(DeviceContext {
        instance,
        physical_device,
        device,
        queue,
        queue_family_index,
    })
}
