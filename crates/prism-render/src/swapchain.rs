// SPDX-License-Identifier: CEPL-1.0
use crate::config::VsyncMode;
use crate::device::DeviceContext;
use crate::driver::{Driver, SwapchainDesc};
use crate::error::SwapchainError;
use crate::surface::Surface;
use crate::teardown::{Resource, TeardownStack};
use crate::RenderSize;
use ash::vk;
use tracing::info;

#[derive(Clone, Debug)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    /// Owned by the swapchain; never destroyed individually.
    pub images: Vec<vk::Image>,
    pub image_count: u32,
    pub present_mode: vk::PresentModeKHR,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    pub desired_image_count: u32,
    pub vsync_mode: VsyncMode,
    pub extent_hint: RenderSize,
    /// Also allow clearing the images with transfer commands.
    pub transfer_dst: bool,
}

/// Clamps the requested length into what the surface allows.
///
/// Down to `max_image_count` when it is nonzero, then up to
/// `min_image_count + 1`. When the surface cap leaves no room above the
/// minimum, the cap wins.
pub fn negotiate_image_count(desired: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = desired;
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count = count.max(caps.min_image_count.saturating_add(1));
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], mode: VsyncMode) -> vk::PresentModeKHR {
    match mode {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn create_swapchain<D: Driver + ?Sized>(
    driver: &mut D,
    ctx: &DeviceContext,
    surface: &Surface,
    cfg: &SwapchainConfig,
    teardown: &mut TeardownStack,
) -> Result<Swapchain, SwapchainError> {
    let caps = &surface.capabilities;
    let modes = driver
        .surface_present_modes(ctx.physical_device, surface.handle)
        .map_err(SwapchainError::QueryFailed)?;

    let present_mode = choose_present_mode(&modes, cfg.vsync_mode);
    let min_image_count = negotiate_image_count(cfg.desired_image_count, caps);
    let extent = surface.extent(cfg.extent_hint);

    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    if cfg.transfer_dst {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }

    let desc = SwapchainDesc {
        surface: surface.handle,
        min_image_count,
        format: surface.format,
        extent,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode,
        clipped: true,
    };

    let handle = driver
        .create_swapchain(&desc)
        .map_err(SwapchainError::SwapchainCreationFailed)?;
    teardown.push(Resource::Swapchain(handle));

    // The driver may hand out more images than asked for.
    let images = driver
        .swapchain_images(handle)
        .map_err(SwapchainError::ImageQueryFailed)?;
    let image_count = images.len() as u32;

    info!(
        "swapchain ready ({}x{}, {} images, requested {}, {:?})",
        extent.width, extent.height, image_count, min_image_count, present_mode
    );

    Ok(Swapchain {
        handle,
        images,
        image_count,
        present_mode,
        format: surface.format,
        extent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(2, 1, 0, 2)]
    #[case(2, 2, 0, 3)]
    #[case(5, 1, 0, 5)]
    #[case(2, 1, 3, 2)]
    #[case(8, 2, 4, 4)]
    #[case(0, 1, 8, 2)]
    #[case(3, 3, 3, 3)]
    #[case(2, u32::MAX, 0, u32::MAX)]
    fn image_count_cases(
        #[case] desired: u32,
        #[case] min: u32,
        #[case] max: u32,
        #[case] expect: u32,
    ) {
        assert_eq!(negotiate_image_count(desired, &caps(min, max)), expect);
    }

    #[test]
    fn image_count_bounds_hold_everywhere() {
        for min in 0..6u32 {
            for max in std::iter::once(0).chain(min + 1..10) {
                for desired in 0..12u32 {
                    let n = negotiate_image_count(desired, &caps(min, max));
                    assert!(n > min, "desired={desired} min={min} max={max} -> {n}");
                    if max > 0 {
                        assert!(n <= max, "desired={desired} min={min} max={max} -> {n}");
                    }
                }
            }
        }
    }

    #[rstest]
    #[case(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX], VsyncMode::Mailbox, vk::PresentModeKHR::MAILBOX)]
    #[case(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE], VsyncMode::Mailbox, vk::PresentModeKHR::FIFO)]
    #[case(&[vk::PresentModeKHR::MAILBOX], VsyncMode::Fifo, vk::PresentModeKHR::FIFO)]
    #[case(&[], VsyncMode::Mailbox, vk::PresentModeKHR::FIFO)]
    fn present_mode_is_two_tier(
        #[case] modes: &[vk::PresentModeKHR],
        #[case] mode: VsyncMode,
        #[case] expect: vk::PresentModeKHR,
    ) {
        assert_eq!(choose_present_mode(modes, mode), expect);
    }
}
