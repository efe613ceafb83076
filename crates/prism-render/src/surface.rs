// SPDX-License-Identifier: CEPL-1.0
use crate::device::DeviceContext;
use crate::driver::Driver;
use crate::error::SurfaceError;
use crate::teardown::{Resource, TeardownStack};
use crate::RenderSize;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::info;

/// Substituted when the driver leaves the format up to us.
pub const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Clone, Copy, Debug)]
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format: vk::SurfaceFormatKHR,
}

impl Surface {
    /// The surface's current extent, or `hint` clamped to its limits when
    /// the surface lets the swapchain decide.
    pub fn extent(&self, hint: RenderSize) -> vk::Extent2D {
        extent_from_caps(&self.capabilities, hint)
    }
}

/// First reported format, or [`FALLBACK_FORMAT`] when that entry is the
/// "undefined" sentinel. `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let first = *formats.first()?;
    if first.format == vk::Format::UNDEFINED {
        Some(FALLBACK_FORMAT)
    } else {
        Some(first)
    }
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Binds the window to the context and picks its pixel format.
pub fn create_surface<D: Driver + ?Sized>(
    driver: &mut D,
    ctx: &DeviceContext,
    display: RawDisplayHandle,
    window: RawWindowHandle,
    teardown: &mut TeardownStack,
) -> Result<Surface, SurfaceError> {
    // A context that was never brought up has nothing to bind to.
    if ctx.instance == vk::Instance::null() {
        return Err(SurfaceError::NoContext);
    }

    let handle = driver
        .create_surface(display, window)
        .map_err(SurfaceError::SurfaceCreationFailed)?;
    teardown.push(Resource::Surface(handle));

    let supported = driver
        .surface_support(ctx.physical_device, ctx.queue_family_index, handle)
        .map_err(SurfaceError::QueryFailed)?;
    if !supported {
        return Err(SurfaceError::PresentationUnsupported);
    }

    let capabilities = driver
        .surface_capabilities(ctx.physical_device, handle)
        .map_err(SurfaceError::QueryFailed)?;
    let formats = driver
        .surface_formats(ctx.physical_device, handle)
        .map_err(SurfaceError::QueryFailed)?;
    let format = choose_surface_format(&formats).ok_or(SurfaceError::NoSurfaceFormats)?;

    info!(
        "surface: fmt {:?} / {:?}, images {}..{}",
        format.format,
        format.color_space,
        capabilities.min_image_count,
        capabilities.max_image_count
    );

    Ok(Surface {
        handle,
        capabilities,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyDriver, DummyWindow};
    use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn undefined_first_entry_resolves_to_fallback() {
        let formats = [fmt(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats), Some(FALLBACK_FORMAT));
    }

    #[test]
    fn first_defined_entry_is_taken_verbatim() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
    }

    #[test]
    fn selection_is_deterministic() {
        let formats = [
            fmt(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let a = choose_surface_format(&formats);
        let b = choose_surface_format(&formats);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_list_has_no_choice() {
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn extent_uses_current_unless_sentinel() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };
        let want = RenderSize {
            width: 2000,
            height: 300,
        };
        assert_eq!(extent_from_caps(&caps, want).width, 800);

        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let e = extent_from_caps(&caps, want);
        assert_eq!((e.width, e.height), (1024, 300));
    }

    #[test]
    fn no_surface_without_a_context() {
        let mut driver = DummyDriver::default();
        let journal = driver.journal();
        let window = DummyWindow::default();
        let display = window.display_handle().unwrap().as_raw();
        let raw = window.window_handle().unwrap().as_raw();
        let mut teardown = TeardownStack::new();

        let err = create_surface(
            &mut driver,
            &DeviceContext::default(),
            display,
            raw,
            &mut teardown,
        )
        .unwrap_err();

        assert_eq!(err, SurfaceError::NoContext);
        assert!(teardown.is_empty());
        assert!(journal.borrow().created().is_empty());
    }
}
