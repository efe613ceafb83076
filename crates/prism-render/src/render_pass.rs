// SPDX-License-Identifier: CEPL-1.0
use crate::driver::Driver;
use crate::error::RenderTargetError;
use crate::teardown::{Resource, TeardownStack};
use ash::vk;

/// Single color attachment: cleared on load, stored, left presentable.
pub fn create_render_pass<D: Driver + ?Sized>(
    driver: &mut D,
    format: vk::Format,
    teardown: &mut TeardownStack,
) -> Result<vk::RenderPass, RenderTargetError> {
    let render_pass = driver
        .create_render_pass(format)
        .map_err(RenderTargetError::RenderPassCreationFailed)?;
    teardown.push(Resource::RenderPass(render_pass));
    Ok(render_pass)
}

/// Whether frames clear through a render pass.
///
/// Transfer clears need TRANSFER_DST on the swapchain images; without it
/// the render pass is the only option.
pub fn wants_render_pass(requested: bool, caps: &vk::SurfaceCapabilitiesKHR) -> bool {
    requested
        || !caps
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST)
}
