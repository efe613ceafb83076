// SPDX-License-Identifier: CEPL-1.0
use crate::driver::Driver;
use crate::error::RenderTargetError;
use crate::swapchain::Swapchain;
use crate::teardown::{Resource, TeardownStack};
use ash::vk;
use tracing::debug;

/// One swapchain image as a draw destination. `framebuffer` is null when
/// frames clear without a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

/// Index-aligned with `Swapchain::images`.
#[derive(Clone, Debug)]
pub struct RenderTargetSet {
    pub targets: Vec<RenderTarget>,
    pub render_pass: vk::RenderPass,
}

impl RenderTargetSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, image_index: u32) -> Option<&RenderTarget> {
        self.targets.get(image_index as usize)
    }
}

/// Creates a view (and, with a render pass, a framebuffer) per image.
///
/// All or nothing: if any object fails, everything this call created is
/// released before the error is returned.
pub fn create_render_targets<D: Driver + ?Sized>(
    driver: &mut D,
    swapchain: &Swapchain,
    render_pass: Option<vk::RenderPass>,
    teardown: &mut TeardownStack,
) -> Result<RenderTargetSet, RenderTargetError> {
    let mut staged = TeardownStack::new();
    match build_targets(driver, swapchain, render_pass, &mut staged) {
        Ok(targets) => {
            teardown.absorb(staged);
            Ok(RenderTargetSet {
                targets,
                render_pass: render_pass.unwrap_or_default(),
            })
        }
        Err(e) => {
            debug!("rolling back {} render target objects", staged.len());
            staged.unwind(driver);
            Err(e)
        }
    }
}

fn build_targets<D: Driver + ?Sized>(
    driver: &mut D,
    swapchain: &Swapchain,
    render_pass: Option<vk::RenderPass>,
    staged: &mut TeardownStack,
) -> Result<Vec<RenderTarget>, RenderTargetError> {
    let mut views = Vec::with_capacity(swapchain.images.len());
    for (index, &image) in swapchain.images.iter().enumerate() {
        let view = driver
            .create_image_view(image, swapchain.format.format)
            .map_err(|code| RenderTargetError::ImageViewCreationFailed { index, code })?;
        staged.push(Resource::ImageView(view));
        views.push(view);
    }

    let mut targets = Vec::with_capacity(views.len());
    for (index, (&image, &view)) in swapchain.images.iter().zip(&views).enumerate() {
        let framebuffer = match render_pass {
            Some(rp) => {
                let fb = driver
                    .create_framebuffer(rp, view, swapchain.extent)
                    .map_err(|code| RenderTargetError::FramebufferCreationFailed {
                        index,
                        code,
                    })?;
                staged.push(Resource::Framebuffer(fb));
                fb
            }
            None => vk::Framebuffer::null(),
        };
        targets.push(RenderTarget {
            image,
            view,
            framebuffer,
        });
    }
    Ok(targets)
}
