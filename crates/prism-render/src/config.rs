// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    /// Always FIFO.
    Fifo,
    /// MAILBOX when the surface offers it, else FIFO.
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub app_name: String,
    /// Requested swapchain length before clamping to the surface limits.
    pub desired_image_count: u32,
    /// Frames that may be queued on the GPU at once. 1 drains every frame.
    pub frames_in_flight: u32,
    /// Create frame fences signaled so the first wait falls through.
    pub fence_starts_signaled: bool,
    pub vsync_mode: VsyncMode,
    /// Clear through a render pass + framebuffers instead of a transfer clear.
    pub render_pass: bool,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            app_name: "prism".to_owned(),
            desired_image_count: 2,
            frames_in_flight: 1,
            fence_starts_signaled: false,
            vsync_mode: VsyncMode::Mailbox,
            render_pass: true,
            clear_color: [0.02, 0.02, 0.04, 1.0],
        }
    }
}

impl RenderConfig {
    /// `frames_in_flight` clamped into `[1, image_count]`.
    pub fn effective_frames_in_flight(&self, image_count: usize) -> usize {
        (self.frames_in_flight as usize).clamp(1, image_count.max(1))
    }
}
