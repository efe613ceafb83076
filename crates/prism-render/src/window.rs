// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// The part of the windowing layer the frame loop consumes.
///
/// Surface creation goes through the raw handles; the loop only pumps
/// events and asks whether to stop.
pub trait PresentationWindow: HasWindowHandle + HasDisplayHandle {
    fn poll_events(&mut self);
    fn should_close(&self) -> bool;
    fn size(&self) -> RenderSize;
}
