// SPDX-License-Identifier: CEPL-1.0
//! Per-frame acquire -> record -> submit -> present.
//!
//! With one frame slot the CPU blocks on the slot fence right after every
//! submit, so the command buffer, fence and acquired index are never
//! touched while the GPU still uses them. With more slots the fence is
//! waited before the slot is reused instead, and a per-image owner table
//! keeps two slots from rendering into the same image at once.

use crate::command::CommandInfrastructure;
use crate::driver::{ClearTarget, Driver, SubmitDesc};
use crate::error::FrameError;
use crate::swapchain::Swapchain;
use crate::sync::FrameSynchronizer;
use crate::targets::RenderTargetSet;
use crate::WAIT_FOREVER;
use ash::vk;
use tracing::{trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    Stopped,
}

impl FramePhase {
    fn can_enter(self, next: FramePhase) -> bool {
        use FramePhase::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Recording)
                | (Recording, Submitted)
                | (Submitted, Presenting)
                | (Presenting, Idle)
                | (_, Stopped)
                // a failed step drops the frame and returns to idle
                | (Acquiring | Recording | Submitted, Idle)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        frame: u64,
        image_index: u32,
        suboptimal: bool,
    },
}

/// Everything one frame reads. Borrowed from the renderer per call.
pub struct FrameResources<'a> {
    pub queue: vk::Queue,
    pub swapchain: &'a Swapchain,
    pub targets: &'a RenderTargetSet,
    pub commands: &'a CommandInfrastructure,
    pub sync: &'a FrameSynchronizer,
    pub clear_color: [f32; 4],
}

#[derive(Debug)]
pub struct FrameDriver {
    phase: FramePhase,
    frame: u64,
    slot: usize,
    /// Per slot: the fence is signaled or will be by submitted work.
    fence_armed: Vec<bool>,
    /// Per slot: the fence has been waited on since it was last submitted.
    fence_drained: Vec<bool>,
    /// Per image: fence of the slot that last rendered into it.
    image_owner: Vec<vk::Fence>,
    current_image: Option<u32>,
}

impl FrameDriver {
    pub fn new(slots: usize, image_count: usize, fence_starts_signaled: bool) -> Self {
        let slots = slots.max(1);
        FrameDriver {
            phase: FramePhase::Idle,
            frame: 0,
            slot: 0,
            fence_armed: vec![fence_starts_signaled; slots],
            fence_drained: vec![false; slots],
            image_owner: vec![vk::Fence::null(); image_count],
            current_image: None,
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of cycles started so far.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Image acquired by the last cycle that got past acquire.
    pub fn current_image_index(&self) -> Option<u32> {
        self.current_image
    }

    pub fn slots(&self) -> usize {
        self.fence_armed.len()
    }

    pub fn stop(&mut self) {
        self.enter(FramePhase::Stopped);
    }

    fn enter(&mut self, next: FramePhase) {
        debug_assert!(
            self.phase.can_enter(next),
            "illegal frame transition {:?} -> {next:?}",
            self.phase
        );
        trace!(frame = self.frame, "{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn abort(&mut self, err: FrameError) -> FrameError {
        self.enter(FramePhase::Idle);
        err
    }

    /// Runs one full cycle.
    ///
    /// Acquire and present failures come back as transient errors; the
    /// driver is idle again afterwards and the next call starts a new frame.
    pub fn draw_frame<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
        res: &FrameResources<'_>,
    ) -> Result<FrameOutcome, FrameError> {
        if self.phase == FramePhase::Stopped {
            return Err(FrameError::Stopped);
        }
        self.frame += 1;
        let frame = self.frame;
        let slot = self.slot;
        let sync = res.sync.slots[slot];
        let cmd = res.commands.buffers[slot];

        // Reclaim the slot before touching its command buffer.
        if self.fence_armed[slot] && !self.fence_drained[slot] {
            driver
                .wait_for_fence(sync.in_flight, WAIT_FOREVER)
                .map_err(|code| FrameError::FenceWaitFailed { frame, code })?;
            self.fence_drained[slot] = true;
        }

        self.enter(FramePhase::Acquiring);
        let (image_index, acquire_suboptimal) = match driver.acquire_next_image(
            res.swapchain.handle,
            WAIT_FOREVER,
            sync.image_available,
        ) {
            Ok(pair) => pair,
            Err(code) => {
                return Err(self.abort(FrameError::AcquireFailed { frame, code }));
            }
        };
        self.current_image = Some(image_index);

        let Some(target) = res.targets.get(image_index) else {
            warn!(frame, image_index, "acquired index outside the target set");
            return Err(self.abort(FrameError::AcquireFailed {
                frame,
                code: vk::Result::ERROR_UNKNOWN,
            }));
        };

        let image = image_index as usize;
        let owner = self.image_owner[image];
        if owner != vk::Fence::null() && owner != sync.in_flight {
            if let Err(code) = driver.wait_for_fence(owner, WAIT_FOREVER) {
                return Err(self.abort(FrameError::FenceWaitFailed { frame, code }));
            }
        }

        self.enter(FramePhase::Recording);
        let clear = ClearTarget {
            image: target.image,
            render_pass: res.targets.render_pass,
            framebuffer: target.framebuffer,
            extent: res.swapchain.extent,
            color: res.clear_color,
        };
        if let Err(code) = record(driver, cmd, &clear) {
            return Err(self.abort(FrameError::RecordFailed { frame, code }));
        }

        if self.fence_armed[slot] {
            if let Err(code) = driver.reset_fence(sync.in_flight) {
                return Err(self.abort(FrameError::FenceResetFailed { frame, code }));
            }
            self.fence_armed[slot] = false;
            self.fence_drained[slot] = false;
        }

        let wait_stage = if res.targets.render_pass == vk::RenderPass::null() {
            vk::PipelineStageFlags::TRANSFER
        } else {
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        };
        let submit = SubmitDesc {
            command_buffer: cmd,
            wait_semaphore: sync.image_available,
            wait_stage,
            signal_semaphore: sync.render_finished,
            fence: sync.in_flight,
        };
        if let Err(code) = driver.queue_submit(res.queue, &submit) {
            return Err(self.abort(FrameError::SubmitFailed { frame, code }));
        }
        self.fence_armed[slot] = true;
        self.image_owner[image] = sync.in_flight;
        self.enter(FramePhase::Submitted);

        if self.slots() == 1 {
            if let Err(code) = driver.wait_for_fence(sync.in_flight, WAIT_FOREVER) {
                return Err(self.abort(FrameError::FenceWaitFailed { frame, code }));
            }
            self.fence_drained[slot] = true;
        }

        self.enter(FramePhase::Presenting);
        let presented = driver.queue_present(
            res.queue,
            res.swapchain.handle,
            image_index,
            sync.render_finished,
        );
        self.slot = (slot + 1) % self.slots();
        self.enter(FramePhase::Idle);

        match presented {
            Ok(present_suboptimal) => Ok(FrameOutcome::Presented {
                frame,
                image_index,
                suboptimal: acquire_suboptimal || present_suboptimal,
            }),
            Err(code) => Err(FrameError::PresentFailed {
                frame,
                image_index,
                code,
            }),
        }
    }
}

fn record<D: Driver + ?Sized>(
    driver: &mut D,
    cmd: vk::CommandBuffer,
    target: &ClearTarget,
) -> Result<(), vk::Result> {
    driver.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
    driver.cmd_set_viewport_scissor(cmd, target.extent);
    driver.cmd_clear_target(cmd, target);
    driver.end_command_buffer(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_transitions_are_legal() {
        use FramePhase::*;
        let cycle = [Idle, Acquiring, Recording, Submitted, Presenting, Idle];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_enter(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn skipping_ahead_is_illegal() {
        use FramePhase::*;
        assert!(!Idle.can_enter(Recording));
        assert!(!Acquiring.can_enter(Presenting));
        assert!(!Presenting.can_enter(Acquiring));
        assert!(!Stopped.can_enter(Idle));
    }

    #[test]
    fn any_phase_can_stop() {
        use FramePhase::*;
        for p in [Idle, Acquiring, Recording, Submitted, Presenting, Stopped] {
            assert!(p.can_enter(Stopped));
        }
    }

    #[test]
    fn new_driver_is_idle_with_no_image() {
        let fd = FrameDriver::new(0, 3, false);
        assert_eq!(fd.phase(), FramePhase::Idle);
        assert_eq!(fd.slots(), 1);
        assert_eq!(fd.current_image_index(), None);
        assert_eq!(fd.frame_index(), 0);
    }
}
