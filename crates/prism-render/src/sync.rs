// SPDX-License-Identifier: CEPL-1.0
use crate::driver::Driver;
use crate::error::SyncError;
use crate::teardown::{Resource, TeardownStack};
use ash::vk;

/// Sync objects for one frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSync {
    /// Signaled when the slot's submitted work completes.
    pub in_flight: vk::Fence,
    /// Acquire -> submit.
    pub image_available: vk::Semaphore,
    /// Submit -> present.
    pub render_finished: vk::Semaphore,
}

#[derive(Clone, Debug)]
pub struct FrameSynchronizer {
    pub slots: Vec<FrameSync>,
    pub fence_starts_signaled: bool,
}

pub fn create_synchronizer<D: Driver + ?Sized>(
    driver: &mut D,
    slots: usize,
    fence_starts_signaled: bool,
    teardown: &mut TeardownStack,
) -> Result<FrameSynchronizer, SyncError> {
    let mut out = Vec::with_capacity(slots);
    for _ in 0..slots {
        let in_flight = driver
            .create_fence(fence_starts_signaled)
            .map_err(SyncError::FenceCreationFailed)?;
        teardown.push(Resource::Fence(in_flight));

        let image_available = driver
            .create_semaphore()
            .map_err(SyncError::SemaphoreCreationFailed)?;
        teardown.push(Resource::Semaphore(image_available));

        let render_finished = driver
            .create_semaphore()
            .map_err(SyncError::SemaphoreCreationFailed)?;
        teardown.push(Resource::Semaphore(render_finished));

        out.push(FrameSync {
            in_flight,
            image_available,
            render_finished,
        });
    }
    Ok(FrameSynchronizer {
        slots: out,
        fence_starts_signaled,
    })
}
