// SPDX-License-Identifier: CEPL-1.0
use crate::device::DeviceContext;
use crate::driver::Driver;
use crate::error::CommandError;
use crate::teardown::{Resource, TeardownStack};
use ash::vk;

/// Pool plus one primary buffer per frame slot. Buffers are re-recorded
/// every frame, never reallocated.
#[derive(Clone, Debug)]
pub struct CommandInfrastructure {
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

pub fn create_command_infrastructure<D: Driver + ?Sized>(
    driver: &mut D,
    ctx: &DeviceContext,
    slots: usize,
    teardown: &mut TeardownStack,
) -> Result<CommandInfrastructure, CommandError> {
    let pool = driver
        .create_command_pool(
            ctx.queue_family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
        .map_err(CommandError::PoolCreationFailed)?;
    teardown.push(Resource::CommandPool(pool));

    let buffers = driver
        .allocate_command_buffers(pool, slots as u32)
        .map_err(CommandError::BufferAllocationFailed)?;
    for &buffer in &buffers {
        teardown.push(Resource::CommandBuffer { pool, buffer });
    }

    Ok(CommandInfrastructure { pool, buffers })
}
