/// Command pools, per-frame command buffers and blocking one-shot uploads.
///
/// The manager owns one command pool per distinct queue family in use. The
/// graphics pool allows per-buffer reset and feeds a ring of primary command
/// buffers, one per frame in flight. Other pools are transient and only back
/// one-shot submissions.
///
/// One-shot work (`submit_one_shot`, `upload_buffer`, `upload_image`) is
/// fully blocking: each submission waits for its queue to go idle before
/// returning, so cross-queue handoffs are serialized without semaphores.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::frame::FrameSlotReady;
use crate::gpu::{
    AccessFlags, BufferBarrier, BufferDesc, BufferHandle, BufferUsage, CommandBufferHandle,
    CommandPoolFlags, CommandPoolHandle, FenceHandle, GpuDevice, ImageBarrier, ImageHandle,
    ImageLayout, MemoryLocation, PipelineStages, QueueFamilyIndices, QueueRole, Scoped,
    SemaphoreHandle, SemaphoreWait, SubmitDesc,
};
use crate::utils::RingSlotSet;
use crate::{engine_debug, engine_error};
use super::ownership_transfer::OwnershipTransfer;

const SOURCE: &str = "krakatoa::command";

/// Frees a one-shot command buffer on every exit path
struct OneShotBuffer<'a> {
    device: &'a dyn GpuDevice,
    pool: CommandPoolHandle,
    cmd: CommandBufferHandle,
}

impl Drop for OneShotBuffer<'_> {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.pool, self.cmd);
    }
}

pub struct CommandSubmissionManager {
    frames: RingSlotSet<CommandBufferHandle>,
    // family -> pool; dropped after the ring (destroying a pool frees its buffers)
    pools: Vec<(u32, Scoped<CommandPoolHandle>)>,
    families: QueueFamilyIndices,
    device: Arc<dyn GpuDevice>,
}

impl CommandSubmissionManager {
    /// Create the pools and `frames_in_flight` primary command buffers
    pub fn new(device: Arc<dyn GpuDevice>, frames_in_flight: usize) -> Result<Self> {
        let families = device.queue_families();

        let mut pools = Vec::new();
        for family in families.distinct_families() {
            let flags = if family == families.graphics {
                CommandPoolFlags::RESET_COMMAND_BUFFER
            } else {
                CommandPoolFlags::TRANSIENT
            };
            let pool = device.create_command_pool(family, flags).map_err(|e| {
                engine_error!(SOURCE, "Failed to create command pool for family {}: {}", family, e);
                e
            })?;
            pools.push((family, Scoped::new(&device, pool)));
        }

        let graphics_pool = pools
            .iter()
            .find(|(family, _)| *family == families.graphics)
            .map(|(_, pool)| pool.get())
            .ok_or_else(|| Error::InitializationFailed("graphics command pool missing".to_string()))?;

        let frames = RingSlotSet::try_from_fn(frames_in_flight, |_| {
            device.allocate_command_buffer(graphics_pool).map_err(|e| {
                engine_error!(SOURCE, "Failed to allocate frame command buffer: {}", e);
                e
            })
        })?;

        engine_debug!(
            SOURCE,
            "{} command pool(s), {} frame command buffers, dedicated transfer: {}",
            pools.len(),
            frames.len(),
            families.has_dedicated_transfer()
        );

        Ok(Self { frames, pools, families, device })
    }

    fn pool_for(&self, role: QueueRole) -> Result<CommandPoolHandle> {
        let family = self.families.family(role);
        self.pools
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, pool)| pool.get())
            .ok_or_else(|| Error::InvalidState(format!("no command pool for queue family {}", family)))
    }

    pub fn families(&self) -> QueueFamilyIndices {
        self.families
    }

    // ===== STEADY-STATE FRAMES =====

    /// Move to the next frame's command buffer (once per frame)
    pub fn advance_frame(&mut self) -> CommandBufferHandle {
        *self.frames.advance()
    }

    pub fn current_slot(&self) -> Option<usize> {
        self.frames.current_index()
    }

    pub fn current_command_buffer(&self) -> Result<CommandBufferHandle> {
        self.frames.current().copied()
    }

    /// Reset and begin the current frame's command buffer.
    ///
    /// `ready` proves the slot's fence has signaled; its slot must match the
    /// manager's, i.e. the pacer and the manager advance in lock-step.
    pub fn begin_frame(&mut self, ready: &FrameSlotReady) -> Result<CommandBufferHandle> {
        let slot = self
            .frames
            .current_index()
            .ok_or_else(|| Error::InvalidState("begin_frame before advance_frame".to_string()))?;
        if slot != ready.slot() {
            return Err(Error::InvalidState(format!(
                "command slot {} begun with the fence of frame slot {}",
                slot,
                ready.slot()
            )));
        }
        let cmd = *self.frames.current()?;
        self.device.reset_command_buffer(cmd)?;
        self.device.begin_command_buffer(cmd, true)?;
        Ok(cmd)
    }

    pub fn end_frame(&mut self) -> Result<()> {
        let cmd = *self.frames.current()?;
        self.device.end_command_buffer(cmd)
    }

    /// Submit the current frame on the graphics queue.
    ///
    /// Waits on `acquire` before color output, signals `render_finished`
    /// for present and `fence` for the CPU.
    pub fn submit_frame(
        &self,
        acquire: SemaphoreHandle,
        render_finished: SemaphoreHandle,
        fence: FenceHandle,
    ) -> Result<()> {
        let cmd = *self.frames.current()?;
        self.device.queue_submit(
            QueueRole::Graphics,
            &SubmitDesc {
                command_buffers: vec![cmd],
                waits: vec![SemaphoreWait {
                    semaphore: acquire,
                    stage: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                }],
                signals: vec![render_finished],
                fence: Some(fence),
            },
        )
    }

    // ===== ONE-SHOT PATH =====

    /// Record and run a command buffer on `role`'s queue, blocking until the
    /// queue is idle
    pub fn submit_one_shot<F>(&self, role: QueueRole, record: F) -> Result<()>
    where
        F: FnOnce(&dyn GpuDevice, CommandBufferHandle),
    {
        let device = self.device.as_ref();
        let pool = self.pool_for(role)?;
        let cmd = device.allocate_command_buffer(pool).map_err(|e| {
            engine_error!(SOURCE, "Failed to allocate one-shot command buffer: {}", e);
            e
        })?;
        let _guard = OneShotBuffer { device, pool, cmd };

        device.begin_command_buffer(cmd, true)?;
        record(device, cmd);
        device.end_command_buffer(cmd)?;
        device.queue_submit(
            role,
            &SubmitDesc { command_buffers: vec![cmd], ..Default::default() },
        )?;
        device.queue_wait_idle(role)
    }

    /// Copy `size` staged bytes from `src` into the GPU-only `dst`, leaving
    /// it readable by `dst_access` at `dst_stage` on the graphics queue
    pub fn upload_buffer(
        &self,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
        dst_stage: PipelineStages,
        dst_access: AccessFlags,
    ) -> Result<()> {
        match OwnershipTransfer::between(self.families.transfer, self.families.graphics) {
            Some(transfer) => {
                self.submit_one_shot(QueueRole::Transfer, |device, cmd| {
                    device.cmd_copy_buffer(cmd, src, dst, size);
                    let release = transfer.release_buffer(dst, AccessFlags::TRANSFER_WRITE);
                    transfer.record_release(device, cmd, &[release], &[]);
                })?;
                self.submit_one_shot(QueueRole::Graphics, |device, cmd| {
                    let acquire = transfer.acquire_buffer(dst, dst_access);
                    transfer.record_acquire(device, cmd, dst_stage, &[acquire], &[]);
                })
            }
            None => self.submit_one_shot(QueueRole::Transfer, |device, cmd| {
                device.cmd_copy_buffer(cmd, src, dst, size);
                device.cmd_pipeline_barrier(
                    cmd,
                    PipelineStages::TRANSFER,
                    dst_stage,
                    &[BufferBarrier::new(dst, AccessFlags::TRANSFER_WRITE, dst_access)],
                    &[],
                );
            }),
        }
    }

    /// Copy a staged `width x height` image into `image`, ending in
    /// `final_layout` on the graphics queue
    pub fn upload_image(
        &self,
        src: BufferHandle,
        image: ImageHandle,
        width: u32,
        height: u32,
        final_layout: ImageLayout,
    ) -> Result<()> {
        let to_transfer_dst = ImageBarrier::transition(
            image,
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
            AccessFlags::empty(),
            AccessFlags::TRANSFER_WRITE,
        );
        let read = final_layout.consumer_access();
        let dst_stage = final_layout.consumer_stage();

        let record_copy = |device: &dyn GpuDevice, cmd: CommandBufferHandle| {
            device.cmd_pipeline_barrier(
                cmd,
                PipelineStages::TOP_OF_PIPE,
                PipelineStages::TRANSFER,
                &[],
                &[to_transfer_dst],
            );
            device.cmd_copy_buffer_to_image(cmd, src, image, width, height);
        };

        match OwnershipTransfer::between(self.families.transfer, self.families.graphics) {
            Some(transfer) => {
                self.submit_one_shot(QueueRole::Transfer, |device, cmd| {
                    record_copy(device, cmd);
                    let release = transfer.release_image(
                        image,
                        AccessFlags::TRANSFER_WRITE,
                        ImageLayout::TransferDst,
                        final_layout,
                    );
                    transfer.record_release(device, cmd, &[], &[release]);
                })?;
                self.submit_one_shot(QueueRole::Graphics, |device, cmd| {
                    let acquire =
                        transfer.acquire_image(image, ImageLayout::TransferDst, final_layout, read);
                    transfer.record_acquire(device, cmd, dst_stage, &[], &[acquire]);
                })
            }
            None => self.submit_one_shot(QueueRole::Transfer, |device, cmd| {
                record_copy(device, cmd);
                let to_final = ImageBarrier::transition(
                    image,
                    ImageLayout::TransferDst,
                    final_layout,
                    AccessFlags::TRANSFER_WRITE,
                    read,
                );
                device.cmd_pipeline_barrier(cmd, PipelineStages::TRANSFER, dst_stage, &[], &[to_final]);
            }),
        }
    }

    /// Create a GPU-only buffer holding `bytes` (vertex/index data)
    ///
    /// The staging buffer lives only for the duration of the blocking upload.
    pub fn create_device_buffer_with_data(
        &self,
        bytes: &[u8],
        usage: BufferUsage,
        dst_stage: PipelineStages,
        dst_access: AccessFlags,
    ) -> Result<Scoped<BufferHandle>> {
        if bytes.is_empty() {
            return Err(Error::InvalidResource("device buffer with no data".to_string()));
        }
        let size = bytes.len() as u64;

        let staging = Scoped::new(&self.device, self.device.create_buffer(&BufferDesc::staging(size))?);
        self.device.write_buffer(staging.get(), 0, bytes)?;
        self.device.flush_buffer(staging.get(), 0, size)?;

        let buffer = Scoped::new(
            &self.device,
            self.device.create_buffer(&BufferDesc {
                size,
                usage: usage | BufferUsage::TRANSFER_DST,
                location: MemoryLocation::GpuOnly,
            })?,
        );
        self.upload_buffer(staging.get(), buffer.get(), size, dst_stage, dst_access)?;
        Ok(buffer)
    }
}

impl Drop for CommandSubmissionManager {
    fn drop(&mut self) {
        // Pools must not be destroyed under executing command buffers
        if let Err(e) = self.device.device_wait_idle() {
            engine_error!(SOURCE, "device_wait_idle failed while destroying command pools: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "command_submission_manager_tests.rs"]
mod tests;
