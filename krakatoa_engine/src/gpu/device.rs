/// GPU device trait - the seam between the engine core and a graphics backend
///
/// Everything the core does on the GPU goes through [`GpuDevice`]. The
/// Vulkan backend implements it over `ash`; unit tests implement it with a
/// recording mock that simulates fences, semaphores and a swapchain.
///
/// All methods take `&self`: backends synchronize internally (queues and the
/// allocator sit behind mutexes), so one device can be shared as
/// `Arc<dyn GpuDevice>` by every component of a frame loop.

use std::time::Duration;
use bitflags::bitflags;
use crate::error::{Error, Result};
use super::barrier::{BufferBarrier, ImageBarrier, PipelineStages};
use super::handles::*;
use super::queue::{QueueFamilyIndices, QueueRole};
use super::resources::{BufferDesc, ImageDesc, PipelineDesc};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandPoolFlags: u32 {
        /// Buffers may be reset individually (steady-state recycling)
        const RESET_COMMAND_BUFFER = 1 << 0;
        /// Buffers are short-lived (one-shot uploads)
        const TRANSIENT            = 1 << 1;
    }
}

/// Semaphore wait with the stage that blocks on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreHandle,
    pub stage: PipelineStages,
}

/// One queue submission
#[derive(Debug, Clone, Default)]
pub struct SubmitDesc {
    pub command_buffers: Vec<CommandBufferHandle>,
    pub waits: Vec<SemaphoreWait>,
    pub signals: Vec<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

/// Result of a bounded fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimedOut,
}

/// Result of a present that reached the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// Presented, but the swapchain should be recreated soon
    Suboptimal,
}

/// Pipeline plus the layout its descriptor sets bind against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineBinding {
    pub pipeline: PipelineHandle,
    pub layout: PipelineLayoutHandle,
}

pub trait GpuDevice: Send + Sync {
    // ===== QUEUES =====

    fn queue_families(&self) -> QueueFamilyIndices;

    // ===== COMMAND POOLS AND BUFFERS =====

    fn create_command_pool(&self, family: u32, flags: CommandPoolFlags) -> Result<CommandPoolHandle>;
    fn destroy_command_pool(&self, pool: CommandPoolHandle);
    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle>;
    fn free_command_buffer(&self, pool: CommandPoolHandle, cmd: CommandBufferHandle);
    fn reset_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;
    fn begin_command_buffer(&self, cmd: CommandBufferHandle, one_time: bool) -> Result<()>;
    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;

    // ===== RECORDING =====

    fn cmd_copy_buffer(&self, cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, size: u64);
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: ImageHandle,
        width: u32,
        height: u32,
    );
    fn cmd_pipeline_barrier(
        &self,
        cmd: CommandBufferHandle,
        src_stage: PipelineStages,
        dst_stage: PipelineStages,
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    );
    /// Begin the swapchain render pass on `image_index`, clearing to `clear`.
    /// Viewport and scissor cover the whole swapchain extent.
    fn cmd_begin_frame_pass(&self, cmd: CommandBufferHandle, image_index: u32, clear: [f32; 4]);
    fn cmd_end_frame_pass(&self, cmd: CommandBufferHandle);
    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        set_index: u32,
        set: DescriptorSetHandle,
    );
    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle);
    /// 32-bit indices
    fn cmd_bind_index_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle);
    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32);
    fn cmd_draw_indexed(&self, cmd: CommandBufferHandle, index_count: u32);

    // ===== SUBMISSION =====

    fn queue_submit(&self, role: QueueRole, submit: &SubmitDesc) -> Result<()>;
    fn queue_wait_idle(&self, role: QueueRole) -> Result<()>;
    fn device_wait_idle(&self) -> Result<()>;

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    /// `None` waits without bound
    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<FenceStatus>;
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;
    fn create_semaphore(&self) -> Result<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // ===== MEMORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    /// Run `write` over the persistently mapped bytes of a host-visible buffer.
    /// `write` must not call back into the device.
    fn map_buffer(&self, buffer: BufferHandle, write: &mut dyn FnMut(&mut [u8])) -> Result<()>;
    /// Make host writes in `offset..offset + size` visible to the device
    /// (no-op on coherent memory)
    fn flush_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()>;

    /// Copy `data` into a host-visible buffer at `offset`
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut outcome = Ok(());
        self.map_buffer(buffer, &mut |mapped: &mut [u8]| {
            let start = offset as usize;
            match mapped.get_mut(start..start + data.len()) {
                Some(dst) => dst.copy_from_slice(data),
                None => {
                    outcome = Err(Error::InvalidResource(format!(
                        "write of {} bytes at {} exceeds buffer of {} bytes",
                        data.len(),
                        offset,
                        mapped.len()
                    )))
                }
            }
        })?;
        outcome
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle>;
    fn destroy_image(&self, image: ImageHandle);
    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle>;
    fn destroy_image_view(&self, view: ImageViewHandle);

    // ===== DESCRIPTORS =====

    /// Set 0 layout of mesh pipelines: one uniform buffer at binding 0
    fn allocate_uniform_set(&self, buffer: BufferHandle, range: u64) -> Result<DescriptorSetHandle>;
    /// Camera background layout: luma sampler at binding 0, chroma at binding 1
    fn allocate_plane_set(
        &self,
        luma: ImageViewHandle,
        chroma: ImageViewHandle,
    ) -> Result<DescriptorSetHandle>;
    fn free_descriptor_set(&self, set: DescriptorSetHandle);

    // ===== PIPELINES =====

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineBinding>;
    fn destroy_pipeline(&self, binding: PipelineBinding);

    // ===== SWAPCHAIN =====

    fn swapchain_image_count(&self) -> u32;
    fn swapchain_extent(&self) -> (u32, u32);
    /// Acquire the next presentable image, signalling `signal` when it is
    /// ready. Fails with `SurfaceOutOfDate` or `Timeout`.
    fn acquire_next_image(&self, signal: SemaphoreHandle, timeout: Option<Duration>) -> Result<u32>;
    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentStatus>;
    /// Rebuild the swapchain for a new surface size, returning the new image count
    fn recreate_swapchain(&self, width: u32, height: u32) -> Result<u32>;

    // ===== DEBUG =====

    fn set_debug_name(&self, _object: GpuObject, _name: &str) {}
}
