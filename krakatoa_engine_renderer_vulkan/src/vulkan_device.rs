/// VulkanDevice - Vulkan implementation of the engine's GpuDevice trait
///
/// Handles crossing the trait are raw Vulkan handles (`vk::Handle::as_raw`).
/// Buffers and images are tracked so their allocations can be returned to
/// the allocator when they are destroyed.

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::AllocationError;
use krakatoa_engine::krakatoa::gpu::*;
use krakatoa_engine::krakatoa::{Error, Result};
use krakatoa_engine::{engine_bail, engine_err, engine_error, engine_info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::sync::Mutex;
use std::time::Duration;

use crate::vulkan_config::VulkanConfig;
use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_convert::*;
use crate::vulkan_descriptors::DescriptorAllocator;
use crate::vulkan_pipeline::{create_graphics_pipeline, KindState};
use crate::vulkan_swapchain::{color_subresource_range, Swapchain};

struct BufferEntry {
    allocation: Allocation,
    size: u64,
}

struct ImageEntry {
    allocation: Allocation,
    format: vk::Format,
}

/// Vulkan backend. Fields drop in declaration order, so everything built on
/// the context is released before it.
pub struct VulkanDevice {
    descriptors: DescriptorAllocator,
    swapchain: Mutex<Swapchain>,
    buffers: Mutex<FxHashMap<u64, BufferEntry>>,
    images: Mutex<FxHashMap<u64, ImageEntry>>,
    ctx: GpuContext,
}

fn raw<H: Handle>(handle: H) -> u64 {
    handle.as_raw()
}

fn vk_handle<H: Handle>(raw: u64) -> H {
    H::from_raw(raw)
}

/// Map a failed call to an engine error, keeping out-of-memory distinct
fn vk_error(what: &str, e: vk::Result) -> Error {
    match e {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            engine_error!("krakatoa::vulkan", "{}: out of memory ({:?})", what, e);
            Error::OutOfMemory
        }
        _ => engine_err!("krakatoa::vulkan", "{}: {:?}", what, e),
    }
}

fn allocation_error(what: &str, requirements: &vk::MemoryRequirements, e: AllocationError) -> Error {
    match e {
        AllocationError::OutOfMemory => {
            let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
            engine_error!("krakatoa::vulkan", "Out of GPU memory for {} (required: {:.2} MB)", what, size_mb);
            Error::OutOfMemory
        }
        other => engine_err!("krakatoa::vulkan", "Failed to allocate memory for {}: {}", what, other),
    }
}

/// Range to flush for host writes at `offset..offset + size` of an
/// allocation living at `alloc_offset` in its memory block. Offsets are
/// widened to `atom` multiples; a range running past the allocation flushes
/// to the end of the block instead.
pub(crate) fn flush_range(alloc_offset: u64, alloc_size: u64, offset: u64, size: u64, atom: u64) -> (u64, u64) {
    let atom = atom.max(1);
    let start = (alloc_offset + offset) / atom * atom;
    let end = (alloc_offset + offset + size).div_ceil(atom) * atom;
    if end > alloc_offset + alloc_size {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}

impl VulkanDevice {
    /// Create a device presenting to `window`, sized to its inner size
    pub fn new(window: &winit::window::Window, config: &VulkanConfig) -> Result<Self> {
        let size = window.inner_size();
        Self::with_surface_size(window, size.width, size.height, config)
    }

    /// Create a device for any window handle provider, with an explicit
    /// initial surface size
    pub fn with_surface_size<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        width: u32,
        height: u32,
        config: &VulkanConfig,
    ) -> Result<Self> {
        let (ctx, surface) = GpuContext::new(window, config)?;
        let swapchain = Swapchain::new(&ctx, surface, width, height, config.min_image_count)?;
        let descriptors = DescriptorAllocator::new(&ctx.device)?;

        let extent = swapchain.extent();
        engine_info!(
            "krakatoa::vulkan",
            "Vulkan device ready: {}x{} swapchain with {} images",
            extent.width,
            extent.height,
            swapchain.image_count()
        );

        Ok(Self {
            descriptors,
            swapchain: Mutex::new(swapchain),
            buffers: Mutex::new(FxHashMap::default()),
            images: Mutex::new(FxHashMap::default()),
            ctx,
        })
    }

    /// Number of descriptor sets currently allocated
    pub fn live_descriptor_sets(&self) -> usize {
        self.descriptors.live_sets()
    }

    /// Number of buffers not yet destroyed
    pub fn live_buffers(&self) -> usize {
        lock(&self.buffers).len()
    }

    fn name_object<H: Handle>(&self, handle: H, name: &str) {
        let Some(debug_names) = &self.ctx.debug_names else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name);
        unsafe {
            if let Err(e) = debug_names.set_debug_utils_object_name(&info) {
                engine_error!("krakatoa::vulkan", "Failed to set debug name {:?}: {:?}", name, e);
            }
        }
    }
}

impl GpuDevice for VulkanDevice {
    // ===== QUEUES =====

    fn queue_families(&self) -> QueueFamilyIndices {
        self.ctx.queue_families
    }

    // ===== COMMAND POOLS AND BUFFERS =====

    fn create_command_pool(&self, family: u32, flags: CommandPoolFlags) -> Result<CommandPoolHandle> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(command_pool_flags_to_vk(flags))
            .queue_family_index(family);
        unsafe {
            let pool = self
                .ctx
                .device
                .create_command_pool(&info, None)
                .map_err(|e| vk_error("Failed to create command pool", e))?;
            Ok(CommandPoolHandle::from_raw(raw(pool)))
        }
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.ctx.device.destroy_command_pool(vk_handle(pool.raw()), None);
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk_handle(pool.raw()))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        unsafe {
            let buffers = self
                .ctx
                .device
                .allocate_command_buffers(&info)
                .map_err(|e| vk_error("Failed to allocate command buffer", e))?;
            Ok(CommandBufferHandle::from_raw(raw(buffers[0])))
        }
    }

    fn free_command_buffer(&self, pool: CommandPoolHandle, cmd: CommandBufferHandle) {
        unsafe {
            self.ctx
                .device
                .free_command_buffers(vk_handle(pool.raw()), &[vk_handle(cmd.raw())]);
        }
    }

    fn reset_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .reset_command_buffer(vk_handle(cmd.raw()), vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error("Failed to reset command buffer", e))
        }
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle, one_time: bool) -> Result<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe {
            self.ctx
                .device
                .begin_command_buffer(vk_handle(cmd.raw()), &info)
                .map_err(|e| vk_error("Failed to begin command buffer", e))
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .end_command_buffer(vk_handle(cmd.raw()))
                .map_err(|e| vk_error("Failed to end command buffer", e))
        }
    }

    // ===== RECORDING =====

    fn cmd_copy_buffer(&self, cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, size: u64) {
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        unsafe {
            self.ctx
                .device
                .cmd_copy_buffer(vk_handle(cmd.raw()), vk_handle(src.raw()), vk_handle(dst.raw()), &[region]);
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: ImageHandle,
        width: u32,
        height: u32,
    ) {
        // Tightly packed rows
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 });
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                vk_handle(cmd.raw()),
                vk_handle(src.raw()),
                vk_handle(dst.raw()),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: CommandBufferHandle,
        src_stage: PipelineStages,
        dst_stage: PipelineStages,
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    ) {
        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = buffers
            .iter()
            .map(|barrier| {
                let (src_family, dst_family) = family_indices(barrier.family_transfer);
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(access_flags_to_vk(barrier.src_access))
                    .dst_access_mask(access_flags_to_vk(barrier.dst_access))
                    .src_queue_family_index(src_family)
                    .dst_queue_family_index(dst_family)
                    .buffer(vk_handle(barrier.buffer.raw()))
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
            })
            .collect();
        let image_barriers: Vec<vk::ImageMemoryBarrier> = images
            .iter()
            .map(|barrier| {
                let (src_family, dst_family) = family_indices(barrier.family_transfer);
                vk::ImageMemoryBarrier::default()
                    .old_layout(image_layout_to_vk(barrier.old_layout))
                    .new_layout(image_layout_to_vk(barrier.new_layout))
                    .src_access_mask(access_flags_to_vk(barrier.src_access))
                    .dst_access_mask(access_flags_to_vk(barrier.dst_access))
                    .src_queue_family_index(src_family)
                    .dst_queue_family_index(dst_family)
                    .image(vk_handle(barrier.image.raw()))
                    .subresource_range(color_subresource_range())
            })
            .collect();
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                vk_handle(cmd.raw()),
                pipeline_stages_to_vk(src_stage),
                pipeline_stages_to_vk(dst_stage),
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn cmd_begin_frame_pass(&self, cmd: CommandBufferHandle, image_index: u32, clear: [f32; 4]) {
        let swapchain = lock(&self.swapchain);
        let Some(framebuffer) = swapchain.framebuffer(image_index) else {
            engine_error!(
                "krakatoa::vulkan",
                "No framebuffer for swapchain image {} ({} images)",
                image_index,
                swapchain.image_count()
            );
            return;
        };
        let extent = swapchain.extent();
        let clear_values = [vk::ClearValue { color: vk::ClearColorValue { float32: clear } }];
        let render_area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(swapchain.render_pass())
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let cmd: vk::CommandBuffer = vk_handle(cmd.raw());
        unsafe {
            self.ctx.device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            self.ctx.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.ctx.device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
    }

    fn cmd_end_frame_pass(&self, cmd: CommandBufferHandle) {
        unsafe {
            self.ctx.device.cmd_end_render_pass(vk_handle(cmd.raw()));
        }
    }

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        unsafe {
            self.ctx.device.cmd_bind_pipeline(
                vk_handle(cmd.raw()),
                vk::PipelineBindPoint::GRAPHICS,
                vk_handle(pipeline.raw()),
            );
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        set_index: u32,
        set: DescriptorSetHandle,
    ) {
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                vk_handle(cmd.raw()),
                vk::PipelineBindPoint::GRAPHICS,
                vk_handle(layout.raw()),
                set_index,
                &[vk_handle(set.raw())],
                &[],
            );
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle) {
        unsafe {
            self.ctx
                .device
                .cmd_bind_vertex_buffers(vk_handle(cmd.raw()), 0, &[vk_handle(buffer.raw())], &[0]);
        }
    }

    fn cmd_bind_index_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle) {
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                vk_handle(cmd.raw()),
                vk_handle(buffer.raw()),
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32) {
        unsafe {
            self.ctx.device.cmd_draw(vk_handle(cmd.raw()), vertex_count, 1, 0, 0);
        }
    }

    fn cmd_draw_indexed(&self, cmd: CommandBufferHandle, index_count: u32) {
        unsafe {
            self.ctx.device.cmd_draw_indexed(vk_handle(cmd.raw()), index_count, 1, 0, 0, 0);
        }
    }

    // ===== SUBMISSION =====

    fn queue_submit(&self, role: QueueRole, submit: &SubmitDesc) -> Result<()> {
        let command_buffers: Vec<vk::CommandBuffer> =
            submit.command_buffers.iter().map(|cmd| vk_handle(cmd.raw())).collect();
        let wait_semaphores: Vec<vk::Semaphore> =
            submit.waits.iter().map(|wait| vk_handle(wait.semaphore.raw())).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            submit.waits.iter().map(|wait| pipeline_stages_to_vk(wait.stage)).collect();
        let signal_semaphores: Vec<vk::Semaphore> =
            submit.signals.iter().map(|semaphore| vk_handle(semaphore.raw())).collect();
        let fence: vk::Fence = submit.fence.map_or(vk::Fence::null(), |fence| vk_handle(fence.raw()));

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let family = self.ctx.queue_families.family(role);
        let queue = self.ctx.queue(family)?;
        unsafe {
            self.ctx
                .device
                .queue_submit(*queue, &[submit_info], fence)
                .map_err(|e| vk_error(&format!("Failed to submit to the {:?} queue", role), e))
        }
    }

    fn queue_wait_idle(&self, role: QueueRole) -> Result<()> {
        let queue = self.ctx.queue(self.ctx.queue_families.family(role))?;
        unsafe {
            self.ctx
                .device
                .queue_wait_idle(*queue)
                .map_err(|e| vk_error(&format!("Failed to wait for the {:?} queue", role), e))
        }
    }

    fn device_wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        unsafe {
            let fence = self
                .ctx
                .device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(|e| vk_error("Failed to create fence", e))?;
            Ok(FenceHandle::from_raw(raw(fence)))
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.ctx.device.destroy_fence(vk_handle(fence.raw()), None);
        }
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<FenceStatus> {
        unsafe {
            match self
                .ctx
                .device
                .wait_for_fences(&[vk_handle(fence.raw())], true, timeout_to_ns(timeout))
            {
                Ok(()) => Ok(FenceStatus::Signaled),
                Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
                Err(e) => Err(vk_error("Failed to wait for fence", e)),
            }
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .reset_fences(&[vk_handle(fence.raw())])
                .map_err(|e| vk_error("Failed to reset fence", e))
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        unsafe {
            let semaphore = self
                .ctx
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| vk_error("Failed to create semaphore", e))?;
            Ok(SemaphoreHandle::from_raw(raw(semaphore)))
        }
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.ctx.device.destroy_semaphore(vk_handle(semaphore.raw()), None);
        }
    }

    // ===== MEMORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        if desc.size == 0 {
            engine_bail!("krakatoa::vulkan", "Cannot create a zero-sized buffer");
        }
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = self
                .ctx
                .device
                .create_buffer(&buffer_create_info, None)
                .map_err(|e| vk_error(&format!("Failed to create buffer of size {} bytes", desc.size), e))?;

            let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = lock(&*self.ctx.allocator).allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location: memory_location_to_allocator(desc.location),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_buffer(buffer, None);
                    return Err(allocation_error("buffer", &requirements, e));
                }
            };

            if let Err(e) = self
                .ctx
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                lock(&*self.ctx.allocator).free(allocation).ok();
                self.ctx.device.destroy_buffer(buffer, None);
                return Err(vk_error("Failed to bind buffer memory", e));
            }

            let handle = raw(buffer);
            lock(&self.buffers).insert(handle, BufferEntry { allocation, size: desc.size });
            Ok(BufferHandle::from_raw(handle))
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let Some(entry) = lock(&self.buffers).remove(&buffer.raw()) else {
            engine_error!("krakatoa::vulkan", "destroy_buffer: unknown buffer {:#x}", buffer.raw());
            return;
        };
        if let Err(e) = lock(&*self.ctx.allocator).free(entry.allocation) {
            engine_error!("krakatoa::vulkan", "Failed to free buffer memory: {}", e);
        }
        unsafe {
            self.ctx.device.destroy_buffer(vk_handle(buffer.raw()), None);
        }
    }

    fn map_buffer(&self, buffer: BufferHandle, write: &mut dyn FnMut(&mut [u8])) -> Result<()> {
        let mut buffers = lock(&self.buffers);
        let entry = buffers
            .get_mut(&buffer.raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:#x}", buffer.raw())))?;
        let size = entry.size as usize;
        let mapped = entry.allocation.mapped_slice_mut().ok_or_else(|| {
            engine_error!("krakatoa::vulkan", "Buffer {:#x} is not host visible", buffer.raw());
            Error::InvalidResource("Buffer is not CPU-accessible".to_string())
        })?;
        // The allocation may be larger than requested
        let len = size.min(mapped.len());
        write(&mut mapped[..len]);
        Ok(())
    }

    fn flush_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()> {
        let buffers = lock(&self.buffers);
        let entry = buffers
            .get(&buffer.raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:#x}", buffer.raw())))?;
        let allocation = &entry.allocation;
        if allocation.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
            return Ok(());
        }

        let (start, len) = flush_range(
            allocation.offset(),
            allocation.size(),
            offset,
            size,
            self.ctx.non_coherent_atom_size,
        );
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(len);
        unsafe {
            self.ctx
                .device
                .flush_mapped_memory_ranges(&[range])
                .map_err(|e| vk_error("Failed to flush mapped memory", e))
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!("krakatoa::vulkan", "Cannot create a {}x{} image", desc.width, desc.height);
        }
        let format = image_format_to_vk(desc.format);
        unsafe {
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(image_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let image = self
                .ctx
                .device
                .create_image(&image_info, None)
                .map_err(|e| vk_error(&format!("Failed to create {}x{} image", desc.width, desc.height), e))?;

            let requirements = self.ctx.device.get_image_memory_requirements(image);
            let allocation = lock(&*self.ctx.allocator).allocate(&AllocationCreateDesc {
                name: "image",
                requirements,
                location: gpu_allocator::MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_image(image, None);
                    return Err(allocation_error("image", &requirements, e));
                }
            };

            if let Err(e) = self
                .ctx
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
            {
                lock(&*self.ctx.allocator).free(allocation).ok();
                self.ctx.device.destroy_image(image, None);
                return Err(vk_error("Failed to bind image memory", e));
            }

            let handle = raw(image);
            lock(&self.images).insert(handle, ImageEntry { allocation, format });
            Ok(ImageHandle::from_raw(handle))
        }
    }

    fn destroy_image(&self, image: ImageHandle) {
        let Some(entry) = lock(&self.images).remove(&image.raw()) else {
            engine_error!("krakatoa::vulkan", "destroy_image: unknown image {:#x}", image.raw());
            return;
        };
        if let Err(e) = lock(&*self.ctx.allocator).free(entry.allocation) {
            engine_error!("krakatoa::vulkan", "Failed to free image memory: {}", e);
        }
        unsafe {
            self.ctx.device.destroy_image(vk_handle(image.raw()), None);
        }
    }

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle> {
        let format = lock(&self.images)
            .get(&image.raw())
            .map(|entry| entry.format)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown image {:#x}", image.raw())))?;
        let view_info = vk::ImageViewCreateInfo::default()
            .image(vk_handle(image.raw()))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());
        unsafe {
            let view = self
                .ctx
                .device
                .create_image_view(&view_info, None)
                .map_err(|e| vk_error("Failed to create image view", e))?;
            Ok(ImageViewHandle::from_raw(raw(view)))
        }
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe {
            self.ctx.device.destroy_image_view(vk_handle(view.raw()), None);
        }
    }

    // ===== DESCRIPTORS =====

    fn allocate_uniform_set(&self, buffer: BufferHandle, range: u64) -> Result<DescriptorSetHandle> {
        let set = self.descriptors.allocate_uniform_set(vk_handle(buffer.raw()), range)?;
        Ok(DescriptorSetHandle::from_raw(raw(set)))
    }

    fn allocate_plane_set(&self, luma: ImageViewHandle, chroma: ImageViewHandle) -> Result<DescriptorSetHandle> {
        let set = self
            .descriptors
            .allocate_plane_set(vk_handle(luma.raw()), vk_handle(chroma.raw()))?;
        Ok(DescriptorSetHandle::from_raw(raw(set)))
    }

    fn free_descriptor_set(&self, set: DescriptorSetHandle) {
        self.descriptors.free(vk_handle(set.raw()));
    }

    // ===== PIPELINES =====

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineBinding> {
        let set_layout = self.descriptors.layout(KindState::for_kind(desc.kind).set_layout);
        let render_pass = lock(&self.swapchain).render_pass();
        let (pipeline, layout) = create_graphics_pipeline(&self.ctx.device, render_pass, set_layout, desc)?;
        self.name_object(pipeline, &desc.name);
        Ok(PipelineBinding {
            pipeline: PipelineHandle::from_raw(raw(pipeline)),
            layout: PipelineLayoutHandle::from_raw(raw(layout)),
        })
    }

    fn destroy_pipeline(&self, binding: PipelineBinding) {
        unsafe {
            self.ctx.device.destroy_pipeline(vk_handle(binding.pipeline.raw()), None);
            self.ctx.device.destroy_pipeline_layout(vk_handle(binding.layout.raw()), None);
        }
    }

    // ===== SWAPCHAIN =====

    fn swapchain_image_count(&self) -> u32 {
        lock(&self.swapchain).image_count()
    }

    fn swapchain_extent(&self) -> (u32, u32) {
        let extent = lock(&self.swapchain).extent();
        (extent.width, extent.height)
    }

    fn acquire_next_image(&self, signal: SemaphoreHandle, timeout: Option<Duration>) -> Result<u32> {
        lock(&self.swapchain).acquire_next_image(vk_handle(signal.raw()), timeout_to_ns(timeout))
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentStatus> {
        let swapchain = lock(&self.swapchain);
        let queue = self.ctx.queue(self.ctx.queue_families.present)?;
        let suboptimal = swapchain.present(*queue, image_index, vk_handle(wait.raw()))?;
        Ok(if suboptimal { PresentStatus::Suboptimal } else { PresentStatus::Optimal })
    }

    fn recreate_swapchain(&self, width: u32, height: u32) -> Result<u32> {
        self.ctx.wait_idle()?;
        lock(&self.swapchain).recreate(self.ctx.physical_device, width, height)
    }

    // ===== DEBUG =====

    fn set_debug_name(&self, object: GpuObject, name: &str) {
        match object {
            GpuObject::CommandBuffer(h) => self.name_object(vk_handle::<vk::CommandBuffer>(h.raw()), name),
            GpuObject::Fence(h) => self.name_object(vk_handle::<vk::Fence>(h.raw()), name),
            GpuObject::Semaphore(h) => self.name_object(vk_handle::<vk::Semaphore>(h.raw()), name),
            GpuObject::Buffer(h) => self.name_object(vk_handle::<vk::Buffer>(h.raw()), name),
            GpuObject::Image(h) => self.name_object(vk_handle::<vk::Image>(h.raw()), name),
            GpuObject::ImageView(h) => self.name_object(vk_handle::<vk::ImageView>(h.raw()), name),
            GpuObject::DescriptorSet(h) => self.name_object(vk_handle::<vk::DescriptorSet>(h.raw()), name),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        self.ctx.wait_idle().ok();

        // Whatever the engine did not destroy still holds allocator memory
        let buffers = std::mem::take(self.buffers.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner));
        let images = std::mem::take(self.images.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner));
        if !buffers.is_empty() || !images.is_empty() {
            engine_info!(
                "krakatoa::vulkan",
                "Releasing {} buffers and {} images still alive at shutdown",
                buffers.len(),
                images.len()
            );
        }
        let mut allocator = lock(&*self.ctx.allocator);
        unsafe {
            for (handle, entry) in buffers {
                allocator.free(entry.allocation).ok();
                self.ctx.device.destroy_buffer(vk_handle(handle), None);
            }
            for (handle, entry) in images {
                allocator.free(entry.allocation).ok();
                self.ctx.device.destroy_image(vk_handle(handle), None);
            }
        }
    }
}
