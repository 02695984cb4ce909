/// Mock GPU device for unit tests (no GPU required)
///
/// Records every call as a [`MockCall`] and simulates the GPU state the
/// frame loop's invariants depend on:
///
/// - fences go pending on submit and signal when waited on (or when their
///   queue idles)
/// - command buffers remember the submission they belong to
/// - binary semaphores must be signaled before they are waited on, and may
///   not be signaled again while a submitted wait on them is still pending
/// - the swapchain hands out images round-robin
///
/// Misuse that a real driver would turn into undefined behavior (resetting
/// a command buffer whose fence has not signaled, resetting a pending fence,
/// waiting on an unsignaled semaphore, destroying an unknown object) is
/// collected in [`MockGpuDevice::violations`] instead of panicking, so tests
/// can assert on the whole sequence.

use std::sync::Mutex;
use std::time::Duration;
use slotmap::{DefaultKey, Key, KeyData, SlotMap};

use crate::error::{Error, Result};
use super::barrier::{BufferBarrier, ImageBarrier, PipelineStages};
use super::device::*;
use super::handles::*;
use super::queue::{QueueFamilyIndices, QueueRole};
use super::resources::{BufferDesc, ImageDesc, MemoryLocation, PipelineDesc, PipelineKind};

// ============================================================================
// Recorded calls
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateCommandPool { pool: CommandPoolHandle, family: u32, flags: CommandPoolFlags },
    DestroyCommandPool { pool: CommandPoolHandle },
    AllocateCommandBuffer { pool: CommandPoolHandle, cmd: CommandBufferHandle },
    FreeCommandBuffer { cmd: CommandBufferHandle },
    ResetCommandBuffer { cmd: CommandBufferHandle },
    BeginCommandBuffer { cmd: CommandBufferHandle, one_time: bool },
    EndCommandBuffer { cmd: CommandBufferHandle },

    CopyBuffer { cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, size: u64 },
    CopyBufferToImage { cmd: CommandBufferHandle, src: BufferHandle, image: ImageHandle, width: u32, height: u32 },
    PipelineBarrier {
        cmd: CommandBufferHandle,
        src_stage: PipelineStages,
        dst_stage: PipelineStages,
        buffers: Vec<BufferBarrier>,
        images: Vec<ImageBarrier>,
    },
    BeginFramePass { cmd: CommandBufferHandle, image_index: u32 },
    EndFramePass { cmd: CommandBufferHandle },
    BindPipeline { cmd: CommandBufferHandle, pipeline: PipelineHandle },
    BindDescriptorSet { cmd: CommandBufferHandle, set_index: u32, set: DescriptorSetHandle },
    BindVertexBuffer { cmd: CommandBufferHandle, buffer: BufferHandle },
    BindIndexBuffer { cmd: CommandBufferHandle, buffer: BufferHandle },
    Draw { cmd: CommandBufferHandle, vertex_count: u32 },
    DrawIndexed { cmd: CommandBufferHandle, index_count: u32 },

    Submit {
        role: QueueRole,
        family: u32,
        command_buffers: Vec<CommandBufferHandle>,
        waits: Vec<SemaphoreHandle>,
        signals: Vec<SemaphoreHandle>,
        fence: Option<FenceHandle>,
    },
    QueueWaitIdle { role: QueueRole },
    DeviceWaitIdle,

    CreateFence { fence: FenceHandle, signaled: bool },
    DestroyFence { fence: FenceHandle },
    WaitFence { fence: FenceHandle },
    ResetFence { fence: FenceHandle },
    CreateSemaphore { semaphore: SemaphoreHandle },
    DestroySemaphore { semaphore: SemaphoreHandle },

    CreateBuffer { buffer: BufferHandle, size: u64, location: MemoryLocation },
    DestroyBuffer { buffer: BufferHandle },
    MapBuffer { buffer: BufferHandle },
    FlushBuffer { buffer: BufferHandle, offset: u64, size: u64 },
    CreateImage { image: ImageHandle, desc: ImageDesc },
    DestroyImage { image: ImageHandle },
    CreateImageView { view: ImageViewHandle, image: ImageHandle },
    DestroyImageView { view: ImageViewHandle },

    AllocateDescriptorSet { set: DescriptorSetHandle },
    FreeDescriptorSet { set: DescriptorSetHandle },
    CreatePipeline { binding: PipelineBinding, kind: PipelineKind },
    DestroyPipeline { binding: PipelineBinding },

    AcquireImage { image_index: u32, semaphore: SemaphoreHandle },
    AcquireOutOfDate,
    AcquireTimedOut,
    Present { image_index: u32, wait: SemaphoreHandle },
    RecreateSwapchain { width: u32, height: u32, image_count: u32 },
    SetDebugName { object: GpuObject, name: String },
}

/// Object categories for leak accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    CommandPool,
    CommandBuffer,
    Fence,
    Semaphore,
    Buffer,
    Image,
    ImageView,
    DescriptorSet,
    Pipeline,
}

// ============================================================================
// Simulated state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Signaled,
    Pending { family: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Fence(FenceHandle),
    Queue(u32),
}

#[derive(Debug)]
enum MockObject {
    CommandPool,
    CommandBuffer { pool: CommandPoolHandle, recording: bool, in_flight: Option<InFlight> },
    Fence { state: FenceState },
    /// `waiter` is the submission whose wait consumed the last signal,
    /// until that submission completes
    Semaphore { signaled: bool, waiter: Option<InFlight> },
    Buffer { data: Vec<u8>, location: MemoryLocation },
    Image,
    ImageView,
    DescriptorSet,
    Pipeline,
}

impl MockObject {
    fn kind(&self) -> ObjectKind {
        match self {
            MockObject::CommandPool => ObjectKind::CommandPool,
            MockObject::CommandBuffer { .. } => ObjectKind::CommandBuffer,
            MockObject::Fence { .. } => ObjectKind::Fence,
            MockObject::Semaphore { .. } => ObjectKind::Semaphore,
            MockObject::Buffer { .. } => ObjectKind::Buffer,
            MockObject::Image => ObjectKind::Image,
            MockObject::ImageView => ObjectKind::ImageView,
            MockObject::DescriptorSet => ObjectKind::DescriptorSet,
            MockObject::Pipeline => ObjectKind::Pipeline,
        }
    }
}

fn key(raw: u64) -> DefaultKey {
    KeyData::from_ffi(raw).into()
}

struct MockState {
    objects: SlotMap<DefaultKey, MockObject>,
    calls: Vec<MockCall>,
    violations: Vec<String>,
    families: QueueFamilyIndices,
    image_count: u32,
    extent: (u32, u32),
    next_image: u32,
    recreate_image_count: Option<u32>,
    injected_fence_timeouts: u32,
    injected_out_of_date: u32,
    injected_acquire_timeouts: u32,
    fail_allocations: bool,
}

impl MockState {
    fn insert(&mut self, object: MockObject) -> u64 {
        self.objects.insert(object).data().as_ffi()
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn remove(&mut self, raw: u64, kind: ObjectKind) -> Option<MockObject> {
        let k = key(raw);
        match self.objects.get(k).map(MockObject::kind) {
            Some(found) if found == kind => self.objects.remove(k),
            _ => {
                self.violation(format!("destroy of unknown {:?} {:#x}", kind, raw));
                None
            }
        }
    }

    fn allocation_check(&self) -> Result<()> {
        if self.fail_allocations {
            Err(Error::OutOfMemory)
        } else {
            Ok(())
        }
    }

    fn fence_state(&self, fence: FenceHandle) -> Option<FenceState> {
        match self.objects.get(key(fence.raw())) {
            Some(MockObject::Fence { state }) => Some(*state),
            _ => None,
        }
    }

    fn set_fence(&mut self, fence: FenceHandle, new_state: FenceState) {
        if let Some(MockObject::Fence { state }) = self.objects.get_mut(key(fence.raw())) {
            *state = new_state;
        }
    }

    fn signal_fence(&mut self, fence: FenceHandle) {
        self.set_fence(fence, FenceState::Signaled);
        self.complete(InFlight::Fence(fence));
    }

    /// Retire everything tied to a finished submission
    fn complete(&mut self, done: InFlight) {
        for object in self.objects.values_mut() {
            match object {
                MockObject::CommandBuffer { in_flight, .. } if *in_flight == Some(done) => *in_flight = None,
                MockObject::Semaphore { waiter, .. } if *waiter == Some(done) => *waiter = None,
                _ => {}
            }
        }
    }

    /// Complete all work on `family` (every family when `None`)
    fn idle(&mut self, family: Option<u32>) {
        let matches = |f: u32| family.map_or(true, |target| target == f);
        let mut signaled = Vec::new();
        for (k, object) in self.objects.iter_mut() {
            match object {
                MockObject::Fence { state } => {
                    if let FenceState::Pending { family: f } = *state {
                        if matches(f) {
                            *state = FenceState::Signaled;
                            signaled.push(FenceHandle::from_raw(k.data().as_ffi()));
                        }
                    }
                }
                MockObject::CommandBuffer { in_flight, .. } => {
                    if let Some(InFlight::Queue(f)) = *in_flight {
                        if matches(f) {
                            *in_flight = None;
                        }
                    }
                }
                MockObject::Semaphore { waiter, .. } => {
                    if let Some(InFlight::Queue(f)) = *waiter {
                        if matches(f) {
                            *waiter = None;
                        }
                    }
                }
                _ => {}
            }
        }
        for fence in signaled {
            self.signal_fence(fence);
        }
    }

    /// Whether `cmd`'s previous submission may still be executing
    fn in_flight(&self, cmd: CommandBufferHandle) -> bool {
        match self.objects.get(key(cmd.raw())) {
            Some(MockObject::CommandBuffer { in_flight: Some(InFlight::Queue(_)), .. }) => true,
            Some(MockObject::CommandBuffer { in_flight: Some(InFlight::Fence(f)), .. }) => {
                matches!(self.fence_state(*f), Some(FenceState::Pending { .. }))
            }
            _ => false,
        }
    }

    fn command_buffer_mut(&mut self, cmd: CommandBufferHandle) -> Option<&mut bool> {
        match self.objects.get_mut(key(cmd.raw())) {
            Some(MockObject::CommandBuffer { recording, .. }) => Some(recording),
            _ => None,
        }
    }

    /// Record a command, flagging recording outside begin/end
    fn record(&mut self, cmd: CommandBufferHandle, call: MockCall) {
        let recording = self.command_buffer_mut(cmd).map(|r| *r);
        if recording != Some(true) {
            self.violation(format!("{:?} recorded into command buffer {:#x} that is not recording", call, cmd.raw()));
        }
        self.calls.push(call);
    }

    /// Wait on `semaphore`; `by` is the submission that stays pending on it
    fn consume_semaphore(&mut self, semaphore: SemaphoreHandle, what: &str, by: Option<InFlight>) {
        match self.objects.get_mut(key(semaphore.raw())) {
            Some(MockObject::Semaphore { signaled, waiter }) if *signaled => {
                *signaled = false;
                *waiter = by;
            }
            Some(MockObject::Semaphore { .. }) => {
                self.violation(format!("{} waits on unsignaled semaphore {:#x}", what, semaphore.raw()))
            }
            _ => self.violation(format!("{} waits on unknown semaphore {:#x}", what, semaphore.raw())),
        }
    }

    fn signal_semaphore(&mut self, semaphore: SemaphoreHandle, what: &str) {
        match self.objects.get_mut(key(semaphore.raw())) {
            Some(MockObject::Semaphore { signaled, waiter: Some(_) }) if !*signaled => {
                *signaled = true;
                self.violation(format!(
                    "{} signals semaphore {:#x} while a wait on it is pending",
                    what,
                    semaphore.raw()
                ))
            }
            Some(MockObject::Semaphore { signaled, .. }) if !*signaled => *signaled = true,
            Some(MockObject::Semaphore { .. }) => self.violation(format!(
                "{} signals semaphore {:#x} that is already signaled",
                what,
                semaphore.raw()
            )),
            _ => self.violation(format!("{} signals unknown semaphore {:#x}", what, semaphore.raw())),
        }
    }

    fn buffer_data(&mut self, buffer: BufferHandle) -> Option<&mut Vec<u8>> {
        match self.objects.get_mut(key(buffer.raw())) {
            Some(MockObject::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    fn exists(&self, raw: u64, kind: ObjectKind) -> bool {
        self.objects.get(key(raw)).map(MockObject::kind) == Some(kind)
    }
}

// ============================================================================
// Mock device
// ============================================================================

pub struct MockGpuDevice {
    state: Mutex<MockState>,
}

impl MockGpuDevice {
    /// Single universal queue family, 4 swapchain images at 640x480
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                objects: SlotMap::new(),
                calls: Vec::new(),
                violations: Vec::new(),
                families: QueueFamilyIndices::unified(0),
                image_count: 4,
                extent: (640, 480),
                next_image: 0,
                recreate_image_count: None,
                injected_fence_timeouts: 0,
                injected_out_of_date: 0,
                injected_acquire_timeouts: 0,
                fail_allocations: false,
            }),
        }
    }

    pub fn with_families(self, families: QueueFamilyIndices) -> Self {
        self.lock().families = families;
        self
    }

    /// Graphics and compute on family 0, transfer on family 1
    pub fn with_dedicated_transfer(self) -> Self {
        self.with_families(QueueFamilyIndices { graphics: 0, present: 0, compute: 0, transfer: 1 })
    }

    pub fn with_swapchain(self, image_count: u32, extent: (u32, u32)) -> Self {
        {
            let mut state = self.lock();
            state.image_count = image_count;
            state.extent = extent;
        }
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== FAULT INJECTION =====

    /// Image count reported after the next swapchain recreate
    pub fn set_recreate_image_count(&self, count: u32) {
        self.lock().recreate_image_count = Some(count);
    }

    /// The next `count` bounded waits on pending fences time out
    pub fn inject_fence_timeouts(&self, count: u32) {
        self.lock().injected_fence_timeouts = count;
    }

    /// The next `count` acquires report a stale surface
    pub fn inject_out_of_date(&self, count: u32) {
        self.lock().injected_out_of_date = count;
    }

    /// The next `count` bounded acquires time out without signaling
    pub fn inject_acquire_timeouts(&self, count: u32) {
        self.lock().injected_acquire_timeouts = count;
    }

    pub fn set_fail_allocations(&self, fail: bool) {
        self.lock().fail_allocations = fail;
    }

    // ===== INSPECTION =====

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.lock().objects.values().filter(|o| o.kind() == kind).count()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.lock().buffer_data(buffer).cloned()
    }

    pub fn fence_is_signaled(&self, fence: FenceHandle) -> bool {
        self.lock().fence_state(fence) == Some(FenceState::Signaled)
    }
}

impl Default for MockGpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for MockGpuDevice {
    fn queue_families(&self) -> QueueFamilyIndices {
        self.lock().families
    }

    // ===== COMMAND POOLS AND BUFFERS =====

    fn create_command_pool(&self, family: u32, flags: CommandPoolFlags) -> Result<CommandPoolHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        let pool = CommandPoolHandle::from_raw(state.insert(MockObject::CommandPool));
        state.calls.push(MockCall::CreateCommandPool { pool, family, flags });
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.lock();
        if state.remove(pool.raw(), ObjectKind::CommandPool).is_some() {
            state
                .objects
                .retain(|_, o| !matches!(o, MockObject::CommandBuffer { pool: p, .. } if *p == pool));
        }
        state.calls.push(MockCall::DestroyCommandPool { pool });
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        if !state.exists(pool.raw(), ObjectKind::CommandPool) {
            return Err(Error::InvalidResource(format!("unknown command pool {:#x}", pool.raw())));
        }
        let cmd = CommandBufferHandle::from_raw(state.insert(MockObject::CommandBuffer {
            pool,
            recording: false,
            in_flight: None,
        }));
        state.calls.push(MockCall::AllocateCommandBuffer { pool, cmd });
        Ok(cmd)
    }

    fn free_command_buffer(&self, _pool: CommandPoolHandle, cmd: CommandBufferHandle) {
        let mut state = self.lock();
        if state.in_flight(cmd) {
            state.violation(format!("free of command buffer {:#x} while in flight", cmd.raw()));
        }
        state.remove(cmd.raw(), ObjectKind::CommandBuffer);
        state.calls.push(MockCall::FreeCommandBuffer { cmd });
    }

    fn reset_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        let mut state = self.lock();
        if state.in_flight(cmd) {
            state.violation(format!("reset of command buffer {:#x} before its fence signaled", cmd.raw()));
        }
        match state.command_buffer_mut(cmd) {
            Some(recording) => *recording = false,
            None => return Err(Error::InvalidResource(format!("unknown command buffer {:#x}", cmd.raw()))),
        }
        state.calls.push(MockCall::ResetCommandBuffer { cmd });
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle, one_time: bool) -> Result<()> {
        let mut state = self.lock();
        if state.in_flight(cmd) {
            state.violation(format!("begin of command buffer {:#x} before its fence signaled", cmd.raw()));
        }
        match state.command_buffer_mut(cmd) {
            Some(recording) => *recording = true,
            None => return Err(Error::InvalidResource(format!("unknown command buffer {:#x}", cmd.raw()))),
        }
        state.calls.push(MockCall::BeginCommandBuffer { cmd, one_time });
        Ok(())
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        let mut state = self.lock();
        match state.command_buffer_mut(cmd) {
            Some(recording) if *recording => *recording = false,
            Some(_) => state.violation(format!("end of command buffer {:#x} that is not recording", cmd.raw())),
            None => return Err(Error::InvalidResource(format!("unknown command buffer {:#x}", cmd.raw()))),
        }
        state.calls.push(MockCall::EndCommandBuffer { cmd });
        Ok(())
    }

    // ===== RECORDING =====

    fn cmd_copy_buffer(&self, cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, size: u64) {
        let mut guard = self.lock();
        let state = &mut *guard;
        // Copies take effect at record time; nothing reads GPU-only memory back
        // before the submission completes
        let bytes = state.buffer_data(src).map(|d| d[..(size as usize).min(d.len())].to_vec());
        let copied = match (bytes, state.buffer_data(dst)) {
            (Some(bytes), Some(target)) => {
                let n = bytes.len().min(target.len());
                target[..n].copy_from_slice(&bytes[..n]);
                true
            }
            _ => false,
        };
        if !copied {
            state.violation(format!("copy between unknown buffers {:#x} -> {:#x}", src.raw(), dst.raw()));
        }
        state.record(cmd, MockCall::CopyBuffer { cmd, src, dst, size });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        image: ImageHandle,
        width: u32,
        height: u32,
    ) {
        self.lock().record(cmd, MockCall::CopyBufferToImage { cmd, src, image, width, height });
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: CommandBufferHandle,
        src_stage: PipelineStages,
        dst_stage: PipelineStages,
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    ) {
        self.lock().record(
            cmd,
            MockCall::PipelineBarrier {
                cmd,
                src_stage,
                dst_stage,
                buffers: buffers.to_vec(),
                images: images.to_vec(),
            },
        );
    }

    fn cmd_begin_frame_pass(&self, cmd: CommandBufferHandle, image_index: u32, _clear: [f32; 4]) {
        self.lock().record(cmd, MockCall::BeginFramePass { cmd, image_index });
    }

    fn cmd_end_frame_pass(&self, cmd: CommandBufferHandle) {
        self.lock().record(cmd, MockCall::EndFramePass { cmd });
    }

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        self.lock().record(cmd, MockCall::BindPipeline { cmd, pipeline });
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        set_index: u32,
        set: DescriptorSetHandle,
    ) {
        let mut state = self.lock();
        if !state.exists(set.raw(), ObjectKind::DescriptorSet) {
            state.violation(format!("bind of unknown descriptor set {:#x}", set.raw()));
        }
        state.record(cmd, MockCall::BindDescriptorSet { cmd, set_index, set });
    }

    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle) {
        self.lock().record(cmd, MockCall::BindVertexBuffer { cmd, buffer });
    }

    fn cmd_bind_index_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle) {
        self.lock().record(cmd, MockCall::BindIndexBuffer { cmd, buffer });
    }

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32) {
        self.lock().record(cmd, MockCall::Draw { cmd, vertex_count });
    }

    fn cmd_draw_indexed(&self, cmd: CommandBufferHandle, index_count: u32) {
        self.lock().record(cmd, MockCall::DrawIndexed { cmd, index_count });
    }

    // ===== SUBMISSION =====

    fn queue_submit(&self, role: QueueRole, submit: &SubmitDesc) -> Result<()> {
        let mut state = self.lock();
        let family = state.families.family(role);
        let in_flight = match submit.fence {
            Some(fence) => InFlight::Fence(fence),
            None => InFlight::Queue(family),
        };

        for wait in &submit.waits {
            state.consume_semaphore(wait.semaphore, "submit", Some(in_flight));
        }
        for &cmd in &submit.command_buffers {
            let still_recording = match state.objects.get_mut(key(cmd.raw())) {
                Some(MockObject::CommandBuffer { recording, in_flight: slot, .. }) => {
                    *slot = Some(in_flight);
                    Some(*recording)
                }
                _ => None,
            };
            match still_recording {
                Some(false) => {}
                Some(true) => state.violation(format!("submit of command buffer {:#x} still recording", cmd.raw())),
                None => state.violation(format!("submit of unknown command buffer {:#x}", cmd.raw())),
            }
        }

        for &semaphore in &submit.signals {
            state.signal_semaphore(semaphore, "submit");
        }

        if let Some(fence) = submit.fence {
            match state.fence_state(fence) {
                Some(FenceState::Unsignaled) => {}
                Some(other) => state.violation(format!("submit with fence {:#x} in state {:?}", fence.raw(), other)),
                None => state.violation(format!("submit with unknown fence {:#x}", fence.raw())),
            }
            state.set_fence(fence, FenceState::Pending { family });
        }

        state.calls.push(MockCall::Submit {
            role,
            family,
            command_buffers: submit.command_buffers.clone(),
            waits: submit.waits.iter().map(|w| w.semaphore).collect(),
            signals: submit.signals.clone(),
            fence: submit.fence,
        });
        Ok(())
    }

    fn queue_wait_idle(&self, role: QueueRole) -> Result<()> {
        let mut state = self.lock();
        let family = state.families.family(role);
        state.idle(Some(family));
        state.calls.push(MockCall::QueueWaitIdle { role });
        Ok(())
    }

    fn device_wait_idle(&self) -> Result<()> {
        let mut state = self.lock();
        state.idle(None);
        state.calls.push(MockCall::DeviceWaitIdle);
        Ok(())
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        let initial = if signaled { FenceState::Signaled } else { FenceState::Unsignaled };
        let fence = FenceHandle::from_raw(state.insert(MockObject::Fence { state: initial }));
        state.calls.push(MockCall::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.lock();
        if let Some(FenceState::Pending { .. }) = state.fence_state(fence) {
            state.violation(format!("destroy of fence {:#x} with pending work", fence.raw()));
        }
        state.remove(fence.raw(), ObjectKind::Fence);
        state.calls.push(MockCall::DestroyFence { fence });
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<FenceStatus> {
        let mut state = self.lock();
        state.calls.push(MockCall::WaitFence { fence });
        match state.fence_state(fence) {
            Some(FenceState::Signaled) => Ok(FenceStatus::Signaled),
            Some(FenceState::Pending { .. }) => {
                if timeout.is_some() && state.injected_fence_timeouts > 0 {
                    state.injected_fence_timeouts -= 1;
                    return Ok(FenceStatus::TimedOut);
                }
                state.signal_fence(fence);
                Ok(FenceStatus::Signaled)
            }
            Some(FenceState::Unsignaled) => {
                state.violation(format!("wait on fence {:#x} that was never submitted", fence.raw()));
                Ok(FenceStatus::TimedOut)
            }
            None => Err(Error::InvalidResource(format!("unknown fence {:#x}", fence.raw()))),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut state = self.lock();
        match state.fence_state(fence) {
            Some(FenceState::Pending { .. }) => {
                state.violation(format!("reset of pending fence {:#x}", fence.raw()));
            }
            Some(_) => {}
            None => return Err(Error::InvalidResource(format!("unknown fence {:#x}", fence.raw()))),
        }
        state.set_fence(fence, FenceState::Unsignaled);
        state.calls.push(MockCall::ResetFence { fence });
        Ok(())
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        let semaphore = SemaphoreHandle::from_raw(state.insert(MockObject::Semaphore { signaled: false, waiter: None }));
        state.calls.push(MockCall::CreateSemaphore { semaphore });
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.lock();
        state.remove(semaphore.raw(), ObjectKind::Semaphore);
        state.calls.push(MockCall::DestroySemaphore { semaphore });
    }

    // ===== MEMORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        let buffer = BufferHandle::from_raw(state.insert(MockObject::Buffer {
            data: vec![0; desc.size as usize],
            location: desc.location,
        }));
        state.calls.push(MockCall::CreateBuffer { buffer, size: desc.size, location: desc.location });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.lock();
        state.remove(buffer.raw(), ObjectKind::Buffer);
        state.calls.push(MockCall::DestroyBuffer { buffer });
    }

    fn map_buffer(&self, buffer: BufferHandle, write: &mut dyn FnMut(&mut [u8])) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.objects.get_mut(key(buffer.raw())) {
            Some(MockObject::Buffer { data, location }) if location.is_host_visible() => write(data.as_mut_slice()),
            Some(MockObject::Buffer { .. }) => {
                return Err(Error::InvalidResource(format!(
                    "buffer {:#x} is not host visible",
                    buffer.raw()
                )))
            }
            _ => return Err(Error::InvalidResource(format!("unknown buffer {:#x}", buffer.raw()))),
        }
        state.calls.push(MockCall::MapBuffer { buffer });
        Ok(())
    }

    fn flush_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()> {
        let mut state = self.lock();
        if !state.exists(buffer.raw(), ObjectKind::Buffer) {
            return Err(Error::InvalidResource(format!("unknown buffer {:#x}", buffer.raw())));
        }
        state.calls.push(MockCall::FlushBuffer { buffer, offset, size });
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        let image = ImageHandle::from_raw(state.insert(MockObject::Image));
        state.calls.push(MockCall::CreateImage { image, desc: *desc });
        Ok(image)
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut state = self.lock();
        state.remove(image.raw(), ObjectKind::Image);
        state.calls.push(MockCall::DestroyImage { image });
    }

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        if !state.exists(image.raw(), ObjectKind::Image) {
            return Err(Error::InvalidResource(format!("unknown image {:#x}", image.raw())));
        }
        let view = ImageViewHandle::from_raw(state.insert(MockObject::ImageView));
        state.calls.push(MockCall::CreateImageView { view, image });
        Ok(view)
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        let mut state = self.lock();
        state.remove(view.raw(), ObjectKind::ImageView);
        state.calls.push(MockCall::DestroyImageView { view });
    }

    // ===== DESCRIPTORS =====

    fn allocate_uniform_set(&self, buffer: BufferHandle, _range: u64) -> Result<DescriptorSetHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        if !state.exists(buffer.raw(), ObjectKind::Buffer) {
            return Err(Error::InvalidResource(format!("unknown buffer {:#x}", buffer.raw())));
        }
        let set = DescriptorSetHandle::from_raw(state.insert(MockObject::DescriptorSet));
        state.calls.push(MockCall::AllocateDescriptorSet { set });
        Ok(set)
    }

    fn allocate_plane_set(
        &self,
        luma: ImageViewHandle,
        chroma: ImageViewHandle,
    ) -> Result<DescriptorSetHandle> {
        let mut state = self.lock();
        state.allocation_check()?;
        if !state.exists(luma.raw(), ObjectKind::ImageView) || !state.exists(chroma.raw(), ObjectKind::ImageView) {
            return Err(Error::InvalidResource("unknown plane image view".to_string()));
        }
        let set = DescriptorSetHandle::from_raw(state.insert(MockObject::DescriptorSet));
        state.calls.push(MockCall::AllocateDescriptorSet { set });
        Ok(set)
    }

    fn free_descriptor_set(&self, set: DescriptorSetHandle) {
        let mut state = self.lock();
        state.remove(set.raw(), ObjectKind::DescriptorSet);
        state.calls.push(MockCall::FreeDescriptorSet { set });
    }

    // ===== PIPELINES =====

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineBinding> {
        let mut state = self.lock();
        state.allocation_check()?;
        let pipeline = PipelineHandle::from_raw(state.insert(MockObject::Pipeline));
        // Layouts are not tracked separately; reuse the pipeline key
        let binding = PipelineBinding { pipeline, layout: PipelineLayoutHandle::from_raw(pipeline.raw()) };
        state.calls.push(MockCall::CreatePipeline { binding, kind: desc.kind });
        Ok(binding)
    }

    fn destroy_pipeline(&self, binding: PipelineBinding) {
        let mut state = self.lock();
        state.remove(binding.pipeline.raw(), ObjectKind::Pipeline);
        state.calls.push(MockCall::DestroyPipeline { binding });
    }

    // ===== SWAPCHAIN =====

    fn swapchain_image_count(&self) -> u32 {
        self.lock().image_count
    }

    fn swapchain_extent(&self) -> (u32, u32) {
        self.lock().extent
    }

    fn acquire_next_image(&self, signal: SemaphoreHandle, timeout: Option<Duration>) -> Result<u32> {
        let mut state = self.lock();
        if state.injected_out_of_date > 0 {
            state.injected_out_of_date -= 1;
            state.calls.push(MockCall::AcquireOutOfDate);
            return Err(Error::SurfaceOutOfDate);
        }
        if timeout.is_some() && state.injected_acquire_timeouts > 0 {
            state.injected_acquire_timeouts -= 1;
            state.calls.push(MockCall::AcquireTimedOut);
            return Err(Error::Timeout);
        }
        state.signal_semaphore(signal, "acquire");
        let image_index = state.next_image;
        state.next_image = (image_index + 1) % state.image_count;
        state.calls.push(MockCall::AcquireImage { image_index, semaphore: signal });
        Ok(image_index)
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentStatus> {
        let mut state = self.lock();
        let image_count = state.image_count;
        if image_index >= image_count {
            state.violation(format!("present of image {} out of {}", image_index, image_count));
        }
        state.consume_semaphore(wait, "present", None);
        state.calls.push(MockCall::Present { image_index, wait });
        Ok(PresentStatus::Optimal)
    }

    fn recreate_swapchain(&self, width: u32, height: u32) -> Result<u32> {
        let mut state = self.lock();
        let image_count = state.recreate_image_count.unwrap_or(state.image_count);
        state.image_count = image_count;
        state.extent = (width, height);
        state.next_image = 0;
        state.calls.push(MockCall::RecreateSwapchain { width, height, image_count });
        Ok(image_count)
    }

    fn set_debug_name(&self, object: GpuObject, name: &str) {
        self.lock().calls.push(MockCall::SetDebugName { object, name: name.to_string() });
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
