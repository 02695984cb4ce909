/// Frame pacing: per-frame fences and per-image semaphores.
///
/// Two independent counts are in play. Frames in flight (N) bound how far
/// the CPU may run ahead of the GPU: each has a fence. Swapchain images (M)
/// are chosen by the presentation engine: each has an acquire semaphore, a
/// render-finished semaphore and a slot in the occupancy map recording which
/// frame fence last rendered into it.
///
/// Per frame, in this order:
///
/// 1. [`advance_frame`](FramePacer::advance_frame)
/// 2. [`wait_for_current_frame`](FramePacer::wait_for_current_frame)
/// 3. acquire an image with [`next_acquire_semaphore`](FramePacer::next_acquire_semaphore),
///    then [`acquire_succeeded`](FramePacer::acquire_succeeded) once it signaled
/// 4. [`wait_for_image`](FramePacer::wait_for_image)
/// 5. [`set_image_fence`](FramePacer::set_image_fence)
/// 6. [`reset_current_fence`](FramePacer::reset_current_fence)
/// 7. record, submit, present
///
/// The acquire semaphore cannot be indexed by image because the image index
/// is only known after acquiring, so acquire semaphores rotate round-robin
/// through their own pool of M.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gpu::{FenceHandle, FenceStatus, GpuDevice, GpuObject, Scoped, SemaphoreHandle};
use crate::utils::RingSlotSet;
use crate::{engine_debug, engine_error, engine_warn};

const SOURCE: &str = "krakatoa::frame";

/// Proof that the current frame slot's fence has signaled.
///
/// Only produced by [`FramePacer::wait_for_current_frame`]; the command
/// manager requires it before resetting the slot's command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlotReady {
    slot: usize,
    fence: FenceHandle,
}

impl FrameSlotReady {
    pub(crate) fn new(slot: usize, fence: FenceHandle) -> Self {
        Self { slot, fence }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn fence(&self) -> FenceHandle {
        self.fence
    }
}

/// Outcome of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameWait<T> {
    Ready(T),
    /// The timeout expired; nothing was consumed and the wait may be retried
    Stalled,
}

struct ImageSync {
    acquire: Scoped<SemaphoreHandle>,
    render_finished: Scoped<SemaphoreHandle>,
    /// Fence of the frame that last rendered into this image
    owner: Option<FenceHandle>,
}

pub struct FramePacer {
    images: Vec<ImageSync>,
    frame_fences: RingSlotSet<Scoped<FenceHandle>>,
    acquire_cursor: usize,
    fence_timeout: Option<Duration>,
    device: Arc<dyn GpuDevice>,
}

impl FramePacer {
    /// Create `frames_in_flight` signaled fences and sync objects for
    /// `image_count` swapchain images. `fence_timeout` bounds every fence
    /// wait (`None` waits forever).
    pub fn new(
        device: Arc<dyn GpuDevice>,
        frames_in_flight: usize,
        image_count: u32,
        fence_timeout: Option<Duration>,
    ) -> Result<Self> {
        // Signaled so the first wait on each slot returns immediately
        let frame_fences = RingSlotSet::try_from_fn(frames_in_flight, |i| {
            let fence = device.create_fence(true).map_err(|e| {
                engine_error!(SOURCE, "Failed to create frame fence {}: {}", i, e);
                e
            })?;
            device.set_debug_name(GpuObject::Fence(fence), &format!("FrameFence[{}]", i));
            Ok(Scoped::new(&device, fence))
        })?;

        let images = Self::create_image_sync(&device, image_count)?;

        engine_debug!(
            SOURCE,
            "Frame pacer: {} frames in flight, {} swapchain images",
            frames_in_flight,
            image_count
        );

        Ok(Self { images, frame_fences, acquire_cursor: 0, fence_timeout, device })
    }

    fn create_image_sync(device: &Arc<dyn GpuDevice>, image_count: u32) -> Result<Vec<ImageSync>> {
        if image_count == 0 {
            return Err(Error::InvalidState("swapchain with no images".to_string()));
        }
        (0..image_count)
            .map(|i| -> Result<ImageSync> {
                let acquire = Scoped::new(device, device.create_semaphore()?);
                let render_finished = Scoped::new(device, device.create_semaphore()?);
                device.set_debug_name(GpuObject::Semaphore(acquire.get()), &format!("AcquireSemaphore[{}]", i));
                device.set_debug_name(
                    GpuObject::Semaphore(render_finished.get()),
                    &format!("RenderFinishedSemaphore[{}]", i),
                );
                Ok(ImageSync { acquire, render_finished, owner: None })
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to create swapchain image semaphores: {}", e);
                e
            })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frame_fences.len()
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn current_slot(&self) -> Option<usize> {
        self.frame_fences.current_index()
    }

    /// Move to the next frame-in-flight slot
    pub fn advance_frame(&mut self) -> usize {
        self.frame_fences.advance();
        self.frame_fences.current_index().unwrap_or(0)
    }

    pub fn current_fence(&self) -> Result<FenceHandle> {
        self.frame_fences.current().map(Scoped::get)
    }

    fn wait(&self, fence: FenceHandle, what: &str) -> Result<FenceStatus> {
        let status = self.device.wait_for_fence(fence, self.fence_timeout)?;
        if status == FenceStatus::TimedOut {
            engine_warn!(
                SOURCE,
                "{} fence not signaled after {:?}, GPU may be stalled",
                what,
                self.fence_timeout
            );
        }
        Ok(status)
    }

    /// Block until the current slot's previous submission has completed
    pub fn wait_for_current_frame(&self) -> Result<FrameWait<FrameSlotReady>> {
        let slot = self
            .frame_fences
            .current_index()
            .ok_or_else(|| Error::InvalidState("wait_for_current_frame before advance_frame".to_string()))?;
        let fence = self.current_fence()?;
        Ok(match self.wait(fence, "Frame")? {
            FenceStatus::Signaled => FrameWait::Ready(FrameSlotReady::new(slot, fence)),
            FenceStatus::TimedOut => FrameWait::Stalled,
        })
    }

    /// Semaphore for the next acquire (round-robin over the image count).
    ///
    /// Repeated calls return the same semaphore until
    /// [`acquire_succeeded`](Self::acquire_succeeded). An acquire that times
    /// out or finds the surface out of date signals nothing, so its
    /// semaphore is handed out again and the rotation stays in step with
    /// the frames that actually waited on it.
    pub fn next_acquire_semaphore(&self) -> SemaphoreHandle {
        self.images[self.acquire_cursor].acquire.get()
    }

    /// The semaphore from [`next_acquire_semaphore`](Self::next_acquire_semaphore)
    /// was signaled by an acquire; move the rotation on
    pub fn acquire_succeeded(&mut self) {
        self.acquire_cursor = (self.acquire_cursor + 1) % self.images.len();
    }

    fn image(&self, image_index: u32) -> Result<&ImageSync> {
        self.images.get(image_index as usize).ok_or_else(|| {
            Error::InvalidState(format!(
                "swapchain image {} out of range ({} images)",
                image_index,
                self.images.len()
            ))
        })
    }

    /// Block until the frame that last rendered into `image_index` has completed
    pub fn wait_for_image(&self, image_index: u32) -> Result<FrameWait<()>> {
        match self.image(image_index)?.owner {
            Some(fence) => Ok(match self.wait(fence, "Image")? {
                FenceStatus::Signaled => FrameWait::Ready(()),
                FenceStatus::TimedOut => FrameWait::Stalled,
            }),
            None => Ok(FrameWait::Ready(())),
        }
    }

    /// Record that the current frame now renders into `image_index`
    pub fn set_image_fence(&mut self, image_index: u32) -> Result<()> {
        let fence = self.current_fence()?;
        self.image(image_index)?;
        self.images[image_index as usize].owner = Some(fence);
        Ok(())
    }

    pub fn image_owner(&self, image_index: u32) -> Option<FenceHandle> {
        self.images.get(image_index as usize).and_then(|image| image.owner)
    }

    /// Unsignal the current fence right before it is submitted
    pub fn reset_current_fence(&self) -> Result<()> {
        self.device.reset_fence(self.current_fence()?)
    }

    pub fn render_finished_semaphore(&self, image_index: u32) -> Result<SemaphoreHandle> {
        Ok(self.image(image_index)?.render_finished.get())
    }

    /// Rebuild the per-image semaphores and occupancy map for a new
    /// swapchain. Frame fences are untouched.
    pub fn recreate_for_swapchain(&mut self, image_count: u32) -> Result<()> {
        self.device.device_wait_idle()?;
        // Old semaphores are released before the new ones exist
        self.images.clear();
        self.images = Self::create_image_sync(&self.device, image_count)?;
        self.acquire_cursor = 0;
        engine_debug!(SOURCE, "Frame pacer rebuilt for {} swapchain images", image_count);
        Ok(())
    }
}

impl Drop for FramePacer {
    fn drop(&mut self) {
        if let Err(e) = self.device.device_wait_idle() {
            engine_error!(SOURCE, "device_wait_idle failed while destroying frame sync objects: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "frame_pacer_tests.rs"]
mod tests;
