/// The frame loop: one explicit context owning every per-frame component.
///
/// [`RenderContext::render_frame`] runs the whole frame in a fixed order so
/// callers cannot misorder the synchronization:
///
/// 1. advance the frame slot (pacer and command buffers in lock-step)
/// 2. wait for the slot's fence
/// 3. acquire a swapchain image
/// 4. wait for the frame that last rendered into that image
/// 5. hand the image to this frame's fence, then reset the fence
/// 6. record: camera upload, render pass, every draw pipeline
/// 7. submit and present
///
/// A bounded wait that expires returns [`FrameOutcome::Stalled`] and the next
/// call resumes at the wait that stalled, without advancing or acquiring
/// again.
///
/// Fields are declared so that dropping the context releases the pipelines
/// and images before the command pools and sync objects.

use std::sync::Arc;

use crate::camera::{CameraFrame, CameraPlaneIngestor};
use crate::command::CommandSubmissionManager;
use crate::error::{Error, Result};
use crate::gpu::{GpuDevice, PresentStatus, SemaphoreHandle};
use crate::pipeline::{DrawPipeline, DrawRequest, PassInputs, ShaderSource};
use crate::{engine_error, engine_info, engine_warn};
use super::config::Config;
use super::frame_pacer::{FramePacer, FrameSlotReady, FrameWait};
use super::frame_timer::FrameTimer;

const SOURCE: &str = "krakatoa::frame";

/// Result of one [`RenderContext::render_frame`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        image_index: u32,
        /// Frame-in-flight slot the frame was recorded in
        slot: usize,
        /// The surface asked for a swapchain rebuild
        suboptimal: bool,
    },
    /// A fence wait timed out; call again to resume
    Stalled,
    /// The swapchain no longer matches the surface; call `resize`
    SurfaceOutOfDate,
}

/// Where the next `render_frame` call picks up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Fresh,
    WaitCurrent,
    WaitImage { ready: FrameSlotReady, image_index: u32, acquire: SemaphoreHandle },
}

pub struct RenderContext {
    pipelines: Vec<DrawPipeline>,
    ingestor: CameraPlaneIngestor,
    commands: CommandSubmissionManager,
    pacer: FramePacer,
    timer: FrameTimer,
    resume: Resume,
    frame_count: u64,
    config: Config,
    device: Arc<dyn GpuDevice>,
}

impl RenderContext {
    pub fn new(device: Arc<dyn GpuDevice>, shaders: &dyn ShaderSource, config: Config) -> Result<Self> {
        let image_count = device.swapchain_image_count();
        config.validate_for_swapchain(image_count)?;
        let frames = config.frames_in_flight;

        let pacer = FramePacer::new(Arc::clone(&device), frames, image_count, config.fence_timeout)?;
        let commands = CommandSubmissionManager::new(Arc::clone(&device), frames)?;
        let ingestor = CameraPlaneIngestor::new(Arc::clone(&device), frames);
        let pipelines = DrawPipeline::create_all(&device, shaders, frames, config.uniform_grace)?;

        let (width, height) = device.swapchain_extent();
        engine_info!(
            SOURCE,
            "Render context ready: {}x{}, {} frames in flight, {} swapchain images",
            width,
            height,
            frames,
            image_count
        );

        Ok(Self {
            pipelines,
            ingestor,
            commands,
            pacer,
            timer: FrameTimer::new(),
            resume: Resume::Fresh,
            frame_count: 0,
            config,
            device,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One-shot uploads (mesh buffers) go through here
    pub fn commands(&self) -> &CommandSubmissionManager {
        &self.commands
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    pub fn pipelines(&self) -> &[DrawPipeline] {
        &self.pipelines
    }

    pub fn camera(&self) -> &CameraPlaneIngestor {
        &self.ingestor
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut FrameTimer {
        &mut self.timer
    }

    /// Frames presented so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Record and present one frame
    pub fn render_frame(&mut self, camera: &CameraFrame, draws: &[DrawRequest]) -> Result<FrameOutcome> {
        if self.resume == Resume::Fresh {
            self.pacer.advance_frame();
            self.commands.advance_frame();
            self.timer.tick();
            self.resume = Resume::WaitCurrent;
        }

        if self.resume == Resume::WaitCurrent {
            let ready = match self.pacer.wait_for_current_frame()? {
                FrameWait::Ready(ready) => ready,
                FrameWait::Stalled => return Ok(FrameOutcome::Stalled),
            };
            let acquire = self.pacer.next_acquire_semaphore();
            let image_index = match self.device.acquire_next_image(acquire, self.config.fence_timeout) {
                Ok(index) => {
                    self.pacer.acquire_succeeded();
                    index
                }
                Err(Error::SurfaceOutOfDate) => {
                    engine_warn!(SOURCE, "Swapchain out of date at acquire");
                    return Ok(FrameOutcome::SurfaceOutOfDate);
                }
                Err(Error::Timeout) => return Ok(FrameOutcome::Stalled),
                Err(e) => return Err(e),
            };
            self.resume = Resume::WaitImage { ready, image_index, acquire };
        }

        let Resume::WaitImage { ready, image_index, acquire } = self.resume else {
            return Err(Error::InvalidState("frame resumed in an unknown state".to_string()));
        };
        if self.pacer.wait_for_image(image_index)? == FrameWait::Stalled {
            return Ok(FrameOutcome::Stalled);
        }
        self.resume = Resume::Fresh;

        self.pacer.set_image_fence(image_index)?;
        self.pacer.reset_current_fence()?;
        let slot = ready.slot();

        let result = self.record_and_submit(&ready, image_index, acquire, camera, draws);
        if let Err(e) = &result {
            engine_error!(SOURCE, "Frame {} failed after its fence was reset: {}", self.frame_count, e);
        }
        let status = match result? {
            Some(status) => status,
            None => return Ok(FrameOutcome::SurfaceOutOfDate),
        };

        self.frame_count += 1;
        Ok(FrameOutcome::Presented {
            image_index,
            slot,
            suboptimal: status == PresentStatus::Suboptimal,
        })
    }

    /// `None` when present found the surface out of date
    fn record_and_submit(
        &mut self,
        ready: &FrameSlotReady,
        image_index: u32,
        acquire: SemaphoreHandle,
        camera: &CameraFrame,
        draws: &[DrawRequest],
    ) -> Result<Option<PresentStatus>> {
        let cmd = self.commands.begin_frame(ready)?;

        // Transfers must be recorded outside the render pass
        self.ingestor.ingest(cmd, camera)?;

        let device = self.device.as_ref();
        device.cmd_begin_frame_pass(cmd, image_index, self.config.clear_color);
        let inputs = PassInputs { draws, camera_set: self.ingestor.current_descriptor_set() };
        for pipeline in self.pipelines.iter_mut() {
            pipeline.record(device, cmd, &inputs)?;
        }
        device.cmd_end_frame_pass(cmd);
        self.commands.end_frame()?;

        let render_finished = self.pacer.render_finished_semaphore(image_index)?;
        self.commands.submit_frame(acquire, render_finished, ready.fence())?;

        match device.present(image_index, render_finished) {
            Ok(status) => Ok(Some(status)),
            Err(Error::SurfaceOutOfDate) => {
                engine_warn!(SOURCE, "Swapchain out of date at present");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Rebuild the swapchain and per-image sync state for a new surface size
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.device.device_wait_idle()?;
        let image_count = self.device.recreate_swapchain(width, height)?;
        self.config.validate_for_swapchain(image_count)?;
        self.pacer.recreate_for_swapchain(image_count)?;
        // An image acquired from the old swapchain is gone; the frame slot
        // itself is still valid
        if let Resume::WaitImage { .. } = self.resume {
            self.resume = Resume::WaitCurrent;
        }
        engine_info!(SOURCE, "Swapchain recreated at {}x{} with {} images", width, height, image_count);
        Ok(())
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.device_wait_idle() {
            engine_error!(SOURCE, "device_wait_idle failed while destroying the render context: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "render_context_tests.rs"]
mod tests;
