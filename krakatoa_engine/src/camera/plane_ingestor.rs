/// Uploads camera YUV planes into sampled images once per frame.
///
/// Each frame in flight owns a luma image, a chroma image, their staging
/// buffers and a combined sampler descriptor set. The rings only advance
/// when a frame is accepted, so a skipped frame leaves the last uploaded
/// image current. The rings are rebuilt when the camera resolution changes.
///
/// All recording happens on the frame's graphics command buffer: no queue
/// ownership transfer is involved.

use std::sync::Arc;

use crate::error::Result;
use crate::gpu::{
    AccessFlags, BufferDesc, BufferHandle, CommandBufferHandle, DescriptorSetHandle, GpuDevice,
    GpuObject, ImageBarrier, ImageDesc, ImageFormat, ImageHandle, ImageLayout, ImageUsage,
    ImageViewHandle, PipelineStages, Scoped,
};
use crate::utils::RingSlotSet;
use crate::{engine_debug, engine_error, engine_info};
use super::camera_frame::CameraFrame;
use super::plane_copy::{copy_plane, PlaneLayout};

const SOURCE: &str = "krakatoa::camera";

/// What [`CameraPlaneIngestor::ingest`] did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Uploaded into the existing images
    Uploaded,
    /// The resolution changed (or this was the first frame); images were
    /// rebuilt before the upload
    Recreated,
    /// Frame rejected, nothing recorded
    Skipped,
}

struct PlaneImage {
    // View before image on drop
    view: Scoped<ImageViewHandle>,
    image: Scoped<ImageHandle>,
    staging: Scoped<BufferHandle>,
    width: u32,
    height: u32,
}

impl PlaneImage {
    fn new(device: &Arc<dyn GpuDevice>, desc: ImageDesc, name: &str) -> Result<Self> {
        let image = Scoped::new(device, device.create_image(&desc)?);
        let view = Scoped::new(device, device.create_image_view(image.get())?);
        let staging = Scoped::new(device, device.create_buffer(&BufferDesc::staging(desc.byte_size()))?);
        device.set_debug_name(GpuObject::Image(image.get()), name);
        Ok(Self { view, image, staging, width: desc.width, height: desc.height })
    }

    /// Pack `src` into the staging buffer and flush it
    fn stage(&self, device: &dyn GpuDevice, src: &[u8], layout: PlaneLayout) -> Result<()> {
        let mut copied = Ok(());
        device.map_buffer(self.staging.get(), &mut |dst: &mut [u8]| copied = copy_plane(src, layout, dst))?;
        copied?;
        device.flush_buffer(self.staging.get(), 0, layout.packed_len() as u64)
    }

    fn barrier(&self, old_layout: ImageLayout, new_layout: ImageLayout, src: AccessFlags, dst: AccessFlags) -> ImageBarrier {
        ImageBarrier::transition(self.image.get(), old_layout, new_layout, src, dst)
    }
}

struct PlaneRings {
    // Sets reference the views, so they go first
    descriptor_sets: RingSlotSet<Scoped<DescriptorSetHandle>>,
    luma: RingSlotSet<PlaneImage>,
    chroma: RingSlotSet<PlaneImage>,
    extent: (u32, u32),
}

impl PlaneRings {
    fn new(device: &Arc<dyn GpuDevice>, frames_in_flight: usize, width: u32, height: u32) -> Result<Self> {
        let usage = ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED;
        let luma = RingSlotSet::try_from_fn(frames_in_flight, |i| {
            let desc = ImageDesc { width, height, format: ImageFormat::R8_UNORM, usage };
            PlaneImage::new(device, desc, &format!("CameraLuma[{}]", i))
        })?;
        let chroma = RingSlotSet::try_from_fn(frames_in_flight, |i| {
            let desc = ImageDesc {
                width: width.div_ceil(2),
                height: height.div_ceil(2),
                format: ImageFormat::R8G8_UNORM,
                usage,
            };
            PlaneImage::new(device, desc, &format!("CameraChroma[{}]", i))
        })?;
        let descriptor_sets = RingSlotSet::try_from_fn(frames_in_flight, |i| {
            let set = device.allocate_plane_set(luma[i].view.get(), chroma[i].view.get())?;
            Ok(Scoped::new(device, set))
        })?;
        Ok(Self { descriptor_sets, luma, chroma, extent: (width, height) })
    }

    fn advance(&mut self) {
        self.descriptor_sets.advance();
        self.luma.advance();
        self.chroma.advance();
    }
}

pub struct CameraPlaneIngestor {
    rings: Option<PlaneRings>,
    frames_in_flight: usize,
    device: Arc<dyn GpuDevice>,
}

impl CameraPlaneIngestor {
    pub fn new(device: Arc<dyn GpuDevice>, frames_in_flight: usize) -> Self {
        Self { rings: None, frames_in_flight, device }
    }

    /// Resolution of the current images, `None` before the first accepted frame
    pub fn extent(&self) -> Option<(u32, u32)> {
        self.rings.as_ref().map(|rings| rings.extent)
    }

    /// Luma and chroma sampler set for this frame's background draw
    pub fn current_descriptor_set(&self) -> Option<DescriptorSetHandle> {
        self.rings
            .as_ref()
            .and_then(|rings| rings.descriptor_sets.current().ok())
            .map(Scoped::get)
    }

    /// Stage `frame` and record its upload into `cmd`
    pub fn ingest(&mut self, cmd: CommandBufferHandle, frame: &CameraFrame) -> Result<IngestOutcome> {
        let (luma_src, chroma_src) = match frame.validate() {
            Ok(planes) => planes,
            Err(e) => {
                engine_debug!(SOURCE, "Skipping camera frame: {}", e);
                return Ok(IngestOutcome::Skipped);
            }
        };

        let mut outcome = IngestOutcome::Uploaded;
        if self.extent() != Some((frame.width, frame.height)) {
            self.recreate(frame.width, frame.height)?;
            outcome = IngestOutcome::Recreated;
        }
        let Some(rings) = self.rings.as_mut() else {
            return Ok(IngestOutcome::Skipped);
        };
        rings.advance();

        let device = self.device.as_ref();
        let luma = rings.luma.current()?;
        let chroma = rings.chroma.current()?;
        luma.stage(device, luma_src, frame.luma_layout())?;
        chroma.stage(device, chroma_src, frame.chroma_layout())?;

        device.cmd_pipeline_barrier(
            cmd,
            PipelineStages::TOP_OF_PIPE,
            PipelineStages::TRANSFER,
            &[],
            &[
                luma.barrier(ImageLayout::Undefined, ImageLayout::TransferDst, AccessFlags::empty(), AccessFlags::TRANSFER_WRITE),
                chroma.barrier(ImageLayout::Undefined, ImageLayout::TransferDst, AccessFlags::empty(), AccessFlags::TRANSFER_WRITE),
            ],
        );
        for plane in [luma, chroma] {
            device.cmd_copy_buffer_to_image(cmd, plane.staging.get(), plane.image.get(), plane.width, plane.height);
        }
        device.cmd_pipeline_barrier(
            cmd,
            PipelineStages::TRANSFER,
            PipelineStages::FRAGMENT_SHADER,
            &[],
            &[
                luma.barrier(ImageLayout::TransferDst, ImageLayout::ShaderReadOnly, AccessFlags::TRANSFER_WRITE, AccessFlags::SHADER_READ),
                chroma.barrier(ImageLayout::TransferDst, ImageLayout::ShaderReadOnly, AccessFlags::TRANSFER_WRITE, AccessFlags::SHADER_READ),
            ],
        );
        Ok(outcome)
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        // The old images may still be sampled by frames in flight
        self.device.device_wait_idle()?;
        self.rings = None;
        let rings = PlaneRings::new(&self.device, self.frames_in_flight, width, height).map_err(|e| {
            engine_error!(SOURCE, "Failed to create {}x{} camera plane images: {}", width, height, e);
            e
        })?;
        self.rings = Some(rings);
        engine_info!(SOURCE, "Camera plane images created at {}x{}", width, height);
        Ok(())
    }
}

#[cfg(test)]
#[path = "plane_ingestor_tests.rs"]
mod tests;
