/// Queue family ownership transfer (release/acquire barrier pair).
///
/// A resource written on family A and read on family B != A changes owner in
/// two halves:
///
/// 1. **Release**, recorded on A right after the write. The source access is
///    the write just performed; the destination access is ignored and left
///    empty. Stages: TRANSFER -> BOTTOM_OF_PIPE.
/// 2. **Acquire**, recorded on B in a separate submission. The source access
///    is ignored and left empty; the destination access is the intended
///    read. Stages: TOP_OF_PIPE -> the consuming stage.
///
/// Both barriers name the same A -> B family pair. Drivers are free to treat
/// a missing half as undefined behavior, so both are always recorded. For
/// images both halves carry the same `old -> new` layout pair.
///
/// When A == B there is no handoff: [`OwnershipTransfer::between`] returns
/// `None` and callers record one ordinary barrier instead.

use crate::gpu::{
    AccessFlags, BufferBarrier, BufferHandle, CommandBufferHandle, FamilyTransfer, GpuDevice,
    ImageBarrier, ImageHandle, ImageLayout, PipelineStages,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub src_family: u32,
    pub dst_family: u32,
}

impl OwnershipTransfer {
    /// Stage the release waits on
    pub const RELEASE_SRC_STAGE: PipelineStages = PipelineStages::TRANSFER;
    pub const RELEASE_DST_STAGE: PipelineStages = PipelineStages::BOTTOM_OF_PIPE;
    /// Stage the acquire waits on
    pub const ACQUIRE_SRC_STAGE: PipelineStages = PipelineStages::TOP_OF_PIPE;

    /// Handoff from `src_family` to `dst_family`, `None` if they are the same family
    pub fn between(src_family: u32, dst_family: u32) -> Option<Self> {
        (src_family != dst_family).then_some(Self { src_family, dst_family })
    }

    fn family_transfer(&self) -> Option<FamilyTransfer> {
        Some(FamilyTransfer { src_family: self.src_family, dst_family: self.dst_family })
    }

    pub fn release_buffer(&self, buffer: BufferHandle, written: AccessFlags) -> BufferBarrier {
        BufferBarrier {
            buffer,
            src_access: written,
            dst_access: AccessFlags::empty(),
            family_transfer: self.family_transfer(),
        }
    }

    pub fn acquire_buffer(&self, buffer: BufferHandle, read: AccessFlags) -> BufferBarrier {
        BufferBarrier {
            buffer,
            src_access: AccessFlags::empty(),
            dst_access: read,
            family_transfer: self.family_transfer(),
        }
    }

    /// Release an image. The layouts must match the ones the acquire half
    /// names; the transition runs once, between the two halves.
    pub fn release_image(
        &self,
        image: ImageHandle,
        written: AccessFlags,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> ImageBarrier {
        ImageBarrier {
            image,
            old_layout,
            new_layout,
            src_access: written,
            dst_access: AccessFlags::empty(),
            family_transfer: self.family_transfer(),
        }
    }

    /// Acquire an image, transitioning `old_layout -> new_layout`
    pub fn acquire_image(
        &self,
        image: ImageHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        read: AccessFlags,
    ) -> ImageBarrier {
        ImageBarrier {
            image,
            old_layout,
            new_layout,
            src_access: AccessFlags::empty(),
            dst_access: read,
            family_transfer: self.family_transfer(),
        }
    }

    /// Record the release half on the source queue's command buffer
    pub fn record_release(
        &self,
        device: &dyn GpuDevice,
        cmd: CommandBufferHandle,
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    ) {
        device.cmd_pipeline_barrier(cmd, Self::RELEASE_SRC_STAGE, Self::RELEASE_DST_STAGE, buffers, images);
    }

    /// Record the acquire half on the destination queue's command buffer
    pub fn record_acquire(
        &self,
        device: &dyn GpuDevice,
        cmd: CommandBufferHandle,
        dst_stage: PipelineStages,
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    ) {
        device.cmd_pipeline_barrier(cmd, Self::ACQUIRE_SRC_STAGE, dst_stage, buffers, images);
    }
}

#[cfg(test)]
#[path = "ownership_transfer_tests.rs"]
mod tests;
