/// Pipeline barrier description types.
///
/// Mirrors the subset of Vulkan synchronization the engine records: access
/// masks, pipeline stages, image layouts, and buffer/image memory barriers
/// with an optional queue family ownership transfer.

use bitflags::bitflags;
use super::handles::{BufferHandle, ImageHandle};

bitflags! {
    /// Memory access types made available or visible by a barrier
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const TRANSFER_READ          = 1 << 0;
        const TRANSFER_WRITE         = 1 << 1;
        const SHADER_READ            = 1 << 2;
        const UNIFORM_READ           = 1 << 3;
        const VERTEX_ATTRIBUTE_READ  = 1 << 4;
        const INDEX_READ             = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const HOST_WRITE             = 1 << 7;
    }
}

bitflags! {
    /// Pipeline stages a barrier orders
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE             = 1 << 0;
        const VERTEX_INPUT            = 1 << 1;
        const VERTEX_SHADER           = 1 << 2;
        const FRAGMENT_SHADER         = 1 << 3;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 4;
        const TRANSFER                = 1 << 5;
        const BOTTOM_OF_PIPE          = 1 << 6;
        const HOST                    = 1 << 7;
    }
}

/// Image memory layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are discarded
    Undefined,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    PresentSrc,
}

impl ImageLayout {
    /// Accesses that consume an image in this layout
    pub fn consumer_access(self) -> AccessFlags {
        match self {
            ImageLayout::Undefined | ImageLayout::PresentSrc => AccessFlags::empty(),
            ImageLayout::TransferDst => AccessFlags::TRANSFER_WRITE,
            ImageLayout::ShaderReadOnly => AccessFlags::SHADER_READ,
            ImageLayout::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
        }
    }

    /// First stage that uses an image in this layout
    pub fn consumer_stage(self) -> PipelineStages {
        match self {
            ImageLayout::Undefined => PipelineStages::TOP_OF_PIPE,
            ImageLayout::PresentSrc => PipelineStages::BOTTOM_OF_PIPE,
            ImageLayout::TransferDst => PipelineStages::TRANSFER,
            ImageLayout::ShaderReadOnly => PipelineStages::FRAGMENT_SHADER,
            ImageLayout::ColorAttachment => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
        }
    }
}

/// Queue family ownership handoff carried by a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyTransfer {
    pub src_family: u32,
    pub dst_family: u32,
}

/// Buffer memory barrier over the whole buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub family_transfer: Option<FamilyTransfer>,
}

impl BufferBarrier {
    /// Same-queue memory dependency
    pub fn new(buffer: BufferHandle, src_access: AccessFlags, dst_access: AccessFlags) -> Self {
        Self { buffer, src_access, dst_access, family_transfer: None }
    }
}

/// Image memory barrier over the single color subresource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub family_transfer: Option<FamilyTransfer>,
}

impl ImageBarrier {
    /// Same-queue layout transition
    pub fn transition(
        image: ImageHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        src_access: AccessFlags,
        dst_access: AccessFlags,
    ) -> Self {
        Self { image, old_layout, new_layout, src_access, dst_access, family_transfer: None }
    }
}
