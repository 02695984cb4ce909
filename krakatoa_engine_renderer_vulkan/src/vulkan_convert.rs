/// Conversions from the engine's backend-neutral GPU types to Vulkan

use ash::vk;
use krakatoa_engine::krakatoa::gpu::{
    AccessFlags, BufferUsage, CommandPoolFlags, FamilyTransfer, ImageFormat, ImageLayout,
    ImageUsage, MemoryLocation, PipelineStages, QueueCapabilities,
};

pub(crate) fn access_flags_to_vk(access: AccessFlags) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    for (engine, vulkan) in [
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ),
        (AccessFlags::VERTEX_ATTRIBUTE_READ, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
        (AccessFlags::INDEX_READ, vk::AccessFlags::INDEX_READ),
        (AccessFlags::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        (AccessFlags::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
    ] {
        if access.contains(engine) {
            flags |= vulkan;
        }
    }
    flags
}

pub(crate) fn pipeline_stages_to_vk(stages: PipelineStages) -> vk::PipelineStageFlags {
    let mut flags = vk::PipelineStageFlags::empty();
    for (engine, vulkan) in [
        (PipelineStages::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStages::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (PipelineStages::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStages::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (PipelineStages::COLOR_ATTACHMENT_OUTPUT, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
        (PipelineStages::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStages::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        (PipelineStages::HOST, vk::PipelineStageFlags::HOST),
    ] {
        if stages.contains(engine) {
            flags |= vulkan;
        }
    }
    // An empty mask is invalid in a barrier
    if flags.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        flags
    }
}

pub(crate) fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn image_format_to_vk(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::R8_UNORM => vk::Format::R8_UNORM,
        ImageFormat::R8G8_UNORM => vk::Format::R8G8_UNORM,
        ImageFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
    }
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    for (engine, vulkan) in [
        (BufferUsage::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsage::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
    ] {
        if usage.contains(engine) {
            flags |= vulkan;
        }
    }
    flags
}

pub(crate) fn image_usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    for (engine, vulkan) in [
        (ImageUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (ImageUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (ImageUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
    ] {
        if usage.contains(engine) {
            flags |= vulkan;
        }
    }
    flags
}

pub(crate) fn memory_location_to_allocator(location: MemoryLocation) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
        MemoryLocation::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
    }
}

pub(crate) fn command_pool_flags_to_vk(flags: CommandPoolFlags) -> vk::CommandPoolCreateFlags {
    let mut vk_flags = vk::CommandPoolCreateFlags::empty();
    if flags.contains(CommandPoolFlags::RESET_COMMAND_BUFFER) {
        vk_flags |= vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
    }
    if flags.contains(CommandPoolFlags::TRANSIENT) {
        vk_flags |= vk::CommandPoolCreateFlags::TRANSIENT;
    }
    vk_flags
}

pub(crate) fn queue_capabilities_from_vk(flags: vk::QueueFlags) -> QueueCapabilities {
    let mut caps = QueueCapabilities::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        caps |= QueueCapabilities::GRAPHICS;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        caps |= QueueCapabilities::COMPUTE;
    }
    // Graphics and compute families support transfers implicitly
    if flags.intersects(vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE) {
        caps |= QueueCapabilities::TRANSFER;
    }
    caps
}

/// Source and destination family indices of a barrier
pub(crate) fn family_indices(transfer: Option<FamilyTransfer>) -> (u32, u32) {
    match transfer {
        Some(t) => (t.src_family, t.dst_family),
        None => (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED),
    }
}

/// `None` waits without bound
pub(crate) fn timeout_to_ns(timeout: Option<std::time::Duration>) -> u64 {
    timeout.map_or(u64::MAX, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
#[path = "vulkan_convert_tests.rs"]
mod tests;
