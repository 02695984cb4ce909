/// Creation descriptors for buffers, images and pipelines

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM      = 1 << 2;
        const VERTEX       = 1 << 3;
        const INDEX        = 1 << 4;
    }
}

/// Where a buffer's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Device-local, not host visible
    GpuOnly,
    /// Host visible, persistently mapped, written by the CPU every frame
    CpuToGpu,
    /// Host visible, read back by the CPU
    GpuToCpu,
}

impl MemoryLocation {
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryLocation::GpuOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

impl BufferDesc {
    /// Host-visible staging source for uploads
    pub fn staging(size: u64) -> Self {
        Self { size, usage: BufferUsage::TRANSFER_SRC, location: MemoryLocation::CpuToGpu }
    }

    /// Persistently mapped uniform buffer
    pub fn uniform(size: u64) -> Self {
        Self { size, usage: BufferUsage::UNIFORM, location: MemoryLocation::CpuToGpu }
    }
}

/// Texel formats used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ImageFormat {
    /// Single 8-bit channel (camera luma)
    R8_UNORM,
    /// Two 8-bit channels (interleaved camera chroma)
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
}

impl ImageFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            ImageFormat::R8_UNORM => 1,
            ImageFormat::R8G8_UNORM => 2,
            ImageFormat::R8G8B8A8_UNORM | ImageFormat::B8G8R8A8_SRGB => 4,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_DST     = 1 << 0;
        const SAMPLED          = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub usage: ImageUsage,
}

impl ImageDesc {
    /// Texel data size for a tightly packed upload
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_texel() as u64
    }
}

/// Fixed-function configuration selected per draw pipeline kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Depth-less opaque meshes, no blending
    Opaque,
    /// Alpha-blended meshes
    Translucent,
    /// Fullscreen triangle sampling the camera planes, no vertex input
    CameraBackground,
}

/// Shader bytecode and kind for pipeline creation
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub name: String,
    pub kind: PipelineKind,
    pub vertex_spirv: Vec<u32>,
    pub fragment_spirv: Vec<u32>,
}
