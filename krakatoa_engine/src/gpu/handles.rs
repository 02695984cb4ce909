/// Opaque GPU object handles.
///
/// Backends hand out raw `u64` values (Vulkan handles are 64-bit on every
/// platform) wrapped in one newtype per object kind, so a fence can never be
/// passed where a semaphore is expected.

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(u64);

        impl $name {
            /// The null handle (never returned by a successful create)
            pub const NULL: Self = Self(0);

            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

gpu_handle!(
    /// Command pool bound to one queue family
    CommandPoolHandle
);
gpu_handle!(
    /// Primary command buffer
    CommandBufferHandle
);
gpu_handle!(
    /// CPU-observable completion signal
    FenceHandle
);
gpu_handle!(
    /// GPU-side ordering primitive between submissions
    SemaphoreHandle
);
gpu_handle!(BufferHandle);
gpu_handle!(ImageHandle);
gpu_handle!(ImageViewHandle);
gpu_handle!(DescriptorSetHandle);
gpu_handle!(PipelineHandle);
gpu_handle!(PipelineLayoutHandle);

/// Any named GPU object, used for debug labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuObject {
    CommandBuffer(CommandBufferHandle),
    Fence(FenceHandle),
    Semaphore(SemaphoreHandle),
    Buffer(BufferHandle),
    Image(ImageHandle),
    ImageView(ImageViewHandle),
    DescriptorSet(DescriptorSetHandle),
}
