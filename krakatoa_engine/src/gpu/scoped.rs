/// RAII ownership of GPU objects.
///
/// A [`Scoped`] handle keeps the device alive and releases the object when
/// dropped, so partially built structures (a ring whose third slot failed to
/// allocate, an error halfway through a recreate) never leak.

use std::fmt;
use std::sync::Arc;
use super::device::{GpuDevice, PipelineBinding};
use super::handles::*;

/// A GPU object that can be released through the device
pub trait DeviceObject: Copy {
    fn release(self, device: &dyn GpuDevice);
}

impl DeviceObject for FenceHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_fence(self);
    }
}

impl DeviceObject for SemaphoreHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_semaphore(self);
    }
}

impl DeviceObject for BufferHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_buffer(self);
    }
}

impl DeviceObject for ImageHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_image(self);
    }
}

impl DeviceObject for ImageViewHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_image_view(self);
    }
}

impl DeviceObject for DescriptorSetHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.free_descriptor_set(self);
    }
}

impl DeviceObject for CommandPoolHandle {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_command_pool(self);
    }
}

impl DeviceObject for PipelineBinding {
    fn release(self, device: &dyn GpuDevice) {
        device.destroy_pipeline(self);
    }
}

/// Owned GPU object, released on drop
pub struct Scoped<H: DeviceObject> {
    handle: H,
    device: Arc<dyn GpuDevice>,
}

impl<H: DeviceObject> Scoped<H> {
    /// Take ownership of a freshly created object
    pub fn new(device: &Arc<dyn GpuDevice>, handle: H) -> Self {
        Self { handle, device: Arc::clone(device) }
    }

    pub fn get(&self) -> H {
        self.handle
    }
}

impl<H: DeviceObject> Drop for Scoped<H> {
    fn drop(&mut self) {
        self.handle.release(self.device.as_ref());
    }
}

impl<H: DeviceObject + fmt::Debug> fmt::Debug for Scoped<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scoped").field(&self.handle).finish()
    }
}
