/// Swapchain - presentable images, the frame render pass and its framebuffers
///
/// The render pass clears the swapchain image and leaves it ready to
/// present. It is created once from the surface format and survives
/// swapchain recreation, so pipelines built against it stay valid.

use ash::vk;
use krakatoa_engine::krakatoa::{Error, Result};
use krakatoa_engine::{engine_err, engine_error, engine_info};

use crate::vulkan_context::GpuContext;

pub(crate) struct Swapchain {
    loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    min_image_count: u32,
    device: ash::Device,
}

impl Swapchain {
    pub(crate) fn new(
        ctx: &GpuContext,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        min_image_count: u32,
    ) -> Result<Self> {
        unsafe {
            let surface_formats = ctx
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, surface)
                .map_err(|e| {
                    engine_error!("krakatoa::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;
            let format = surface_formats
                .iter()
                .copied()
                .find(|f| f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
                .or_else(|| surface_formats.first().copied())
                .ok_or_else(|| {
                    engine_error!("krakatoa::vulkan", "Surface reports no formats");
                    Error::InitializationFailed("Surface reports no formats".to_string())
                })?;

            let render_pass = create_render_pass(&ctx.device, format.format)?;

            let mut swapchain = Self {
                loader: ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device),
                surface_loader: ctx.surface_loader.clone(),
                surface,
                swapchain: vk::SwapchainKHR::null(),
                images: Vec::new(),
                views: Vec::new(),
                framebuffers: Vec::new(),
                render_pass,
                format,
                extent: vk::Extent2D { width, height },
                min_image_count,
                device: ctx.device.clone(),
            };
            swapchain.build(ctx.physical_device, width, height)?;
            Ok(swapchain)
        }
    }

    pub(crate) fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub(crate) fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub(crate) fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub(crate) fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub(crate) fn acquire_next_image(&self, signal: vk::Semaphore, timeout_ns: u64) -> Result<u32> {
        unsafe {
            match self.loader.acquire_next_image(self.swapchain, timeout_ns, signal, vk::Fence::null()) {
                // A suboptimal acquire still signals; present reports it
                Ok((index, _suboptimal)) => Ok(index),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SurfaceOutOfDate),
                Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(Error::Timeout),
                Err(e) => Err(engine_err!("krakatoa::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
            }
        }
    }

    /// Present `image_index` once `wait` is signaled; `Ok(true)` when suboptimal
    pub(crate) fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> Result<bool> {
        unsafe {
            let swapchains = [self.swapchain];
            let image_indices = [image_index];
            let wait_semaphores = [wait];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&wait_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            match self.loader.queue_present(queue, &present_info) {
                Ok(suboptimal) => Ok(suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SurfaceOutOfDate),
                Err(e) => Err(engine_err!("krakatoa::vulkan", "Failed to present swapchain image: {:?}", e)),
            }
        }
    }

    /// Rebuild for a new surface size. The caller has waited for the device
    /// to go idle.
    pub(crate) fn recreate(&mut self, physical_device: vk::PhysicalDevice, width: u32, height: u32) -> Result<u32> {
        self.destroy_image_targets();
        self.build(physical_device, width, height)?;
        engine_info!(
            "krakatoa::vulkan",
            "Swapchain rebuilt: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
        Ok(self.image_count())
    }

    /// Create the swapchain (retiring the previous one), its views and framebuffers
    fn build(&mut self, physical_device: vk::PhysicalDevice, width: u32, height: u32) -> Result<()> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(|e| {
                    engine_error!("krakatoa::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;

            let extent = if caps.current_extent.width != u32::MAX {
                caps.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                    height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
                }
            };

            let mut image_count = self.min_image_count.max(caps.min_image_count);
            if caps.max_image_count > 0 {
                image_count = image_count.min(caps.max_image_count);
            }

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.format.format)
                .image_color_space(self.format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(caps.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.loader.create_swapchain(&create_info, None).map_err(|e| {
                engine_error!("krakatoa::vulkan", "Failed to create swapchain: {:?}", e);
                Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
            })?;
            if old_swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            self.images = self.loader.get_swapchain_images(swapchain).map_err(|e| {
                engine_error!("krakatoa::vulkan", "Failed to get swapchain images: {:?}", e);
                Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
            })?;

            for &image in &self.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.format.format)
                    .subresource_range(color_subresource_range());
                let view = self.device.create_image_view(&view_info, None).map_err(|e| {
                    engine_error!("krakatoa::vulkan", "Failed to create swapchain image view: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create image view: {:?}", e))
                })?;
                self.views.push(view);

                let attachments = [view];
                let framebuffer_info = vk::FramebufferCreateInfo::default()
                    .render_pass(self.render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);
                let framebuffer = self.device.create_framebuffer(&framebuffer_info, None).map_err(|e| {
                    engine_error!("krakatoa::vulkan", "Failed to create framebuffer: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create framebuffer: {:?}", e))
                })?;
                self.framebuffers.push(framebuffer);
            }
            Ok(())
        }
    }

    fn destroy_image_targets(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
        }
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_targets();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Single color attachment: cleared on load, handed to the presentation
/// engine at the end of the pass
fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_attachment_ref));

    // The layout transition waits for the acquire semaphore, which the
    // submit waits on at COLOR_ATTACHMENT_OUTPUT
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let attachments = [color_attachment];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    unsafe {
        device
            .create_render_pass(&render_pass_info, None)
            .map_err(|e| engine_err!("krakatoa::vulkan", "Failed to create frame render pass: {:?}", e))
    }
}
