/// GpuContext - instance, device, allocator and queues
///
/// Owns everything whose lifetime spans the whole backend. Objects built on
/// top of it (swapchain, descriptor pools, pipelines) must be destroyed
/// before the context is dropped.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use krakatoa_engine::krakatoa::gpu::QueueFamilyIndices;
use krakatoa_engine::krakatoa::{Error, Result};
use krakatoa_engine::{engine_err, engine_error, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::vulkan_config::VulkanConfig;
use crate::vulkan_convert::queue_capabilities_from_vk;

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn init_error(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!("krakatoa::vulkan", "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

/// Debug messenger created with the instance
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
pub(crate) struct DebugMessenger {
    pub loader: ash::ext::debug_utils::Instance,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

pub struct GpuContext {
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    /// Dropped by hand before the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,
    pub(crate) queue_families: QueueFamilyIndices,
    /// One queue per distinct family, each behind its own lock
    queues: FxHashMap<u32, Mutex<vk::Queue>>,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    debug_messenger: Option<DebugMessenger>,
    /// Object naming, present when debug utils are enabled
    pub(crate) debug_names: Option<ash::ext::debug_utils::Device>,
    pub(crate) non_coherent_atom_size: u64,
}

impl GpuContext {
    /// Create the instance, a surface for `window`, and a device whose queues
    /// can render to and present on that surface
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        config: &VulkanConfig,
    ) -> Result<(Self, vk::SurfaceKHR)> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_error("Failed to load Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_error("Invalid application name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Krakatoa")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_1);

            let display_handle = window
                .display_handle()
                .map_err(|e| init_error("Failed to get display handle", e))?;
            let window_handle = window
                .window_handle()
                .map_err(|e| init_error("Failed to get window handle", e))?;

            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_error("Failed to get required extensions", e))?
                .to_vec();

            let validation = validation_enabled(config);
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_error("Failed to create Vulkan instance", e))?;

            let debug_messenger = if validation {
                Some(create_debug_messenger(&entry, &instance, config)?)
            } else {
                None
            };

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_error("Failed to create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let (physical_device, queue_families) = pick_physical_device(&instance, &surface_loader, surface)?;

            // One queue per distinct family, present included
            let mut families = queue_families.distinct_families();
            if !families.contains(&queue_families.present) {
                families.push(queue_families.present);
            }
            let queue_priorities = [1.0];
            let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
                .iter()
                .map(|&family| {
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(family)
                        .queue_priorities(&queue_priorities)
                })
                .collect();

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names);
            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_error("Failed to create logical device", e))?;

            let queues = families
                .iter()
                .map(|&family| (family, Mutex::new(device.get_device_queue(family, 0))))
                .collect();

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_error("Failed to create GPU allocator", e))?;

            let properties = instance.get_physical_device_properties(physical_device);
            let debug_names = debug_messenger
                .as_ref()
                .map(|_| ash::ext::debug_utils::Device::new(&instance, &device));

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());
            engine_info!(
                "krakatoa::vulkan",
                "Using {} (graphics family {}, transfer family {}, present family {})",
                device_name,
                queue_families.graphics,
                queue_families.transfer,
                queue_families.present
            );

            Ok((
                Self {
                    _entry: entry,
                    instance,
                    physical_device,
                    device,
                    allocator: ManuallyDrop::new(Mutex::new(allocator)),
                    queue_families,
                    queues,
                    surface_loader,
                    debug_messenger,
                    debug_names,
                    non_coherent_atom_size: properties.limits.non_coherent_atom_size.max(1),
                },
                surface,
            ))
        }
    }

    /// Queue of `family`, locked for submission
    pub(crate) fn queue(&self, family: u32) -> Result<MutexGuard<'_, vk::Queue>> {
        self.queues
            .get(&family)
            .map(lock)
            .ok_or_else(|| engine_err!("krakatoa::vulkan", "No queue created for family {}", family))
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!("krakatoa::vulkan", "Failed to wait for device idle: {:?}", e))
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // Allocator pages must go before the device
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);

            crate::vulkan_debug::cleanup_debug_config();
            if let Some(debug) = self.debug_messenger.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_enabled(config: &VulkanConfig) -> bool {
    if !config.enable_validation {
        return false;
    }
    if cfg!(feature = "vulkan-validation") {
        true
    } else {
        engine_warn!(
            "krakatoa::vulkan",
            "Validation requested but the vulkan-validation feature is disabled"
        );
        false
    }
}

#[cfg(feature = "vulkan-validation")]
unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
    config: &VulkanConfig,
) -> Result<DebugMessenger> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    crate::vulkan_debug::init_debug_config(config.debug.clone());

    let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(config.debug.severity.message_severity_flags())
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));

    let messenger = loader
        .create_debug_utils_messenger(&debug_info, None)
        .map_err(|e| init_error("Failed to create debug messenger", e))?;
    Ok(DebugMessenger { loader, messenger })
}

#[cfg(not(feature = "vulkan-validation"))]
unsafe fn create_debug_messenger(
    _entry: &ash::Entry,
    _instance: &ash::Instance,
    _config: &VulkanConfig,
) -> Result<DebugMessenger> {
    Err(Error::InitializationFailed(
        "debug messenger requires the vulkan-validation feature".to_string(),
    ))
}

/// Rank devices (discrete first) and keep the first one with a graphics
/// family and a family that can present to `surface`
unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let mut physical_devices = instance
        .enumerate_physical_devices()
        .map_err(|e| init_error("Failed to enumerate physical devices", e))?;

    physical_devices.sort_by_key(|&pd| {
        match instance.get_physical_device_properties(pd).device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 0,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
            _ => 2,
        }
    });

    for physical_device in physical_devices {
        let capabilities: Vec<_> = instance
            .get_physical_device_queue_family_properties(physical_device)
            .iter()
            .map(|family| queue_capabilities_from_vk(family.queue_flags))
            .collect();
        let supports_present = |family: u32| {
            surface_loader
                .get_physical_device_surface_support(physical_device, family, surface)
                .unwrap_or(false)
        };
        if let Ok(families) = QueueFamilyIndices::select(&capabilities, supports_present) {
            return Ok((physical_device, families));
        }
    }

    engine_error!("krakatoa::vulkan", "No Vulkan-capable GPU can render and present to this surface");
    Err(Error::InitializationFailed("No suitable GPU found".to_string()))
}
