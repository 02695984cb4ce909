/// Descriptor set layouts, growable pools and the plane sampler
///
/// Two fixed layouts cover every set the engine binds:
/// - uniform: one uniform buffer at binding 0 (mesh pipelines, set 0)
/// - plane: luma and chroma combined image samplers at bindings 0 and 1
///   (camera background pipeline, set 0)
///
/// Pools are created with FREE_DESCRIPTOR_SET so the resource cache can
/// release sets of evicted objects one by one. When the current pool is
/// exhausted a new one is appended.

use ash::vk;
use krakatoa_engine::krakatoa::{Error, Result};
use krakatoa_engine::{engine_err, engine_error, engine_info};
use rustc_hash::FxHashMap;
use std::sync::Mutex;

use crate::vulkan_context::lock;

const SETS_PER_POOL: u32 = 256;

/// Which of the two set layouts a set was allocated with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetLayoutKind {
    Uniform,
    Plane,
}

struct PoolState {
    pools: Vec<vk::DescriptorPool>,
    /// Owning pool of every live set
    owners: FxHashMap<vk::DescriptorSet, vk::DescriptorPool>,
}

pub(crate) struct DescriptorAllocator {
    device: ash::Device,
    uniform_layout: vk::DescriptorSetLayout,
    plane_layout: vk::DescriptorSetLayout,
    plane_sampler: vk::Sampler,
    state: Mutex<PoolState>,
}

impl DescriptorAllocator {
    pub(crate) fn new(device: &ash::Device) -> Result<Self> {
        unsafe {
            let uniform_binding = vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
            let uniform_layout = device
                .create_descriptor_set_layout(
                    &vk::DescriptorSetLayoutCreateInfo::default().bindings(std::slice::from_ref(&uniform_binding)),
                    None,
                )
                .map_err(|e| init_error("Failed to create uniform set layout", e))?;

            let plane_bindings = [0, 1].map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            });
            let plane_layout = device
                .create_descriptor_set_layout(
                    &vk::DescriptorSetLayoutCreateInfo::default().bindings(&plane_bindings),
                    None,
                )
                .map_err(|e| init_error("Failed to create plane set layout", e))?;

            // Camera planes are sampled once per screen pixel, no mips
            let sampler_info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .mip_lod_bias(0.0)
                .min_lod(0.0)
                .max_lod(0.0)
                .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
                .compare_enable(false)
                .compare_op(vk::CompareOp::ALWAYS)
                .unnormalized_coordinates(false);
            let plane_sampler = device
                .create_sampler(&sampler_info, None)
                .map_err(|e| init_error("Failed to create plane sampler", e))?;

            let first_pool = create_pool(device)?;

            Ok(Self {
                device: device.clone(),
                uniform_layout,
                plane_layout,
                plane_sampler,
                state: Mutex::new(PoolState { pools: vec![first_pool], owners: FxHashMap::default() }),
            })
        }
    }

    pub(crate) fn layout(&self, kind: SetLayoutKind) -> vk::DescriptorSetLayout {
        match kind {
            SetLayoutKind::Uniform => self.uniform_layout,
            SetLayoutKind::Plane => self.plane_layout,
        }
    }

    pub(crate) fn allocate_uniform_set(&self, buffer: vk::Buffer, range: u64) -> Result<vk::DescriptorSet> {
        let set = self.allocate(SetLayoutKind::Uniform)?;
        let buffer_info = vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(range);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe {
            self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }
        Ok(set)
    }

    pub(crate) fn allocate_plane_set(&self, luma: vk::ImageView, chroma: vk::ImageView) -> Result<vk::DescriptorSet> {
        let set = self.allocate(SetLayoutKind::Plane)?;
        let image_infos = [luma, chroma].map(|view| {
            vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(view)
                .sampler(self.plane_sampler)
        });
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(&image_infos[0])),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(&image_infos[1])),
        ];
        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }
        Ok(set)
    }

    /// Return a set to its pool. Unknown sets are ignored.
    pub(crate) fn free(&self, set: vk::DescriptorSet) {
        let mut state = lock(&self.state);
        if let Some(pool) = state.owners.remove(&set) {
            unsafe {
                if let Err(e) = self.device.free_descriptor_sets(pool, &[set]) {
                    engine_error!("krakatoa::vulkan", "Failed to free descriptor set: {:?}", e);
                }
            }
        }
    }

    /// Number of live sets
    pub(crate) fn live_sets(&self) -> usize {
        lock(&self.state).owners.len()
    }

    fn allocate(&self, kind: SetLayoutKind) -> Result<vk::DescriptorSet> {
        let layouts = [self.layout(kind)];
        let mut state = lock(&self.state);
        let current_pool = *state
            .pools
            .last()
            .ok_or_else(|| Error::InvalidState("Descriptor allocator has no pool".to_string()))?;

        let set = unsafe {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(current_pool)
                .set_layouts(&layouts);
            match self.device.allocate_descriptor_sets(&allocate_info) {
                Ok(sets) => (current_pool, sets[0]),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                    let new_pool = create_pool(&self.device)?;
                    state.pools.push(new_pool);
                    engine_info!(
                        "krakatoa::vulkan",
                        "Descriptor pool exhausted, created new pool (total: {})",
                        state.pools.len()
                    );
                    let retry_info = vk::DescriptorSetAllocateInfo::default()
                        .descriptor_pool(new_pool)
                        .set_layouts(&layouts);
                    let sets = self.device.allocate_descriptor_sets(&retry_info).map_err(|e| {
                        engine_err!("krakatoa::vulkan", "Failed to allocate descriptor set after pool growth: {:?}", e)
                    })?;
                    (new_pool, sets[0])
                }
                Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) | Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                    engine_error!("krakatoa::vulkan", "Out of memory allocating a {:?} descriptor set", kind);
                    return Err(Error::OutOfMemory);
                }
                Err(e) => return Err(engine_err!("krakatoa::vulkan", "Failed to allocate descriptor set: {:?}", e)),
            }
        };

        state.owners.insert(set.1, set.0);
        Ok(set.1)
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        unsafe {
            let state = self.state.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
            // Destroying a pool frees its sets
            for pool in state.pools.drain(..) {
                self.device.destroy_descriptor_pool(pool, None);
            }
            state.owners.clear();
            self.device.destroy_sampler(self.plane_sampler, None);
            self.device.destroy_descriptor_set_layout(self.plane_layout, None);
            self.device.destroy_descriptor_set_layout(self.uniform_layout, None);
        }
    }
}

fn init_error(what: &str, e: vk::Result) -> Error {
    engine_error!("krakatoa::vulkan", "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

/// Pool sized for `SETS_PER_POOL` sets of either layout
fn create_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let pool_sizes = pool_sizes(SETS_PER_POOL);
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .pool_sizes(&pool_sizes)
        .max_sets(SETS_PER_POOL);
    unsafe { device.create_descriptor_pool(&info, None).map_err(|e| init_error("Failed to create descriptor pool", e)) }
}

/// Descriptor counts so that `sets` sets of either layout always fit
pub(crate) fn pool_sizes(sets: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: sets },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count: sets * 2 },
    ]
}
