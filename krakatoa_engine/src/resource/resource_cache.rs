/// Per-object uniform buffer cache with idle eviction.
///
/// Every drawn object gets a ring of persistently mapped uniform buffers, one
/// per frame in flight, each with its own descriptor set. Entries are not
/// reference counted. Instead each carries a death counter:
///
/// - it starts at `grace` when the entry is created
/// - every draw adds one
/// - every [`sweep`](ResourceCache::sweep) evicts entries at zero and
///   decrements the rest
///
/// An entry that is never drawn survives `grace` sweeps and is evicted on the
/// next one. An entry drawn once per sweep never reaches zero. The counter is
/// an approximation: an object drawn only every few frames with a small
/// `grace` can be evicted and recreated while still in use.
///
/// Evicted entries may still be referenced by frames in flight, so their
/// buffers and descriptor sets are only released `frames_in_flight` sweeps
/// later.

use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::gpu::{
    BufferDesc, BufferHandle, CommandBufferHandle, DescriptorSetHandle, GpuDevice, GpuObject,
    PipelineBinding, Scoped,
};
use crate::utils::RingSlotSet;
use crate::{engine_debug, engine_error, engine_trace};
use super::mesh_binding::MeshBinding;
use super::uniforms::ObjectId;

const SOURCE: &str = "krakatoa::resource";

/// Descriptor set index the per-object uniform block is bound at
pub const UNIFORM_SET_INDEX: u32 = 0;

struct UniformSlot {
    // Freed before the buffer it points at
    descriptor_set: Scoped<DescriptorSetHandle>,
    buffer: Scoped<BufferHandle>,
}

pub struct UniformEntry {
    slots: RingSlotSet<UniformSlot>,
    size: u64,
    death_counter: u32,
}

impl UniformEntry {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn death_counter(&self) -> u32 {
        self.death_counter
    }

    /// Descriptor set the next draw binds
    pub fn current_descriptor_set(&self) -> Result<DescriptorSetHandle> {
        Ok(self.slots.current()?.descriptor_set.get())
    }

    /// Descriptor sets of every slot, in slot order
    pub fn descriptor_sets(&self) -> Vec<DescriptorSetHandle> {
        self.slots.iter().map(|slot| slot.descriptor_set.get()).collect()
    }

    pub fn buffers(&self) -> Vec<BufferHandle> {
        self.slots.iter().map(|slot| slot.buffer.get()).collect()
    }
}

struct RetiredEntry {
    _entry: UniformEntry,
    sweeps_left: usize,
}

pub struct ResourceCache {
    entries: FxHashMap<ObjectId, UniformEntry>,
    retired: Vec<RetiredEntry>,
    frames_in_flight: usize,
    grace: u32,
    device: Arc<dyn GpuDevice>,
}

impl ResourceCache {
    pub fn new(device: Arc<dyn GpuDevice>, frames_in_flight: usize, grace: u32) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InvalidState("uniform cache needs at least one frame in flight".to_string()));
        }
        Ok(Self {
            entries: FxHashMap::default(),
            retired: Vec::new(),
            frames_in_flight,
            grace,
            device,
        })
    }

    pub fn grace(&self) -> u32 {
        self.grace
    }

    /// Live entries (retired ones excluded)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn death_counter(&self, id: ObjectId) -> Option<u32> {
        self.entries.get(&id).map(UniformEntry::death_counter)
    }

    /// Evicted entries whose resources are not yet released
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Return the entry for `id`, allocating its ring on first use
    pub fn get_or_create(&mut self, id: ObjectId, size: u64) -> Result<&UniformEntry> {
        self.entry_mut(id, size).map(|entry| &*entry)
    }

    fn entry_mut(&mut self, id: ObjectId, size: u64) -> Result<&mut UniformEntry> {
        let Self { entries, frames_in_flight, grace, device, .. } = self;
        match entries.entry(id) {
            std::collections::hash_map::Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if entry.size != size {
                    return Err(Error::InvalidResource(format!(
                        "uniform block of object {} is {} bytes, requested {}",
                        id.0, entry.size, size
                    )));
                }
                Ok(entry)
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let entry = Self::create_entry(device, id, size, *frames_in_flight, *grace)?;
                Ok(vacant.insert(entry))
            }
        }
    }

    fn create_entry(
        device: &Arc<dyn GpuDevice>,
        id: ObjectId,
        size: u64,
        frames_in_flight: usize,
        grace: u32,
    ) -> Result<UniformEntry> {
        if size == 0 {
            return Err(Error::InvalidResource("zero-sized uniform block".to_string()));
        }
        let mut slots = RingSlotSet::try_from_fn(frames_in_flight, |i| {
            let buffer = Scoped::new(device, device.create_buffer(&BufferDesc::uniform(size))?);
            let descriptor_set = Scoped::new(device, device.allocate_uniform_set(buffer.get(), size)?);
            device.set_debug_name(GpuObject::Buffer(buffer.get()), &format!("Uniform[{}][{}]", id.0, i));
            Ok(UniformSlot { descriptor_set, buffer })
        })
        .map_err(|e| {
            engine_error!(SOURCE, "Failed to allocate uniform buffers for object {}: {}", id.0, e);
            e
        })?;
        slots.advance();

        engine_trace!(SOURCE, "Uniform entry for object {} ({} bytes x {})", id.0, size, frames_in_flight);
        Ok(UniformEntry { slots, size, death_counter: grace })
    }

    /// Write `uniforms` into the object's current slot, bind it and draw
    /// `mesh`. The pipeline must already be bound on `cmd`.
    pub fn draw<U: bytemuck::Pod>(
        &mut self,
        cmd: CommandBufferHandle,
        id: ObjectId,
        uniforms: &U,
        pipeline: &PipelineBinding,
        mesh: &MeshBinding,
    ) -> Result<()> {
        let bytes = bytemuck::bytes_of(uniforms);
        let size = bytes.len() as u64;
        let device = Arc::clone(&self.device);
        let entry = self.entry_mut(id, size)?;

        let slot = entry.slots.current()?;
        device.write_buffer(slot.buffer.get(), 0, bytes)?;
        device.flush_buffer(slot.buffer.get(), 0, size)?;
        device.cmd_bind_descriptor_set(cmd, pipeline.layout, UNIFORM_SET_INDEX, slot.descriptor_set.get());
        device.cmd_bind_vertex_buffer(cmd, mesh.vertex_buffer);
        match mesh.index_buffer {
            Some(index_buffer) => {
                device.cmd_bind_index_buffer(cmd, index_buffer);
                device.cmd_draw_indexed(cmd, mesh.index_count);
            }
            None => device.cmd_draw(cmd, mesh.vertex_count),
        }

        entry.slots.advance();
        entry.death_counter = entry.death_counter.saturating_add(1);
        Ok(())
    }

    /// Age every entry once; returns the number evicted
    pub fn sweep(&mut self) -> usize {
        // Entries evicted by earlier sweeps are released once no frame can
        // still reference them
        self.retired.retain_mut(|retired| {
            retired.sweeps_left -= 1;
            retired.sweeps_left > 0
        });

        let mut evicted = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            if entry.death_counter == 0 {
                evicted.push(*id);
            } else {
                entry.death_counter -= 1;
            }
        }

        for id in &evicted {
            if let Some(entry) = self.entries.remove(id) {
                engine_debug!(SOURCE, "Evicting uniform entry for object {}", id.0);
                self.retired.push(RetiredEntry { _entry: entry, sweeps_left: self.frames_in_flight });
            }
        }
        evicted.len()
    }
}

#[cfg(test)]
#[path = "resource_cache_tests.rs"]
mod tests;
