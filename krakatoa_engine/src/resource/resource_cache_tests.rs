use super::*;
use crate::gpu::mock_device::{MockCall, MockGpuDevice, ObjectKind};
use crate::gpu::{CommandPoolFlags, PipelineLayoutHandle, PipelineHandle};
use crate::resource::ObjectUniforms;

const OBJECT: ObjectId = ObjectId(7);
const UNIFORM_SIZE: u64 = std::mem::size_of::<ObjectUniforms>() as u64;

struct Harness {
    mock: Arc<MockGpuDevice>,
    cache: ResourceCache,
    cmd: CommandBufferHandle,
    pipeline: PipelineBinding,
}

fn setup(frames: usize, grace: u32) -> Harness {
    let mock = Arc::new(MockGpuDevice::new());
    let device: Arc<dyn GpuDevice> = mock.clone();
    let pool = mock.create_command_pool(0, CommandPoolFlags::RESET_COMMAND_BUFFER).unwrap();
    let cmd = mock.allocate_command_buffer(pool).unwrap();
    mock.begin_command_buffer(cmd, true).unwrap();
    let cache = ResourceCache::new(device, frames, grace).unwrap();
    let pipeline = PipelineBinding {
        pipeline: PipelineHandle::from_raw(1),
        layout: PipelineLayoutHandle::from_raw(1),
    };
    Harness { mock, cache, cmd, pipeline }
}

fn mesh(indexed: bool) -> MeshBinding {
    MeshBinding {
        vertex_buffer: BufferHandle::from_raw(0x10),
        index_buffer: indexed.then_some(BufferHandle::from_raw(0x11)),
        vertex_count: 4,
        index_count: 6,
    }
}

impl Harness {
    fn draw(&mut self, id: ObjectId, uniforms: &ObjectUniforms) {
        self.cache.draw(self.cmd, id, uniforms, &self.pipeline, &mesh(true)).unwrap();
    }
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_get_or_create_is_idempotent() {
    let mut h = setup(3, 8);
    let first = h.cache.get_or_create(OBJECT, UNIFORM_SIZE).unwrap().descriptor_sets();
    let second = h.cache.get_or_create(OBJECT, UNIFORM_SIZE).unwrap().descriptor_sets();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(h.cache.len(), 1);
    assert_eq!(h.mock.live_count(ObjectKind::Buffer), 3);
    assert_eq!(h.mock.live_count(ObjectKind::DescriptorSet), 3);
    assert_eq!(h.cache.death_counter(OBJECT), Some(8));
}

#[test]
fn test_size_mismatch_rejected() {
    let mut h = setup(2, 4);
    h.cache.get_or_create(OBJECT, 64).unwrap();
    assert!(matches!(h.cache.get_or_create(OBJECT, 128), Err(Error::InvalidResource(_))));
}

#[test]
fn test_failed_allocation_leaves_nothing_behind() {
    let mut h = setup(3, 4);
    h.mock.set_fail_allocations(true);
    assert!(h.cache.get_or_create(OBJECT, 64).is_err());
    assert!(!h.cache.contains(OBJECT));
    assert_eq!(h.mock.live_count(ObjectKind::Buffer), 0);
}

#[test]
fn test_buffers_are_named_per_slot() {
    let mut h = setup(2, 4);
    h.cache.get_or_create(ObjectId(3), 64).unwrap();
    let names: Vec<String> = h
        .mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::SetDebugName { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["Uniform[3][0]".to_string(), "Uniform[3][1]".to_string()]);
}

// ============================================================================
// Drawing
// ============================================================================

#[test]
fn test_draw_writes_current_slot_and_advances() {
    let mut h = setup(2, 4);
    let a = ObjectUniforms::default().with_display_rotation(1);
    let b = ObjectUniforms::default().with_display_rotation(2);

    h.draw(OBJECT, &a);
    h.draw(OBJECT, &b);

    let entry = h.cache.get_or_create(OBJECT, UNIFORM_SIZE).unwrap();
    let buffers = entry.buffers();
    let sets = entry.descriptor_sets();
    assert_eq!(h.mock.buffer_contents(buffers[0]).unwrap(), bytemuck::bytes_of(&a));
    assert_eq!(h.mock.buffer_contents(buffers[1]).unwrap(), bytemuck::bytes_of(&b));

    let bound: Vec<DescriptorSetHandle> = h
        .mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::BindDescriptorSet { set_index: UNIFORM_SET_INDEX, set, .. } => Some(set),
            _ => None,
        })
        .collect();
    assert_eq!(bound, sets);
    assert_eq!(h.mock.count_calls(|c| matches!(c, MockCall::FlushBuffer { .. })), 2);
    assert!(h.mock.violations().is_empty());
}

#[test]
fn test_draw_indexed_or_not() {
    let mut h = setup(1, 4);
    let uniforms = ObjectUniforms::default();
    h.cache.draw(h.cmd, ObjectId(1), &uniforms, &h.pipeline, &mesh(true)).unwrap();
    h.cache.draw(h.cmd, ObjectId(2), &uniforms, &h.pipeline, &mesh(false)).unwrap();

    let cmd = h.cmd;
    assert_eq!(h.mock.count_calls(|c| *c == MockCall::DrawIndexed { cmd, index_count: 6 }), 1);
    assert_eq!(h.mock.count_calls(|c| *c == MockCall::Draw { cmd, vertex_count: 4 }), 1);
    assert_eq!(h.mock.count_calls(|c| matches!(c, MockCall::BindIndexBuffer { .. })), 1);
}

#[test]
fn test_draw_increments_counter() {
    let mut h = setup(2, 3);
    h.draw(OBJECT, &ObjectUniforms::default());
    h.draw(OBJECT, &ObjectUniforms::default());
    assert_eq!(h.cache.death_counter(OBJECT), Some(5));
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_undrawn_entry_evicted_on_sweep_grace_plus_one() {
    let grace = 3;
    let mut h = setup(2, grace);
    h.cache.get_or_create(OBJECT, 64).unwrap();

    for sweep in 1..=grace {
        assert_eq!(h.cache.sweep(), 0, "evicted early on sweep {}", sweep);
        assert!(h.cache.contains(OBJECT));
    }
    assert_eq!(h.cache.death_counter(OBJECT), Some(0));
    assert_eq!(h.cache.sweep(), 1);
    assert!(!h.cache.contains(OBJECT));
}

#[test]
fn test_entry_drawn_every_sweep_never_evicted() {
    let mut h = setup(3, 1);
    for _ in 0..50 {
        h.draw(OBJECT, &ObjectUniforms::default());
        assert_eq!(h.cache.sweep(), 0);
    }
    assert!(h.cache.contains(OBJECT));
    assert_eq!(h.cache.death_counter(OBJECT), Some(1));
}

#[test]
fn test_zero_grace_evicts_on_first_sweep() {
    let mut h = setup(1, 0);
    h.cache.get_or_create(OBJECT, 64).unwrap();
    assert_eq!(h.cache.sweep(), 1);
}

#[test]
fn test_evicted_resources_released_after_frames_in_flight_sweeps() {
    let frames = 3;
    let mut h = setup(frames, 0);
    h.cache.get_or_create(OBJECT, 64).unwrap();

    assert_eq!(h.cache.sweep(), 1);
    assert_eq!(h.cache.retired_len(), 1);
    for _ in 1..frames {
        h.cache.sweep();
        assert_eq!(h.mock.live_count(ObjectKind::Buffer), frames);
    }
    h.cache.sweep();
    assert_eq!(h.cache.retired_len(), 0);
    assert_eq!(h.mock.live_count(ObjectKind::Buffer), 0);
    assert_eq!(h.mock.live_count(ObjectKind::DescriptorSet), 0);
    assert!(h.mock.violations().is_empty());
}

#[test]
fn test_redraw_after_eviction_recreates() {
    let mut h = setup(1, 0);
    let before = h.cache.get_or_create(OBJECT, UNIFORM_SIZE).unwrap().descriptor_sets();
    h.cache.sweep();
    h.draw(OBJECT, &ObjectUniforms::default());
    let after = h.cache.get_or_create(OBJECT, UNIFORM_SIZE).unwrap().descriptor_sets();
    assert_ne!(before, after);
    assert_eq!(h.cache.death_counter(OBJECT), Some(1));
}
