use super::*;

const BUFFER: BufferHandle = BufferHandle::from_raw(7);
const IMAGE: ImageHandle = ImageHandle::from_raw(9);

#[test]
fn test_same_family_has_no_transfer() {
    assert_eq!(OwnershipTransfer::between(0, 0), None);
    assert_eq!(
        OwnershipTransfer::between(1, 0),
        Some(OwnershipTransfer { src_family: 1, dst_family: 0 })
    );
}

#[test]
fn test_release_buffer_carries_write_only() {
    let transfer = OwnershipTransfer::between(2, 0).unwrap();
    let barrier = transfer.release_buffer(BUFFER, AccessFlags::TRANSFER_WRITE);
    assert_eq!(barrier.src_access, AccessFlags::TRANSFER_WRITE);
    assert!(barrier.dst_access.is_empty());
    assert_eq!(barrier.family_transfer, Some(FamilyTransfer { src_family: 2, dst_family: 0 }));
}

#[test]
fn test_acquire_buffer_carries_read_only() {
    let transfer = OwnershipTransfer::between(2, 0).unwrap();
    let barrier = transfer.acquire_buffer(BUFFER, AccessFlags::VERTEX_ATTRIBUTE_READ);
    assert!(barrier.src_access.is_empty());
    assert_eq!(barrier.dst_access, AccessFlags::VERTEX_ATTRIBUTE_READ);
    // Same family pair as the release, not reversed
    assert_eq!(barrier.family_transfer, Some(FamilyTransfer { src_family: 2, dst_family: 0 }));
}

#[test]
fn test_image_halves_name_the_same_transition() {
    let transfer = OwnershipTransfer::between(1, 0).unwrap();

    let release = transfer.release_image(
        IMAGE,
        AccessFlags::TRANSFER_WRITE,
        ImageLayout::TransferDst,
        ImageLayout::ShaderReadOnly,
    );
    let acquire = transfer.acquire_image(
        IMAGE,
        ImageLayout::TransferDst,
        ImageLayout::ShaderReadOnly,
        AccessFlags::SHADER_READ,
    );

    assert_eq!((release.old_layout, release.new_layout), (acquire.old_layout, acquire.new_layout));
    assert_eq!(acquire.new_layout, ImageLayout::ShaderReadOnly);
    assert_eq!(release.src_access, AccessFlags::TRANSFER_WRITE);
    assert!(release.dst_access.is_empty());
    assert!(acquire.src_access.is_empty());
}

#[test]
fn test_record_uses_protocol_stages() {
    use crate::gpu::mock_device::{MockCall, MockGpuDevice};
    use crate::gpu::CommandPoolFlags;

    let device = MockGpuDevice::new();
    let pool = device.create_command_pool(0, CommandPoolFlags::TRANSIENT).unwrap();
    let cmd = device.allocate_command_buffer(pool).unwrap();
    device.begin_command_buffer(cmd, true).unwrap();

    let transfer = OwnershipTransfer::between(1, 0).unwrap();
    let release = transfer.release_buffer(BUFFER, AccessFlags::TRANSFER_WRITE);
    let acquire = transfer.acquire_buffer(BUFFER, AccessFlags::UNIFORM_READ);
    transfer.record_release(&device, cmd, &[release], &[]);
    transfer.record_acquire(&device, cmd, PipelineStages::VERTEX_SHADER, &[acquire], &[]);

    let stages: Vec<(PipelineStages, PipelineStages)> = device
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::PipelineBarrier { src_stage, dst_stage, .. } => Some((src_stage, dst_stage)),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            (PipelineStages::TRANSFER, PipelineStages::BOTTOM_OF_PIPE),
            (PipelineStages::TOP_OF_PIPE, PipelineStages::VERTEX_SHADER),
        ]
    );
}
