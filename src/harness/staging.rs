//! Moving CPU data into GPU resources through transient upload buffers.

use tracing::debug;

use crate::api::format::{row_count, row_size};
use crate::api::{
    CommandQueue, CopyableFootprints, Device, GraphicsCommandList, PlacedSubresourceFootprint,
    Resource, ResourceDesc, SubresourceFootprint, TextureCopyLocation,
    TEXTURE_DATA_PITCH_ALIGNMENT, TEXTURE_DATA_PLACEMENT_ALIGNMENT,
};
use crate::error::{HarnessError, Hresult};
use crate::harness::resources::create_upload_buffer;
use crate::harness::sync::{exec_command_list, wait_queue_idle};

/// CPU-side contents of one sub-resource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

/// Copy `data` into `buffer` at `offset`.
///
/// `list` must be open; it is closed, executed and waited for before
/// returning.
pub fn upload_buffer_data(
    device: &dyn Device,
    buffer: &dyn Resource,
    offset: u64,
    data: &[u8],
    queue: &dyn CommandQueue,
    list: &dyn GraphicsCommandList,
) -> Result<(), HarnessError> {
    let size = data.len() as u64;
    let upload = create_upload_buffer(device, size, Some(data))?;
    list.copy_buffer_region(buffer, offset, &*upload, 0, size);
    exec_command_list(queue, list)?;
    wait_queue_idle(device, queue)?;
    debug!("Uploaded {} bytes at offset {}", size, offset);
    Ok(())
}

/// Fill sub-resources `0..data.len()` of `texture`.
pub fn upload_texture_data(
    device: &dyn Device,
    texture: &dyn Resource,
    data: &[SubresourceData<'_>],
    queue: &dyn CommandQueue,
    list: &dyn GraphicsCommandList,
) -> Result<(), HarnessError> {
    let desc = texture.desc();
    let count = data.len() as u32;
    let footprints = device.get_copyable_footprints(&desc, 0, count, 0);
    if footprints.total_bytes == u64::MAX {
        return Err(HarnessError::Api {
            call: "GetCopyableFootprints",
            hr: Hresult::E_INVALIDARG,
        });
    }

    let staging = pack_subresources(&footprints, data)?;
    let upload = create_upload_buffer(device, footprints.total_bytes, Some(&staging))?;
    for (index, layout) in footprints.layouts.iter().enumerate() {
        let dst = TextureCopyLocation::SubresourceIndex {
            resource: texture,
            index: index as u32,
        };
        let src = TextureCopyLocation::PlacedFootprint {
            resource: &*upload,
            footprint: *layout,
        };
        list.copy_texture_region(&dst, 0, 0, 0, &src, None);
    }
    exec_command_list(queue, list)?;
    wait_queue_idle(device, queue)?;
    debug!("Uploaded {} sub-resources, {} bytes", count, footprints.total_bytes);
    Ok(())
}

/// Lay out tightly packed CPU rows at the pitch of each footprint.
fn pack_subresources(
    footprints: &CopyableFootprints,
    data: &[SubresourceData<'_>],
) -> Result<Vec<u8>, HarnessError> {
    let mut staging = vec![0u8; footprints.total_bytes as usize];
    for (index, sub) in data.iter().enumerate() {
        let layout = &footprints.layouts[index];
        let rows = footprints.row_counts[index] as usize;
        let row_bytes = footprints.row_sizes[index] as usize;
        let pitch = layout.footprint.row_pitch as usize;
        let short = || HarnessError::ShortData { index: index as u32 };

        for z in 0..layout.footprint.depth as usize {
            for y in 0..rows {
                let src = z * sub.slice_pitch + y * sub.row_pitch;
                let dst = layout.offset as usize + (z * rows + y) * pitch;
                let row = sub.data.get(src..src + row_bytes).ok_or_else(short)?;
                staging
                    .get_mut(dst..dst + row_bytes)
                    .ok_or_else(short)?
                    .copy_from_slice(row);
            }
        }
    }
    Ok(staging)
}

/// Footprints of sub-resources `first..first + count` of `desc`, computed
/// from the placement rules alone: rows are padded to 256 bytes and every
/// sub-resource starts on a 512-byte boundary after the previous one.
pub fn compute_copyable_footprints(
    desc: &ResourceDesc,
    first: u32,
    count: u32,
    base_offset: u64,
) -> CopyableFootprints {
    let mip_count = desc.mip_count();
    let pitch_alignment = u64::from(TEXTURE_DATA_PITCH_ALIGNMENT);

    let mut result = CopyableFootprints::default();
    let mut cursor = base_offset;
    for subresource in first..first + count {
        let level = subresource % mip_count;
        let width = desc.mip_width(level);
        let height = desc.mip_height(level);
        let depth = desc.mip_depth(level);

        let row_bytes = u64::from(row_size(desc.format, width));
        let rows = row_count(desc.format, height);
        let pitch = row_bytes.div_ceil(pitch_alignment) * pitch_alignment;

        let offset = cursor.div_ceil(TEXTURE_DATA_PLACEMENT_ALIGNMENT) * TEXTURE_DATA_PLACEMENT_ALIGNMENT;
        result.layouts.push(PlacedSubresourceFootprint {
            offset,
            footprint: SubresourceFootprint {
                format: desc.format,
                width,
                height,
                depth,
                row_pitch: pitch as u32,
            },
        });
        result.row_counts.push(rows);
        result.row_sizes.push(row_bytes);
        cursor = offset + pitch * u64::from(rows) * u64::from(depth);
    }
    result.total_bytes = cursor - base_offset;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Format, ResourceDimension, ResourceFlags};

    #[test]
    fn test_footprints_of_mip_chain() {
        let mut desc = ResourceDesc::texture2d(32, 32, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 3;
        let f = compute_copyable_footprints(&desc, 0, 3, 0);
        assert_eq!(f.layouts[0].offset, 0);
        assert_eq!(f.layouts[0].footprint.row_pitch, 256);
        assert_eq!(f.row_sizes, vec![128, 64, 32]);
        assert_eq!(f.row_counts, vec![32, 16, 8]);
        assert_eq!(f.layouts[1].offset, 8192);
        assert_eq!(f.layouts[2].offset, 8192 + 4096);
        assert_eq!(f.total_bytes, 8192 + 4096 + 2048);
    }

    #[test]
    fn test_footprints_of_block_compressed() {
        let desc = ResourceDesc::texture2d(16, 16, Format::BC1_UNORM, ResourceFlags::NONE);
        let f = compute_copyable_footprints(&desc, 0, 1, 0);
        assert_eq!(f.row_counts[0], 4);
        assert_eq!(f.row_sizes[0], 32);
        assert_eq!(f.layouts[0].footprint.row_pitch, 256);
        assert_eq!(f.total_bytes, 1024);
    }

    #[test]
    fn test_footprints_of_volume() {
        let mut desc = ResourceDesc::texture2d(4, 4, Format::R32_FLOAT, ResourceFlags::NONE);
        desc.dimension = ResourceDimension::Texture3D;
        desc.depth_or_array_size = 2;
        let f = compute_copyable_footprints(&desc, 0, 1, 512);
        assert_eq!(f.layouts[0].offset, 512);
        assert_eq!(f.layouts[0].footprint.depth, 2);
        assert_eq!(f.total_bytes, 256 * 4 * 2);
    }

    #[test]
    fn test_pack_respects_both_pitches() {
        let desc = ResourceDesc::texture2d(2, 2, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        let footprints = compute_copyable_footprints(&desc, 0, 1, 0);
        let texels: Vec<u8> = (0..16).collect();
        let data = [SubresourceData {
            data: &texels,
            row_pitch: 8,
            slice_pitch: 16,
        }];
        let staging = pack_subresources(&footprints, &data).unwrap();
        assert_eq!(&staging[0..8], &texels[0..8]);
        assert_eq!(&staging[256..264], &texels[8..16]);
        assert!(staging[8..256].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_pack_rejects_short_data() {
        let desc = ResourceDesc::texture2d(2, 2, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        let footprints = compute_copyable_footprints(&desc, 0, 1, 0);
        let data = [SubresourceData {
            data: &[0; 8],
            row_pitch: 8,
            slice_pitch: 16,
        }];
        assert!(matches!(
            pack_subresources(&footprints, &data),
            Err(HarnessError::ShortData { index: 0 })
        ));
    }
}
