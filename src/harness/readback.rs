//! Reading GPU resources back into host memory.

use std::ptr::NonNull;
use std::slice;

use tracing::debug;

use crate::api::format::{format_size, row_count, row_size};
use crate::api::{
    ComPtr, CommandQueue, Device, Format, GraphicsCommandList, HeapType,
    PlacedSubresourceFootprint, Resource, SubresourceFootprint, TextureCopyLocation,
    TEXTURE_DATA_PITCH_ALIGNMENT,
};
use crate::error::HarnessError;
use crate::harness::resources::create_readback_buffer;
use crate::harness::sync::{exec_command_list, wait_queue_idle};

/// A mapped readback buffer with a 2-D view of its contents.
///
/// The buffer stays mapped until the readback is released or dropped.
pub struct ResourceReadback {
    pub width: u32,
    pub height: u32,
    pub row_pitch: u64,
    pub format: Format,
    resource: ComPtr<dyn Resource>,
    data: NonNull<u8>,
    len: usize,
}

impl ResourceReadback {
    /// Map the first `len` bytes of a readback-heap buffer.
    pub(crate) fn map(
        resource: ComPtr<dyn Resource>,
        format: Format,
        width: u32,
        height: u32,
        row_pitch: u64,
    ) -> Result<Self, HarnessError> {
        let len = resource.desc().width as usize;
        let data = resource
            .map(0, Some(0..len))
            .map_err(HarnessError::api("Map"))?;
        Ok(Self {
            width,
            height,
            row_pitch,
            format,
            resource,
            data,
            len,
        })
    }

    /// Raw mapped bytes.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the buffer is mapped for `len` bytes while `self` is alive,
        // and the queue has been drained so nothing writes to it.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// `size` bytes of the element at (x, y).
    pub fn data(&self, x: u32, y: u32, size: usize) -> &[u8] {
        let offset = y as usize * self.row_pitch as usize + x as usize * size;
        &self.bytes()[offset..offset + size]
    }

    fn array<const N: usize>(&self, x: u32, y: u32) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.data(x, y, N));
        out
    }

    pub fn get_u8(&self, x: u32, y: u32) -> u8 {
        self.data(x, y, 1)[0]
    }

    pub fn get_u16(&self, x: u32, y: u32) -> u16 {
        u16::from_le_bytes(self.array(x, y))
    }

    pub fn get_u32(&self, x: u32, y: u32) -> u32 {
        u32::from_le_bytes(self.array(x, y))
    }

    pub fn get_u64(&self, x: u32, y: u32) -> u64 {
        u64::from_le_bytes(self.array(x, y))
    }

    pub fn get_f32(&self, x: u32, y: u32) -> f32 {
        f32::from_le_bytes(self.array(x, y))
    }

    pub fn get_vec4(&self, x: u32, y: u32) -> [f32; 4] {
        let raw = self.data(x, y, 16);
        std::array::from_fn(|i| f32::from_le_bytes([raw[i * 4], raw[i * 4 + 1], raw[i * 4 + 2], raw[i * 4 + 3]]))
    }

    pub fn get_uvec4(&self, x: u32, y: u32) -> [u32; 4] {
        let raw = self.data(x, y, 16);
        std::array::from_fn(|i| u32::from_le_bytes([raw[i * 4], raw[i * 4 + 1], raw[i * 4 + 2], raw[i * 4 + 3]]))
    }
}

impl Drop for ResourceReadback {
    fn drop(&mut self) {
        self.resource.unmap(0, Some(0..0));
    }
}

/// Unmap and release the readback buffer.
pub fn release_readback(readback: ResourceReadback) {
    drop(readback);
}

/// Read a whole buffer as elements of `format`.
pub fn get_buffer_readback_with_command_list(
    device: &dyn Device,
    buffer: &ComPtr<dyn Resource>,
    format: Format,
    queue: &dyn CommandQueue,
    list: &dyn GraphicsCommandList,
) -> Result<ResourceReadback, HarnessError> {
    let size = buffer.desc().width;
    let (heap, _) = buffer
        .heap_properties()
        .map_err(HarnessError::api("GetHeapProperties"))?;

    let resource = if heap.heap_type == HeapType::Readback {
        buffer.clone()
    } else {
        let readback = create_readback_buffer(device, size)?;
        list.copy_resource(&*readback, &**buffer);
        exec_command_list(queue, list)?;
        wait_queue_idle(device, queue)?;
        readback
    };

    let width = (size / u64::from(format_size(format))) as u32;
    debug!("Buffer readback: {} elements of {:?}", width, format);
    ResourceReadback::map(resource, format, width, 1, size)
}

/// Read one sub-resource of a 2-D texture.
pub fn get_texture_readback_with_command_list(
    device: &dyn Device,
    texture: &dyn Resource,
    sub_resource: u32,
    queue: &dyn CommandQueue,
    list: &dyn GraphicsCommandList,
) -> Result<ResourceReadback, HarnessError> {
    let desc = texture.desc();
    let level = sub_resource % desc.mip_count();
    let width = desc.mip_width(level);
    let height = desc.mip_height(level);
    let pitch_alignment = u64::from(TEXTURE_DATA_PITCH_ALIGNMENT);
    let row_pitch = u64::from(row_size(desc.format, width)).div_ceil(pitch_alignment) * pitch_alignment;
    let size = row_pitch * u64::from(row_count(desc.format, height));

    let readback = create_readback_buffer(device, size)?;
    let dst = TextureCopyLocation::PlacedFootprint {
        resource: &*readback,
        footprint: PlacedSubresourceFootprint {
            offset: 0,
            footprint: SubresourceFootprint {
                format: desc.format,
                width,
                height,
                depth: 1,
                row_pitch: row_pitch as u32,
            },
        },
    };
    let src = TextureCopyLocation::SubresourceIndex {
        resource: texture,
        index: sub_resource,
    };
    list.copy_texture_region(&dst, 0, 0, 0, &src, None);
    exec_command_list(queue, list)?;
    wait_queue_idle(device, queue)?;

    debug!(
        "Texture readback: sub-resource {}, {}x{} {:?}",
        sub_resource, width, height, desc.format
    );
    ResourceReadback::map(readback, desc.format, width, height, row_pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        CommandListType, CommandQueueDesc, DeviceOptions, ResourceFlags, ResourceStates, Runtime,
    };
    use crate::harness::resources::{create_default_buffer, create_default_texture};
    use crate::harness::staging::{upload_buffer_data, upload_texture_data, SubresourceData};
    use crate::harness::sync::{reset_command_list, transition_resource_state};
    use crate::reference::ReferenceRuntime;

    #[test]
    fn test_buffer_round_trip() {
        let device = ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap();
        let queue = device
            .create_command_queue(&CommandQueueDesc::new(CommandListType::Direct))
            .unwrap();
        let allocator = device.create_command_allocator(CommandListType::Direct).unwrap();
        let list = device
            .create_command_list(0, CommandListType::Direct, &*allocator, None)
            .unwrap();

        let values: Vec<u8> = (0u32..16).flat_map(|v| (v * 3).to_le_bytes()).collect();
        let buffer = create_default_buffer(&*device, 64, ResourceFlags::NONE, ResourceStates::COPY_DEST)
            .unwrap();
        upload_buffer_data(&*device, &*buffer, 0, &values, &*queue, &*list).unwrap();
        reset_command_list(&*list, &*allocator).unwrap();
        transition_resource_state(&*list, &*buffer, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);

        let rb = get_buffer_readback_with_command_list(&*device, &buffer, Format::R32_UINT, &*queue, &*list)
            .unwrap();
        assert_eq!(rb.width, 16);
        assert_eq!(rb.height, 1);
        assert_eq!(rb.get_u32(5, 0), 15);
        release_readback(rb);
    }

    #[test]
    fn test_texture_round_trip() {
        let device = ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap();
        let queue = device
            .create_command_queue(&CommandQueueDesc::new(CommandListType::Direct))
            .unwrap();
        let allocator = device.create_command_allocator(CommandListType::Direct).unwrap();
        let list = device
            .create_command_list(0, CommandListType::Direct, &*allocator, None)
            .unwrap();

        let texture = create_default_texture(
            &*device,
            4,
            4,
            Format::R32_FLOAT,
            ResourceFlags::NONE,
            ResourceStates::COPY_DEST,
        )
        .unwrap();
        let texels: Vec<u8> = (0..16).flat_map(|i| (i as f32 * 0.5).to_le_bytes()).collect();
        let data = [SubresourceData {
            data: &texels,
            row_pitch: 16,
            slice_pitch: 64,
        }];
        upload_texture_data(&*device, &*texture, &data, &*queue, &*list).unwrap();
        reset_command_list(&*list, &*allocator).unwrap();
        transition_resource_state(&*list, &*texture, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);

        let rb = get_texture_readback_with_command_list(&*device, &*texture, 0, &*queue, &*list).unwrap();
        assert_eq!((rb.width, rb.height, rb.row_pitch), (4, 4, 256));
        assert_eq!(rb.get_f32(1, 2), 4.5);
        assert_eq!(rb.get_f32(3, 3), 7.5);
    }
}
