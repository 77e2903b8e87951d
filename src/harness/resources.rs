//! Resource factory.
//!
//! Every function returns a resource holding exactly one reference.

use std::ptr;

use tracing::debug;

use crate::api::{
    ClearValue, ClearValueKind, ComPtr, CpuDescriptorHandle, DepthStencilViewDesc,
    DescriptorHeap, DescriptorHeapDesc, DescriptorHeapFlags, DescriptorHeapType, Device,
    DsvFlags, Format, HeapFlags, HeapProperties, HeapType, Resource, ResourceDesc,
    ResourceDimension, ResourceFlags, ResourceStates,
};
use crate::error::HarnessError;

/// Upload heaps live in GENERIC_READ and readback heaps in COPY_DEST.
pub fn is_legal_initial_state(heap: HeapType, state: ResourceStates) -> bool {
    match heap {
        HeapType::Upload => state == ResourceStates::GENERIC_READ,
        HeapType::Readback => state == ResourceStates::COPY_DEST,
        _ => true,
    }
}

fn create_committed(
    device: &dyn Device,
    heap: HeapType,
    desc: &ResourceDesc,
    state: ResourceStates,
    clear_value: Option<&ClearValue>,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    if !is_legal_initial_state(heap, state) {
        return Err(HarnessError::IllegalInitialState { heap, state });
    }
    device
        .create_committed_resource(
            &HeapProperties::new(heap),
            HeapFlags::NONE,
            desc,
            state,
            clear_value,
        )
        .map_err(HarnessError::api("CreateCommittedResource"))
}

pub fn create_buffer(
    device: &dyn Device,
    heap: HeapType,
    size: u64,
    flags: ResourceFlags,
    state: ResourceStates,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    create_committed(device, heap, &ResourceDesc::buffer(size, flags), state, None)
}

pub fn create_default_buffer(
    device: &dyn Device,
    size: u64,
    flags: ResourceFlags,
    state: ResourceStates,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    create_buffer(device, HeapType::Default, size, flags, state)
}

/// An upload buffer of `size` bytes, optionally filled with `data`.
pub fn create_upload_buffer(
    device: &dyn Device,
    size: u64,
    data: Option<&[u8]>,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    let buffer = create_buffer(
        device,
        HeapType::Upload,
        size,
        ResourceFlags::NONE,
        ResourceStates::GENERIC_READ,
    )?;
    if let Some(data) = data {
        let len = data.len().min(size as usize);
        let dst = buffer.map(0, Some(0..0)).map_err(HarnessError::api("Map"))?;
        // SAFETY: a mapped buffer exposes `size` writable bytes until unmapped.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), dst.as_ptr(), len) };
        buffer.unmap(0, Some(0..len));
        debug!("Filled upload buffer with {} bytes", len);
    }
    Ok(buffer)
}

pub fn create_readback_buffer(
    device: &dyn Device,
    size: u64,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    create_buffer(
        device,
        HeapType::Readback,
        size,
        ResourceFlags::NONE,
        ResourceStates::COPY_DEST,
    )
}

/// A single-mip, single-layer 2-D texture on `heap`.
pub fn create_texture(
    device: &dyn Device,
    heap: HeapType,
    width: u32,
    height: u32,
    format: Format,
    flags: ResourceFlags,
    state: ResourceStates,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    let desc = ResourceDesc::texture2d(width, height, format, flags);
    create_committed(device, heap, &desc, state, None)
}

pub fn create_default_texture(
    device: &dyn Device,
    width: u32,
    height: u32,
    format: Format,
    flags: ResourceFlags,
    state: ResourceStates,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    create_texture(device, HeapType::Default, width, height, format, flags, state)
}

#[allow(clippy::too_many_arguments)]
pub fn create_default_texture2d(
    device: &dyn Device,
    width: u32,
    height: u32,
    array_size: u16,
    mip_levels: u16,
    format: Format,
    flags: ResourceFlags,
    state: ResourceStates,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    let mut desc = ResourceDesc::texture2d(width, height, format, flags);
    desc.depth_or_array_size = array_size;
    desc.mip_levels = mip_levels;
    create_committed(device, HeapType::Default, &desc, state, None)
}

#[allow(clippy::too_many_arguments)]
pub fn create_default_texture3d(
    device: &dyn Device,
    width: u32,
    height: u32,
    depth: u16,
    mip_levels: u16,
    format: Format,
    flags: ResourceFlags,
    state: ResourceStates,
) -> Result<ComPtr<dyn Resource>, HarnessError> {
    let mut desc = ResourceDesc::texture2d(width, height, format, flags);
    desc.dimension = ResourceDimension::Texture3D;
    desc.depth_or_array_size = depth;
    desc.mip_levels = mip_levels;
    create_committed(device, HeapType::Default, &desc, state, None)
}

pub fn create_descriptor_heap(
    device: &dyn Device,
    heap_type: DescriptorHeapType,
    num_descriptors: u32,
    flags: DescriptorHeapFlags,
) -> Result<ComPtr<dyn DescriptorHeap>, HarnessError> {
    device
        .create_descriptor_heap(&DescriptorHeapDesc {
            heap_type,
            num_descriptors,
            flags,
            node_mask: 0,
        })
        .map_err(HarnessError::api("CreateDescriptorHeap"))
}

/// CPU handle of slot `index` in `heap`.
pub fn cpu_descriptor_handle(
    device: &dyn Device,
    heap: &dyn DescriptorHeap,
    index: u32,
) -> CpuDescriptorHandle {
    let increment = device.descriptor_handle_increment_size(heap.desc().heap_type);
    heap.cpu_descriptor_handle_for_heap_start().offset(index, increment)
}

/// A depth/stencil texture together with a one-slot view heap.
pub struct DepthStencil {
    pub texture: ComPtr<dyn Resource>,
    pub heap: ComPtr<dyn DescriptorHeap>,
    pub handle: CpuDescriptorHandle,
}

impl DepthStencil {
    /// Release the texture and heap, texture last.
    pub fn destroy(self) {
        let DepthStencil { texture, heap, .. } = self;
        drop(heap);
        drop(texture);
    }
}

/// Create a depth/stencil texture in DEPTH_WRITE. The optimized clear value,
/// when given, is `(depth, stencil)` in `view_format`.
pub fn create_depth_stencil(
    device: &dyn Device,
    width: u32,
    height: u32,
    format: Format,
    view_format: Format,
    clear_value: Option<(f32, u8)>,
) -> Result<DepthStencil, HarnessError> {
    let desc = ResourceDesc::texture2d(width, height, format, ResourceFlags::ALLOW_DEPTH_STENCIL);
    let clear_value = clear_value.map(|(depth, stencil)| ClearValue {
        format: view_format,
        value: ClearValueKind::DepthStencil { depth, stencil },
    });
    let texture = create_committed(
        device,
        HeapType::Default,
        &desc,
        ResourceStates::DEPTH_WRITE,
        clear_value.as_ref(),
    )?;

    let heap = create_descriptor_heap(device, DescriptorHeapType::Dsv, 1, DescriptorHeapFlags::NONE)?;
    let handle = heap.cpu_descriptor_handle_for_heap_start();
    let view = DepthStencilViewDesc {
        format: view_format,
        flags: DsvFlags::NONE,
        mip_slice: 0,
    };
    device.create_depth_stencil_view(Some(&*texture), Some(&view), handle);

    Ok(DepthStencil {
        texture,
        heap,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DeviceOptions, Runtime};
    use crate::error::Hresult;
    use crate::reference::ReferenceRuntime;

    fn device() -> ComPtr<dyn Device> {
        ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap()
    }

    #[test]
    fn test_factory_refcounts() {
        let device = device();
        let buffer = create_default_buffer(&*device, 256, ResourceFlags::NONE, ResourceStates::COPY_DEST)
            .unwrap();
        assert_eq!(buffer.refcount(), 1);
        let texture = create_default_texture(
            &*device,
            4,
            4,
            Format::R8G8B8A8_UNORM,
            ResourceFlags::NONE,
            ResourceStates::COPY_DEST,
        )
        .unwrap();
        assert_eq!(texture.refcount(), 1);
        assert_eq!(texture.desc().mip_levels, 1);
        drop(buffer);
        drop(texture);
        assert_eq!(device.release(), 0);
    }

    #[test]
    fn test_heap_state_rules_enforced() {
        let device = device();
        assert!(matches!(
            create_buffer(
                &*device,
                HeapType::Upload,
                64,
                ResourceFlags::NONE,
                ResourceStates::COPY_DEST
            ),
            Err(HarnessError::IllegalInitialState { .. })
        ));
        assert!(matches!(
            create_buffer(
                &*device,
                HeapType::Readback,
                64,
                ResourceFlags::NONE,
                ResourceStates::GENERIC_READ
            ),
            Err(HarnessError::IllegalInitialState { .. })
        ));
    }

    #[test]
    fn test_upload_buffer_contents() {
        let device = device();
        let buffer = create_upload_buffer(&*device, 8, Some(&[1, 2, 3, 4])).unwrap();
        let ptr = buffer.map(0, None).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 8) };
        assert_eq!(bytes, &[1, 2, 3, 4, 0, 0, 0, 0]);
        buffer.unmap(0, None);
    }

    #[test]
    fn test_texture_rejected_on_upload_heap() {
        let device = device();
        let result = create_texture(
            &*device,
            HeapType::Upload,
            4,
            4,
            Format::R8G8B8A8_UNORM,
            ResourceFlags::NONE,
            ResourceStates::GENERIC_READ,
        );
        assert!(matches!(
            result,
            Err(HarnessError::Api { hr: Hresult::E_INVALIDARG, .. })
        ));
    }

    #[test]
    fn test_depth_stencil_with_clear_value() {
        let device = device();
        let ds = create_depth_stencil(&*device, 8, 8, Format::D32_FLOAT, Format::D32_FLOAT, Some((1.0, 0)))
            .unwrap();
        assert_eq!(ds.texture.desc().format, Format::D32_FLOAT);
        assert_eq!(ds.handle, ds.heap.cpu_descriptor_handle_for_heap_start());
        ds.destroy();
        assert_eq!(device.release(), 0);
    }
}
