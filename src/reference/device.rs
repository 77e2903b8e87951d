//! The reference device: creates every object and owns the descriptor
//! heap registry.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::command_list::{check_initial_state, ReferenceCommandAllocator, ReferenceCommandList};
use super::descriptor::{
    heap_id_of, DepthStencilView, Descriptor, ReferenceDescriptorHeap, RenderTargetView,
    DESCRIPTOR_INCREMENT,
};
use super::fence::ReferenceFence;
use super::layout::{align, copyable_footprints};
use super::pipeline::{
    check_bytecode, check_render_target_count, classify_program, GraphicsState, PipelineKind,
    ReferencePipelineState, ReferenceRootSignature,
};
use super::queue::ReferenceCommandQueue;
use super::resource::ReferenceResource;
use crate::api::{
    iid, ClearValue, ComObject, ComPtr, CommandAllocator, CommandListType, CommandQueue,
    CommandQueueDesc, ComputePipelineStateDesc, ConstantBufferViewDesc, CopyableFootprints,
    CpuDescriptorHandle, DepthStencilViewDesc, DescriptorHeap, DescriptorHeapDesc,
    DescriptorHeapFlags, DescriptorHeapType, Device, DeviceOptions, DsvFlags, Fence, FenceFlags,
    Format, GraphicsCommandList, GraphicsPipelineStateDesc, Guid, HeapFlags, HeapProperties,
    HeapType, PipelineState, PrimitiveTopologyType, RefCount, Resource, ResourceDesc,
    RenderTargetViewDesc, ResourceDimension, ResourceFlags, ResourceStates, RootSignature,
    RtvDimension, SamplerDesc,
    ShaderResourceViewDesc, TextureLayout, UnorderedAccessViewDesc, Unknown, MAX_ROOT_COST,
    DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT,
};
use crate::dxbc::rts0;
use crate::error::{ApiResult, Hresult};

/// Base of the GPU virtual address range handed to buffers.
const GPU_ADDRESS_BASE: u64 = 0x1_0000_0000;

/// Largest constant buffer view, in bytes.
const MAX_CONSTANT_BUFFER_SIZE: u32 = 65536;

pub struct ReferenceDevice {
    self_ref: Weak<ReferenceDevice>,
    refcount: RefCount,
    options: DeviceOptions,
    next_id: AtomicU32,
    next_gpu_address: AtomicU64,
    heaps: Mutex<HashMap<u32, Weak<ReferenceDescriptorHeap>>>,
}

impl ReferenceDevice {
    pub(crate) fn new(options: DeviceOptions) -> Arc<Self> {
        info!(
            "Creating reference device (validation: {}, warp: {})",
            options.validate, options.warp
        );
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            options,
            next_id: AtomicU32::new(1),
            next_gpu_address: AtomicU64::new(GPU_ADDRESS_BASE),
            heaps: Mutex::new(HashMap::new()),
        })
    }

    pub fn options(&self) -> DeviceOptions {
        self.options
    }

    fn arc(&self) -> ApiResult<Arc<ReferenceDevice>> {
        self.self_ref.upgrade().ok_or(Hresult::E_FAIL)
    }

    fn allocate_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn allocate_gpu_address(&self, size: u64) -> u64 {
        let size = align(size.max(1), DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT);
        self.next_gpu_address.fetch_add(size, Ordering::Relaxed)
    }

    /// Count a new child against the device and hand out its reference.
    fn adopt<T: ?Sized + Unknown>(&self, child: Arc<T>) -> ComPtr<T> {
        self.refcount.increment();
        ComPtr::from_counted(child)
    }

    fn heap_of(&self, ptr: u64) -> Option<Arc<ReferenceDescriptorHeap>> {
        self.heaps.lock().get(&heap_id_of(ptr)).and_then(Weak::upgrade)
    }

    pub(crate) fn forget_heap(&self, id: u32) {
        self.heaps.lock().remove(&id);
    }

    /// Contents of the descriptor slot addressed by a CPU handle.
    pub(crate) fn read_descriptor(&self, handle: CpuDescriptorHandle) -> Option<Descriptor> {
        self.heap_of(handle.ptr)?.read(handle)
    }

    fn write_descriptor(&self, handle: CpuDescriptorHandle, expected: DescriptorHeapType, descriptor: Descriptor) {
        let Some(heap) = self.heap_of(handle.ptr) else {
            warn!("Descriptor handle {:#x} does not belong to a live heap", handle.ptr);
            return;
        };
        if heap.desc().heap_type != expected {
            warn!(
                "Descriptor of type {:?} written to {:?} heap",
                expected,
                heap.desc().heap_type
            );
            return;
        }
        if !heap.write(handle, descriptor) {
            warn!("Descriptor handle {:#x} is outside its heap", handle.ptr);
        }
    }

    fn resolve(resource: Option<&dyn Resource>) -> Option<Arc<ReferenceResource>> {
        resource.and_then(ReferenceResource::from_interface)
    }

    fn validate_resource_desc(heap: &HeapProperties, desc: &ResourceDesc) -> ApiResult<ResourceDesc> {
        let mut desc = *desc;
        let invalid = |reason: &str| {
            warn!("CreateCommittedResource: {}", reason);
            Err(Hresult::E_INVALIDARG)
        };
        if desc.sample_desc.count != 1 {
            return invalid("multisampled resources are not supported");
        }
        match desc.dimension {
            ResourceDimension::Unknown => return invalid("unknown dimension"),
            ResourceDimension::Buffer => {
                if desc.width == 0
                    || desc.height != 1
                    || desc.depth_or_array_size != 1
                    || desc.mip_levels != 1
                    || desc.format != Format::UNKNOWN
                    || desc.layout != TextureLayout::RowMajor
                {
                    return invalid("malformed buffer description");
                }
                if desc
                    .flags
                    .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
                {
                    return invalid("buffers cannot be render or depth targets");
                }
            }
            dimension => {
                if heap.heap_type != HeapType::Default {
                    return invalid("textures must live on the default heap");
                }
                if desc.width == 0
                    || desc.height == 0
                    || desc.depth_or_array_size == 0
                    || desc.format == Format::UNKNOWN
                    || desc.width > u64::from(u32::MAX)
                {
                    return invalid("malformed texture description");
                }
                if dimension == ResourceDimension::Texture1D && desc.height != 1 {
                    return invalid("1D texture with height");
                }
                if !matches!(desc.layout, TextureLayout::Unknown | TextureLayout::RowMajor) {
                    return invalid("swizzled layouts are not supported");
                }
                if desc.mip_count() > desc.full_mip_chain() {
                    return invalid("too many mip levels");
                }
                desc.mip_levels = desc.mip_count() as u16;
                let rt = desc.flags.contains(ResourceFlags::ALLOW_RENDER_TARGET);
                let ds = desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL);
                if rt && ds {
                    return invalid("render target and depth stencil flags together");
                }
                let depth_family = desc.format.is_depth_stencil()
                    || matches!(
                        desc.format,
                        Format::R32_TYPELESS | Format::R24G8_TYPELESS | Format::R16_TYPELESS | Format::R32G8X24_TYPELESS
                    );
                if ds && !depth_family {
                    return invalid("depth stencil flag on a colour format");
                }
                if rt && desc.format.is_depth_stencil() {
                    return invalid("render target flag on a depth format");
                }
                if desc.format.is_depth_stencil() && !ds {
                    return invalid("depth format without the depth stencil flag");
                }
            }
        }
        Ok(desc)
    }

    fn final_release(&self) {
        debug!("Reference device released");
    }
}

impl_unknown!(ReferenceDevice, Device, [iid::OBJECT, iid::DEVICE]);

impl Device for ReferenceDevice {
    fn create_command_queue(&self, desc: &CommandQueueDesc) -> ApiResult<ComPtr<dyn CommandQueue>> {
        if desc.list_type == CommandListType::Bundle || desc.node_mask > 1 {
            return Err(Hresult::E_INVALIDARG);
        }
        let queue = ReferenceCommandQueue::new(self.arc()?, self.allocate_id(), *desc)?;
        Ok(self.adopt(queue as Arc<dyn CommandQueue>))
    }

    fn create_command_allocator(
        &self,
        list_type: CommandListType,
    ) -> ApiResult<ComPtr<dyn CommandAllocator>> {
        if list_type == CommandListType::Bundle {
            warn!("Bundles are not supported");
            return Err(Hresult::E_NOTIMPL);
        }
        let allocator = ReferenceCommandAllocator::new(self.arc()?, self.allocate_id(), list_type);
        Ok(self.adopt(allocator as Arc<dyn CommandAllocator>))
    }

    fn create_command_list(
        &self,
        node_mask: u32,
        list_type: CommandListType,
        allocator: &dyn CommandAllocator,
        initial_state: Option<&dyn PipelineState>,
    ) -> ApiResult<ComPtr<dyn GraphicsCommandList>> {
        if node_mask > 1 {
            return Err(Hresult::E_INVALIDARG);
        }
        if list_type == CommandListType::Bundle {
            return Err(Hresult::E_NOTIMPL);
        }
        let allocator = ReferenceCommandAllocator::from_interface(allocator).ok_or(Hresult::E_INVALIDARG)?;
        let pipeline = match initial_state {
            Some(pso) => Some(ReferencePipelineState::from_interface(pso).ok_or(Hresult::E_INVALIDARG)?),
            None => None,
        };
        let list = ReferenceCommandList::new(self.arc()?, self.allocate_id(), list_type, allocator, pipeline)?;
        Ok(self.adopt(list as Arc<dyn GraphicsCommandList>))
    }

    fn create_committed_resource(
        &self,
        heap_properties: &HeapProperties,
        heap_flags: HeapFlags,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        optimized_clear_value: Option<&ClearValue>,
    ) -> ApiResult<ComPtr<dyn Resource>> {
        if heap_properties.heap_type == HeapType::Custom {
            warn!("CreateCommittedResource: custom heaps are not supported");
            return Err(Hresult::E_INVALIDARG);
        }
        let desc = Self::validate_resource_desc(heap_properties, desc)?;
        check_initial_state(heap_properties.heap_type, desc.flags, initial_state)?;
        if let Some(clear) = optimized_clear_value {
            if !desc
                .flags
                .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
            {
                warn!(
                    "CreateCommittedResource: clear value {:?} on a resource that is never cleared",
                    clear.format
                );
                return Err(Hresult::E_INVALIDARG);
            }
        }
        let gpu_address = if desc.is_buffer() {
            self.allocate_gpu_address(desc.width)
        } else {
            0
        };
        let resource = ReferenceResource::new(
            self.arc()?,
            self.allocate_id(),
            *heap_properties,
            heap_flags,
            desc,
            initial_state,
            gpu_address,
        )?;
        Ok(self.adopt(resource as Arc<dyn Resource>))
    }

    fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> ApiResult<ComPtr<dyn DescriptorHeap>> {
        if desc.num_descriptors == 0 {
            return Err(Hresult::E_INVALIDARG);
        }
        let shader_visible = desc.flags.contains(DescriptorHeapFlags::SHADER_VISIBLE);
        if shader_visible && matches!(desc.heap_type, DescriptorHeapType::Rtv | DescriptorHeapType::Dsv) {
            warn!("{:?} heaps cannot be shader visible", desc.heap_type);
            return Err(Hresult::E_INVALIDARG);
        }
        let id = self.allocate_id();
        let heap = ReferenceDescriptorHeap::new(self.arc()?, id, *desc);
        self.heaps.lock().insert(id, Arc::downgrade(&heap));
        Ok(self.adopt(heap as Arc<dyn DescriptorHeap>))
    }

    fn descriptor_handle_increment_size(&self, _heap_type: DescriptorHeapType) -> u32 {
        DESCRIPTOR_INCREMENT
    }

    fn create_render_target_view(
        &self,
        resource: Option<&dyn Resource>,
        desc: Option<&RenderTargetViewDesc>,
        dest: CpuDescriptorHandle,
    ) {
        let Some(resource) = Self::resolve(resource) else {
            self.write_descriptor(dest, DescriptorHeapType::Rtv, Descriptor::Empty);
            return;
        };
        let rdesc = resource.resource_desc();
        let (format, subresource) = match desc {
            Some(d) => {
                let subresource = match d.dimension {
                    RtvDimension::Texture2D { mip_slice } => mip_slice,
                    RtvDimension::Texture2DArray {
                        mip_slice,
                        first_array_slice,
                        ..
                    } => mip_slice + first_array_slice * rdesc.mip_count(),
                };
                let format = if d.format == Format::UNKNOWN {
                    rdesc.format
                } else {
                    d.format
                };
                (format, subresource)
            }
            None => (rdesc.format, 0),
        };
        if !rdesc.flags.contains(ResourceFlags::ALLOW_RENDER_TARGET) {
            warn!("CreateRenderTargetView: resource {} is not a render target", resource.id);
            return;
        }
        if format.is_typeless() || !rdesc.format.is_view_compatible(format) {
            warn!("CreateRenderTargetView: {:?} cannot view {:?}", format, rdesc.format);
            return;
        }
        if subresource >= resource.subresource_count() {
            warn!("CreateRenderTargetView: sub-resource {} out of range", subresource);
            return;
        }
        self.write_descriptor(
            dest,
            DescriptorHeapType::Rtv,
            Descriptor::RenderTarget(RenderTargetView {
                resource,
                format,
                subresource,
            }),
        );
    }

    fn create_depth_stencil_view(
        &self,
        resource: Option<&dyn Resource>,
        desc: Option<&DepthStencilViewDesc>,
        dest: CpuDescriptorHandle,
    ) {
        let Some(resource) = Self::resolve(resource) else {
            self.write_descriptor(dest, DescriptorHeapType::Dsv, Descriptor::Empty);
            return;
        };
        let rdesc = resource.resource_desc();
        let (format, flags, subresource) = match desc {
            Some(d) if d.format != Format::UNKNOWN => (d.format, d.flags, d.mip_slice),
            Some(d) => (rdesc.format, d.flags, d.mip_slice),
            None => (rdesc.format, DsvFlags::NONE, 0),
        };
        if !rdesc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) || !format.is_depth_stencil() {
            warn!(
                "CreateDepthStencilView: {:?} view of resource {} is invalid",
                format, resource.id
            );
            return;
        }
        if subresource >= resource.subresource_count() {
            warn!("CreateDepthStencilView: sub-resource {} out of range", subresource);
            return;
        }
        self.write_descriptor(
            dest,
            DescriptorHeapType::Dsv,
            Descriptor::DepthStencil(DepthStencilView {
                resource,
                format,
                flags,
                subresource,
            }),
        );
    }

    fn create_shader_resource_view(
        &self,
        resource: Option<&dyn Resource>,
        desc: Option<&ShaderResourceViewDesc>,
        dest: CpuDescriptorHandle,
    ) {
        let resource = Self::resolve(resource);
        if resource.is_none() && desc.is_none() {
            warn!("CreateShaderResourceView: null view without a description");
            return;
        }
        if let Some(r) = &resource {
            if r.resource_desc().flags.contains(ResourceFlags::DENY_SHADER_RESOURCE) {
                warn!("CreateShaderResourceView: resource {} denies shader access", r.id);
                return;
            }
        }
        self.write_descriptor(dest, DescriptorHeapType::CbvSrvUav, Descriptor::ShaderResource);
    }

    fn create_unordered_access_view(
        &self,
        resource: Option<&dyn Resource>,
        _counter: Option<&dyn Resource>,
        desc: Option<&UnorderedAccessViewDesc>,
        dest: CpuDescriptorHandle,
    ) {
        let resource = Self::resolve(resource);
        if resource.is_none() && desc.is_none() {
            warn!("CreateUnorderedAccessView: null view without a description");
            return;
        }
        if let Some(r) = &resource {
            if !r.resource_desc().flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS) {
                warn!("CreateUnorderedAccessView: resource {} lacks UAV access", r.id);
                return;
            }
        }
        self.write_descriptor(dest, DescriptorHeapType::CbvSrvUav, Descriptor::UnorderedAccess);
    }

    fn create_constant_buffer_view(
        &self,
        desc: Option<&ConstantBufferViewDesc>,
        dest: CpuDescriptorHandle,
    ) {
        let size = desc.map_or(0, |d| d.size_in_bytes);
        if size % 256 != 0 || size > MAX_CONSTANT_BUFFER_SIZE {
            warn!("CreateConstantBufferView: size {} is invalid", size);
            return;
        }
        self.write_descriptor(dest, DescriptorHeapType::CbvSrvUav, Descriptor::ConstantBuffer);
    }

    fn create_sampler(&self, _desc: &SamplerDesc, dest: CpuDescriptorHandle) {
        self.write_descriptor(dest, DescriptorHeapType::Sampler, Descriptor::Sampler);
    }

    fn create_root_signature(
        &self,
        node_mask: u32,
        blob: &[u8],
    ) -> ApiResult<ComPtr<dyn RootSignature>> {
        if node_mask > 1 {
            return Err(Hresult::E_INVALIDARG);
        }
        let desc = rts0::deserialize(blob).map_err(|e| {
            warn!("CreateRootSignature: {}", e);
            Hresult::E_INVALIDARG
        })?;
        if desc.dword_cost() > MAX_ROOT_COST {
            warn!(
                "CreateRootSignature: cost {} exceeds {} DWORDs",
                desc.dword_cost(),
                MAX_ROOT_COST
            );
            return Err(Hresult::E_INVALIDARG);
        }
        let rs = ReferenceRootSignature::new(self.arc()?, self.allocate_id(), desc);
        Ok(self.adopt(rs as Arc<dyn RootSignature>))
    }

    fn create_graphics_pipeline_state(
        &self,
        desc: &GraphicsPipelineStateDesc<'_>,
    ) -> ApiResult<ComPtr<dyn PipelineState>> {
        let root_signature = desc
            .root_signature
            .and_then(ReferenceRootSignature::from_interface)
            .ok_or(Hresult::E_INVALIDARG)?;
        if desc.vs.is_empty() {
            warn!("CreateGraphicsPipelineState: no vertex shader");
            return Err(Hresult::E_INVALIDARG);
        }
        for stage in [desc.vs, desc.ps, desc.ds, desc.hs, desc.gs] {
            if !stage.is_empty() {
                check_bytecode(stage.code)?;
            }
        }
        if desc.primitive_topology_type == PrimitiveTopologyType::Undefined {
            return Err(Hresult::E_INVALIDARG);
        }
        check_render_target_count(desc.num_render_targets)?;
        let rtv_formats = desc.rtv_formats[..desc.num_render_targets as usize].to_vec();
        if rtv_formats.iter().any(|f| f.is_depth_stencil() || f.is_typeless()) {
            warn!("CreateGraphicsPipelineState: bad render target formats {:?}", rtv_formats);
            return Err(Hresult::E_INVALIDARG);
        }
        if desc.dsv_format != Format::UNKNOWN && !desc.dsv_format.is_depth_stencil() {
            return Err(Hresult::E_INVALIDARG);
        }
        let program = classify_program(desc.vs.code, desc.ps.code);
        let kind = PipelineKind::Graphics(GraphicsState {
            topology_type: desc.primitive_topology_type,
            rtv_formats,
            dsv_format: desc.dsv_format,
            program,
        });
        let pso = ReferencePipelineState::new(self.arc()?, self.allocate_id(), root_signature, kind);
        Ok(self.adopt(pso as Arc<dyn PipelineState>))
    }

    fn create_compute_pipeline_state(
        &self,
        desc: &ComputePipelineStateDesc<'_>,
    ) -> ApiResult<ComPtr<dyn PipelineState>> {
        let root_signature = desc
            .root_signature
            .and_then(ReferenceRootSignature::from_interface)
            .ok_or(Hresult::E_INVALIDARG)?;
        if desc.cs.is_empty() {
            return Err(Hresult::E_INVALIDARG);
        }
        check_bytecode(desc.cs.code)?;
        let pso = ReferencePipelineState::new(
            self.arc()?,
            self.allocate_id(),
            root_signature,
            PipelineKind::Compute,
        );
        Ok(self.adopt(pso as Arc<dyn PipelineState>))
    }

    fn create_fence(&self, initial_value: u64, _flags: FenceFlags) -> ApiResult<ComPtr<dyn Fence>> {
        let fence = ReferenceFence::new(self.arc()?, self.allocate_id(), initial_value);
        Ok(self.adopt(fence as Arc<dyn Fence>))
    }

    fn get_copyable_footprints(
        &self,
        desc: &ResourceDesc,
        first_subresource: u32,
        num_subresources: u32,
        base_offset: u64,
    ) -> CopyableFootprints {
        copyable_footprints(desc, first_subresource, num_subresources, base_offset)
    }

    fn device_removed_reason(&self) -> Hresult {
        Hresult::S_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{get_refcount, CommandQueueDesc, Runtime};
    use crate::reference::ReferenceRuntime;

    fn device() -> ComPtr<dyn Device> {
        ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap()
    }

    #[test]
    fn test_children_hold_device_reference() {
        let device = device();
        assert_eq!(device.refcount(), 1);
        let queue = device
            .create_command_queue(&CommandQueueDesc::new(CommandListType::Direct))
            .unwrap();
        let fence = device.create_fence(0, FenceFlags::NONE).unwrap();
        assert_eq!(get_refcount(&*device), 3);
        drop(queue);
        assert_eq!(device.refcount(), 2);
        drop(fence);
        assert_eq!(device.refcount(), 1);
    }

    #[test]
    fn test_upload_texture_rejected() {
        let device = device();
        let desc = ResourceDesc::texture2d(4, 4, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        let result = device.create_committed_resource(
            &HeapProperties::new(HeapType::Upload),
            HeapFlags::NONE,
            &desc,
            ResourceStates::GENERIC_READ,
            None,
        );
        assert_eq!(result.err(), Some(Hresult::E_INVALIDARG));
    }

    #[test]
    fn test_readback_requires_copy_dest() {
        let device = device();
        let desc = ResourceDesc::buffer(256, ResourceFlags::NONE);
        let result = device.create_committed_resource(
            &HeapProperties::new(HeapType::Readback),
            HeapFlags::NONE,
            &desc,
            ResourceStates::GENERIC_READ,
            None,
        );
        assert_eq!(result.err(), Some(Hresult::E_INVALIDARG));
    }

    #[test]
    fn test_buffers_get_distinct_addresses() {
        let device = device();
        let desc = ResourceDesc::buffer(100, ResourceFlags::NONE);
        let heap = HeapProperties::new(HeapType::Upload);
        let a = device
            .create_committed_resource(&heap, HeapFlags::NONE, &desc, ResourceStates::GENERIC_READ, None)
            .unwrap();
        let b = device
            .create_committed_resource(&heap, HeapFlags::NONE, &desc, ResourceStates::GENERIC_READ, None)
            .unwrap();
        assert_ne!(a.gpu_virtual_address(), 0);
        assert_eq!(
            b.gpu_virtual_address() - a.gpu_virtual_address(),
            DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT
        );
    }

    #[test]
    fn test_zero_mip_levels_match_footprints() {
        let device = device();
        let mut desc = ResourceDesc::texture2d(64, 16, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 0;
        let texture = device
            .create_committed_resource(
                &HeapProperties::new(HeapType::Default),
                HeapFlags::NONE,
                &desc,
                ResourceStates::COPY_DEST,
                None,
            )
            .unwrap();
        assert_eq!(texture.desc().mip_levels, 7);
        let count = texture.desc().subresource_count();
        assert_eq!(desc.subresource_count(), count);
        assert_eq!(
            device.get_copyable_footprints(&desc, 0, count, 0),
            device.get_copyable_footprints(&texture.desc(), 0, count, 0)
        );

        desc.mip_levels = 8;
        let result = device.create_committed_resource(
            &HeapProperties::new(HeapType::Default),
            HeapFlags::NONE,
            &desc,
            ResourceStates::COPY_DEST,
            None,
        );
        assert_eq!(result.err(), Some(Hresult::E_INVALIDARG));
    }

    #[test]
    fn test_footprints_of_oversized_chain_do_not_panic() {
        let device = device();
        let mut desc = ResourceDesc::texture2d(1, 1, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 40;
        let fp = device.get_copyable_footprints(&desc, 35, 1, 0);
        assert_eq!(fp.layouts[0].footprint.width, 1);
        let fp = device.get_copyable_footprints(&desc, 39, 2, 0);
        assert_eq!(fp.total_bytes, u64::MAX);
    }

    #[test]
    fn test_shader_visible_rtv_heap_rejected() {
        let device = device();
        let desc = DescriptorHeapDesc {
            heap_type: DescriptorHeapType::Rtv,
            num_descriptors: 1,
            flags: DescriptorHeapFlags::SHADER_VISIBLE,
            node_mask: 0,
        };
        assert_eq!(device.create_descriptor_heap(&desc).err(), Some(Hresult::E_INVALIDARG));
    }

    #[test]
    fn test_bundle_allocator_not_implemented() {
        let device = device();
        assert_eq!(
            device.create_command_allocator(CommandListType::Bundle).err(),
            Some(Hresult::E_NOTIMPL)
        );
    }

    #[test]
    fn test_rtv_written_to_heap() {
        let device = device();
        let heap = device
            .create_descriptor_heap(&DescriptorHeapDesc {
                heap_type: DescriptorHeapType::Rtv,
                num_descriptors: 2,
                flags: DescriptorHeapFlags::NONE,
                node_mask: 0,
            })
            .unwrap();
        let desc = ResourceDesc::texture2d(8, 8, Format::R8G8B8A8_UNORM, ResourceFlags::ALLOW_RENDER_TARGET);
        let texture = device
            .create_committed_resource(
                &HeapProperties::new(HeapType::Default),
                HeapFlags::NONE,
                &desc,
                ResourceStates::RENDER_TARGET,
                None,
            )
            .unwrap();
        let handle = heap
            .cpu_descriptor_handle_for_heap_start()
            .offset(1, device.descriptor_handle_increment_size(DescriptorHeapType::Rtv));
        device.create_render_target_view(Some(&*texture), None, handle);

        let reference = device.as_any().downcast_ref::<ReferenceDevice>().unwrap();
        assert!(matches!(
            reference.read_descriptor(handle),
            Some(Descriptor::RenderTarget(_))
        ));
        assert!(matches!(
            reference.read_descriptor(heap.cpu_descriptor_handle_for_heap_start()),
            Some(Descriptor::Empty)
        ));
    }
}
