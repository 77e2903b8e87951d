//! Interface traits of the object model.
//!
//! Each trait is the capability table of one interface. Recording methods on
//! [`GraphicsCommandList`] do not return status; errors in a recording are
//! reported by [`GraphicsCommandList::close`].

use std::ops::Range;
use std::ptr::NonNull;

use crate::api::com::{ComPtr, Unknown};
use crate::api::root_signature::{
    RootSignatureDesc, RootSignatureVersion, VersionedRootSignatureDesc,
};
use crate::api::types::*;
use crate::error::{ApiResult, Hresult};
use crate::platform::Event;

/// Entry points of a library implementing the API.
pub trait Runtime: Send + Sync {
    /// Human-readable name of the implementation.
    fn name(&self) -> &str;

    fn create_device(&self, options: &DeviceOptions) -> ApiResult<ComPtr<dyn Device>>;

    /// Encode a version 1.0 description into a root signature blob.
    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> ApiResult<Vec<u8>>;

    fn serialize_versioned_root_signature(
        &self,
        desc: &VersionedRootSignatureDesc,
    ) -> ApiResult<Vec<u8>>;

    fn create_root_signature_deserializer(
        &self,
        blob: &[u8],
    ) -> ApiResult<ComPtr<dyn RootSignatureDeserializer>>;

    fn create_versioned_root_signature_deserializer(
        &self,
        blob: &[u8],
    ) -> ApiResult<ComPtr<dyn RootSignatureDeserializer>>;
}

pub trait Device: Unknown {
    fn create_command_queue(&self, desc: &CommandQueueDesc) -> ApiResult<ComPtr<dyn CommandQueue>>;

    fn create_command_allocator(
        &self,
        list_type: CommandListType,
    ) -> ApiResult<ComPtr<dyn CommandAllocator>>;

    /// Create a list in the recording state on `allocator`.
    fn create_command_list(
        &self,
        node_mask: u32,
        list_type: CommandListType,
        allocator: &dyn CommandAllocator,
        initial_state: Option<&dyn PipelineState>,
    ) -> ApiResult<ComPtr<dyn GraphicsCommandList>>;

    fn create_committed_resource(
        &self,
        heap_properties: &HeapProperties,
        heap_flags: HeapFlags,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        optimized_clear_value: Option<&ClearValue>,
    ) -> ApiResult<ComPtr<dyn Resource>>;

    fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> ApiResult<ComPtr<dyn DescriptorHeap>>;

    fn descriptor_handle_increment_size(&self, heap_type: DescriptorHeapType) -> u32;

    fn create_render_target_view(
        &self,
        resource: Option<&dyn Resource>,
        desc: Option<&RenderTargetViewDesc>,
        dest: CpuDescriptorHandle,
    );

    fn create_depth_stencil_view(
        &self,
        resource: Option<&dyn Resource>,
        desc: Option<&DepthStencilViewDesc>,
        dest: CpuDescriptorHandle,
    );

    fn create_shader_resource_view(
        &self,
        resource: Option<&dyn Resource>,
        desc: Option<&ShaderResourceViewDesc>,
        dest: CpuDescriptorHandle,
    );

    fn create_unordered_access_view(
        &self,
        resource: Option<&dyn Resource>,
        counter: Option<&dyn Resource>,
        desc: Option<&UnorderedAccessViewDesc>,
        dest: CpuDescriptorHandle,
    );

    fn create_constant_buffer_view(
        &self,
        desc: Option<&ConstantBufferViewDesc>,
        dest: CpuDescriptorHandle,
    );

    fn create_sampler(&self, desc: &SamplerDesc, dest: CpuDescriptorHandle);

    fn create_root_signature(
        &self,
        node_mask: u32,
        blob: &[u8],
    ) -> ApiResult<ComPtr<dyn RootSignature>>;

    fn create_graphics_pipeline_state(
        &self,
        desc: &GraphicsPipelineStateDesc<'_>,
    ) -> ApiResult<ComPtr<dyn PipelineState>>;

    fn create_compute_pipeline_state(
        &self,
        desc: &ComputePipelineStateDesc<'_>,
    ) -> ApiResult<ComPtr<dyn PipelineState>>;

    fn create_fence(&self, initial_value: u64, flags: FenceFlags) -> ApiResult<ComPtr<dyn Fence>>;

    /// Layout of `num_subresources` sub-resources of `desc` in a buffer
    /// starting at `base_offset`. An invalid range fills every output with
    /// all-ones.
    fn get_copyable_footprints(
        &self,
        desc: &ResourceDesc,
        first_subresource: u32,
        num_subresources: u32,
        base_offset: u64,
    ) -> CopyableFootprints;

    /// `S_OK` while the device is healthy.
    fn device_removed_reason(&self) -> Hresult;
}

pub trait CommandQueue: Unknown {
    fn desc(&self) -> CommandQueueDesc;

    /// Submit closed lists; they execute in submission order.
    fn execute_command_lists(&self, lists: &[&dyn GraphicsCommandList]);

    /// Set `fence` to `value` once all prior work on this queue completes.
    fn signal(&self, fence: &dyn Fence, value: u64) -> ApiResult<()>;

    /// Hold later work on this queue until `fence` reaches `value`.
    fn wait(&self, fence: &dyn Fence, value: u64) -> ApiResult<()>;
}

pub trait CommandAllocator: Unknown {
    fn list_type(&self) -> CommandListType;

    /// Reclaim memory. Fails while a list recorded on this allocator is open.
    fn reset(&self) -> ApiResult<()>;
}

pub trait GraphicsCommandList: Unknown {
    fn list_type(&self) -> CommandListType;

    fn close(&self) -> ApiResult<()>;

    fn reset(
        &self,
        allocator: &dyn CommandAllocator,
        initial_state: Option<&dyn PipelineState>,
    ) -> ApiResult<()>;

    fn copy_buffer_region(
        &self,
        dst: &dyn Resource,
        dst_offset: u64,
        src: &dyn Resource,
        src_offset: u64,
        num_bytes: u64,
    );

    fn copy_texture_region(
        &self,
        dst: &TextureCopyLocation<'_>,
        dst_x: u32,
        dst_y: u32,
        dst_z: u32,
        src: &TextureCopyLocation<'_>,
        src_box: Option<&CopyBox>,
    );

    fn copy_resource(&self, dst: &dyn Resource, src: &dyn Resource);

    fn resource_barrier(&self, barriers: &[ResourceBarrier<'_>]);

    fn clear_render_target_view(&self, rtv: CpuDescriptorHandle, color: [f32; 4], rects: &[Rect]);

    fn clear_depth_stencil_view(
        &self,
        dsv: CpuDescriptorHandle,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
        rects: &[Rect],
    );

    fn om_set_render_targets(&self, rtvs: &[CpuDescriptorHandle], dsv: Option<CpuDescriptorHandle>);

    fn rs_set_viewports(&self, viewports: &[Viewport]);

    fn rs_set_scissor_rects(&self, rects: &[Rect]);

    fn ia_set_primitive_topology(&self, topology: PrimitiveTopology);

    fn set_pipeline_state(&self, pipeline_state: &dyn PipelineState);

    fn set_graphics_root_signature(&self, root_signature: Option<&dyn RootSignature>);

    fn set_compute_root_signature(&self, root_signature: Option<&dyn RootSignature>);

    fn set_descriptor_heaps(&self, heaps: &[&dyn DescriptorHeap]);

    fn set_graphics_root_descriptor_table(&self, index: u32, base: GpuDescriptorHandle);

    fn set_compute_root_descriptor_table(&self, index: u32, base: GpuDescriptorHandle);

    fn set_graphics_root_32bit_constants(&self, index: u32, values: &[u32], dest_offset: u32);

    fn set_compute_root_32bit_constants(&self, index: u32, values: &[u32], dest_offset: u32);

    fn set_graphics_root_constant_buffer_view(&self, index: u32, address: u64);

    fn set_compute_root_constant_buffer_view(&self, index: u32, address: u64);

    fn set_graphics_root_shader_resource_view(&self, index: u32, address: u64);

    fn set_compute_root_shader_resource_view(&self, index: u32, address: u64);

    fn set_graphics_root_unordered_access_view(&self, index: u32, address: u64);

    fn set_compute_root_unordered_access_view(&self, index: u32, address: u64);

    fn draw_instanced(
        &self,
        vertex_count_per_instance: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );

    fn dispatch(&self, x: u32, y: u32, z: u32);
}

pub trait Fence: Unknown {
    fn completed_value(&self) -> u64;

    /// Host-side signal; observable immediately.
    fn signal(&self, value: u64) -> ApiResult<()>;

    /// Set `event` once the fence reaches `value`. With no event, block the
    /// calling thread until then.
    fn set_event_on_completion(&self, value: u64, event: Option<&Event>) -> ApiResult<()>;
}

pub trait Resource: Unknown {
    fn desc(&self) -> ResourceDesc;

    fn heap_properties(&self) -> ApiResult<(HeapProperties, HeapFlags)>;

    /// Pointer to the start of `subresource`. `read_range` is advisory.
    fn map(&self, subresource: u32, read_range: Option<Range<usize>>) -> ApiResult<NonNull<u8>>;

    fn unmap(&self, subresource: u32, written_range: Option<Range<usize>>);

    /// Zero for textures.
    fn gpu_virtual_address(&self) -> u64;
}

pub trait DescriptorHeap: Unknown {
    fn desc(&self) -> DescriptorHeapDesc;

    fn cpu_descriptor_handle_for_heap_start(&self) -> CpuDescriptorHandle;

    /// Fails unless the heap is shader visible.
    fn gpu_descriptor_handle_for_heap_start(&self) -> ApiResult<GpuDescriptorHandle>;
}

pub trait RootSignature: Unknown {}

pub trait PipelineState: Unknown {}

/// Decoded view of a root signature blob. The same object answers both the
/// plain and the versioned deserializer interface.
pub trait RootSignatureDeserializer: Unknown {
    /// The description converted to version 1.0.
    fn root_signature_desc(&self) -> RootSignatureDesc;

    fn root_signature_desc_at_version(
        &self,
        version: RootSignatureVersion,
    ) -> ApiResult<VersionedRootSignatureDesc>;

    /// The description at the version it was encoded with.
    fn unconverted_root_signature_desc(&self) -> VersionedRootSignatureDesc;
}
