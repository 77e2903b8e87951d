//! Command allocators and command lists.
//!
//! A list moves between `Recording`, `Closed` and `InFlight`. Recording
//! methods validate as they go; the first error is remembered and reported
//! by `close`. Resource states are tracked per list and published to the
//! resources when the list is submitted.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::descriptor::{heap_id_of, DepthStencilView, Descriptor, ReferenceDescriptorHeap, RenderTargetView};
use super::device::ReferenceDevice;
use super::layout::DepthStencilWrite;
use super::pipeline::{PipelineKind, ReferencePipelineState, ReferenceRootSignature};
use super::resource::ReferenceResource;
use crate::api::{
    iid, ClearFlags, ComObject, ComPtr, CommandAllocator, CommandListType, CopyBox,
    CpuDescriptorHandle, DescriptorHeap, DsvFlags, Format, GpuDescriptorHandle, GraphicsCommandList, Guid, HeapType,
    PipelineState, PlacedSubresourceFootprint, PrimitiveTopology, Rect, RefCount, Resource,
    ResourceBarrier, ResourceFlags, ResourceStates, RootSignature, TextureCopyLocation, Unknown,
    Viewport, ALL_SUBRESOURCES,
};
use crate::error::{ApiResult, Hresult};

pub struct ReferenceCommandAllocator {
    self_ref: Weak<ReferenceCommandAllocator>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    list_type: CommandListType,
    /// Id of the list currently recording into this allocator.
    open_list: Mutex<Option<u32>>,
}

impl ReferenceCommandAllocator {
    pub(crate) fn new(device: Arc<ReferenceDevice>, id: u32, list_type: CommandListType) -> Arc<Self> {
        debug!("CreateCommandAllocator: id={}, {:?}", id, list_type);
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            list_type,
            open_list: Mutex::new(None),
        })
    }

    pub(crate) fn from_interface(allocator: &dyn CommandAllocator) -> Option<Arc<ReferenceCommandAllocator>> {
        allocator
            .as_any()
            .downcast_ref::<ReferenceCommandAllocator>()
            .and_then(|a| a.self_ref.upgrade())
    }

    /// Claim the allocator for `list_id`. Fails if another list is open on it.
    pub(crate) fn acquire(&self, list_id: u32) -> ApiResult<()> {
        let mut open = self.open_list.lock();
        match *open {
            Some(other) if other != list_id => {
                warn!(
                    "Allocator {} is in use by open command list {}",
                    self.id, other
                );
                Err(Hresult::E_INVALIDARG)
            }
            _ => {
                *open = Some(list_id);
                Ok(())
            }
        }
    }

    pub(crate) fn release_list(&self, list_id: u32) {
        let mut open = self.open_list.lock();
        if *open == Some(list_id) {
            *open = None;
        }
    }

    fn final_release(&self) {
        debug!("Command allocator {} released", self.id);
        self.device.release();
    }
}

impl_unknown!(
    ReferenceCommandAllocator,
    CommandAllocator,
    [iid::OBJECT, iid::DEVICE_CHILD, iid::PAGEABLE, iid::COMMAND_ALLOCATOR]
);

impl CommandAllocator for ReferenceCommandAllocator {
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&self) -> ApiResult<()> {
        let open = self.open_list.lock();
        if let Some(list) = *open {
            warn!(
                "Reset of allocator {} while command list {} is recording",
                self.id, list
            );
            return Err(Hresult::E_FAIL);
        }
        debug!("Allocator {} reset", self.id);
        Ok(())
    }
}

/// One side of a recorded texture copy.
#[derive(Clone)]
pub enum CopyLocation {
    Subresource {
        resource: Arc<ReferenceResource>,
        index: u32,
    },
    Footprint {
        resource: Arc<ReferenceResource>,
        footprint: PlacedSubresourceFootprint,
    },
}

/// Output-merger and rasterizer state captured by a draw.
#[derive(Clone)]
pub struct DrawState {
    pub render_targets: Vec<RenderTargetView>,
    pub viewports: Vec<Viewport>,
    pub scissors: Vec<Rect>,
    pub pipeline: Option<Arc<ReferencePipelineState>>,
    pub topology: PrimitiveTopology,
}

pub enum Command {
    CopyBuffer {
        dst: Arc<ReferenceResource>,
        dst_offset: u64,
        src: Arc<ReferenceResource>,
        src_offset: u64,
        len: u64,
    },
    CopyTexture {
        dst: CopyLocation,
        dst_origin: [u32; 3],
        src: CopyLocation,
        src_box: Option<CopyBox>,
    },
    CopyResource {
        dst: Arc<ReferenceResource>,
        src: Arc<ReferenceResource>,
    },
    ClearRenderTarget {
        view: RenderTargetView,
        color: [f32; 4],
        rects: Vec<Rect>,
    },
    ClearDepthStencil {
        view: DepthStencilView,
        write: DepthStencilWrite,
        rects: Vec<Rect>,
    },
    Draw {
        state: Arc<DrawState>,
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch {
        groups: [u32; 3],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Recording,
    Closed,
    InFlight,
}

struct Recording {
    state: ListState,
    allocator: Option<Arc<ReferenceCommandAllocator>>,
    commands: Vec<Command>,
    /// Commands of the last successful close, shared with submissions.
    closed: Arc<Vec<Command>>,
    error: Option<String>,
    local_states: HashMap<(u32, u32), (Arc<ReferenceResource>, ResourceStates)>,
    published: Vec<(Arc<ReferenceResource>, u32, ResourceStates)>,
    render_targets: Vec<RenderTargetView>,
    depth_stencil: Option<DepthStencilView>,
    viewports: Vec<Viewport>,
    scissors: Vec<Rect>,
    topology: PrimitiveTopology,
    pipeline: Option<Arc<ReferencePipelineState>>,
    graphics_root_signature: Option<Arc<ReferenceRootSignature>>,
    compute_root_signature: Option<Arc<ReferenceRootSignature>>,
    descriptor_heaps: Vec<Arc<ReferenceDescriptorHeap>>,
    draw_state: Option<Arc<DrawState>>,
}

impl Recording {
    fn new(allocator: Arc<ReferenceCommandAllocator>, pipeline: Option<Arc<ReferencePipelineState>>) -> Self {
        Self {
            state: ListState::Recording,
            allocator: Some(allocator),
            commands: Vec::new(),
            closed: Arc::new(Vec::new()),
            error: None,
            local_states: HashMap::new(),
            published: Vec::new(),
            render_targets: Vec::new(),
            depth_stencil: None,
            viewports: Vec::new(),
            scissors: Vec::new(),
            topology: PrimitiveTopology::Undefined,
            pipeline,
            graphics_root_signature: None,
            compute_root_signature: None,
            descriptor_heaps: Vec::new(),
            draw_state: None,
        }
    }

    fn fail(&mut self, message: String) {
        warn!("Invalid command: {}", message);
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn transition(
        &mut self,
        resource: Arc<ReferenceResource>,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    ) -> Result<(), String> {
        let id = resource.id;
        match resource.heap_type() {
            HeapType::Upload if after != ResourceStates::GENERIC_READ => {
                return Err(format!("upload resource {} must stay in GENERIC_READ", id));
            }
            HeapType::Readback if after != ResourceStates::COPY_DEST => {
                return Err(format!("readback resource {} must stay in COPY_DEST", id));
            }
            _ => {}
        }
        if !before.is_valid_combination() || !after.is_valid_combination() {
            return Err(format!("invalid state combination {:?} -> {:?}", before, after));
        }
        check_state_flags(&resource, after)?;

        let subresources = if subresource == ALL_SUBRESOURCES {
            0..resource.subresource_count()
        } else if subresource < resource.subresource_count() {
            subresource..subresource + 1
        } else {
            return Err(format!("sub-resource {} out of range for resource {}", subresource, id));
        };

        for sub in subresources {
            let current = match self.local_states.get(&(id, sub)) {
                Some((_, state)) => Some(*state),
                None => resource.state(sub),
            };
            if current != Some(before) {
                return Err(format!(
                    "resource {} sub-resource {} is in {:?}, barrier expects {:?}",
                    id, sub, current, before
                ));
            }
            self.local_states.insert((id, sub), (resource.clone(), after));
        }
        Ok(())
    }

    /// The bound pipeline must agree with the root signature, topology and
    /// output-merger bindings of the list.
    fn check_draw_bindings(&self) -> Result<(), String> {
        let pso = self.pipeline.as_ref().ok_or("no pipeline state")?;
        let PipelineKind::Graphics(graphics) = &pso.kind else {
            return Err("compute pipeline bound".to_string());
        };
        let root_signature = self
            .graphics_root_signature
            .as_ref()
            .ok_or("no graphics root signature")?;
        if !Arc::ptr_eq(root_signature, &pso.root_signature) && root_signature.desc != pso.root_signature.desc {
            return Err(format!(
                "root signature {} does not match root signature {} of pipeline {}",
                root_signature.id, pso.root_signature.id, pso.id
            ));
        }
        if self.topology.topology_type() != graphics.topology_type {
            return Err(format!(
                "topology {:?} does not match pipeline topology type {:?}",
                self.topology, graphics.topology_type
            ));
        }
        for (i, view) in self.render_targets.iter().enumerate() {
            let expected = graphics.rtv_formats.get(i).copied().unwrap_or(Format::UNKNOWN);
            if view.format != expected {
                return Err(format!(
                    "render target {} is {:?}, pipeline expects {:?}",
                    i, view.format, expected
                ));
            }
        }
        if let Some(view) = &self.depth_stencil {
            if view.format != graphics.dsv_format {
                return Err(format!(
                    "depth-stencil view is {:?}, pipeline expects {:?}",
                    view.format, graphics.dsv_format
                ));
            }
        }
        Ok(())
    }

    fn capture_draw_state(&mut self) -> Arc<DrawState> {
        if let Some(state) = &self.draw_state {
            return state.clone();
        }
        let state = Arc::new(DrawState {
            render_targets: self.render_targets.clone(),
            viewports: self.viewports.clone(),
            scissors: self.scissors.clone(),
            pipeline: self.pipeline.clone(),
            topology: self.topology,
        });
        self.draw_state = Some(state.clone());
        state
    }

    fn invalidate_draw_state(&mut self) {
        self.draw_state = None;
    }
}

fn check_state_flags(resource: &ReferenceResource, state: ResourceStates) -> Result<(), String> {
    let flags = resource.resource_desc().flags;
    let required = [
        (ResourceStates::RENDER_TARGET, ResourceFlags::ALLOW_RENDER_TARGET),
        (ResourceStates::DEPTH_WRITE, ResourceFlags::ALLOW_DEPTH_STENCIL),
        (ResourceStates::UNORDERED_ACCESS, ResourceFlags::ALLOW_UNORDERED_ACCESS),
    ];
    for (s, f) in required {
        if state.contains(s) && !flags.contains(f) {
            return Err(format!(
                "state {:?} requires {:?} on resource {}",
                s, f, resource.id
            ));
        }
    }
    Ok(())
}

/// Check a state against the creation flags and heap of a new resource.
pub(crate) fn check_initial_state(
    heap: HeapType,
    flags: ResourceFlags,
    state: ResourceStates,
) -> ApiResult<()> {
    let ok = match heap {
        HeapType::Upload => state == ResourceStates::GENERIC_READ,
        HeapType::Readback => state == ResourceStates::COPY_DEST,
        _ => {
            state.is_valid_combination()
                && (!state.contains(ResourceStates::RENDER_TARGET)
                    || flags.contains(ResourceFlags::ALLOW_RENDER_TARGET))
                && (!state.contains(ResourceStates::DEPTH_WRITE)
                    || flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL))
                && (!state.contains(ResourceStates::UNORDERED_ACCESS)
                    || flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS))
        }
    };
    if ok {
        Ok(())
    } else {
        warn!("Initial state {:?} not allowed on {:?} heap", state, heap);
        Err(Hresult::E_INVALIDARG)
    }
}

pub struct ReferenceCommandList {
    self_ref: Weak<ReferenceCommandList>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    list_type: CommandListType,
    inner: Mutex<Recording>,
    in_flight: AtomicU32,
}

impl ReferenceCommandList {
    pub(crate) fn new(
        device: Arc<ReferenceDevice>,
        id: u32,
        list_type: CommandListType,
        allocator: Arc<ReferenceCommandAllocator>,
        pipeline: Option<Arc<ReferencePipelineState>>,
    ) -> ApiResult<Arc<Self>> {
        if allocator.list_type() != list_type {
            warn!(
                "Allocator {} is {:?}, list requested {:?}",
                allocator.id,
                allocator.list_type(),
                list_type
            );
            return Err(Hresult::E_INVALIDARG);
        }
        allocator.acquire(id)?;
        debug!("CreateCommandList: id={}, {:?}, allocator {}", id, list_type, allocator.id);
        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            list_type,
            inner: Mutex::new(Recording::new(allocator, pipeline)),
            in_flight: AtomicU32::new(0),
        }))
    }

    pub(crate) fn from_interface(list: &dyn GraphicsCommandList) -> Option<Arc<ReferenceCommandList>> {
        list.as_any()
            .downcast_ref::<ReferenceCommandList>()
            .and_then(|l| l.self_ref.upgrade())
    }

    /// Publish resource states and hand out the closed commands for
    /// execution. Returns `None` if the list cannot be submitted.
    pub(crate) fn submit(&self) -> Option<Arc<Vec<Command>>> {
        let mut rec = self.inner.lock();
        if rec.state == ListState::Recording {
            warn!("Command list {} submitted while recording", self.id);
            return None;
        }
        if let Some(error) = &rec.error {
            warn!("Command list {} submitted after failed close: {}", self.id, error);
            return None;
        }
        for (resource, sub, state) in &rec.published {
            resource.set_state(*sub, *state);
        }
        rec.state = ListState::InFlight;
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(rec.closed.clone())
    }

    /// Called by the queue once a submission of this list has executed.
    pub(crate) fn complete(&self) {
        let remaining = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|n| n - 1)
            .unwrap_or(0);
        if remaining == 0 {
            let mut rec = self.inner.lock();
            if rec.state == ListState::InFlight {
                rec.state = ListState::Closed;
            }
        }
    }

    fn record<F: FnOnce(&mut Recording)>(&self, name: &str, f: F) {
        let mut rec = self.inner.lock();
        if rec.state != ListState::Recording {
            let message = format!("{} on command list {} that is not recording", name, self.id);
            rec.fail(message);
            return;
        }
        trace!("List {}: {}", self.id, name);
        f(&mut rec);
    }

    fn resolve_resource(rec: &mut Recording, resource: &dyn Resource, what: &str) -> Option<Arc<ReferenceResource>> {
        let resolved = ReferenceResource::from_interface(resource);
        if resolved.is_none() {
            rec.fail(format!("{}: foreign resource", what));
        }
        resolved
    }

    fn resolve_location(rec: &mut Recording, location: &TextureCopyLocation<'_>) -> Option<CopyLocation> {
        let resource = Self::resolve_resource(rec, location.resource(), "CopyTextureRegion")?;
        Some(match *location {
            TextureCopyLocation::SubresourceIndex { index, .. } => {
                if resource.resource_desc().is_buffer() || index >= resource.subresource_count() {
                    rec.fail(format!("CopyTextureRegion: bad sub-resource {} of {}", index, resource.id));
                    return None;
                }
                CopyLocation::Subresource { resource, index }
            }
            TextureCopyLocation::PlacedFootprint { footprint, .. } => {
                if !resource.resource_desc().is_buffer() {
                    rec.fail(format!("CopyTextureRegion: footprint on texture {}", resource.id));
                    return None;
                }
                CopyLocation::Footprint { resource, footprint }
            }
        })
    }

    fn check_root_index(rec: &mut Recording, compute: bool, index: u32, what: &str) -> bool {
        let rs = if compute {
            &rec.compute_root_signature
        } else {
            &rec.graphics_root_signature
        };
        match rs {
            Some(rs) if index < rs.parameter_count() => true,
            Some(rs) => {
                let id = rs.id;
                rec.fail(format!("{}: root parameter {} out of range for {}", what, index, id));
                false
            }
            None => {
                rec.fail(format!("{}: no root signature bound", what));
                false
            }
        }
    }

    fn set_root_table(&self, compute: bool, index: u32, base: GpuDescriptorHandle) {
        self.record("SetRootDescriptorTable", |rec| {
            if !Self::check_root_index(rec, compute, index, "SetRootDescriptorTable") {
                return;
            }
            if !rec.descriptor_heaps.iter().any(|h| h.contains_gpu(base)) {
                rec.fail(format!(
                    "SetRootDescriptorTable: handle {:#x} is not in a bound heap",
                    base.ptr
                ));
            }
        });
    }

    fn set_root_argument(&self, compute: bool, index: u32, what: &str) {
        self.record(what, |rec| {
            Self::check_root_index(rec, compute, index, what);
        });
    }

    fn final_release(&self) {
        debug!("Command list {} released", self.id);
        let rec = self.inner.lock();
        if rec.state == ListState::Recording {
            if let Some(allocator) = &rec.allocator {
                allocator.release_list(self.id);
            }
        }
        drop(rec);
        self.device.release();
    }
}

impl_unknown!(
    ReferenceCommandList,
    GraphicsCommandList,
    [
        iid::OBJECT,
        iid::DEVICE_CHILD,
        iid::COMMAND_LIST,
        iid::GRAPHICS_COMMAND_LIST
    ]
);

impl GraphicsCommandList for ReferenceCommandList {
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn close(&self) -> ApiResult<()> {
        let mut rec = self.inner.lock();
        if rec.state != ListState::Recording {
            warn!("Close of command list {} that is not recording", self.id);
            return Err(Hresult::E_FAIL);
        }
        if let Some(allocator) = &rec.allocator {
            allocator.release_list(self.id);
        }
        rec.state = ListState::Closed;
        let commands = std::mem::take(&mut rec.commands);
        rec.closed = Arc::new(commands);
        rec.published = rec
            .local_states
            .drain()
            .map(|((_, sub), (resource, state))| (resource, sub, state))
            .collect();
        debug!("Command list {} closed with {} commands", self.id, rec.closed.len());
        match &rec.error {
            Some(error) => {
                warn!("Command list {} failed: {}", self.id, error);
                Err(Hresult::E_INVALIDARG)
            }
            None => Ok(()),
        }
    }

    fn reset(
        &self,
        allocator: &dyn CommandAllocator,
        initial_state: Option<&dyn PipelineState>,
    ) -> ApiResult<()> {
        let allocator = ReferenceCommandAllocator::from_interface(allocator).ok_or(Hresult::E_INVALIDARG)?;
        let pipeline = initial_state.and_then(ReferencePipelineState::from_interface);
        let mut rec = self.inner.lock();
        if rec.state == ListState::Recording {
            warn!("Reset of command list {} that is still recording", self.id);
            return Err(Hresult::E_FAIL);
        }
        if allocator.list_type() != self.list_type {
            return Err(Hresult::E_INVALIDARG);
        }
        allocator.acquire(self.id)?;
        let state = rec.state;
        *rec = Recording::new(allocator, pipeline);
        debug!("Command list {} reset (was {:?})", self.id, state);
        Ok(())
    }

    fn copy_buffer_region(
        &self,
        dst: &dyn Resource,
        dst_offset: u64,
        src: &dyn Resource,
        src_offset: u64,
        num_bytes: u64,
    ) {
        self.record("CopyBufferRegion", |rec| {
            let Some(dst) = Self::resolve_resource(rec, dst, "CopyBufferRegion") else {
                return;
            };
            let Some(src) = Self::resolve_resource(rec, src, "CopyBufferRegion") else {
                return;
            };
            let in_range = |r: &ReferenceResource, offset: u64| {
                r.resource_desc().is_buffer()
                    && offset
                        .checked_add(num_bytes)
                        .map_or(false, |end| end <= r.resource_desc().width)
            };
            if !in_range(&dst, dst_offset) || !in_range(&src, src_offset) {
                rec.fail(format!(
                    "CopyBufferRegion: {} bytes {}@{} -> {}@{} out of range",
                    num_bytes, src.id, src_offset, dst.id, dst_offset
                ));
                return;
            }
            rec.push(Command::CopyBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                len: num_bytes,
            });
        });
    }

    fn copy_texture_region(
        &self,
        dst: &TextureCopyLocation<'_>,
        dst_x: u32,
        dst_y: u32,
        dst_z: u32,
        src: &TextureCopyLocation<'_>,
        src_box: Option<&CopyBox>,
    ) {
        self.record("CopyTextureRegion", |rec| {
            let Some(dst) = Self::resolve_location(rec, dst) else {
                return;
            };
            let Some(src) = Self::resolve_location(rec, src) else {
                return;
            };
            if matches!(
                (&dst, &src),
                (CopyLocation::Footprint { .. }, CopyLocation::Footprint { .. })
            ) {
                rec.fail("CopyTextureRegion: buffer to buffer".to_string());
                return;
            }
            rec.push(Command::CopyTexture {
                dst,
                dst_origin: [dst_x, dst_y, dst_z],
                src,
                src_box: src_box.copied(),
            });
        });
    }

    fn copy_resource(&self, dst: &dyn Resource, src: &dyn Resource) {
        self.record("CopyResource", |rec| {
            let Some(dst) = Self::resolve_resource(rec, dst, "CopyResource") else {
                return;
            };
            let Some(src) = Self::resolve_resource(rec, src, "CopyResource") else {
                return;
            };
            let (d, s) = (dst.resource_desc(), src.resource_desc());
            if d.dimension != s.dimension
                || d.width != s.width
                || d.height != s.height
                || d.depth_or_array_size != s.depth_or_array_size
                || d.mip_levels != s.mip_levels
                || !d.format.is_view_compatible(s.format)
            {
                rec.fail(format!("CopyResource: {} and {} differ", dst.id, src.id));
                return;
            }
            rec.push(Command::CopyResource { dst, src });
        });
    }

    fn resource_barrier(&self, barriers: &[ResourceBarrier<'_>]) {
        self.record("ResourceBarrier", |rec| {
            for barrier in barriers {
                match *barrier {
                    ResourceBarrier::Transition {
                        resource,
                        subresource,
                        before,
                        after,
                    } => {
                        let Some(resource) = Self::resolve_resource(rec, resource, "ResourceBarrier") else {
                            continue;
                        };
                        if let Err(message) = rec.transition(resource, subresource, before, after) {
                            rec.fail(format!("ResourceBarrier: {}", message));
                        }
                    }
                    ResourceBarrier::Uav { resource } => {
                        if let Some(resource) = resource {
                            Self::resolve_resource(rec, resource, "ResourceBarrier");
                        }
                    }
                }
            }
        });
    }

    fn clear_render_target_view(&self, rtv: CpuDescriptorHandle, color: [f32; 4], rects: &[Rect]) {
        self.record("ClearRenderTargetView", |rec| {
            match self.device.read_descriptor(rtv) {
                Some(Descriptor::RenderTarget(view)) => rec.push(Command::ClearRenderTarget {
                    view,
                    color,
                    rects: rects.to_vec(),
                }),
                _ => rec.fail(format!("ClearRenderTargetView: {:#x} is not an RTV", rtv.ptr)),
            }
        });
    }

    fn clear_depth_stencil_view(
        &self,
        dsv: CpuDescriptorHandle,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
        rects: &[Rect],
    ) {
        self.record("ClearDepthStencilView", |rec| {
            match self.device.read_descriptor(dsv) {
                Some(Descriptor::DepthStencil(view)) => {
                    let read_only = (flags.contains(ClearFlags::DEPTH) && view.flags.contains(DsvFlags::READ_ONLY_DEPTH))
                        || (flags.contains(ClearFlags::STENCIL) && view.flags.contains(DsvFlags::READ_ONLY_STENCIL));
                    if read_only {
                        rec.fail(format!("ClearDepthStencilView: {:#x} is read-only for {:?}", dsv.ptr, flags));
                        return;
                    }
                    let write = DepthStencilWrite {
                        depth: flags.contains(ClearFlags::DEPTH).then_some(depth),
                        stencil: flags.contains(ClearFlags::STENCIL).then_some(stencil),
                    };
                    rec.push(Command::ClearDepthStencil {
                        view,
                        write,
                        rects: rects.to_vec(),
                    });
                }
                _ => rec.fail(format!("ClearDepthStencilView: {:#x} is not a DSV", dsv.ptr)),
            }
        });
    }

    fn om_set_render_targets(&self, rtvs: &[CpuDescriptorHandle], dsv: Option<CpuDescriptorHandle>) {
        self.record("OMSetRenderTargets", |rec| {
            let mut views = Vec::with_capacity(rtvs.len());
            for handle in rtvs {
                match self.device.read_descriptor(*handle) {
                    Some(Descriptor::RenderTarget(view)) => views.push(view),
                    _ => {
                        rec.fail(format!("OMSetRenderTargets: {:#x} is not an RTV", handle.ptr));
                        return;
                    }
                }
            }
            rec.render_targets = views;
            rec.depth_stencil = match dsv.map(|h| self.device.read_descriptor(h)) {
                Some(Some(Descriptor::DepthStencil(view))) => Some(view),
                Some(_) => {
                    rec.fail("OMSetRenderTargets: bad DSV handle".to_string());
                    None
                }
                None => None,
            };
            rec.invalidate_draw_state();
        });
    }

    fn rs_set_viewports(&self, viewports: &[Viewport]) {
        self.record("RSSetViewports", |rec| {
            rec.viewports = viewports.to_vec();
            rec.invalidate_draw_state();
        });
    }

    fn rs_set_scissor_rects(&self, rects: &[Rect]) {
        self.record("RSSetScissorRects", |rec| {
            rec.scissors = rects.to_vec();
            rec.invalidate_draw_state();
        });
    }

    fn ia_set_primitive_topology(&self, topology: PrimitiveTopology) {
        self.record("IASetPrimitiveTopology", |rec| {
            rec.topology = topology;
            rec.invalidate_draw_state();
        });
    }

    fn set_pipeline_state(&self, pipeline_state: &dyn PipelineState) {
        self.record("SetPipelineState", |rec| {
            match ReferencePipelineState::from_interface(pipeline_state) {
                Some(pso) => rec.pipeline = Some(pso),
                None => rec.fail("SetPipelineState: foreign pipeline state".to_string()),
            }
            rec.invalidate_draw_state();
        });
    }

    fn set_graphics_root_signature(&self, root_signature: Option<&dyn RootSignature>) {
        self.record("SetGraphicsRootSignature", |rec| {
            rec.graphics_root_signature = root_signature.and_then(ReferenceRootSignature::from_interface);
        });
    }

    fn set_compute_root_signature(&self, root_signature: Option<&dyn RootSignature>) {
        self.record("SetComputeRootSignature", |rec| {
            rec.compute_root_signature = root_signature.and_then(ReferenceRootSignature::from_interface);
        });
    }

    fn set_descriptor_heaps(&self, heaps: &[&dyn DescriptorHeap]) {
        self.record("SetDescriptorHeaps", |rec| {
            let resolved: Vec<_> = heaps
                .iter()
                .filter_map(|h| ReferenceDescriptorHeap::from_interface(*h))
                .collect();
            if resolved.len() != heaps.len() {
                rec.fail("SetDescriptorHeaps: foreign heap".to_string());
                return;
            }
            let mut types: Vec<_> = resolved.iter().map(|h| h.desc().heap_type).collect();
            types.sort_by_key(|t| u32::from(*t));
            types.dedup();
            if types.len() != resolved.len() {
                rec.fail("SetDescriptorHeaps: more than one heap of a type".to_string());
                return;
            }
            for heap in &resolved {
                if heap.gpu_descriptor_handle_for_heap_start().is_err() {
                    rec.fail(format!(
                        "SetDescriptorHeaps: heap {} is not shader visible",
                        heap_id_of(heap.cpu_descriptor_handle_for_heap_start().ptr)
                    ));
                    return;
                }
            }
            rec.descriptor_heaps = resolved;
        });
    }

    fn set_graphics_root_descriptor_table(&self, index: u32, base: GpuDescriptorHandle) {
        self.set_root_table(false, index, base);
    }

    fn set_compute_root_descriptor_table(&self, index: u32, base: GpuDescriptorHandle) {
        self.set_root_table(true, index, base);
    }

    fn set_graphics_root_32bit_constants(&self, index: u32, _values: &[u32], _dest_offset: u32) {
        self.set_root_argument(false, index, "SetGraphicsRoot32BitConstants");
    }

    fn set_compute_root_32bit_constants(&self, index: u32, _values: &[u32], _dest_offset: u32) {
        self.set_root_argument(true, index, "SetComputeRoot32BitConstants");
    }

    fn set_graphics_root_constant_buffer_view(&self, index: u32, _address: u64) {
        self.set_root_argument(false, index, "SetGraphicsRootConstantBufferView");
    }

    fn set_compute_root_constant_buffer_view(&self, index: u32, _address: u64) {
        self.set_root_argument(true, index, "SetComputeRootConstantBufferView");
    }

    fn set_graphics_root_shader_resource_view(&self, index: u32, _address: u64) {
        self.set_root_argument(false, index, "SetGraphicsRootShaderResourceView");
    }

    fn set_compute_root_shader_resource_view(&self, index: u32, _address: u64) {
        self.set_root_argument(true, index, "SetComputeRootShaderResourceView");
    }

    fn set_graphics_root_unordered_access_view(&self, index: u32, _address: u64) {
        self.set_root_argument(false, index, "SetGraphicsRootUnorderedAccessView");
    }

    fn set_compute_root_unordered_access_view(&self, index: u32, _address: u64) {
        self.set_root_argument(true, index, "SetComputeRootUnorderedAccessView");
    }

    fn draw_instanced(
        &self,
        vertex_count_per_instance: u32,
        instance_count: u32,
        _start_vertex: u32,
        _start_instance: u32,
    ) {
        self.record("DrawInstanced", |rec| {
            if let Err(message) = rec.check_draw_bindings() {
                rec.fail(format!("DrawInstanced: {}", message));
                return;
            }
            let state = rec.capture_draw_state();
            rec.push(Command::Draw {
                state,
                vertex_count: vertex_count_per_instance,
                instance_count,
            });
        });
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        self.record("Dispatch", |rec| {
            // An empty grid does no work and needs no bindings.
            if x == 0 || y == 0 || z == 0 {
                return;
            }
            match &rec.pipeline {
                Some(pso) if matches!(pso.kind, PipelineKind::Compute) => {}
                _ => {
                    rec.fail("Dispatch: no compute pipeline state".to_string());
                    return;
                }
            }
            if rec.compute_root_signature.is_none() {
                rec.fail("Dispatch: no compute root signature".to_string());
                return;
            }
            rec.push(Command::Dispatch { groups: [x, y, z] });
        });
    }
}
