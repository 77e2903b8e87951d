//! Descriptor heaps and the views written into them.
//!
//! A CPU handle encodes `heap_id << 32 | slot * increment`; GPU handles set
//! the top bit as well so the two spaces never overlap.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::device::ReferenceDevice;
use super::resource::ReferenceResource;
use crate::api::{
    iid, ComObject, ComPtr, CpuDescriptorHandle, DescriptorHeap, DescriptorHeapDesc,
    DescriptorHeapFlags, DsvFlags, Format, GpuDescriptorHandle, Guid, RefCount,
    Unknown,
};
use crate::error::{ApiResult, Hresult};

/// Size of one descriptor slot, for every heap type.
pub const DESCRIPTOR_INCREMENT: u32 = 32;

const GPU_HANDLE_BIT: u64 = 1 << 63;

/// A render target view resolved to its texture sub-resource.
#[derive(Clone)]
pub struct RenderTargetView {
    pub resource: Arc<ReferenceResource>,
    pub format: Format,
    pub subresource: u32,
}

#[derive(Clone)]
pub struct DepthStencilView {
    pub resource: Arc<ReferenceResource>,
    pub format: Format,
    pub flags: DsvFlags,
    pub subresource: u32,
}

/// Contents of one heap slot.
#[derive(Clone, Default)]
pub enum Descriptor {
    #[default]
    Empty,
    RenderTarget(RenderTargetView),
    DepthStencil(DepthStencilView),
    ShaderResource,
    UnorderedAccess,
    ConstantBuffer,
    Sampler,
}

pub struct ReferenceDescriptorHeap {
    self_ref: Weak<ReferenceDescriptorHeap>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    desc: DescriptorHeapDesc,
    slots: Mutex<Vec<Descriptor>>,
}

impl ReferenceDescriptorHeap {
    pub(crate) fn new(device: Arc<ReferenceDevice>, id: u32, desc: DescriptorHeapDesc) -> Arc<Self> {
        debug!(
            "CreateDescriptorHeap: id={}, {:?} x{}",
            id, desc.heap_type, desc.num_descriptors
        );
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            desc,
            slots: Mutex::new(vec![Descriptor::Empty; desc.num_descriptors as usize]),
        })
    }

    /// Slot index addressed by `handle`, if it points into this heap.
    fn slot_index(&self, ptr: u64) -> Option<usize> {
        let ptr = ptr & !GPU_HANDLE_BIT;
        if ptr >> 32 != u64::from(self.id) {
            return None;
        }
        let offset = (ptr & 0xffff_ffff) as u32;
        if offset % DESCRIPTOR_INCREMENT != 0 {
            return None;
        }
        let index = offset / DESCRIPTOR_INCREMENT;
        (index < self.desc.num_descriptors).then_some(index as usize)
    }

    pub(crate) fn write(&self, handle: CpuDescriptorHandle, descriptor: Descriptor) -> bool {
        match self.slot_index(handle.ptr) {
            Some(i) => {
                self.slots.lock()[i] = descriptor;
                true
            }
            None => false,
        }
    }

    pub(crate) fn read(&self, handle: CpuDescriptorHandle) -> Option<Descriptor> {
        let i = self.slot_index(handle.ptr)?;
        Some(self.slots.lock()[i].clone())
    }

    /// Whether a GPU handle addresses a slot of this heap.
    pub(crate) fn contains_gpu(&self, handle: GpuDescriptorHandle) -> bool {
        handle.ptr & GPU_HANDLE_BIT != 0 && self.slot_index(handle.ptr).is_some()
    }

    pub(crate) fn from_interface(heap: &dyn DescriptorHeap) -> Option<Arc<ReferenceDescriptorHeap>> {
        heap.as_any()
            .downcast_ref::<ReferenceDescriptorHeap>()
            .and_then(|h| h.self_ref.upgrade())
    }

    fn final_release(&self) {
        debug!("Descriptor heap {} released", self.id);
        self.device.forget_heap(self.id);
        self.device.release();
    }
}

/// Heap id encoded in a CPU or GPU handle.
pub fn heap_id_of(ptr: u64) -> u32 {
    ((ptr & !GPU_HANDLE_BIT) >> 32) as u32
}

impl_unknown!(
    ReferenceDescriptorHeap,
    DescriptorHeap,
    [iid::OBJECT, iid::DEVICE_CHILD, iid::PAGEABLE, iid::DESCRIPTOR_HEAP]
);

impl DescriptorHeap for ReferenceDescriptorHeap {
    fn desc(&self) -> DescriptorHeapDesc {
        self.desc
    }

    fn cpu_descriptor_handle_for_heap_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle {
            ptr: u64::from(self.id) << 32,
        }
    }

    fn gpu_descriptor_handle_for_heap_start(&self) -> ApiResult<GpuDescriptorHandle> {
        if !self.desc.flags.contains(DescriptorHeapFlags::SHADER_VISIBLE) {
            return Err(Hresult::E_INVALIDARG);
        }
        Ok(GpuDescriptorHandle {
            ptr: GPU_HANDLE_BIT | u64::from(self.id) << 32,
        })
    }
}
