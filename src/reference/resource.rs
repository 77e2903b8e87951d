//! Committed resources and their backing memory.

use std::any::Any;
use std::ops::Range;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::device::ReferenceDevice;
use super::layout::{copyable_footprints, storage_size};
use crate::api::{
    iid, ComObject, ComPtr, CopyableFootprints, Guid, HeapFlags, HeapProperties, HeapType,
    RefCount, Resource, ResourceDesc, ResourceStates, TextureLayout, Unknown,
};
use crate::error::{ApiResult, Hresult};

const MAX_STORAGE_SIZE: u64 = 1 << 32;

/// Device memory of one resource.
///
/// Queue work goes through the lock. Mapped pointers bypass it; the API
/// contract keeps the host off ranges the queue is writing.
pub struct Storage {
    bytes: Mutex<Box<[u8]>>,
    len: usize,
}

impl Storage {
    pub fn new(len: u64) -> ApiResult<Self> {
        if len > MAX_STORAGE_SIZE {
            return Err(Hresult::E_OUTOFMEMORY);
        }
        let len = usize::try_from(len).map_err(|_| Hresult::E_OUTOFMEMORY)?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| Hresult::E_OUTOFMEMORY)?;
        bytes.resize(len, 0);
        Ok(Self {
            bytes: Mutex::new(bytes.into_boxed_slice()),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn range(&self, offset: u64, len: usize) -> Option<Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.len).then_some(start..end)
    }

    /// Host pointer for a mapping, clamped to the allocation.
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        let offset = offset.min(self.len);
        let mut bytes = self.bytes.lock();
        // SAFETY: `offset <= len`, and a boxed slice never moves its buffer.
        unsafe { NonNull::new_unchecked(bytes.as_mut_ptr().add(offset)) }
    }

    pub fn read(&self, offset: u64, dst: &mut [u8]) -> bool {
        let Some(range) = self.range(offset, dst.len()) else {
            return false;
        };
        dst.copy_from_slice(&self.bytes.lock()[range]);
        true
    }

    pub fn write(&self, offset: u64, src: &[u8]) -> bool {
        let Some(range) = self.range(offset, src.len()) else {
            return false;
        };
        self.bytes.lock()[range].copy_from_slice(src);
        true
    }

    /// Copy `len` bytes from `src` (which may be `self`).
    pub fn copy_from(&self, dst_offset: u64, src: &Storage, src_offset: u64, len: usize) -> bool {
        let (Some(dst_range), Some(src_range)) = (self.range(dst_offset, len), src.range(src_offset, len)) else {
            return false;
        };
        if ptr::eq(self, src) {
            self.bytes.lock().copy_within(src_range, dst_range.start);
            return true;
        }
        // Lock in address order so opposite copies cannot deadlock.
        let (mut dst_bytes, src_bytes) = if (self as *const Storage) < (src as *const Storage) {
            let dst_bytes = self.bytes.lock();
            (dst_bytes, src.bytes.lock())
        } else {
            let src_bytes = src.bytes.lock();
            (self.bytes.lock(), src_bytes)
        };
        dst_bytes[dst_range].copy_from_slice(&src_bytes[src_range]);
        true
    }
}

pub struct ReferenceResource {
    self_ref: Weak<ReferenceResource>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    desc: ResourceDesc,
    heap: HeapProperties,
    heap_flags: HeapFlags,
    gpu_address: u64,
    /// Placement of every sub-resource inside `storage`.
    pub(crate) footprints: CopyableFootprints,
    pub(crate) storage: Storage,
    /// Last state per sub-resource, as of the most recent submission.
    states: Mutex<Vec<ResourceStates>>,
    map_count: AtomicU32,
}

impl ReferenceResource {
    pub(crate) fn new(
        device: Arc<ReferenceDevice>,
        id: u32,
        heap: HeapProperties,
        heap_flags: HeapFlags,
        desc: ResourceDesc,
        initial_state: ResourceStates,
        gpu_address: u64,
    ) -> ApiResult<Arc<Self>> {
        let storage = Storage::new(storage_size(&desc))?;
        let footprints = copyable_footprints(&desc, 0, desc.subresource_count(), 0);
        debug!(
            "CreateCommittedResource: id={}, {:?} {}x{}x{} {:?} on {:?}, {} bytes",
            id,
            desc.dimension,
            desc.width,
            desc.height,
            desc.depth_or_array_size,
            desc.format,
            heap.heap_type,
            storage.len()
        );
        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            desc,
            heap,
            heap_flags,
            gpu_address,
            footprints,
            storage,
            states: Mutex::new(vec![initial_state; desc.subresource_count() as usize]),
            map_count: AtomicU32::new(0),
        }))
    }

    /// The reference adapter's own resource behind an interface reference.
    pub(crate) fn from_interface(resource: &dyn Resource) -> Option<Arc<ReferenceResource>> {
        resource
            .as_any()
            .downcast_ref::<ReferenceResource>()
            .and_then(|r| r.self_ref.upgrade())
    }

    pub(crate) fn heap_type(&self) -> HeapType {
        self.heap.heap_type
    }

    pub(crate) fn resource_desc(&self) -> &ResourceDesc {
        &self.desc
    }

    pub(crate) fn subresource_count(&self) -> u32 {
        self.desc.subresource_count()
    }

    pub(crate) fn state(&self, subresource: u32) -> Option<ResourceStates> {
        self.states.lock().get(subresource as usize).copied()
    }

    pub(crate) fn set_state(&self, subresource: u32, state: ResourceStates) {
        if let Some(s) = self.states.lock().get_mut(subresource as usize) {
            *s = state;
        }
    }

    fn final_release(&self) {
        debug!("Resource {} released", self.id);
        if self.map_count.load(Ordering::Acquire) != 0 {
            warn!("Resource {} released while mapped", self.id);
        }
        self.device.release();
    }
}

impl_unknown!(ReferenceResource, Resource, [iid::OBJECT, iid::DEVICE_CHILD, iid::PAGEABLE, iid::RESOURCE]);

impl Resource for ReferenceResource {
    fn desc(&self) -> ResourceDesc {
        self.desc
    }

    fn heap_properties(&self) -> ApiResult<(HeapProperties, HeapFlags)> {
        Ok((self.heap, self.heap_flags))
    }

    fn map(&self, subresource: u32, _read_range: Option<Range<usize>>) -> ApiResult<NonNull<u8>> {
        if self.heap.heap_type == HeapType::Default {
            return Err(Hresult::E_INVALIDARG);
        }
        if !self.desc.is_buffer() && self.desc.layout != TextureLayout::RowMajor {
            return Err(Hresult::E_INVALIDARG);
        }
        let layout = self
            .footprints
            .layouts
            .get(subresource as usize)
            .ok_or(Hresult::E_INVALIDARG)?;
        self.map_count.fetch_add(1, Ordering::AcqRel);
        Ok(self.storage.ptr_at(layout.offset as usize))
    }

    fn unmap(&self, subresource: u32, _written_range: Option<Range<usize>>) {
        if subresource >= self.desc.subresource_count() {
            return;
        }
        let previous = self
            .map_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous.is_err() {
            warn!("Unmap of resource {} without a matching map", self.id);
        }
    }

    fn gpu_virtual_address(&self) -> u64 {
        if self.desc.is_buffer() {
            self.gpu_address
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_bounds() {
        let storage = Storage::new(16).unwrap();
        assert!(storage.write(12, &[1, 2, 3, 4]));
        assert!(!storage.write(13, &[1, 2, 3, 4]));
        let mut out = [0u8; 4];
        assert!(storage.read(12, &mut out));
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(!storage.read(u64::MAX, &mut out));
    }

    #[test]
    fn test_storage_overlapping_copy() {
        let storage = Storage::new(8).unwrap();
        storage.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(storage.copy_from(2, &storage, 0, 4));
        let mut out = [0u8; 8];
        storage.read(0, &mut out);
        assert_eq!(out, [1, 2, 1, 2, 3, 4, 7, 8]);
    }

    #[test]
    fn test_storage_mapped_writes_are_visible() {
        let storage = Storage::new(16).unwrap();
        let ptr = storage.ptr_at(4);
        // SAFETY: four bytes from offset 4 lie inside the allocation.
        unsafe { ptr::copy_nonoverlapping([9u8, 8, 7, 6].as_ptr(), ptr.as_ptr(), 4) };
        let mut out = [0u8; 6];
        assert!(storage.read(3, &mut out));
        assert_eq!(out, [0, 9, 8, 7, 6, 0]);
        // Offsets past the end clamp to one-past-the-end.
        assert_eq!(storage.ptr_at(100), storage.ptr_at(16));
    }

    #[test]
    fn test_storage_opposite_copies() {
        let a = Arc::new(Storage::new(64).unwrap());
        let b = Arc::new(Storage::new(64).unwrap());
        a.write(0, &[1; 64]);
        b.write(0, &[2; 64]);
        let workers: Vec<_> = [(a.clone(), b.clone()), (b.clone(), a.clone())]
            .into_iter()
            .map(|(dst, src)| {
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(dst.copy_from(0, &src, 32, 32));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let mut out = [0u8; 64];
        a.read(0, &mut out);
        assert_eq!(&out[32..], &[1; 32]);
        assert!(!a.copy_from(40, &b, 0, 32));
        assert!(!a.copy_from(0, &b, 40, 32));
    }

    #[test]
    fn test_storage_empty() {
        let storage = Storage::new(0).unwrap();
        assert_eq!(storage.len(), 0);
        assert!(storage.read(0, &mut []));
        assert!(!storage.write(0, &[1]));
    }

    #[test]
    fn test_storage_rejects_huge() {
        assert_eq!(Storage::new(u64::MAX).err(), Some(Hresult::E_OUTOFMEMORY));
    }
}
