//! Reference-counted handles and interface identifiers.
//!
//! Every API object implements [`Unknown`]. A [`ComPtr`] owns exactly one
//! reference: cloning adds one, dropping releases one. The public count is
//! separate from the Rust allocation; objects drop their private references
//! (for example on their device) when the public count reaches zero.

use std::any::Any;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::api::interfaces::{
    CommandAllocator, CommandQueue, DescriptorHeap, Device, Fence, GraphicsCommandList,
    PipelineState, Resource, RootSignature, RootSignatureDeserializer,
};
use crate::error::{ApiResult, Hresult};

/// A 128-bit interface identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn from_u128(v: u128) -> Self {
        Self {
            data1: (v >> 96) as u32,
            data2: (v >> 80) as u16,
            data3: (v >> 64) as u16,
            data4: (v as u64).to_be_bytes(),
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub mod iid {
    use super::Guid;

    pub const IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);
    pub const OBJECT: Guid = Guid::from_u128(0xc4fec28f_7966_4e95_9f94_f431cb56c3b8);
    pub const DEVICE_CHILD: Guid = Guid::from_u128(0x905db94b_a00c_4140_9df5_2b64ca9ea357);
    pub const PAGEABLE: Guid = Guid::from_u128(0x63ee58fb_1268_4835_86da_f008ce62f0d6);
    pub const DEVICE: Guid = Guid::from_u128(0x189819f1_1db6_4b57_be54_1821339b85f7);
    pub const COMMAND_QUEUE: Guid = Guid::from_u128(0x0ec870a6_5d7e_4c22_8cfc_5baae07616ed);
    pub const COMMAND_ALLOCATOR: Guid = Guid::from_u128(0x6102dee4_af59_4b09_b999_b44d73f09b24);
    pub const COMMAND_LIST: Guid = Guid::from_u128(0x7116d91c_e7e4_47ce_b8c6_ec8168f437e5);
    pub const GRAPHICS_COMMAND_LIST: Guid =
        Guid::from_u128(0x5b160d0f_ac1b_4185_8ba8_b3ae42a5a455);
    pub const FENCE: Guid = Guid::from_u128(0x0a753dcf_c4d8_4b91_adf6_be5a60d95a76);
    pub const RESOURCE: Guid = Guid::from_u128(0x696442be_a72e_4059_bc79_5b5c98040fad);
    pub const DESCRIPTOR_HEAP: Guid = Guid::from_u128(0x8efb471d_616c_4f49_90f7_127bb763fa51);
    pub const ROOT_SIGNATURE: Guid = Guid::from_u128(0xc54a6b66_72df_4ee8_8be5_a946a1429214);
    pub const PIPELINE_STATE: Guid = Guid::from_u128(0x765a30f3_f624_4c6f_a828_ace948622445);
    pub const ROOT_SIGNATURE_DESERIALIZER: Guid =
        Guid::from_u128(0x34ab647b_3cc8_46ac_841b_c0965645c046);
    pub const VERSIONED_ROOT_SIGNATURE_DESERIALIZER: Guid =
        Guid::from_u128(0x7f91ce67_090c_4bb7_b78e_ed8ff2e31da0);
}

/// Base protocol of every API object.
pub trait Unknown: Send + Sync + 'static {
    /// Increment the public reference count, returning the new count.
    fn add_ref(&self) -> u32;

    /// Decrement the public reference count, returning the new count.
    fn release(&self) -> u32;

    /// Look up another interface of this object. A successful lookup owns a
    /// new reference.
    fn query_interface(&self, iid: &Guid) -> ApiResult<ComObject>;

    /// Concrete object, for implementations that need to recognise their own
    /// objects when handed back through the API.
    fn as_any(&self) -> &dyn Any;
}

/// Current public reference count, observed through an `add_ref`/`release` pair.
pub fn get_refcount<T: ?Sized + Unknown>(object: &T) -> u32 {
    object.add_ref();
    object.release()
}

/// An interface that can be requested through `query_interface`.
pub trait ComInterface: Unknown {
    const IID: Guid;

    fn from_object(object: ComObject) -> Option<ComPtr<Self>>;
}

/// An owned reference to an API object.
pub struct ComPtr<T: ?Sized + Unknown> {
    inner: Arc<T>,
}

impl<T: ?Sized + Unknown> ComPtr<T> {
    /// Adopt a reference that has already been counted by the object.
    pub fn from_counted(inner: Arc<T>) -> Self {
        Self { inner }
    }

    pub fn as_arc(&self) -> &Arc<T> {
        &self.inner
    }

    /// Ask the object for another interface.
    pub fn cast<U: ?Sized + ComInterface>(&self) -> ApiResult<ComPtr<U>> {
        let object = self.inner.query_interface(&U::IID)?;
        U::from_object(object).ok_or(Hresult::E_NOINTERFACE)
    }

    pub fn refcount(&self) -> u32 {
        get_refcount(&*self.inner)
    }

    /// Release this reference, returning the count left on the object.
    pub fn release(self) -> u32 {
        let mut this = ManuallyDrop::new(self);
        let count = this.inner.release();
        // SAFETY: `this` is not used again and its destructor never runs.
        unsafe { ptr::drop_in_place(&mut this.inner) };
        count
    }

    pub fn ptr_eq(&self, other: &ComPtr<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: ?Sized + Unknown> Clone for ComPtr<T> {
    fn clone(&self) -> Self {
        self.inner.add_ref();
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized + Unknown> Drop for ComPtr<T> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl<T: ?Sized + Unknown> Deref for ComPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized + Unknown> fmt::Debug for ComPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComPtr({:p})", Arc::as_ptr(&self.inner) as *const ())
    }
}

/// The result of `query_interface`: one owned reference, tagged with the
/// interface it was obtained as.
pub enum ComObject {
    Device(ComPtr<dyn Device>),
    CommandQueue(ComPtr<dyn CommandQueue>),
    CommandAllocator(ComPtr<dyn CommandAllocator>),
    GraphicsCommandList(ComPtr<dyn GraphicsCommandList>),
    Fence(ComPtr<dyn Fence>),
    Resource(ComPtr<dyn Resource>),
    DescriptorHeap(ComPtr<dyn DescriptorHeap>),
    RootSignature(ComPtr<dyn RootSignature>),
    PipelineState(ComPtr<dyn PipelineState>),
    RootSignatureDeserializer(ComPtr<dyn RootSignatureDeserializer>),
}

impl ComObject {
    /// Public reference count of the underlying object.
    pub fn refcount(&self) -> u32 {
        match self {
            ComObject::Device(p) => p.refcount(),
            ComObject::CommandQueue(p) => p.refcount(),
            ComObject::CommandAllocator(p) => p.refcount(),
            ComObject::GraphicsCommandList(p) => p.refcount(),
            ComObject::Fence(p) => p.refcount(),
            ComObject::Resource(p) => p.refcount(),
            ComObject::DescriptorHeap(p) => p.refcount(),
            ComObject::RootSignature(p) => p.refcount(),
            ComObject::PipelineState(p) => p.refcount(),
            ComObject::RootSignatureDeserializer(p) => p.refcount(),
        }
    }
}

impl fmt::Debug for ComObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComObject::Device(_) => "Device",
            ComObject::CommandQueue(_) => "CommandQueue",
            ComObject::CommandAllocator(_) => "CommandAllocator",
            ComObject::GraphicsCommandList(_) => "GraphicsCommandList",
            ComObject::Fence(_) => "Fence",
            ComObject::Resource(_) => "Resource",
            ComObject::DescriptorHeap(_) => "DescriptorHeap",
            ComObject::RootSignature(_) => "RootSignature",
            ComObject::PipelineState(_) => "PipelineState",
            ComObject::RootSignatureDeserializer(_) => "RootSignatureDeserializer",
        };
        write!(f, "ComObject::{}", name)
    }
}

macro_rules! com_interface {
    ($trait:ident, $variant:ident, $iid:expr) => {
        impl ComInterface for dyn $trait {
            const IID: Guid = $iid;

            fn from_object(object: ComObject) -> Option<ComPtr<Self>> {
                match object {
                    ComObject::$variant(p) => Some(p),
                    _ => None,
                }
            }
        }
    };
}

com_interface!(Device, Device, iid::DEVICE);
com_interface!(CommandQueue, CommandQueue, iid::COMMAND_QUEUE);
com_interface!(CommandAllocator, CommandAllocator, iid::COMMAND_ALLOCATOR);
com_interface!(GraphicsCommandList, GraphicsCommandList, iid::GRAPHICS_COMMAND_LIST);
com_interface!(Fence, Fence, iid::FENCE);
com_interface!(Resource, Resource, iid::RESOURCE);
com_interface!(DescriptorHeap, DescriptorHeap, iid::DESCRIPTOR_HEAP);
com_interface!(RootSignature, RootSignature, iid::ROOT_SIGNATURE);
com_interface!(PipelineState, PipelineState, iid::PIPELINE_STATE);
com_interface!(
    RootSignatureDeserializer,
    RootSignatureDeserializer,
    iid::ROOT_SIGNATURE_DESERIALIZER
);

/// Public reference count shared by implementations.
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    /// A new count of one, owned by the creator.
    pub fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement, saturating at zero.
    pub fn decrement(&self) -> u32 {
        self.try_decrement().unwrap_or(0)
    }

    /// Decrement, or `None` if the count was already zero. `Some(0)` is
    /// returned exactly once per object lifetime.
    pub fn try_decrement(&self) -> Option<u32> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            match self.0.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current - 1),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_display() {
        assert_eq!(
            iid::DEVICE.to_string(),
            "{189819f1-1db6-4b57-be54-1821339b85f7}"
        );
        assert_eq!(
            iid::IUNKNOWN.to_string(),
            "{00000000-0000-0000-c000-000000000046}"
        );
    }

    #[test]
    fn test_cast_counts_references() {
        use crate::api::{DeviceOptions, FenceFlags, Runtime};
        use crate::reference::ReferenceRuntime;

        let device = ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap();
        let fence = device.create_fence(0, FenceFlags::NONE).unwrap();
        assert_eq!(fence.refcount(), 1);

        let same = fence.cast::<dyn Fence>().unwrap();
        assert!(same.ptr_eq(&fence));
        assert_eq!(fence.refcount(), 2);

        // A failed cast leaves the count alone.
        assert_eq!(fence.cast::<dyn Resource>().err(), Some(Hresult::E_NOINTERFACE));
        assert_eq!(fence.cast::<dyn Device>().err(), Some(Hresult::E_NOINTERFACE));
        assert_eq!(fence.refcount(), 2);

        let unknown = fence.query_interface(&iid::IUNKNOWN).unwrap();
        assert!(matches!(unknown, ComObject::Fence(_)));
        assert_eq!(unknown.refcount(), 3);
        drop(unknown);
        drop(same);
        assert_eq!(fence.refcount(), 1);
        assert_eq!(fence.release(), 0);
    }

    #[test]
    fn test_refcount_saturates() {
        let count = RefCount::new();
        assert_eq!(count.increment(), 2);
        assert_eq!(count.decrement(), 1);
        assert_eq!(count.decrement(), 0);
        assert_eq!(count.decrement(), 0);
        assert_eq!(count.try_decrement(), None);
    }
}
