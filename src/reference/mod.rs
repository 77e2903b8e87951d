//! Reference Adapter Module
//!
//! A software implementation of the API. Objects live in process memory,
//! queues execute on worker threads, and the raster subset covers clears,
//! copies and constant-colour full-screen draws.

/// Implements [`Unknown`](crate::api::Unknown) for a reference object with
/// `self_ref`, `refcount` and `final_release`.
macro_rules! impl_unknown {
    ($ty:ty, $iface:ident, [$($iid:expr),* $(,)?]) => {
        impl Unknown for $ty {
            fn add_ref(&self) -> u32 {
                self.refcount.increment()
            }

            fn release(&self) -> u32 {
                match self.refcount.try_decrement() {
                    Some(0) => {
                        self.final_release();
                        0
                    }
                    Some(n) => n,
                    None => 0,
                }
            }

            fn query_interface(&self, riid: &Guid) -> ApiResult<ComObject> {
                let known: &[Guid] = &[$crate::api::iid::IUNKNOWN, $($iid),*];
                if !known.contains(riid) {
                    return Err($crate::error::Hresult::E_NOINTERFACE);
                }
                let this = self
                    .self_ref
                    .upgrade()
                    .ok_or($crate::error::Hresult::E_NOINTERFACE)?;
                self.refcount.increment();
                let object: Arc<dyn $iface> = this;
                Ok(ComObject::$iface(ComPtr::from_counted(object)))
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

mod command_list;
mod descriptor;
mod device;
mod fence;
pub mod layout;
mod pipeline;
mod queue;
mod resource;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{
    ComPtr, Device, DeviceOptions, RootParameterKind, RootParameterKind1, RootSignatureDesc,
    RootSignatureDeserializer, Runtime, VersionedRootSignatureDesc, DescriptorRangeType,
};
use crate::dxbc::rts0;
use crate::error::{ApiResult, Hresult};

pub use command_list::ListState;
pub use descriptor::DESCRIPTOR_INCREMENT;
pub use device::ReferenceDevice;

use pipeline::ReferenceDeserializer;

/// Entry points of the reference adapter.
#[derive(Debug, Default)]
pub struct ReferenceRuntime {
    device_error: Option<Hresult>,
}

impl ReferenceRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime on a host without a usable adapter: device creation
    /// fails with `hr`.
    pub fn unavailable(hr: Hresult) -> Self {
        Self {
            device_error: Some(hr),
        }
    }

    fn deserializer(&self, blob: &[u8]) -> ApiResult<ComPtr<dyn RootSignatureDeserializer>> {
        let desc = rts0::deserialize(blob).map_err(|e| {
            warn!("Root signature blob rejected: {}", e);
            Hresult::E_INVALIDARG
        })?;
        debug!("Deserialized {:?} root signature", desc.version());
        Ok(ComPtr::from_counted(
            ReferenceDeserializer::new(desc) as Arc<dyn RootSignatureDeserializer>
        ))
    }
}

/// A descriptor table may hold samplers or views, never both.
fn check_tables(desc: &VersionedRootSignatureDesc) -> ApiResult<()> {
    let tables: Vec<Vec<DescriptorRangeType>> = match desc {
        VersionedRootSignatureDesc::V1_0(d) => d
            .parameters
            .iter()
            .filter_map(|p| match &p.kind {
                RootParameterKind::DescriptorTable(ranges) => {
                    Some(ranges.iter().map(|r| r.range_type).collect())
                }
                _ => None,
            })
            .collect(),
        VersionedRootSignatureDesc::V1_1(d) => d
            .parameters
            .iter()
            .filter_map(|p| match &p.kind {
                RootParameterKind1::DescriptorTable(ranges) => {
                    Some(ranges.iter().map(|r| r.range_type).collect())
                }
                _ => None,
            })
            .collect(),
    };
    for types in tables {
        let samplers = types.iter().filter(|t| **t == DescriptorRangeType::Sampler).count();
        if samplers != 0 && samplers != types.len() {
            warn!("Descriptor table mixes samplers with other ranges");
            return Err(Hresult::E_INVALIDARG);
        }
    }
    Ok(())
}

impl Runtime for ReferenceRuntime {
    fn name(&self) -> &str {
        "reference"
    }

    fn create_device(&self, options: &DeviceOptions) -> ApiResult<ComPtr<dyn Device>> {
        if let Some(hr) = self.device_error {
            warn!("No adapter available: {}", hr);
            return Err(hr);
        }
        let device = ReferenceDevice::new(*options);
        Ok(ComPtr::from_counted(device as Arc<dyn Device>))
    }

    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> ApiResult<Vec<u8>> {
        self.serialize_versioned_root_signature(&VersionedRootSignatureDesc::V1_0(desc.clone()))
    }

    fn serialize_versioned_root_signature(
        &self,
        desc: &VersionedRootSignatureDesc,
    ) -> ApiResult<Vec<u8>> {
        check_tables(desc)?;
        Ok(rts0::serialize(desc))
    }

    fn create_root_signature_deserializer(
        &self,
        blob: &[u8],
    ) -> ApiResult<ComPtr<dyn RootSignatureDeserializer>> {
        self.deserializer(blob)
    }

    fn create_versioned_root_signature_deserializer(
        &self,
        blob: &[u8],
    ) -> ApiResult<ComPtr<dyn RootSignatureDeserializer>> {
        self.deserializer(blob)
    }
}

/// The runtime used when no other implementation is plugged in.
pub fn create_runtime() -> Arc<dyn Runtime> {
    Arc::new(ReferenceRuntime::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        iid, DescriptorRange, RootParameter, RootSignatureVersion, ShaderVisibility,
    };

    #[test]
    fn test_mixed_sampler_table_rejected() {
        let desc = RootSignatureDesc {
            parameters: vec![RootParameter::table(
                vec![
                    DescriptorRange::new(DescriptorRangeType::Srv, 1, 0),
                    DescriptorRange::new(DescriptorRangeType::Sampler, 1, 0),
                ],
                ShaderVisibility::All,
            )],
            ..Default::default()
        };
        assert_eq!(
            ReferenceRuntime::new().serialize_root_signature(&desc).err(),
            Some(Hresult::E_INVALIDARG)
        );
    }

    #[test]
    fn test_deserializer_answers_both_interfaces() {
        let runtime = ReferenceRuntime::new();
        let blob = runtime
            .serialize_root_signature(&RootSignatureDesc::default())
            .unwrap();
        let deserializer = runtime.create_root_signature_deserializer(&blob).unwrap();
        let versioned = deserializer
            .query_interface(&iid::VERSIONED_ROOT_SIGNATURE_DESERIALIZER)
            .unwrap();
        assert_eq!(deserializer.refcount(), 2);
        drop(versioned);
        assert_eq!(
            deserializer.unconverted_root_signature_desc().version(),
            RootSignatureVersion::V1_0
        );
        assert!(runtime.create_root_signature_deserializer(&blob[..20]).is_err());
    }
}
