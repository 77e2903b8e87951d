//! Root signatures, pipeline states and root signature deserializers.

use std::any::Any;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::device::ReferenceDevice;
use crate::api::{
    iid, ComObject, ComPtr, Format, Guid, PipelineState, PrimitiveTopologyType, RefCount,
    RootSignature, RootSignatureDesc, RootSignatureDeserializer, RootSignatureVersion, Unknown,
    VersionedRootSignatureDesc, SIMULTANEOUS_RENDER_TARGET_COUNT,
};
use crate::dxbc::sm4::{is_vertex_id_program, Program};
use crate::dxbc::DxbcFile;
use crate::error::{ApiResult, Hresult};

pub struct ReferenceRootSignature {
    self_ref: Weak<ReferenceRootSignature>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    pub(crate) desc: VersionedRootSignatureDesc,
}

impl ReferenceRootSignature {
    pub(crate) fn new(device: Arc<ReferenceDevice>, id: u32, desc: VersionedRootSignatureDesc) -> Arc<Self> {
        debug!(
            "CreateRootSignature: id={}, {} parameters, cost {}",
            id,
            desc.parameter_count(),
            desc.dword_cost()
        );
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            desc,
        })
    }

    pub(crate) fn from_interface(rs: &dyn RootSignature) -> Option<Arc<ReferenceRootSignature>> {
        rs.as_any()
            .downcast_ref::<ReferenceRootSignature>()
            .and_then(|r| r.self_ref.upgrade())
    }

    pub(crate) fn parameter_count(&self) -> u32 {
        self.desc.parameter_count() as u32
    }

    fn final_release(&self) {
        debug!("Root signature {} released", self.id);
        self.device.release();
    }
}

impl_unknown!(
    ReferenceRootSignature,
    RootSignature,
    [iid::OBJECT, iid::DEVICE_CHILD, iid::ROOT_SIGNATURE]
);

impl RootSignature for ReferenceRootSignature {}

/// What the raster subset can do with a graphics pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterProgram {
    /// Full-screen triangle writing constant colours, per output register.
    ConstantFill(Vec<(u32, [u32; 4])>),
    /// Recorded and validated, not rasterised.
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub topology_type: PrimitiveTopologyType,
    pub rtv_formats: Vec<Format>,
    pub dsv_format: Format,
    pub program: RasterProgram,
}

#[derive(Debug, Clone)]
pub enum PipelineKind {
    Graphics(GraphicsState),
    Compute,
}

pub struct ReferencePipelineState {
    self_ref: Weak<ReferencePipelineState>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    pub(crate) root_signature: Arc<ReferenceRootSignature>,
    pub(crate) kind: PipelineKind,
}

impl ReferencePipelineState {
    pub(crate) fn new(
        device: Arc<ReferenceDevice>,
        id: u32,
        root_signature: Arc<ReferenceRootSignature>,
        kind: PipelineKind,
    ) -> Arc<Self> {
        debug!("CreatePipelineState: id={}, {:?}", id, kind);
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            root_signature,
            kind,
        })
    }

    pub(crate) fn from_interface(ps: &dyn PipelineState) -> Option<Arc<ReferencePipelineState>> {
        ps.as_any()
            .downcast_ref::<ReferencePipelineState>()
            .and_then(|p| p.self_ref.upgrade())
    }

    fn final_release(&self) {
        debug!("Pipeline state {} released", self.id);
        self.device.release();
    }
}

impl_unknown!(
    ReferencePipelineState,
    PipelineState,
    [iid::OBJECT, iid::DEVICE_CHILD, iid::PAGEABLE, iid::PIPELINE_STATE]
);

impl PipelineState for ReferencePipelineState {}

/// Reject bytecode that is not a well-formed container.
pub(crate) fn check_bytecode(code: &[u8]) -> ApiResult<()> {
    DxbcFile::parse(code).map(|_| ()).map_err(|e| {
        warn!("Rejecting shader bytecode: {}", e);
        Hresult::E_INVALIDARG
    })
}

/// Classify a vertex/pixel program pair for the raster subset.
pub(crate) fn classify_program(vs: &[u8], ps: &[u8]) -> RasterProgram {
    if !is_vertex_id_program(vs) {
        return RasterProgram::Unsupported;
    }
    if ps.is_empty() {
        return RasterProgram::ConstantFill(Vec::new());
    }
    match Program::from_bytecode(ps).ok().and_then(|p| p.constant_outputs()) {
        Some(outputs) => RasterProgram::ConstantFill(outputs),
        None => RasterProgram::Unsupported,
    }
}

pub(crate) fn check_render_target_count(count: u32) -> ApiResult<()> {
    if count as usize > SIMULTANEOUS_RENDER_TARGET_COUNT {
        Err(Hresult::E_INVALIDARG)
    } else {
        Ok(())
    }
}

/// Decoded root signature blob. Not a device child.
pub struct ReferenceDeserializer {
    self_ref: Weak<ReferenceDeserializer>,
    refcount: RefCount,
    desc: VersionedRootSignatureDesc,
}

impl ReferenceDeserializer {
    pub(crate) fn new(desc: VersionedRootSignatureDesc) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            desc,
        })
    }

    fn final_release(&self) {}
}

impl_unknown!(
    ReferenceDeserializer,
    RootSignatureDeserializer,
    [
        iid::ROOT_SIGNATURE_DESERIALIZER,
        iid::VERSIONED_ROOT_SIGNATURE_DESERIALIZER
    ]
);

impl RootSignatureDeserializer for ReferenceDeserializer {
    fn root_signature_desc(&self) -> RootSignatureDesc {
        match self.desc.convert_to(RootSignatureVersion::V1_0) {
            VersionedRootSignatureDesc::V1_0(desc) => desc,
            VersionedRootSignatureDesc::V1_1(_) => RootSignatureDesc::default(),
        }
    }

    fn root_signature_desc_at_version(
        &self,
        version: RootSignatureVersion,
    ) -> ApiResult<VersionedRootSignatureDesc> {
        Ok(self.desc.convert_to(version))
    }

    fn unconverted_root_signature_desc(&self) -> VersionedRootSignatureDesc {
        self.desc.clone()
    }
}
