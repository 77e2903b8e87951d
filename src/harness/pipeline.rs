//! Canned root signatures and pipeline states.

use tracing::debug;

use crate::api::{
    BlendDesc, ComPtr, ComputePipelineStateDesc, CullMode, DepthStencilDesc, DescriptorRange,
    DescriptorRangeType, Device, Format, GraphicsPipelineStateDesc, InputElementDesc,
    PipelineState, PrimitiveTopologyType, RasterizerDesc, RootParameter, RootSignature,
    RootSignatureDesc, RootSignatureFlags, Runtime, SampleDesc, ShaderBytecode, ShaderVisibility,
    StaticSamplerDesc, VersionedRootSignatureDesc, SIMULTANEOUS_RENDER_TARGET_COUNT,
};
use crate::error::HarnessError;
use crate::harness::shaders::{green_ps, passthrough_vs};

/// Serialize `desc` and create a root signature from the blob.
pub fn create_root_signature(
    runtime: &dyn Runtime,
    device: &dyn Device,
    desc: &RootSignatureDesc,
) -> Result<ComPtr<dyn RootSignature>, HarnessError> {
    let blob = runtime
        .serialize_root_signature(desc)
        .map_err(HarnessError::api("SerializeRootSignature"))?;
    device
        .create_root_signature(0, &blob)
        .map_err(HarnessError::api("CreateRootSignature"))
}

pub fn create_versioned_root_signature(
    runtime: &dyn Runtime,
    device: &dyn Device,
    desc: &VersionedRootSignatureDesc,
) -> Result<ComPtr<dyn RootSignature>, HarnessError> {
    let blob = runtime
        .serialize_versioned_root_signature(desc)
        .map_err(HarnessError::api("SerializeVersionedRootSignature"))?;
    device
        .create_root_signature(0, &blob)
        .map_err(HarnessError::api("CreateRootSignature"))
}

pub fn create_empty_root_signature(
    runtime: &dyn Runtime,
    device: &dyn Device,
    flags: RootSignatureFlags,
) -> Result<ComPtr<dyn RootSignature>, HarnessError> {
    let desc = RootSignatureDesc {
        flags,
        ..Default::default()
    };
    create_root_signature(runtime, device, &desc)
}

/// One root CBV at `b<reg_idx>`.
pub fn create_cb_root_signature(
    runtime: &dyn Runtime,
    device: &dyn Device,
    reg_idx: u32,
    visibility: ShaderVisibility,
    flags: RootSignatureFlags,
) -> Result<ComPtr<dyn RootSignature>, HarnessError> {
    let desc = RootSignatureDesc {
        parameters: vec![RootParameter::cbv(reg_idx, 0, visibility)],
        static_samplers: Vec::new(),
        flags,
    };
    create_root_signature(runtime, device, &desc)
}

/// One block of `num_constants` root constants at `b<reg_idx>`.
pub fn create_32bit_constants_root_signature(
    runtime: &dyn Runtime,
    device: &dyn Device,
    reg_idx: u32,
    num_constants: u32,
    visibility: ShaderVisibility,
    flags: RootSignatureFlags,
) -> Result<ComPtr<dyn RootSignature>, HarnessError> {
    let desc = RootSignatureDesc {
        parameters: vec![RootParameter::constants(reg_idx, 0, num_constants, visibility)],
        static_samplers: Vec::new(),
        flags,
    };
    create_root_signature(runtime, device, &desc)
}

/// An SRV table at `t0`, a point-clamp static sampler at `s0` and, when
/// `constant_count` is non-zero, root constants at `b0`.
pub fn create_texture_root_signature(
    runtime: &dyn Runtime,
    device: &dyn Device,
    visibility: ShaderVisibility,
    constant_count: u32,
    flags: RootSignatureFlags,
) -> Result<ComPtr<dyn RootSignature>, HarnessError> {
    let mut parameters = vec![RootParameter::table(
        vec![DescriptorRange::new(DescriptorRangeType::Srv, 1, 0)],
        visibility,
    )];
    if constant_count > 0 {
        parameters.push(RootParameter::constants(0, 0, constant_count, visibility));
    }
    let desc = RootSignatureDesc {
        parameters,
        static_samplers: vec![StaticSamplerDesc::point_clamp(0, visibility)],
        flags,
    };
    create_root_signature(runtime, device, &desc)
}

/// Graphics pipeline defaults: solid fill, no culling, no depth test, one
/// render target of `rt_format` (none for `Format::UNKNOWN`). Missing
/// shaders are replaced by the built-in full-screen triangle and green fill.
pub fn pipeline_state_desc<'a>(
    root_signature: Option<&'a dyn RootSignature>,
    rt_format: Format,
    vs: Option<&'a [u8]>,
    ps: Option<&'a [u8]>,
    input_layout: &'a [InputElementDesc<'a>],
) -> GraphicsPipelineStateDesc<'a> {
    let mut rtv_formats = [Format::UNKNOWN; SIMULTANEOUS_RENDER_TARGET_COUNT];
    rtv_formats[0] = rt_format;
    GraphicsPipelineStateDesc {
        root_signature,
        vs: ShaderBytecode::new(vs.unwrap_or(passthrough_vs())),
        ps: ShaderBytecode::new(ps.unwrap_or(green_ps())),
        ds: ShaderBytecode::default(),
        hs: ShaderBytecode::default(),
        gs: ShaderBytecode::default(),
        blend_state: BlendDesc::default(),
        sample_mask: !0,
        rasterizer_state: RasterizerDesc {
            cull_mode: CullMode::None,
            ..Default::default()
        },
        depth_stencil_state: DepthStencilDesc {
            depth_enable: false,
            ..Default::default()
        },
        input_layout,
        primitive_topology_type: PrimitiveTopologyType::Triangle,
        num_render_targets: u32::from(rt_format != Format::UNKNOWN),
        rtv_formats,
        dsv_format: Format::UNKNOWN,
        sample_desc: SampleDesc::default(),
        node_mask: 0,
    }
}

pub fn create_pipeline_state(
    device: &dyn Device,
    root_signature: &dyn RootSignature,
    rt_format: Format,
    vs: Option<&[u8]>,
    ps: Option<&[u8]>,
    input_layout: &[InputElementDesc<'_>],
) -> Result<ComPtr<dyn PipelineState>, HarnessError> {
    let desc = pipeline_state_desc(Some(root_signature), rt_format, vs, ps, input_layout);
    debug!("Creating graphics pipeline for {:?}", rt_format);
    device
        .create_graphics_pipeline_state(&desc)
        .map_err(HarnessError::api("CreateGraphicsPipelineState"))
}

pub fn create_compute_pipeline_state(
    device: &dyn Device,
    root_signature: &dyn RootSignature,
    cs: &[u8],
) -> Result<ComPtr<dyn PipelineState>, HarnessError> {
    let desc = ComputePipelineStateDesc {
        root_signature: Some(root_signature),
        cs: ShaderBytecode::new(cs),
        node_mask: 0,
    };
    device
        .create_compute_pipeline_state(&desc)
        .map_err(HarnessError::api("CreateComputePipelineState"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DeviceOptions;
    use crate::error::Hresult;
    use crate::harness::shaders::empty_cs;
    use crate::reference::ReferenceRuntime;

    #[test]
    fn test_defaults() {
        let desc = pipeline_state_desc(None, Format::R8G8B8A8_UNORM, None, None, &[]);
        assert_eq!(desc.num_render_targets, 1);
        assert_eq!(desc.rasterizer_state.cull_mode, CullMode::None);
        assert!(!desc.depth_stencil_state.depth_enable);
        assert_eq!(desc.sample_mask, u32::MAX);
        assert_eq!(desc.vs.code, passthrough_vs());
        let no_rt = pipeline_state_desc(None, Format::UNKNOWN, None, None, &[]);
        assert_eq!(no_rt.num_render_targets, 0);
    }

    #[test]
    fn test_canned_root_signatures() {
        let runtime = ReferenceRuntime::new();
        let device = runtime.create_device(&DeviceOptions::default()).unwrap();
        let flags = RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT;
        let empty = create_empty_root_signature(&runtime, &*device, flags).unwrap();
        let cb = create_cb_root_signature(&runtime, &*device, 0, ShaderVisibility::Pixel, flags).unwrap();
        let constants =
            create_32bit_constants_root_signature(&runtime, &*device, 0, 4, ShaderVisibility::All, flags).unwrap();
        let textured =
            create_texture_root_signature(&runtime, &*device, ShaderVisibility::Pixel, 2, flags).unwrap();

        let pso = create_pipeline_state(&*device, &*empty, Format::R8G8B8A8_UNORM, None, None, &[]).unwrap();
        let cs = create_compute_pipeline_state(&*device, &*constants, empty_cs()).unwrap();
        drop((pso, cs, empty, cb, constants, textured));
        assert_eq!(device.release(), 0);
    }

    #[test]
    fn test_too_many_constants_rejected() {
        let runtime = ReferenceRuntime::new();
        let device = runtime.create_device(&DeviceOptions::default()).unwrap();
        let result = create_32bit_constants_root_signature(
            &runtime,
            &*device,
            0,
            65,
            ShaderVisibility::All,
            RootSignatureFlags::NONE,
        );
        assert!(matches!(
            result,
            Err(HarnessError::Api { hr: Hresult::E_INVALIDARG, .. })
        ));
    }
}
