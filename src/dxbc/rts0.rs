//! Root signature blob codec (`RTS0` chunk), versions 1.0 and 1.1.
//!
//! ```text
//! header:    version | param_count | params_offset | sampler_count | samplers_offset | flags
//! parameter: type | visibility | payload_offset
//! table:     range_count | ranges_offset
//! range 1.0: type | count | base_register | space | table_offset
//! range 1.1: type | count | base_register | space | flags | table_offset
//! constants: register | space | count
//! root desc: register | space [| flags (1.1)]
//! sampler:   13 words
//! ```
//!
//! Offsets are relative to the start of the chunk. Payloads are written in
//! parameter order right after the parameter headers, then the samplers.

use crate::api::{
    ComparisonFunc, DescriptorRange, DescriptorRange1, DescriptorRangeFlags, DescriptorRangeType,
    Filter, RootConstants, RootDescriptor, RootDescriptor1, RootDescriptorFlags, RootParameter,
    RootParameter1, RootParameterKind, RootParameterKind1, RootParameterType, RootSignatureDesc,
    RootSignatureDesc1, RootSignatureFlags, RootSignatureVersion, ShaderVisibility,
    StaticBorderColor, StaticSamplerDesc, TextureAddressMode, VersionedRootSignatureDesc,
};

use super::{DxbcBuilder, DxbcError, DxbcFile, DxbcResult, FourCC, WordReader, WordWriter};

const HEADER_SIZE: usize = 24;
const PARAMETER_HEADER_SIZE: usize = 12;
const SAMPLER_SIZE: usize = 52;

fn enum_value<T: TryFrom<u32, Error = u32>>(field: &'static str, value: u32) -> DxbcResult<T> {
    T::try_from(value).map_err(|value| DxbcError::InvalidValue { field, value })
}

/// Encode `desc` as an `RTS0` chunk payload.
pub fn encode(desc: &VersionedRootSignatureDesc) -> Vec<u8> {
    let mut out = WordWriter::default();
    let (param_count, samplers, flags) = match desc {
        VersionedRootSignatureDesc::V1_0(d) => (d.parameters.len(), &d.static_samplers, d.flags),
        VersionedRootSignatureDesc::V1_1(d) => (d.parameters.len(), &d.static_samplers, d.flags),
    };

    out.put(u32::from(desc.version()));
    out.put(param_count as u32);
    out.put(HEADER_SIZE as u32);
    out.put(samplers.len() as u32);
    let samplers_offset_slot = out.position();
    out.put(0);
    out.put(flags.bits());

    let headers_start = out.position();
    match desc {
        VersionedRootSignatureDesc::V1_0(d) => {
            for p in &d.parameters {
                out.put(u32::from(p.kind.parameter_type()));
                out.put(u32::from(p.shader_visibility));
                out.put(0);
            }
            for (i, p) in d.parameters.iter().enumerate() {
                let payload = out.position();
                out.patch(headers_start + i * PARAMETER_HEADER_SIZE + 8, payload as u32);
                encode_parameter(&mut out, &p.kind);
            }
        }
        VersionedRootSignatureDesc::V1_1(d) => {
            for p in &d.parameters {
                out.put(u32::from(p.kind.parameter_type()));
                out.put(u32::from(p.shader_visibility));
                out.put(0);
            }
            for (i, p) in d.parameters.iter().enumerate() {
                let payload = out.position();
                out.patch(headers_start + i * PARAMETER_HEADER_SIZE + 8, payload as u32);
                encode_parameter1(&mut out, &p.kind);
            }
        }
    }

    let samplers_offset = out.position();
    out.patch(samplers_offset_slot, samplers_offset as u32);
    for s in samplers {
        encode_sampler(&mut out, s);
    }
    out.into_bytes()
}

fn encode_parameter(out: &mut WordWriter, kind: &RootParameterKind) {
    match kind {
        RootParameterKind::DescriptorTable(ranges) => {
            out.put(ranges.len() as u32);
            let ranges_offset = out.position() + 4;
            out.put(ranges_offset as u32);
            for r in ranges {
                out.put(u32::from(r.range_type));
                out.put(r.num_descriptors);
                out.put(r.base_shader_register);
                out.put(r.register_space);
                out.put(r.offset_in_descriptors_from_table_start);
            }
        }
        RootParameterKind::Constants(c) => encode_constants(out, c),
        RootParameterKind::Cbv(d) | RootParameterKind::Srv(d) | RootParameterKind::Uav(d) => {
            out.put(d.shader_register);
            out.put(d.register_space);
        }
    }
}

fn encode_parameter1(out: &mut WordWriter, kind: &RootParameterKind1) {
    match kind {
        RootParameterKind1::DescriptorTable(ranges) => {
            out.put(ranges.len() as u32);
            let ranges_offset = out.position() + 4;
            out.put(ranges_offset as u32);
            for r in ranges {
                out.put(u32::from(r.range_type));
                out.put(r.num_descriptors);
                out.put(r.base_shader_register);
                out.put(r.register_space);
                out.put(r.flags.bits());
                out.put(r.offset_in_descriptors_from_table_start);
            }
        }
        RootParameterKind1::Constants(c) => encode_constants(out, c),
        RootParameterKind1::Cbv(d) | RootParameterKind1::Srv(d) | RootParameterKind1::Uav(d) => {
            out.put(d.shader_register);
            out.put(d.register_space);
            out.put(d.flags.bits());
        }
    }
}

fn encode_constants(out: &mut WordWriter, c: &RootConstants) {
    out.put(c.shader_register);
    out.put(c.register_space);
    out.put(c.num_32bit_values);
}

fn encode_sampler(out: &mut WordWriter, s: &StaticSamplerDesc) {
    out.put(s.filter.0);
    out.put(u32::from(s.address_u));
    out.put(u32::from(s.address_v));
    out.put(u32::from(s.address_w));
    out.put_f32(s.mip_lod_bias);
    out.put(s.max_anisotropy);
    out.put(u32::from(s.comparison_func));
    out.put(u32::from(s.border_color));
    out.put_f32(s.min_lod);
    out.put_f32(s.max_lod);
    out.put(s.shader_register);
    out.put(s.register_space);
    out.put(u32::from(s.shader_visibility));
}

/// Decode an `RTS0` chunk payload.
pub fn decode(chunk: &[u8]) -> DxbcResult<VersionedRootSignatureDesc> {
    let r = WordReader::new(chunk);
    let version_word = r.u32_at(0)?;
    let version = RootSignatureVersion::try_from(version_word)
        .map_err(DxbcError::UnsupportedRootSignatureVersion)?;
    let param_count = r.u32_at(4)? as usize;
    let params_offset = r.u32_at(8)? as usize;
    let sampler_count = r.u32_at(12)? as usize;
    let samplers_offset = r.u32_at(16)? as usize;
    let flags_word = r.u32_at(20)?;
    let flags = RootSignatureFlags::from_bits(flags_word).ok_or(DxbcError::InvalidValue {
        field: "root signature flags",
        value: flags_word,
    })?;

    let static_samplers = (0..sampler_count)
        .map(|i| decode_sampler(&r, samplers_offset + i * SAMPLER_SIZE))
        .collect::<DxbcResult<Vec<_>>>()?;

    let headers = (0..param_count)
        .map(|i| {
            let at = params_offset + i * PARAMETER_HEADER_SIZE;
            let ty: RootParameterType = enum_value("parameter type", r.u32_at(at)?)?;
            let visibility: ShaderVisibility = enum_value("shader visibility", r.u32_at(at + 4)?)?;
            Ok((ty, visibility, r.u32_at(at + 8)? as usize))
        })
        .collect::<DxbcResult<Vec<_>>>()?;

    Ok(match version {
        RootSignatureVersion::V1_0 => {
            let parameters = headers
                .into_iter()
                .map(|(ty, shader_visibility, at)| {
                    Ok(RootParameter {
                        kind: decode_parameter(&r, ty, at)?,
                        shader_visibility,
                    })
                })
                .collect::<DxbcResult<Vec<_>>>()?;
            VersionedRootSignatureDesc::V1_0(RootSignatureDesc {
                parameters,
                static_samplers,
                flags,
            })
        }
        RootSignatureVersion::V1_1 => {
            let parameters = headers
                .into_iter()
                .map(|(ty, shader_visibility, at)| {
                    Ok(RootParameter1 {
                        kind: decode_parameter1(&r, ty, at)?,
                        shader_visibility,
                    })
                })
                .collect::<DxbcResult<Vec<_>>>()?;
            VersionedRootSignatureDesc::V1_1(RootSignatureDesc1 {
                parameters,
                static_samplers,
                flags,
            })
        }
    })
}

fn decode_constants(r: &WordReader<'_>, at: usize) -> DxbcResult<RootConstants> {
    Ok(RootConstants {
        shader_register: r.u32_at(at)?,
        register_space: r.u32_at(at + 4)?,
        num_32bit_values: r.u32_at(at + 8)?,
    })
}

fn decode_parameter(r: &WordReader<'_>, ty: RootParameterType, at: usize) -> DxbcResult<RootParameterKind> {
    let descriptor = || -> DxbcResult<RootDescriptor> {
        Ok(RootDescriptor {
            shader_register: r.u32_at(at)?,
            register_space: r.u32_at(at + 4)?,
        })
    };
    Ok(match ty {
        RootParameterType::DescriptorTable => {
            let count = r.u32_at(at)? as usize;
            let ranges_at = r.u32_at(at + 4)? as usize;
            let ranges = (0..count)
                .map(|i| {
                    let at = ranges_at + i * 20;
                    Ok(DescriptorRange {
                        range_type: enum_value("range type", r.u32_at(at)?)?,
                        num_descriptors: r.u32_at(at + 4)?,
                        base_shader_register: r.u32_at(at + 8)?,
                        register_space: r.u32_at(at + 12)?,
                        offset_in_descriptors_from_table_start: r.u32_at(at + 16)?,
                    })
                })
                .collect::<DxbcResult<Vec<_>>>()?;
            RootParameterKind::DescriptorTable(ranges)
        }
        RootParameterType::Constants32Bit => RootParameterKind::Constants(decode_constants(r, at)?),
        RootParameterType::Cbv => RootParameterKind::Cbv(descriptor()?),
        RootParameterType::Srv => RootParameterKind::Srv(descriptor()?),
        RootParameterType::Uav => RootParameterKind::Uav(descriptor()?),
    })
}

fn decode_parameter1(
    r: &WordReader<'_>,
    ty: RootParameterType,
    at: usize,
) -> DxbcResult<RootParameterKind1> {
    let descriptor = || -> DxbcResult<RootDescriptor1> {
        let flags = r.u32_at(at + 8)?;
        Ok(RootDescriptor1 {
            shader_register: r.u32_at(at)?,
            register_space: r.u32_at(at + 4)?,
            flags: RootDescriptorFlags::from_bits(flags).ok_or(DxbcError::InvalidValue {
                field: "root descriptor flags",
                value: flags,
            })?,
        })
    };
    Ok(match ty {
        RootParameterType::DescriptorTable => {
            let count = r.u32_at(at)? as usize;
            let ranges_at = r.u32_at(at + 4)? as usize;
            let ranges = (0..count)
                .map(|i| {
                    let at = ranges_at + i * 24;
                    let flags = r.u32_at(at + 16)?;
                    Ok(DescriptorRange1 {
                        range_type: enum_value::<DescriptorRangeType>("range type", r.u32_at(at)?)?,
                        num_descriptors: r.u32_at(at + 4)?,
                        base_shader_register: r.u32_at(at + 8)?,
                        register_space: r.u32_at(at + 12)?,
                        flags: DescriptorRangeFlags::from_bits(flags).ok_or(
                            DxbcError::InvalidValue {
                                field: "descriptor range flags",
                                value: flags,
                            },
                        )?,
                        offset_in_descriptors_from_table_start: r.u32_at(at + 20)?,
                    })
                })
                .collect::<DxbcResult<Vec<_>>>()?;
            RootParameterKind1::DescriptorTable(ranges)
        }
        RootParameterType::Constants32Bit => RootParameterKind1::Constants(decode_constants(r, at)?),
        RootParameterType::Cbv => RootParameterKind1::Cbv(descriptor()?),
        RootParameterType::Srv => RootParameterKind1::Srv(descriptor()?),
        RootParameterType::Uav => RootParameterKind1::Uav(descriptor()?),
    })
}

fn decode_sampler(r: &WordReader<'_>, at: usize) -> DxbcResult<StaticSamplerDesc> {
    Ok(StaticSamplerDesc {
        filter: Filter(r.u32_at(at)?),
        address_u: enum_value::<TextureAddressMode>("address mode", r.u32_at(at + 4)?)?,
        address_v: enum_value::<TextureAddressMode>("address mode", r.u32_at(at + 8)?)?,
        address_w: enum_value::<TextureAddressMode>("address mode", r.u32_at(at + 12)?)?,
        mip_lod_bias: r.f32_at(at + 16)?,
        max_anisotropy: r.u32_at(at + 20)?,
        comparison_func: enum_value::<ComparisonFunc>("comparison func", r.u32_at(at + 24)?)?,
        border_color: enum_value::<StaticBorderColor>("border color", r.u32_at(at + 28)?)?,
        min_lod: r.f32_at(at + 32)?,
        max_lod: r.f32_at(at + 36)?,
        shader_register: r.u32_at(at + 40)?,
        register_space: r.u32_at(at + 44)?,
        shader_visibility: enum_value::<ShaderVisibility>("shader visibility", r.u32_at(at + 48)?)?,
    })
}

/// Encode `desc` into a complete container blob.
pub fn serialize(desc: &VersionedRootSignatureDesc) -> Vec<u8> {
    DxbcBuilder::new().chunk(FourCC::RTS0, encode(desc)).build()
}

/// Decode the `RTS0` chunk of a container blob.
pub fn deserialize(blob: &[u8]) -> DxbcResult<VersionedRootSignatureDesc> {
    let file = DxbcFile::parse(blob)?;
    decode(file.require_chunk(FourCC::RTS0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxbc::words;

    fn v1_0(desc: RootSignatureDesc) -> VersionedRootSignatureDesc {
        VersionedRootSignatureDesc::V1_0(desc)
    }

    #[test]
    fn test_empty_layout() {
        let blob = serialize(&v1_0(RootSignatureDesc {
            flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
            ..Default::default()
        }));
        assert_eq!(blob.len(), 0x44);
        let w: Vec<u32> = words(&blob).collect();
        assert_eq!(w[0], 0x4342_5844);
        assert_eq!(&w[5..9], &[1, 0x44, 1, 0x24]);
        assert_eq!(&w[9..11], &[0x3053_5452, 0x18]);
        assert_eq!(&w[11..], &[1, 0, 0x18, 0, 0x18, 1]);
    }

    #[test]
    fn test_cbv_layout() {
        let blob = serialize(&v1_0(RootSignatureDesc {
            parameters: vec![RootParameter::cbv(3, 0, ShaderVisibility::All)],
            ..Default::default()
        }));
        assert_eq!(blob.len(), 0x58);
        let w: Vec<u32> = words(&blob).collect();
        assert_eq!(&w[11..], &[1, 1, 0x18, 0, 0x2c, 0, 2, 0, 0x24, 3, 0]);
    }

    #[test]
    fn test_table_layout() {
        let desc = v1_0(RootSignatureDesc {
            parameters: vec![RootParameter::table(
                vec![
                    DescriptorRange::new(DescriptorRangeType::Srv, 2, 0),
                    DescriptorRange::new(DescriptorRangeType::Uav, 1, 1),
                ],
                ShaderVisibility::Pixel,
            )],
            ..Default::default()
        });
        let chunk = encode(&desc);
        let w: Vec<u32> = words(&chunk).collect();
        // Header, parameter header, range count and offset.
        assert_eq!(&w[..11], &[1, 1, 0x18, 0, 0x54, 0, 0, 5, 0x24, 2, 0x2c]);
        assert_eq!(&w[11..16], &[0, 2, 0, 0, 0xffff_ffff]);
        assert_eq!(chunk.len(), 0x54);
        assert_eq!(decode(&chunk).unwrap(), desc);
    }

    #[test]
    fn test_v1_1_layout() {
        let desc = VersionedRootSignatureDesc::V1_1(RootSignatureDesc1 {
            parameters: vec![
                RootParameter1 {
                    kind: RootParameterKind1::Cbv(RootDescriptor1 {
                        shader_register: 0,
                        register_space: 0,
                        flags: RootDescriptorFlags::DATA_STATIC,
                    }),
                    shader_visibility: ShaderVisibility::All,
                },
                RootParameter1 {
                    kind: RootParameterKind1::DescriptorTable(vec![DescriptorRange1 {
                        range_type: DescriptorRangeType::Cbv,
                        num_descriptors: 1,
                        base_shader_register: 1,
                        register_space: 0,
                        flags: DescriptorRangeFlags::DATA_VOLATILE,
                        offset_in_descriptors_from_table_start: 0,
                    }]),
                    shader_visibility: ShaderVisibility::Vertex,
                },
            ],
            ..Default::default()
        });
        let chunk = encode(&desc);
        let w: Vec<u32> = words(&chunk).collect();
        assert_eq!(w[0], 2);
        // CBV payload at 0x30 carries flags, table payload follows at 0x3c.
        assert_eq!(&w[6..12], &[2, 0, 0x30, 0, 1, 0x3c]);
        assert_eq!(&w[12..15], &[0, 0, 8]);
        assert_eq!(&w[15..17], &[1, 0x44]);
        assert_eq!(&w[17..23], &[2, 1, 1, 0, 2, 0]);
        assert_eq!(decode(&chunk).unwrap(), desc);
    }

    #[test]
    fn test_static_sampler_words() {
        let desc = v1_0(RootSignatureDesc {
            static_samplers: vec![StaticSamplerDesc::default_at(0)],
            ..Default::default()
        });
        let chunk = encode(&desc);
        let w: Vec<u32> = words(&chunk).collect();
        assert_eq!(
            &w[6..],
            &[0x55, 1, 1, 1, 0, 16, 4, 2, 0, 0x7f7f_ffff, 0, 0, 0]
        );
        assert_eq!(serialize(&desc).len(), 0x78);
        assert_eq!(decode(&chunk).unwrap(), desc);
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        let mut chunk = encode(&v1_0(RootSignatureDesc {
            parameters: vec![RootParameter::uav(6, 0, ShaderVisibility::All)],
            ..Default::default()
        }));
        chunk[0] = 3;
        assert_eq!(
            decode(&chunk),
            Err(DxbcError::UnsupportedRootSignatureVersion(3))
        );
        chunk[0] = 1;
        chunk[24] = 9;
        assert!(matches!(
            decode(&chunk),
            Err(DxbcError::InvalidValue {
                field: "parameter type",
                value: 9
            })
        ));
        assert!(matches!(
            decode(&chunk[..20]),
            Err(DxbcError::OutOfBounds { .. })
        ));
    }
}
