//! Root signature blob checks.
//!
//! The battery pairs hand-assembled blobs with the descriptions they encode.
//! Blobs are compared word by word, skipping the container digest.

use crate::api::{
    ComparisonFunc, DescriptorRange, DescriptorRange1, DescriptorRangeFlags, DescriptorRangeType,
    Filter, RootDescriptor1, RootDescriptorFlags, RootParameter, RootParameter1,
    RootParameterKind1, RootSignatureDesc, RootSignatureDesc1, RootSignatureFlags, Runtime,
    ShaderVisibility, StaticBorderColor, StaticSamplerDesc, TextureAddressMode,
    VersionedRootSignatureDesc,
};
use crate::dxbc::{from_words, words};
use crate::harness::report;

const DXBC: u32 = 0x4342_5844;
const RTS0: u32 = 0x3053_5452;

/// Words 1..=4 of a container hold the digest.
const DIGEST_WORDS: std::ops::RangeInclusive<usize> = 1..=4;

/// Wrap chunk words in a single-chunk container carrying `digest`.
fn container(digest: [u32; 4], chunk: &[u32]) -> Vec<u8> {
    let chunk_size = (chunk.len() * 4) as u32;
    let mut out = vec![DXBC];
    out.extend_from_slice(&digest);
    out.extend_from_slice(&[1, 0x2c + chunk_size, 1, 0x24, RTS0, chunk_size]);
    out.extend_from_slice(chunk);
    from_words(&out)
}

pub struct RootSignatureBlob {
    pub name: &'static str,
    pub blob: Vec<u8>,
    pub desc: VersionedRootSignatureDesc,
}

fn v1_0(name: &'static str, digest: [u32; 4], chunk: &[u32], desc: RootSignatureDesc) -> RootSignatureBlob {
    RootSignatureBlob {
        name,
        blob: container(digest, chunk),
        desc: VersionedRootSignatureDesc::V1_0(desc),
    }
}

fn v1_1(name: &'static str, digest: [u32; 4], chunk: &[u32], desc: RootSignatureDesc1) -> RootSignatureBlob {
    RootSignatureBlob {
        name,
        blob: container(digest, chunk),
        desc: VersionedRootSignatureDesc::V1_1(desc),
    }
}

const MAX_LOD: u32 = 0x7f7f_ffff;

/// Known blob/description pairs.
pub fn battery() -> Vec<RootSignatureBlob> {
    let mut out = Vec::new();

    out.push(v1_0(
        "empty",
        [0xd64a_fc1d, 0x5dc2_7735, 0x9eda_cb4a, 0x6bd8_a7fa],
        &[1, 0, 0x18, 0, 0x18, 0],
        RootSignatureDesc::default(),
    ));

    out.push(v1_0(
        "input assembler",
        [0x8572_7f1b, 0xe85f_b4c5, 0x3a2e_d80a, 0x2c14_46dc],
        &[1, 0, 0x18, 0, 0x18, 1],
        RootSignatureDesc {
            flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "deny pixel shader",
        [0x1b90_6b1f, 0x2de1_b442, 0xdf2c_9c72, 0x02a4_e9c3],
        &[1, 0, 0x18, 0, 0x18, 0x20],
        RootSignatureDesc {
            flags: RootSignatureFlags::DENY_PIXEL_SHADER_ROOT_ACCESS,
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "cbv",
        [0x8dc5_087e, 0x5cb9_bf0d, 0x2e46_5ae3, 0x6291_e0e0],
        &[1, 1, 0x18, 0, 0x2c, 0,
          2, 0, 0x24,
          3, 0],
        RootSignatureDesc {
            parameters: vec![RootParameter::cbv(3, 0, ShaderVisibility::All)],
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "cbv in register space",
        [0x6d4c_d7ff, 0x6c90_1a6b, 0x1c2b_e3a0, 0x5e14_2eb6],
        &[1, 1, 0x18, 0, 0x2c, 0,
          2, 4, 0x24,
          4, 3],
        RootSignatureDesc {
            parameters: vec![RootParameter::cbv(4, 3, ShaderVisibility::Geometry)],
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "srv",
        [0xbc00_e5e0, 0xffff_2fd3, 0x85c2_d405, 0xa61d_b5ba],
        &[1, 1, 0x18, 0, 0x2c, 0x2,
          3, 0, 0x24,
          9, 0],
        RootSignatureDesc {
            parameters: vec![RootParameter::srv(9, 0, ShaderVisibility::All)],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::DENY_VERTEX_SHADER_ROOT_ACCESS,
        },
    ));

    out.push(v1_0(
        "uav",
        [0xbd67_0c62, 0x5c35_651b, 0xfb9b_9bd1, 0x8a4d_ddde],
        &[1, 1, 0x18, 0, 0x2c, 0,
          4, 0, 0x24,
          6, 0],
        RootSignatureDesc {
            parameters: vec![RootParameter::uav(6, 0, ShaderVisibility::All)],
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "constants",
        [0xbc01_5590, 0xa9d1_4d58, 0xd6e1_3af9, 0x18c9_c4f6],
        &[1, 2, 0x18, 0, 0x48, 0,
          1, 0, 0x30,
          1, 5, 0x3c,
          0, 0, 4,
          1, 0, 8],
        RootSignatureDesc {
            parameters: vec![
                RootParameter::constants(0, 0, 4, ShaderVisibility::All),
                RootParameter::constants(1, 0, 8, ShaderVisibility::Pixel),
            ],
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "descriptor table",
        [0xf2c2_7f36, 0x0ed4_af1a, 0x8a5e_2b9e, 0x4d83_b7d1],
        &[1, 1, 0x18, 0, 0x68, 0,
          0, 0, 0x24,
          3, 0x2c,
          2, 1, 0, 0, 0,
          0, 4, 0, 1, 1,
          1, 2, 0, 0, 0xffff_ffff],
        RootSignatureDesc {
            parameters: vec![RootParameter::table(
                vec![
                    DescriptorRange {
                        offset_in_descriptors_from_table_start: 0,
                        ..DescriptorRange::new(DescriptorRangeType::Cbv, 1, 0)
                    },
                    DescriptorRange {
                        register_space: 1,
                        offset_in_descriptors_from_table_start: 1,
                        ..DescriptorRange::new(DescriptorRangeType::Srv, 4, 0)
                    },
                    DescriptorRange::new(DescriptorRangeType::Uav, 2, 0),
                ],
                ShaderVisibility::All,
            )],
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "default static sampler",
        [0x2876_b8ff, 0x935a_a9b8, 0x7713_7a3c, 0x5f9e_3c16],
        &[1, 0, 0x18, 1, 0x18, 0,
          0x55, 1, 1, 1, 0, 16, 4, 2, 0, MAX_LOD, 0, 0, 0],
        RootSignatureDesc {
            static_samplers: vec![StaticSamplerDesc::default_at(0)],
            ..Default::default()
        },
    ));

    out.push(v1_0(
        "static samplers",
        [0x6e8c_3b43, 0x6dfd_2dd2, 0xf0aa_2a34, 0x9b65_c56d],
        &[1, 0, 0x18, 2, 0x18, 0,
          0x00, 3, 3, 3, 0, 0, 1, 2, 0, 0, 0, 0, 5,
          0x15, 2, 2, 2, 0, 1, 8, 0, 0, MAX_LOD, 1, 2, 1],
        RootSignatureDesc {
            static_samplers: vec![
                StaticSamplerDesc::point_clamp(0, ShaderVisibility::Pixel),
                StaticSamplerDesc {
                    filter: Filter::MIN_MAG_MIP_LINEAR,
                    address_u: TextureAddressMode::Mirror,
                    address_v: TextureAddressMode::Mirror,
                    address_w: TextureAddressMode::Mirror,
                    max_anisotropy: 1,
                    comparison_func: ComparisonFunc::Always,
                    border_color: StaticBorderColor::TransparentBlack,
                    register_space: 2,
                    shader_visibility: ShaderVisibility::Vertex,
                    ..StaticSamplerDesc::default_at(1)
                },
            ],
            ..Default::default()
        },
    ));

    out.push(v1_1(
        "empty 1.1",
        [0x3326_0a5e, 0x7b12_cc40, 0x0a0f_6b5a, 0x2ff4_0b44],
        &[2, 0, 0x18, 0, 0x18, 0],
        RootSignatureDesc1::default(),
    ));

    out.push(v1_1(
        "cbv 1.1",
        [0x7a18_5ae2, 0x3b54_0ba8, 0x5e6b_0d1c, 0xc39f_0f35],
        &[2, 1, 0x18, 0, 0x30, 0,
          2, 0, 0x24,
          0, 0, 8],
        RootSignatureDesc1 {
            parameters: vec![RootParameter1 {
                kind: RootParameterKind1::Cbv(RootDescriptor1 {
                    shader_register: 0,
                    register_space: 0,
                    flags: RootDescriptorFlags::DATA_STATIC,
                }),
                shader_visibility: ShaderVisibility::All,
            }],
            ..Default::default()
        },
    ));

    out.push(v1_1(
        "descriptor table 1.1",
        [0x9d7e_51c4, 0x2b6e_4b8c, 0x44a1_7f06, 0x6c5b_e3e7],
        &[2, 1, 0x18, 0, 0x44, 0,
          0, 0, 0x24,
          1, 0x2c,
          0, 1, 0, 0, 3, 0],
        RootSignatureDesc1 {
            parameters: vec![RootParameter1 {
                kind: RootParameterKind1::DescriptorTable(vec![DescriptorRange1 {
                    range_type: DescriptorRangeType::Srv,
                    num_descriptors: 1,
                    base_shader_register: 0,
                    register_space: 0,
                    flags: DescriptorRangeFlags::DESCRIPTORS_VOLATILE | DescriptorRangeFlags::DATA_VOLATILE,
                    offset_in_descriptors_from_table_start: 0,
                }]),
                shader_visibility: ShaderVisibility::All,
            }],
            ..Default::default()
        },
    ));

    out
}

/// Report the first word where two blobs differ, ignoring the digest.
#[track_caller]
pub fn check_blob_words(got: &[u8], expected: &[u8]) -> bool {
    if !report::check(
        got.len() == expected.len(),
        format!("Got blob size {:#x}, expected {:#x}.", got.len(), expected.len()),
    ) {
        return false;
    }
    let mismatch = words(got)
        .zip(words(expected))
        .enumerate()
        .filter(|(i, _)| !DIGEST_WORDS.contains(i))
        .find(|(_, (a, b))| a != b);
    let message = match mismatch {
        Some((i, (a, b))) => format!("Got {:#010x}, expected {:#010x} at word {}.", a, b, i),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message)
}

#[track_caller]
fn check_desc_1_0(got: &RootSignatureDesc, expected: &RootSignatureDesc) {
    report::check(
        got.flags == expected.flags,
        format!("Got flags {:?}, expected {:?}.", got.flags, expected.flags),
    );
    if report::check(
        got.parameters.len() == expected.parameters.len(),
        format!(
            "Got {} parameters, expected {}.",
            got.parameters.len(),
            expected.parameters.len()
        ),
    ) {
        for (i, (a, b)) in got.parameters.iter().zip(&expected.parameters).enumerate() {
            report::check(a == b, format!("Parameter {}: got {:?}, expected {:?}.", i, a, b));
        }
    }
    check_samplers(&got.static_samplers, &expected.static_samplers);
}

#[track_caller]
fn check_desc_1_1(got: &RootSignatureDesc1, expected: &RootSignatureDesc1) {
    report::check(
        got.flags == expected.flags,
        format!("Got flags {:?}, expected {:?}.", got.flags, expected.flags),
    );
    if report::check(
        got.parameters.len() == expected.parameters.len(),
        format!(
            "Got {} parameters, expected {}.",
            got.parameters.len(),
            expected.parameters.len()
        ),
    ) {
        for (i, (a, b)) in got.parameters.iter().zip(&expected.parameters).enumerate() {
            report::check(a == b, format!("Parameter {}: got {:?}, expected {:?}.", i, a, b));
        }
    }
    check_samplers(&got.static_samplers, &expected.static_samplers);
}

#[track_caller]
fn check_samplers(got: &[StaticSamplerDesc], expected: &[StaticSamplerDesc]) {
    if report::check(
        got.len() == expected.len(),
        format!("Got {} static samplers, expected {}.", got.len(), expected.len()),
    ) {
        for (i, (a, b)) in got.iter().zip(expected).enumerate() {
            report::check(a == b, format!("Static sampler {}: got {:?}, expected {:?}.", i, a, b));
        }
    }
}

/// Decode `blob` with a 1.0 deserializer and compare with `expected`.
#[track_caller]
pub fn check_root_signature_deserialization(runtime: &dyn Runtime, blob: &[u8], expected: &RootSignatureDesc) {
    let Some(deserializer) = report::check_ok(
        runtime.create_root_signature_deserializer(blob),
        "Failed to create deserializer",
    ) else {
        return;
    };
    check_desc_1_0(&deserializer.root_signature_desc(), expected);
    let refcount = deserializer.release();
    report::check(refcount == 0, format!("Deserializer has {} references left.", refcount));
}

/// Encode `desc` and compare with `expected_blob`.
#[track_caller]
pub fn check_root_signature_serialization(runtime: &dyn Runtime, expected_blob: &[u8], desc: &RootSignatureDesc) {
    if let Some(blob) = report::check_ok(runtime.serialize_root_signature(desc), "Failed to serialize") {
        check_blob_words(&blob, expected_blob);
    }
}

#[track_caller]
pub fn check_root_signature_deserialization1(runtime: &dyn Runtime, blob: &[u8], expected: &RootSignatureDesc1) {
    let Some(deserializer) = report::check_ok(
        runtime.create_versioned_root_signature_deserializer(blob),
        "Failed to create versioned deserializer",
    ) else {
        return;
    };
    match deserializer.unconverted_root_signature_desc() {
        VersionedRootSignatureDesc::V1_1(got) => check_desc_1_1(&got, expected),
        other => report::fail(format!("Got version {:?}, expected 1.1.", other.version())),
    }
    let refcount = deserializer.release();
    report::check(refcount == 0, format!("Deserializer has {} references left.", refcount));
}

#[track_caller]
pub fn check_root_signature_serialization1(runtime: &dyn Runtime, expected_blob: &[u8], desc: &RootSignatureDesc1) {
    let versioned = VersionedRootSignatureDesc::V1_1(desc.clone());
    if let Some(blob) = report::check_ok(
        runtime.serialize_versioned_root_signature(&versioned),
        "Failed to serialize",
    ) {
        check_blob_words(&blob, expected_blob);
    }
}

/// Run both directions for one battery entry.
#[track_caller]
pub fn check_root_signature_blob(runtime: &dyn Runtime, entry: &RootSignatureBlob) {
    report::trace(format!("Root signature \"{}\".", entry.name));
    match &entry.desc {
        VersionedRootSignatureDesc::V1_0(desc) => {
            check_root_signature_deserialization(runtime, &entry.blob, desc);
            check_root_signature_serialization(runtime, &entry.blob, desc);
        }
        VersionedRootSignatureDesc::V1_1(desc) => {
            check_root_signature_deserialization1(runtime, &entry.blob, desc);
            check_root_signature_serialization1(runtime, &entry.blob, desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxbc::rts0;
    use crate::reference::ReferenceRuntime;

    #[test]
    fn test_battery_decodes() {
        for entry in battery() {
            let decoded = rts0::deserialize(&entry.blob).unwrap();
            assert_eq!(decoded, entry.desc, "{}", entry.name);
        }
    }

    #[test]
    fn test_battery_against_reference() {
        let runtime = ReferenceRuntime::new();
        let outcome = report::run_test(|| {
            for entry in battery() {
                check_root_signature_blob(&runtime, &entry);
            }
        });
        assert_eq!(outcome.failures, 0, "{:?}", outcome.records);
    }

    #[test]
    fn test_digest_is_ignored() {
        let a = container([1, 2, 3, 4], &[1, 0, 0x18, 0, 0x18, 0]);
        let b = container([5, 6, 7, 8], &[1, 0, 0x18, 0, 0x18, 0]);
        let c = container([1, 2, 3, 4], &[1, 0, 0x18, 0, 0x18, 1]);
        let outcome = report::run_test(|| {
            check_blob_words(&a, &b);
            check_blob_words(&a, &c);
        });
        assert_eq!(outcome.failures, 1);
        assert!(outcome.records[0].message.contains("word 16"));
    }
}
