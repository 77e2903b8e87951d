//! Root signature descriptions, versions 1.0 and 1.1.

use bitflags::bitflags;

use crate::api::types::{ComparisonFunc, Filter, StaticBorderColor, TextureAddressMode};

/// Architectural limit on the size of a root signature, in 32-bit words.
pub const MAX_ROOT_COST: u32 = 64;

/// Appends a range directly after the previous one in its table.
pub const DESCRIPTOR_RANGE_OFFSET_APPEND: u32 = 0xffff_ffff;

pub const FLOAT32_MAX: f32 = f32::MAX;

api_enum! {
    pub enum RootSignatureVersion {
        V1_0 = 0x1,
        V1_1 = 0x2,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootSignatureFlags: u32 {
        const NONE = 0;
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 0x1;
        const DENY_VERTEX_SHADER_ROOT_ACCESS = 0x2;
        const DENY_HULL_SHADER_ROOT_ACCESS = 0x4;
        const DENY_DOMAIN_SHADER_ROOT_ACCESS = 0x8;
        const DENY_GEOMETRY_SHADER_ROOT_ACCESS = 0x10;
        const DENY_PIXEL_SHADER_ROOT_ACCESS = 0x20;
        const ALLOW_STREAM_OUTPUT = 0x40;
        const LOCAL_ROOT_SIGNATURE = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorRangeFlags: u32 {
        const NONE = 0;
        const DESCRIPTORS_VOLATILE = 0x1;
        const DATA_VOLATILE = 0x2;
        const DATA_STATIC_WHILE_SET_AT_EXECUTE = 0x4;
        const DATA_STATIC = 0x8;
        const DESCRIPTORS_STATIC_KEEPING_BUFFER_BOUNDS_CHECKS = 0x10000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootDescriptorFlags: u32 {
        const NONE = 0;
        const DATA_VOLATILE = 0x2;
        const DATA_STATIC_WHILE_SET_AT_EXECUTE = 0x4;
        const DATA_STATIC = 0x8;
    }
}

api_enum! {
    pub enum DescriptorRangeType {
        Srv = 0,
        Uav = 1,
        Cbv = 2,
        Sampler = 3,
    }
}

api_enum! {
    pub enum RootParameterType {
        DescriptorTable = 0,
        Constants32Bit = 1,
        Cbv = 2,
        Srv = 3,
        Uav = 4,
    }
}

api_enum! {
    pub enum ShaderVisibility {
        All = 0,
        Vertex = 1,
        Hull = 2,
        Domain = 3,
        Geometry = 4,
        Pixel = 5,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub range_type: DescriptorRangeType,
    pub num_descriptors: u32,
    pub base_shader_register: u32,
    pub register_space: u32,
    pub offset_in_descriptors_from_table_start: u32,
}

impl DescriptorRange {
    pub fn new(range_type: DescriptorRangeType, num_descriptors: u32, base_shader_register: u32) -> Self {
        Self {
            range_type,
            num_descriptors,
            base_shader_register,
            register_space: 0,
            offset_in_descriptors_from_table_start: DESCRIPTOR_RANGE_OFFSET_APPEND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange1 {
    pub range_type: DescriptorRangeType,
    pub num_descriptors: u32,
    pub base_shader_register: u32,
    pub register_space: u32,
    pub flags: DescriptorRangeFlags,
    pub offset_in_descriptors_from_table_start: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootConstants {
    pub shader_register: u32,
    pub register_space: u32,
    pub num_32bit_values: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootDescriptor {
    pub shader_register: u32,
    pub register_space: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootDescriptor1 {
    pub shader_register: u32,
    pub register_space: u32,
    pub flags: RootDescriptorFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameterKind {
    DescriptorTable(Vec<DescriptorRange>),
    Constants(RootConstants),
    Cbv(RootDescriptor),
    Srv(RootDescriptor),
    Uav(RootDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameterKind1 {
    DescriptorTable(Vec<DescriptorRange1>),
    Constants(RootConstants),
    Cbv(RootDescriptor1),
    Srv(RootDescriptor1),
    Uav(RootDescriptor1),
}

macro_rules! parameter_type {
    ($kind:ident) => {
        impl $kind {
            pub fn parameter_type(&self) -> RootParameterType {
                match self {
                    $kind::DescriptorTable(_) => RootParameterType::DescriptorTable,
                    $kind::Constants(_) => RootParameterType::Constants32Bit,
                    $kind::Cbv(_) => RootParameterType::Cbv,
                    $kind::Srv(_) => RootParameterType::Srv,
                    $kind::Uav(_) => RootParameterType::Uav,
                }
            }

            /// Size of this parameter in the root, in 32-bit words.
            pub fn dword_cost(&self) -> u32 {
                match self {
                    $kind::DescriptorTable(_) => 1,
                    $kind::Constants(c) => c.num_32bit_values,
                    $kind::Cbv(_) | $kind::Srv(_) | $kind::Uav(_) => 2,
                }
            }
        }
    };
}

parameter_type!(RootParameterKind);
parameter_type!(RootParameterKind1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootParameter {
    pub kind: RootParameterKind,
    pub shader_visibility: ShaderVisibility,
}

impl RootParameter {
    pub fn table(ranges: Vec<DescriptorRange>, shader_visibility: ShaderVisibility) -> Self {
        Self {
            kind: RootParameterKind::DescriptorTable(ranges),
            shader_visibility,
        }
    }

    pub fn constants(
        shader_register: u32,
        register_space: u32,
        num_32bit_values: u32,
        shader_visibility: ShaderVisibility,
    ) -> Self {
        Self {
            kind: RootParameterKind::Constants(RootConstants {
                shader_register,
                register_space,
                num_32bit_values,
            }),
            shader_visibility,
        }
    }

    pub fn cbv(shader_register: u32, register_space: u32, shader_visibility: ShaderVisibility) -> Self {
        Self {
            kind: RootParameterKind::Cbv(RootDescriptor {
                shader_register,
                register_space,
            }),
            shader_visibility,
        }
    }

    pub fn srv(shader_register: u32, register_space: u32, shader_visibility: ShaderVisibility) -> Self {
        Self {
            kind: RootParameterKind::Srv(RootDescriptor {
                shader_register,
                register_space,
            }),
            shader_visibility,
        }
    }

    pub fn uav(shader_register: u32, register_space: u32, shader_visibility: ShaderVisibility) -> Self {
        Self {
            kind: RootParameterKind::Uav(RootDescriptor {
                shader_register,
                register_space,
            }),
            shader_visibility,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootParameter1 {
    pub kind: RootParameterKind1,
    pub shader_visibility: ShaderVisibility,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSamplerDesc {
    pub filter: Filter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: StaticBorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
    pub shader_register: u32,
    pub register_space: u32,
    pub shader_visibility: ShaderVisibility,
}

impl StaticSamplerDesc {
    /// Anisotropic wrap sampler with the helper-library defaults.
    pub fn default_at(shader_register: u32) -> Self {
        Self {
            filter: Filter::ANISOTROPIC,
            address_u: TextureAddressMode::Wrap,
            address_v: TextureAddressMode::Wrap,
            address_w: TextureAddressMode::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
            comparison_func: ComparisonFunc::LessEqual,
            border_color: StaticBorderColor::OpaqueWhite,
            min_lod: 0.0,
            max_lod: FLOAT32_MAX,
            shader_register,
            register_space: 0,
            shader_visibility: ShaderVisibility::All,
        }
    }

    pub fn point_clamp(shader_register: u32, shader_visibility: ShaderVisibility) -> Self {
        Self {
            filter: Filter::MIN_MAG_MIP_POINT,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 0,
            comparison_func: ComparisonFunc::Never,
            border_color: StaticBorderColor::OpaqueWhite,
            min_lod: 0.0,
            max_lod: 0.0,
            shader_register,
            register_space: 0,
            shader_visibility,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSamplerDesc>,
    pub flags: RootSignatureFlags,
}

impl RootSignatureDesc {
    pub fn dword_cost(&self) -> u32 {
        self.parameters.iter().map(|p| p.kind.dword_cost()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootSignatureDesc1 {
    pub parameters: Vec<RootParameter1>,
    pub static_samplers: Vec<StaticSamplerDesc>,
    pub flags: RootSignatureFlags,
}

impl RootSignatureDesc1 {
    pub fn dword_cost(&self) -> u32 {
        self.parameters.iter().map(|p| p.kind.dword_cost()).sum()
    }
}

/// A root signature description tagged with its version.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionedRootSignatureDesc {
    V1_0(RootSignatureDesc),
    V1_1(RootSignatureDesc1),
}

impl VersionedRootSignatureDesc {
    pub fn version(&self) -> RootSignatureVersion {
        match self {
            VersionedRootSignatureDesc::V1_0(_) => RootSignatureVersion::V1_0,
            VersionedRootSignatureDesc::V1_1(_) => RootSignatureVersion::V1_1,
        }
    }

    pub fn flags(&self) -> RootSignatureFlags {
        match self {
            VersionedRootSignatureDesc::V1_0(d) => d.flags,
            VersionedRootSignatureDesc::V1_1(d) => d.flags,
        }
    }

    pub fn dword_cost(&self) -> u32 {
        match self {
            VersionedRootSignatureDesc::V1_0(d) => d.dword_cost(),
            VersionedRootSignatureDesc::V1_1(d) => d.dword_cost(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            VersionedRootSignatureDesc::V1_0(d) => d.parameters.len(),
            VersionedRootSignatureDesc::V1_1(d) => d.parameters.len(),
        }
    }

    pub fn static_samplers(&self) -> &[StaticSamplerDesc] {
        match self {
            VersionedRootSignatureDesc::V1_0(d) => &d.static_samplers,
            VersionedRootSignatureDesc::V1_1(d) => &d.static_samplers,
        }
    }

    /// The same root signature expressed at `version`.
    pub fn convert_to(&self, version: RootSignatureVersion) -> VersionedRootSignatureDesc {
        match (self, version) {
            (VersionedRootSignatureDesc::V1_0(d), RootSignatureVersion::V1_1) => {
                VersionedRootSignatureDesc::V1_1(upgrade(d))
            }
            (VersionedRootSignatureDesc::V1_1(d), RootSignatureVersion::V1_0) => {
                VersionedRootSignatureDesc::V1_0(downgrade(d))
            }
            _ => self.clone(),
        }
    }
}

/// 1.0 semantics expressed with 1.1 flags: everything is volatile.
fn upgrade(desc: &RootSignatureDesc) -> RootSignatureDesc1 {
    let parameters = desc
        .parameters
        .iter()
        .map(|p| {
            let descriptor = |d: &RootDescriptor| RootDescriptor1 {
                shader_register: d.shader_register,
                register_space: d.register_space,
                flags: RootDescriptorFlags::DATA_VOLATILE,
            };
            let kind = match &p.kind {
                RootParameterKind::DescriptorTable(ranges) => RootParameterKind1::DescriptorTable(
                    ranges
                        .iter()
                        .map(|r| DescriptorRange1 {
                            range_type: r.range_type,
                            num_descriptors: r.num_descriptors,
                            base_shader_register: r.base_shader_register,
                            register_space: r.register_space,
                            flags: if r.range_type == DescriptorRangeType::Sampler {
                                DescriptorRangeFlags::DESCRIPTORS_VOLATILE
                            } else {
                                DescriptorRangeFlags::DESCRIPTORS_VOLATILE
                                    | DescriptorRangeFlags::DATA_VOLATILE
                            },
                            offset_in_descriptors_from_table_start: r
                                .offset_in_descriptors_from_table_start,
                        })
                        .collect(),
                ),
                RootParameterKind::Constants(c) => RootParameterKind1::Constants(*c),
                RootParameterKind::Cbv(d) => RootParameterKind1::Cbv(descriptor(d)),
                RootParameterKind::Srv(d) => RootParameterKind1::Srv(descriptor(d)),
                RootParameterKind::Uav(d) => RootParameterKind1::Uav(descriptor(d)),
            };
            RootParameter1 {
                kind,
                shader_visibility: p.shader_visibility,
            }
        })
        .collect();

    RootSignatureDesc1 {
        parameters,
        static_samplers: desc.static_samplers.clone(),
        flags: desc.flags,
    }
}

fn downgrade(desc: &RootSignatureDesc1) -> RootSignatureDesc {
    let parameters = desc
        .parameters
        .iter()
        .map(|p| {
            let descriptor = |d: &RootDescriptor1| RootDescriptor {
                shader_register: d.shader_register,
                register_space: d.register_space,
            };
            let kind = match &p.kind {
                RootParameterKind1::DescriptorTable(ranges) => RootParameterKind::DescriptorTable(
                    ranges
                        .iter()
                        .map(|r| DescriptorRange {
                            range_type: r.range_type,
                            num_descriptors: r.num_descriptors,
                            base_shader_register: r.base_shader_register,
                            register_space: r.register_space,
                            offset_in_descriptors_from_table_start: r
                                .offset_in_descriptors_from_table_start,
                        })
                        .collect(),
                ),
                RootParameterKind1::Constants(c) => RootParameterKind::Constants(*c),
                RootParameterKind1::Cbv(d) => RootParameterKind::Cbv(descriptor(d)),
                RootParameterKind1::Srv(d) => RootParameterKind::Srv(descriptor(d)),
                RootParameterKind1::Uav(d) => RootParameterKind::Uav(descriptor(d)),
            };
            RootParameter {
                kind,
                shader_visibility: p.shader_visibility,
            }
        })
        .collect();

    RootSignatureDesc {
        parameters,
        static_samplers: desc.static_samplers.clone(),
        flags: desc.flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dword_cost() {
        let desc = RootSignatureDesc {
            parameters: vec![
                RootParameter::constants(0, 0, 4, ShaderVisibility::All),
                RootParameter::cbv(0, 0, ShaderVisibility::All),
                RootParameter::table(
                    vec![DescriptorRange::new(DescriptorRangeType::Srv, 1, 0)],
                    ShaderVisibility::Pixel,
                ),
            ],
            ..Default::default()
        };
        assert_eq!(desc.dword_cost(), 7);
    }

    #[test]
    fn test_upgrade_marks_volatile() {
        let desc = VersionedRootSignatureDesc::V1_0(RootSignatureDesc {
            parameters: vec![
                RootParameter::table(
                    vec![
                        DescriptorRange::new(DescriptorRangeType::Srv, 1, 0),
                        DescriptorRange::new(DescriptorRangeType::Sampler, 1, 0),
                    ],
                    ShaderVisibility::All,
                ),
                RootParameter::uav(6, 0, ShaderVisibility::All),
            ],
            ..Default::default()
        });
        let VersionedRootSignatureDesc::V1_1(upgraded) = desc.convert_to(RootSignatureVersion::V1_1)
        else {
            panic!("expected a 1.1 description");
        };
        let RootParameterKind1::DescriptorTable(ranges) = &upgraded.parameters[0].kind else {
            panic!("expected a table");
        };
        assert_eq!(
            ranges[0].flags,
            DescriptorRangeFlags::DESCRIPTORS_VOLATILE | DescriptorRangeFlags::DATA_VOLATILE
        );
        assert_eq!(ranges[1].flags, DescriptorRangeFlags::DESCRIPTORS_VOLATILE);
        assert_eq!(
            upgraded.parameters[1].kind,
            RootParameterKind1::Uav(RootDescriptor1 {
                shader_register: 6,
                register_space: 0,
                flags: RootDescriptorFlags::DATA_VOLATILE,
            })
        );

        let back = VersionedRootSignatureDesc::V1_1(upgraded).convert_to(RootSignatureVersion::V1_0);
        assert_eq!(back, desc);
    }
}
