//! Sub-resource placement and texel encoding.
//!
//! Textures are stored linearly using the same placement that copyable
//! footprints describe, so copies between buffers and textures are plain
//! row copies.

use half::f16;

use crate::api::format::{row_count, row_size};
use crate::api::{
    CopyableFootprints, Format, PlacedSubresourceFootprint, ResourceDesc, SubresourceFootprint,
    TEXTURE_DATA_PITCH_ALIGNMENT, TEXTURE_DATA_PLACEMENT_ALIGNMENT,
};

pub fn align(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Copyable footprints of `count` sub-resources starting at `first`.
pub fn copyable_footprints(
    desc: &ResourceDesc,
    first: u32,
    count: u32,
    base_offset: u64,
) -> CopyableFootprints {
    let total = desc.subresource_count();
    let valid = first < total && count <= total - first && base_offset % TEXTURE_DATA_PLACEMENT_ALIGNMENT == 0;
    if !valid {
        return invalid_footprints(count);
    }

    let mut out = CopyableFootprints::default();
    let mut offset = 0u64;
    let mut end = 0u64;
    for i in first..first + count {
        let mip = i % desc.mip_count();
        let width = desc.mip_width(mip);
        let height = desc.mip_height(mip);
        let depth = desc.mip_depth(mip);
        let rows = row_count(desc.format, height);
        let row_bytes = row_size(desc.format, width);
        let pitch = align(u64::from(row_bytes), u64::from(TEXTURE_DATA_PITCH_ALIGNMENT));

        offset = align(offset, TEXTURE_DATA_PLACEMENT_ALIGNMENT);
        out.layouts.push(PlacedSubresourceFootprint {
            offset: base_offset + offset,
            footprint: SubresourceFootprint {
                format: desc.format,
                width,
                height,
                depth,
                row_pitch: pitch as u32,
            },
        });
        out.row_counts.push(rows);
        out.row_sizes.push(u64::from(row_bytes));

        let size = pitch * u64::from(rows) * u64::from(depth);
        end = offset + size;
        offset = end;
    }
    out.total_bytes = end;
    out
}

fn invalid_footprints(count: u32) -> CopyableFootprints {
    let n = count as usize;
    CopyableFootprints {
        layouts: vec![
            PlacedSubresourceFootprint {
                offset: u64::MAX,
                footprint: SubresourceFootprint {
                    format: Format(u32::MAX),
                    width: u32::MAX,
                    height: u32::MAX,
                    depth: u32::MAX,
                    row_pitch: u32::MAX,
                },
            };
            n
        ],
        row_counts: vec![u32::MAX; n],
        row_sizes: vec![u64::MAX; n],
        total_bytes: u64::MAX,
    }
}

/// Bytes of storage backing every sub-resource of `desc`.
pub fn storage_size(desc: &ResourceDesc) -> u64 {
    if desc.is_buffer() {
        desc.width
    } else {
        copyable_footprints(desc, 0, desc.subresource_count(), 0).total_bytes
    }
}

fn unorm(value: f32, max: f64) -> u32 {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    (f64::from(v) * max + 0.5) as u32
}

fn snorm(value: f32, max: f32) -> i32 {
    let v = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    (v * max).round() as i32
}

pub fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Encode a clear colour for one texel of `format`. `None` for formats the
/// reference adapter cannot render to.
pub fn encode_color(format: Format, color: [f32; 4]) -> Option<Vec<u8>> {
    let [r, g, b, a] = color;
    let bytes = match format {
        Format::R8G8B8A8_UNORM => [r, g, b, a].map(|c| unorm(c, 255.0) as u8).to_vec(),
        Format::R8G8B8A8_UNORM_SRGB => [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b), a]
            .map(|c| unorm(c, 255.0) as u8)
            .to_vec(),
        Format::B8G8R8A8_UNORM => [b, g, r, a].map(|c| unorm(c, 255.0) as u8).to_vec(),
        Format::B8G8R8A8_UNORM_SRGB => [linear_to_srgb(b), linear_to_srgb(g), linear_to_srgb(r), a]
            .map(|c| unorm(c, 255.0) as u8)
            .to_vec(),
        Format::R8G8B8A8_SNORM => [r, g, b, a].map(|c| snorm(c, 127.0) as i8 as u8).to_vec(),
        Format::R8G8B8A8_UINT => [r, g, b, a].map(|c| c as u8).to_vec(),
        Format::R8G8_UNORM => vec![unorm(r, 255.0) as u8, unorm(g, 255.0) as u8],
        Format::R8_UNORM | Format::A8_UNORM => {
            let c = if format == Format::A8_UNORM { a } else { r };
            vec![unorm(c, 255.0) as u8]
        }
        Format::R8_UINT => vec![r as u8],
        Format::R16_UNORM => (unorm(r, 65535.0) as u16).to_le_bytes().to_vec(),
        Format::R16_UINT => (r as u16).to_le_bytes().to_vec(),
        Format::R16_FLOAT => f16::from_f32(r).to_le_bytes().to_vec(),
        Format::R16G16_FLOAT => [r, g].iter().flat_map(|c| f16::from_f32(*c).to_le_bytes()).collect(),
        Format::R16G16B16A16_FLOAT => [r, g, b, a]
            .iter()
            .flat_map(|c| f16::from_f32(*c).to_le_bytes())
            .collect(),
        Format::R16G16B16A16_UNORM => [r, g, b, a]
            .iter()
            .flat_map(|c| (unorm(*c, 65535.0) as u16).to_le_bytes())
            .collect(),
        Format::R32_FLOAT => r.to_le_bytes().to_vec(),
        Format::R32_UINT => (r as u32).to_le_bytes().to_vec(),
        Format::R32_SINT => (r as i32).to_le_bytes().to_vec(),
        Format::R32G32_FLOAT => [r, g].iter().flat_map(|c| c.to_le_bytes()).collect(),
        Format::R32G32B32A32_FLOAT => [r, g, b, a].iter().flat_map(|c| c.to_le_bytes()).collect(),
        Format::R32G32B32A32_UINT => [r, g, b, a]
            .iter()
            .flat_map(|c| (*c as u32).to_le_bytes())
            .collect(),
        Format::R10G10B10A2_UNORM => {
            let packed = unorm(r, 1023.0)
                | unorm(g, 1023.0) << 10
                | unorm(b, 1023.0) << 20
                | unorm(a, 3.0) << 30;
            packed.to_le_bytes().to_vec()
        }
        _ => return None,
    };
    Some(bytes)
}

/// Encode the colour words of a pixel program output. Float formats take
/// the words as IEEE bits, integer formats take them verbatim.
pub fn encode_output(format: Format, words: [u32; 4]) -> Option<Vec<u8>> {
    match format {
        Format::R32G32B32A32_UINT => Some(words.iter().flat_map(|w| w.to_le_bytes()).collect()),
        Format::R32_UINT => Some(words[0].to_le_bytes().to_vec()),
        _ => encode_color(format, words.map(f32::from_bits)),
    }
}

/// Which parts of a depth/stencil texel a clear writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilWrite {
    pub depth: Option<f32>,
    pub stencil: Option<u8>,
}

/// Apply a depth/stencil clear to one texel in place. Returns false for
/// formats without a depth or stencil aspect.
pub fn write_depth_stencil(format: Format, texel: &mut [u8], write: DepthStencilWrite) -> bool {
    match format {
        Format::D32_FLOAT => {
            if let Some(d) = write.depth {
                texel[..4].copy_from_slice(&d.clamp(0.0, 1.0).to_le_bytes());
            }
        }
        Format::D16_UNORM => {
            if let Some(d) = write.depth {
                texel[..2].copy_from_slice(&(unorm(d, 65535.0) as u16).to_le_bytes());
            }
        }
        Format::D24_UNORM_S8_UINT => {
            let mut word = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
            if let Some(d) = write.depth {
                word = (word & 0xff00_0000) | unorm(d, 16_777_215.0);
            }
            if let Some(s) = write.stencil {
                word = (word & 0x00ff_ffff) | u32::from(s) << 24;
            }
            texel[..4].copy_from_slice(&word.to_le_bytes());
        }
        Format::D32_FLOAT_S8X24_UINT => {
            if let Some(d) = write.depth {
                texel[..4].copy_from_slice(&d.clamp(0.0, 1.0).to_le_bytes());
            }
            if let Some(s) = write.stencil {
                texel[4] = s;
            }
        }
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ResourceDimension, ResourceFlags};

    #[test]
    fn test_footprints_of_mip_chain() {
        let mut desc = ResourceDesc::texture2d(32, 32, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 3;
        let fp = copyable_footprints(&desc, 0, 3, 0);
        assert_eq!(fp.layouts[0].offset, 0);
        assert_eq!(fp.layouts[0].footprint.row_pitch, 256);
        assert_eq!(fp.row_sizes[0], 128);
        // 256 * 32 = 8192, already aligned.
        assert_eq!(fp.layouts[1].offset, 8192);
        assert_eq!(fp.layouts[1].footprint.width, 16);
        assert_eq!(fp.layouts[2].offset, 8192 + 4096);
        assert_eq!(fp.row_counts[2], 8);
        assert_eq!(fp.total_bytes, 8192 + 4096 + 2048);
    }

    #[test]
    fn test_footprints_of_block_compressed() {
        let desc = ResourceDesc::texture2d(10, 10, Format::BC1_UNORM, ResourceFlags::NONE);
        let fp = copyable_footprints(&desc, 0, 1, 1024);
        assert_eq!(fp.row_counts[0], 3);
        assert_eq!(fp.row_sizes[0], 24);
        assert_eq!(fp.layouts[0].offset, 1024);
        assert_eq!(fp.total_bytes, 256 * 3);
    }

    #[test]
    fn test_footprints_of_volume() {
        let mut desc = ResourceDesc::texture2d(4, 4, Format::R32_FLOAT, ResourceFlags::NONE);
        desc.dimension = ResourceDimension::Texture3D;
        desc.depth_or_array_size = 4;
        desc.mip_levels = 2;
        let fp = copyable_footprints(&desc, 0, 2, 0);
        assert_eq!(fp.layouts[0].footprint.depth, 4);
        assert_eq!(fp.layouts[1].footprint.depth, 2);
        assert_eq!(fp.layouts[1].offset, 256 * 4 * 4);
    }

    #[test]
    fn test_invalid_range_fills_ones() {
        let desc = ResourceDesc::texture2d(4, 4, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        let fp = copyable_footprints(&desc, 1, 1, 0);
        assert_eq!(fp.total_bytes, u64::MAX);
        assert_eq!(fp.layouts[0].offset, u64::MAX);
        assert_eq!(fp.row_counts, vec![u32::MAX]);
    }

    #[test]
    fn test_footprints_past_the_mip_chain() {
        let mut desc = ResourceDesc::texture2d(1, 1, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 40;
        let fp = copyable_footprints(&desc, 35, 1, 0);
        assert_eq!(fp.layouts[0].footprint.width, 1);
        assert_eq!(fp.layouts[0].footprint.height, 1);
        assert_eq!(fp.total_bytes, 256);
        assert_eq!(copyable_footprints(&desc, 35, 6, 0).total_bytes, u64::MAX);
    }

    #[test]
    fn test_zero_mip_levels_cover_the_chain() {
        let mut desc = ResourceDesc::texture2d(16, 4, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 0;
        let fp = copyable_footprints(&desc, 0, 5, 0);
        assert_eq!(fp.layouts.len(), 5);
        assert_eq!(fp.layouts[4].footprint.width, 1);
        assert_ne!(fp.total_bytes, u64::MAX);
        assert_eq!(copyable_footprints(&desc, 0, 6, 0).total_bytes, u64::MAX);
    }

    #[test]
    fn test_encode_unorm_rounds() {
        assert_eq!(
            encode_color(Format::R8G8B8A8_UNORM, [0.0, 1.0, 0.0, 1.0]),
            Some(vec![0, 255, 0, 255])
        );
        let srgb = encode_color(Format::R8G8B8A8_UNORM_SRGB, [0.1, 0.5, 0.3, 0.75]).unwrap();
        assert_eq!(srgb, vec![0x59, 0xbc, 0x95, 0xbf]);
        assert_eq!(encode_color(Format::BC1_UNORM, [0.0; 4]), None);
    }

    #[test]
    fn test_depth_stencil_partial_write() {
        let mut texel = [0u8; 4];
        write_depth_stencil(
            Format::D24_UNORM_S8_UINT,
            &mut texel,
            DepthStencilWrite {
                depth: Some(1.0),
                stencil: None,
            },
        );
        assert_eq!(u32::from_le_bytes(texel), 0x00ff_ffff);
        write_depth_stencil(
            Format::D24_UNORM_S8_UINT,
            &mut texel,
            DepthStencilWrite {
                depth: None,
                stencil: Some(0x80),
            },
        );
        assert_eq!(u32::from_le_bytes(texel), 0x80ff_ffff);
    }

    #[test]
    fn test_depth_stencil_write_compares_by_value() {
        let depth = |depth| DepthStencilWrite {
            depth: Some(depth),
            stencil: Some(1),
        };
        assert_eq!(depth(0.5), depth(0.5));
        assert_ne!(depth(0.5), depth(0.25));
        // NaN depths never compare equal.
        assert_ne!(depth(f32::NAN), depth(f32::NAN));
    }
}
