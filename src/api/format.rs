//! Pixel formats.
//!
//! Values follow the vendor numbering and are passed through unchanged; the
//! harness only needs their structure: bytes per element or block, block
//! extent, and which family a format belongs to.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Format(pub u32);

impl Format {
    pub const UNKNOWN: Format = Format(0);
    pub const R32G32B32A32_TYPELESS: Format = Format(1);
    pub const R32G32B32A32_FLOAT: Format = Format(2);
    pub const R32G32B32A32_UINT: Format = Format(3);
    pub const R32G32B32A32_SINT: Format = Format(4);
    pub const R32G32B32_FLOAT: Format = Format(6);
    pub const R16G16B16A16_TYPELESS: Format = Format(9);
    pub const R16G16B16A16_FLOAT: Format = Format(10);
    pub const R16G16B16A16_UNORM: Format = Format(11);
    pub const R16G16B16A16_UINT: Format = Format(12);
    pub const R32G32_TYPELESS: Format = Format(15);
    pub const R32G32_FLOAT: Format = Format(16);
    pub const R32G32_UINT: Format = Format(17);
    pub const R32G8X24_TYPELESS: Format = Format(19);
    pub const D32_FLOAT_S8X24_UINT: Format = Format(20);
    pub const R10G10B10A2_TYPELESS: Format = Format(23);
    pub const R10G10B10A2_UNORM: Format = Format(24);
    pub const R10G10B10A2_UINT: Format = Format(25);
    pub const R11G11B10_FLOAT: Format = Format(26);
    pub const R8G8B8A8_TYPELESS: Format = Format(27);
    pub const R8G8B8A8_UNORM: Format = Format(28);
    pub const R8G8B8A8_UNORM_SRGB: Format = Format(29);
    pub const R8G8B8A8_UINT: Format = Format(30);
    pub const R8G8B8A8_SNORM: Format = Format(31);
    pub const R8G8B8A8_SINT: Format = Format(32);
    pub const R16G16_TYPELESS: Format = Format(33);
    pub const R16G16_FLOAT: Format = Format(34);
    pub const R16G16_UNORM: Format = Format(35);
    pub const R16G16_UINT: Format = Format(36);
    pub const R32_TYPELESS: Format = Format(39);
    pub const D32_FLOAT: Format = Format(40);
    pub const R32_FLOAT: Format = Format(41);
    pub const R32_UINT: Format = Format(42);
    pub const R32_SINT: Format = Format(43);
    pub const R24G8_TYPELESS: Format = Format(44);
    pub const D24_UNORM_S8_UINT: Format = Format(45);
    pub const R24_UNORM_X8_TYPELESS: Format = Format(46);
    pub const R8G8_TYPELESS: Format = Format(48);
    pub const R8G8_UNORM: Format = Format(49);
    pub const R8G8_UINT: Format = Format(50);
    pub const R16_TYPELESS: Format = Format(53);
    pub const R16_FLOAT: Format = Format(54);
    pub const D16_UNORM: Format = Format(55);
    pub const R16_UNORM: Format = Format(56);
    pub const R16_UINT: Format = Format(57);
    pub const R16_SNORM: Format = Format(58);
    pub const R16_SINT: Format = Format(59);
    pub const R8_TYPELESS: Format = Format(60);
    pub const R8_UNORM: Format = Format(61);
    pub const R8_UINT: Format = Format(62);
    pub const R8_SNORM: Format = Format(63);
    pub const R8_SINT: Format = Format(64);
    pub const A8_UNORM: Format = Format(65);
    pub const R1_UNORM: Format = Format(66);
    pub const R9G9B9E5_SHAREDEXP: Format = Format(67);
    pub const R8G8_B8G8_UNORM: Format = Format(68);
    pub const G8R8_G8B8_UNORM: Format = Format(69);
    pub const BC1_TYPELESS: Format = Format(70);
    pub const BC1_UNORM: Format = Format(71);
    pub const BC1_UNORM_SRGB: Format = Format(72);
    pub const BC2_TYPELESS: Format = Format(73);
    pub const BC2_UNORM: Format = Format(74);
    pub const BC2_UNORM_SRGB: Format = Format(75);
    pub const BC3_TYPELESS: Format = Format(76);
    pub const BC3_UNORM: Format = Format(77);
    pub const BC3_UNORM_SRGB: Format = Format(78);
    pub const BC4_TYPELESS: Format = Format(79);
    pub const BC4_UNORM: Format = Format(80);
    pub const BC4_SNORM: Format = Format(81);
    pub const BC5_TYPELESS: Format = Format(82);
    pub const BC5_UNORM: Format = Format(83);
    pub const BC5_SNORM: Format = Format(84);
    pub const B8G8R8A8_UNORM: Format = Format(87);
    pub const B8G8R8A8_TYPELESS: Format = Format(90);
    pub const B8G8R8A8_UNORM_SRGB: Format = Format(91);
    pub const BC6H_TYPELESS: Format = Format(94);
    pub const BC6H_UF16: Format = Format(95);
    pub const BC6H_SF16: Format = Format(96);
    pub const BC7_TYPELESS: Format = Format(97);
    pub const BC7_UNORM: Format = Format(98);
    pub const BC7_UNORM_SRGB: Format = Format(99);

    /// Block-compressed formats encode 4×4 texel blocks.
    pub fn is_block_compressed(self) -> bool {
        matches!(self.0, 70..=84 | 94..=99)
    }

    /// Bytes per element, or per block for block-compressed formats.
    ///
    /// Unknown formats (including buffers) report a size of 1.
    pub fn byte_size(self) -> u32 {
        match self.0 {
            1..=4 => 16,
            5..=8 => 12,
            9..=22 => 8,
            23..=47 | 67..=69 | 87..=93 => 4,
            48..=59 | 85 | 86 => 2,
            60..=65 => 1,
            70..=72 | 79..=81 => 8,
            73..=78 | 82..=84 | 94..=99 => 16,
            _ => 1,
        }
    }

    /// Texel extent of one block (1×1 for uncompressed formats).
    pub fn block_dimensions(self) -> (u32, u32) {
        if self.is_block_compressed() {
            (4, 4)
        } else {
            (1, 1)
        }
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, Self::R8G8B8A8_UNORM_SRGB | Self::B8G8R8A8_UNORM_SRGB)
            || matches!(self, Self::BC1_UNORM_SRGB | Self::BC2_UNORM_SRGB)
            || matches!(self, Self::BC3_UNORM_SRGB | Self::BC7_UNORM_SRGB)
    }

    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::D32_FLOAT | Self::D24_UNORM_S8_UINT | Self::D16_UNORM | Self::D32_FLOAT_S8X24_UINT
        )
    }

    pub fn is_typeless(self) -> bool {
        matches!(
            self,
            Self::R32G32B32A32_TYPELESS
                | Self::R16G16B16A16_TYPELESS
                | Self::R32G32_TYPELESS
                | Self::R32G8X24_TYPELESS
                | Self::R10G10B10A2_TYPELESS
                | Self::R8G8B8A8_TYPELESS
                | Self::R16G16_TYPELESS
                | Self::R32_TYPELESS
                | Self::R24G8_TYPELESS
                | Self::R8G8_TYPELESS
                | Self::R16_TYPELESS
                | Self::R8_TYPELESS
                | Self::BC1_TYPELESS
                | Self::BC2_TYPELESS
                | Self::BC3_TYPELESS
                | Self::BC4_TYPELESS
                | Self::BC5_TYPELESS
                | Self::B8G8R8A8_TYPELESS
                | Self::BC6H_TYPELESS
                | Self::BC7_TYPELESS
        )
    }

    /// The typeless family this format belongs to, if any.
    pub fn typeless(self) -> Option<Format> {
        let family = match self.0 {
            1..=4 => Self::R32G32B32A32_TYPELESS,
            9..=12 => Self::R16G16B16A16_TYPELESS,
            15..=17 => Self::R32G32_TYPELESS,
            19 | 20 => Self::R32G8X24_TYPELESS,
            23..=25 => Self::R10G10B10A2_TYPELESS,
            27..=32 => Self::R8G8B8A8_TYPELESS,
            33..=36 => Self::R16G16_TYPELESS,
            39..=43 => Self::R32_TYPELESS,
            44..=46 => Self::R24G8_TYPELESS,
            48..=50 => Self::R8G8_TYPELESS,
            53..=59 => Self::R16_TYPELESS,
            60..=64 => Self::R8_TYPELESS,
            70..=72 => Self::BC1_TYPELESS,
            73..=75 => Self::BC2_TYPELESS,
            76..=78 => Self::BC3_TYPELESS,
            79..=81 => Self::BC4_TYPELESS,
            82..=84 => Self::BC5_TYPELESS,
            87 | 90 | 91 => Self::B8G8R8A8_TYPELESS,
            94..=96 => Self::BC6H_TYPELESS,
            97..=99 => Self::BC7_TYPELESS,
            _ => return None,
        };
        Some(family)
    }

    /// True if a view of `view` may be created over storage of `self`.
    pub fn is_view_compatible(self, view: Format) -> bool {
        if self == view {
            return true;
        }
        match (self.typeless(), view.typeless()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Bytes per element (or per block) of `format`.
pub fn format_size(format: Format) -> u32 {
    format.byte_size()
}

/// Bytes in one tightly packed row of `width` texels.
pub fn row_size(format: Format, width: u32) -> u32 {
    let (block_width, _) = format.block_dimensions();
    width.div_ceil(block_width) * format.byte_size()
}

/// Number of block rows covering `height` texels.
pub fn row_count(format: Format, height: u32) -> u32 {
    let (_, block_height) = format.block_dimensions();
    height.div_ceil(block_height)
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::UNKNOWN => "UNKNOWN",
            Self::R32G32B32A32_FLOAT => "R32G32B32A32_FLOAT",
            Self::R32G32B32A32_UINT => "R32G32B32A32_UINT",
            Self::R16G16B16A16_FLOAT => "R16G16B16A16_FLOAT",
            Self::R8G8B8A8_TYPELESS => "R8G8B8A8_TYPELESS",
            Self::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
            Self::R8G8B8A8_UNORM_SRGB => "R8G8B8A8_UNORM_SRGB",
            Self::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
            Self::R32_TYPELESS => "R32_TYPELESS",
            Self::D32_FLOAT => "D32_FLOAT",
            Self::R32_FLOAT => "R32_FLOAT",
            Self::R32_UINT => "R32_UINT",
            Self::D24_UNORM_S8_UINT => "D24_UNORM_S8_UINT",
            Self::R16_FLOAT => "R16_FLOAT",
            Self::D16_UNORM => "D16_UNORM",
            Self::R16_UNORM => "R16_UNORM",
            Self::R8_UNORM => "R8_UNORM",
            Self::BC1_UNORM => "BC1_UNORM",
            Self::BC3_UNORM => "BC3_UNORM",
            Self::BC7_UNORM => "BC7_UNORM",
            _ => return write!(f, "Format({})", self.0),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompressed_sizes() {
        assert_eq!(format_size(Format::D32_FLOAT), 4);
        assert_eq!(format_size(Format::R32_UINT), 4);
        assert_eq!(format_size(Format::R32G32B32A32_FLOAT), 16);
        assert_eq!(format_size(Format::R8_UNORM), 1);
        assert_eq!(format_size(Format::R8G8B8A8_UNORM_SRGB), 4);
        assert_eq!(format_size(Format::R16_FLOAT), 2);
        assert_eq!(format_size(Format::R16_UNORM), 2);
        assert_eq!(format_size(Format::UNKNOWN), 1);
    }

    #[test]
    fn test_packed_sizes() {
        assert_eq!(format_size(Format::A8_UNORM), 1);
        assert_eq!(format_size(Format::R9G9B9E5_SHAREDEXP), 4);
        assert_eq!(format_size(Format::R8G8_B8G8_UNORM), 4);
        assert_eq!(format_size(Format::G8R8_G8B8_UNORM), 4);
        assert_eq!(format_size(Format::BC1_TYPELESS), 8);
    }

    #[test]
    fn test_block_compressed_sizes() {
        for format in [Format::BC1_UNORM, Format::BC4_UNORM] {
            assert_eq!(format_size(format), 8);
            assert_eq!(format.block_dimensions(), (4, 4));
        }
        for format in [
            Format::BC2_UNORM,
            Format::BC3_UNORM,
            Format::BC5_UNORM,
            Format::BC6H_UF16,
            Format::BC7_UNORM,
        ] {
            assert_eq!(format_size(format), 16);
        }
        assert_eq!(Format::UNKNOWN.block_dimensions(), (1, 1));
    }

    #[test]
    fn test_row_geometry() {
        assert_eq!(row_size(Format::BC1_UNORM, 6), 16);
        assert_eq!(row_count(Format::BC1_UNORM, 6), 2);
        assert_eq!(row_size(Format::R8G8B8A8_UNORM, 32), 128);
        assert_eq!(row_count(Format::R8G8B8A8_UNORM, 3), 3);
    }

    #[test]
    fn test_view_compatibility() {
        assert!(Format::R8G8B8A8_UNORM.is_view_compatible(Format::R8G8B8A8_UNORM_SRGB));
        assert!(Format::R32_TYPELESS.is_view_compatible(Format::D32_FLOAT));
        assert!(!Format::R32_FLOAT.is_view_compatible(Format::R16G16_FLOAT));
    }
}
