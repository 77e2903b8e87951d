//! Built-in shader programs.
//!
//! Assembled token by token so the harness has no offline compiler step.

use std::sync::OnceLock;

use crate::dxbc::signature::{
    write_signature, SignatureElement, COMPONENT_FLOAT32, COMPONENT_UINT32, SYSVAL_NONE,
    SYSVAL_POSITION, SYSVAL_VERTEX_ID,
};
use crate::dxbc::{from_words, DxbcBuilder, FourCC};

const VERSION_PS_4_0: u32 = 0x0000_0040;
const VERSION_VS_4_0: u32 = 0x0001_0040;
const VERSION_CS_5_0: u32 = 0x0005_0050;

const RET: u32 = 0x0100_003e;

fn program(version: u32, body: &[u32]) -> Vec<u8> {
    let mut words = Vec::with_capacity(body.len() + 2);
    words.push(version);
    words.push(body.len() as u32 + 2);
    words.extend_from_slice(body);
    from_words(&words)
}

/// ```text
/// float2 coords = float2((id << 1) & 2, id & 2);
/// position = float4(coords * float2(2, -2) + float2(-1, 1), 0, 1);
/// ```
///
/// Three vertices cover the whole viewport.
pub fn passthrough_vs() -> &'static [u8] {
    static CODE: OnceLock<Vec<u8>> = OnceLock::new();
    CODE.get_or_init(|| {
        #[rustfmt::skip]
        let body = [
            0x0400_0060, 0x0010_1012, 0, 6,                     // dcl_input_sgv v0.x, vertex_id
            0x0400_0067, 0x0010_20f2, 0, 1,                     // dcl_output_siv o0.xyzw, position
            0x0200_0068, 1,                                     // dcl_temps 1
            0x0700_0029, 0x0010_0012, 0, 0x0010_100a, 0, 0x0000_4001, 1,   // ishl r0.x, v0.x, l(1)
            0x0700_0001, 0x0010_0012, 0, 0x0010_000a, 0, 0x0000_4001, 2,   // and r0.x, r0.x, l(2)
            0x0700_0001, 0x0010_0022, 0, 0x0010_100a, 0, 0x0000_4001, 2,   // and r0.y, v0.x, l(2)
            0x0500_0056, 0x0010_0032, 0, 0x0010_0046, 0,                   // utof r0.xy, r0.xyxx
            0x0f00_0032, 0x0010_2032, 0, 0x0010_0046, 0,                   // mad o0.xy, r0.xyxx,
            0x0000_4002, 0x4000_0000, 0xc000_0000, 0, 0,                   //   l(2, -2, 0, 0),
            0x0000_4002, 0xbf80_0000, 0x3f80_0000, 0, 0,                   //   l(-1, 1, 0, 0)
            0x0800_0036, 0x0010_20c2, 0, 0x0000_4002, 0, 0, 0, 0x3f80_0000, // mov o0.zw, l(0, 0, 0, 1)
            RET,
        ];
        DxbcBuilder::new()
            .chunk(
                FourCC::ISGN,
                write_signature(&[SignatureElement::new("SV_VertexID", SYSVAL_VERTEX_ID, COMPONENT_UINT32, 0, 0x1).used(0x1)]),
            )
            .chunk(
                FourCC::OSGN,
                write_signature(&[SignatureElement::new("SV_Position", SYSVAL_POSITION, COMPONENT_FLOAT32, 0, 0xf)]),
            )
            .chunk(FourCC::SHDR, program(VERSION_VS_4_0, &body))
            .build()
    })
}

/// A pixel program writing `color` to render target 0.
pub fn constant_color_ps(color: [f32; 4]) -> Vec<u8> {
    let [r, g, b, a] = color.map(f32::to_bits);
    #[rustfmt::skip]
    let body = [
        0x0300_0065, 0x0010_20f2, 0,                                     // dcl_output o0.xyzw
        0x0800_0036, 0x0010_20f2, 0, 0x0000_4002, r, g, b, a,           // mov o0.xyzw, l(r, g, b, a)
        RET,
    ];
    DxbcBuilder::new()
        .chunk(FourCC::ISGN, write_signature(&[]))
        .chunk(
            FourCC::OSGN,
            write_signature(&[SignatureElement::new("SV_Target", SYSVAL_NONE, COMPONENT_FLOAT32, 0, 0xf)]),
        )
        .chunk(FourCC::SHDR, program(VERSION_PS_4_0, &body))
        .build()
}

pub fn green_ps() -> &'static [u8] {
    static CODE: OnceLock<Vec<u8>> = OnceLock::new();
    CODE.get_or_init(|| constant_color_ps([0.0, 1.0, 0.0, 1.0]))
}

/// `[numthreads(1, 1, 1)] void main() {}`
pub fn empty_cs() -> &'static [u8] {
    static CODE: OnceLock<Vec<u8>> = OnceLock::new();
    CODE.get_or_init(|| {
        let body = [0x0400_009b, 1, 1, 1, RET];
        DxbcBuilder::new()
            .chunk(FourCC::ISGN, write_signature(&[]))
            .chunk(FourCC::OSGN, write_signature(&[]))
            .chunk(FourCC::SHEX, program(VERSION_CS_5_0, &body))
            .build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxbc::sm4::{is_vertex_id_program, Program, ProgramType};

    #[test]
    fn test_passthrough_vs_shape() {
        let program = Program::from_bytecode(passthrough_vs()).unwrap();
        assert_eq!(program.program_type, ProgramType::Vertex);
        assert_eq!(program.instructions.len(), 10);
        assert!(is_vertex_id_program(passthrough_vs()));
    }

    #[test]
    fn test_green_ps_is_constant() {
        let program = Program::from_bytecode(green_ps()).unwrap();
        assert_eq!(
            program.constant_outputs(),
            Some(vec![(0, [0, 0x3f80_0000, 0, 0x3f80_0000])])
        );
        assert!(!is_vertex_id_program(green_ps()));
    }

    #[test]
    fn test_empty_cs() {
        let program = Program::from_bytecode(empty_cs()).unwrap();
        assert_eq!(program.program_type, ProgramType::Compute);
        assert_eq!(program.instructions.len(), 2);
    }
}
