//! Shader model 4/5 token stream scanning.
//!
//! Only enough of the instruction encoding is understood to walk the stream
//! and recognise a few trivial program shapes. Bytecode is never validated.

use super::signature::{read_signature, SYSVAL_VERTEX_ID};
use super::{DxbcError, DxbcFile, DxbcResult, FourCC, WordReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramType {
    Pixel,
    Vertex,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl ProgramType {
    fn from_token(token: u32) -> DxbcResult<Self> {
        match token >> 16 {
            0 => Ok(ProgramType::Pixel),
            1 => Ok(ProgramType::Vertex),
            2 => Ok(ProgramType::Geometry),
            3 => Ok(ProgramType::Hull),
            4 => Ok(ProgramType::Domain),
            5 => Ok(ProgramType::Compute),
            other => Err(DxbcError::InvalidValue {
                field: "program type",
                value: other,
            }),
        }
    }
}

pub const OP_MOV: u32 = 0x36;
pub const OP_RET: u32 = 0x3e;
pub const OP_CUSTOMDATA: u32 = 0x35;
pub const OP_DCL_OUTPUT: u32 = 0x65;

const OPERAND_TYPE_OUTPUT: u32 = 2;
const OPERAND_TYPE_IMMEDIATE32: u32 = 4;

fn is_declaration(opcode: u32) -> bool {
    (0x58..=0x6a).contains(&opcode) || (0x8f..=0xa3).contains(&opcode)
}

/// One instruction: opcode plus its full token slice.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: u32,
    pub tokens: Vec<u32>,
}

/// The decoded program chunk.
#[derive(Debug, Clone)]
pub struct Program {
    pub program_type: ProgramType,
    pub instructions: Vec<Instruction>,
}

impl Program {
    /// Parse the `SHDR`/`SHEX` chunk of a shader container.
    pub fn from_bytecode(bytecode: &[u8]) -> DxbcResult<Self> {
        let file = DxbcFile::parse(bytecode)?;
        let chunk = file
            .chunk(FourCC::SHEX)
            .or_else(|| file.chunk(FourCC::SHDR))
            .ok_or(DxbcError::MissingChunk(FourCC::SHDR))?;
        Self::from_chunk(chunk)
    }

    pub fn from_chunk(chunk: &[u8]) -> DxbcResult<Self> {
        let reader = WordReader::new(chunk);
        let program_type = ProgramType::from_token(reader.u32_at(0)?)?;
        let length = reader.u32_at(4)? as usize;
        if length * 4 > reader.len() || length < 2 {
            return Err(DxbcError::InvalidValue {
                field: "program length",
                value: length as u32,
            });
        }

        let mut instructions = Vec::new();
        let mut pos = 2;
        while pos < length {
            let token = reader.u32_at(pos * 4)?;
            let opcode = token & 0x7ff;
            let len = if opcode == OP_CUSTOMDATA {
                reader.u32_at((pos + 1) * 4)? as usize
            } else {
                ((token >> 24) & 0x7f) as usize
            };
            if len == 0 || pos + len > length {
                return Err(DxbcError::InvalidValue {
                    field: "instruction length",
                    value: len as u32,
                });
            }
            let tokens = (pos..pos + len)
                .map(|i| reader.u32_at(i * 4))
                .collect::<DxbcResult<Vec<_>>>()?;
            instructions.push(Instruction { opcode, tokens });
            pos += len;
        }

        Ok(Self {
            program_type,
            instructions,
        })
    }

    /// Colours written by a pixel program consisting only of declarations and
    /// `mov oN.xyzw, l(...)`. Returns `None` for any other program.
    pub fn constant_outputs(&self) -> Option<Vec<(u32, [u32; 4])>> {
        if self.program_type != ProgramType::Pixel {
            return None;
        }
        let mut outputs = Vec::new();
        for inst in &self.instructions {
            match inst.opcode {
                op if is_declaration(op) => {}
                OP_RET => break,
                OP_MOV => outputs.push(immediate_output_move(&inst.tokens)?),
                _ => return None,
            }
        }
        Some(outputs)
    }
}

/// Decode `mov oN.xyzw, l(a, b, c, d)`.
fn immediate_output_move(tokens: &[u32]) -> Option<(u32, [u32; 4])> {
    if tokens.len() != 8 || tokens[0] & 0x8000_0000 != 0 {
        return None;
    }
    let dst = tokens[1];
    let dst_type = (dst >> 12) & 0xff;
    let dst_mask = (dst >> 4) & 0xf;
    let src = tokens[3];
    let src_type = (src >> 12) & 0xff;
    if dst_type != OPERAND_TYPE_OUTPUT || dst_mask != 0xf || src_type != OPERAND_TYPE_IMMEDIATE32 {
        return None;
    }
    Some((tokens[2], [tokens[4], tokens[5], tokens[6], tokens[7]]))
}

/// True for a vertex program whose only input is `SV_VertexID`; such
/// programs are treated as generating a full-screen triangle.
pub fn is_vertex_id_program(bytecode: &[u8]) -> bool {
    let Ok(program) = Program::from_bytecode(bytecode) else {
        return false;
    };
    if program.program_type != ProgramType::Vertex {
        return false;
    }
    let Ok(file) = DxbcFile::parse(bytecode) else {
        return false;
    };
    let Some(isgn) = file.chunk(FourCC::ISGN) else {
        return false;
    };
    match read_signature(isgn) {
        Ok(elements) => {
            !elements.is_empty() && elements.iter().all(|e| e.system_value == SYSVAL_VERTEX_ID)
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxbc::{from_words, DxbcBuilder};

    fn pixel_program(body: &[u32]) -> Vec<u8> {
        let mut words = vec![0x0000_0040, (body.len() + 2) as u32];
        words.extend_from_slice(body);
        DxbcBuilder::new()
            .chunk(FourCC::SHDR, from_words(&words))
            .build()
    }

    #[test]
    fn test_constant_colour_program() {
        let blob = pixel_program(&[
            0x0300_0065,
            0x0010_20f2,
            0,
            0x0800_0036,
            0x0010_20f2,
            0,
            0x4002,
            0,
            0x3f80_0000,
            0,
            0x3f80_0000,
            0x0100_003e,
        ]);
        let program = Program::from_bytecode(&blob).unwrap();
        assert_eq!(program.program_type, ProgramType::Pixel);
        assert_eq!(program.instructions.len(), 3);
        assert_eq!(
            program.constant_outputs(),
            Some(vec![(0, [0, 0x3f80_0000, 0, 0x3f80_0000])])
        );
    }

    #[test]
    fn test_non_constant_program() {
        // add r0.x, r0.x, r0.x
        let blob = pixel_program(&[0x0700_0000, 0x0010_0012, 0, 0x0010_000a, 0, 0x0010_000a, 0, 0x0100_003e]);
        let program = Program::from_bytecode(&blob).unwrap();
        assert_eq!(program.constant_outputs(), None);
    }

    #[test]
    fn test_truncated_instruction() {
        let blob = pixel_program(&[0x0800_0036, 0x0010_20f2]);
        assert!(Program::from_bytecode(&blob).is_err());
    }
}
