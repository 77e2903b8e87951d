//! Input/output signature chunks (`ISGN`, `OSGN`).

use super::{DxbcResult, WordReader, WordWriter};

/// System value semantics used by the built-in programs.
pub const SYSVAL_NONE: u32 = 0;
pub const SYSVAL_POSITION: u32 = 1;
pub const SYSVAL_VERTEX_ID: u32 = 6;

pub const COMPONENT_UINT32: u32 = 1;
pub const COMPONENT_SINT32: u32 = 2;
pub const COMPONENT_FLOAT32: u32 = 3;

const ELEMENT_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureElement {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub system_value: u32,
    pub component_type: u32,
    pub register: u32,
    pub mask: u8,
    pub used_mask: u8,
}

impl SignatureElement {
    pub fn new(name: &str, system_value: u32, component_type: u32, register: u32, mask: u8) -> Self {
        Self {
            semantic_name: name.to_string(),
            semantic_index: 0,
            system_value,
            component_type,
            register,
            mask,
            used_mask: 0,
        }
    }

    pub fn used(mut self, used_mask: u8) -> Self {
        self.used_mask = used_mask;
        self
    }
}

/// Encode a signature chunk payload. Names follow the element table.
pub fn write_signature(elements: &[SignatureElement]) -> Vec<u8> {
    let mut out = WordWriter::default();
    out.put(elements.len() as u32);
    out.put(8);

    let mut string_offset = 8 + elements.len() * ELEMENT_SIZE;
    for e in elements {
        out.put(string_offset as u32);
        out.put(e.semantic_index);
        out.put(e.system_value);
        out.put(e.component_type);
        out.put(e.register);
        out.put(u32::from(e.mask) | u32::from(e.used_mask) << 8);
        string_offset += e.semantic_name.len() + 1;
    }
    for e in elements {
        out.put_bytes(e.semantic_name.as_bytes());
        out.put_bytes(&[0]);
    }
    out.align(4);
    out.into_bytes()
}

pub fn read_signature(chunk: &[u8]) -> DxbcResult<Vec<SignatureElement>> {
    let reader = WordReader::new(chunk);
    let count = reader.u32_at(0)? as usize;
    let base = reader.u32_at(4)? as usize;

    let mut elements = Vec::with_capacity(count.min(32));
    for i in 0..count {
        let at = base + i * ELEMENT_SIZE;
        let name_offset = reader.u32_at(at)? as usize;
        let masks = reader.u32_at(at + 20)?;
        elements.push(SignatureElement {
            semantic_name: reader.cstr_at(name_offset)?.to_string(),
            semantic_index: reader.u32_at(at + 4)?,
            system_value: reader.u32_at(at + 8)?,
            component_type: reader.u32_at(at + 12)?,
            register: reader.u32_at(at + 16)?,
            mask: masks as u8,
            used_mask: (masks >> 8) as u8,
        });
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_layout() {
        let chunk = write_signature(&[
            SignatureElement::new("SV_VertexID", SYSVAL_VERTEX_ID, COMPONENT_UINT32, 0, 0x1).used(0x1),
        ]);
        // Header, one element, "SV_VertexID\0".
        assert_eq!(chunk.len(), 8 + 24 + 12);
        assert_eq!(&chunk[32..43], b"SV_VertexID");

        let elements = read_signature(&chunk).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].semantic_name, "SV_VertexID");
        assert_eq!(elements[0].system_value, SYSVAL_VERTEX_ID);
        assert_eq!(elements[0].mask, 0x1);
        assert_eq!(elements[0].used_mask, 0x1);
    }

    #[test]
    fn test_empty_signature() {
        let chunk = write_signature(&[]);
        assert_eq!(chunk, vec![0, 0, 0, 0, 8, 0, 0, 0]);
        assert!(read_signature(&chunk).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_signature_fails() {
        let mut chunk = write_signature(&[SignatureElement::new(
            "SV_Target",
            SYSVAL_NONE,
            COMPONENT_FLOAT32,
            0,
            0xf,
        )]);
        chunk.truncate(20);
        assert!(read_signature(&chunk).is_err());
    }
}
