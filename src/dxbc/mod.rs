//! DXBC Container Module
//!
//! Reads and writes the chunked container that carries shader programs and
//! root signature blobs:
//!
//! ```text
//! 'DXBC' | digest[16] | version | total_size | chunk_count | offsets[chunk_count]
//! chunk: tag | size | payload[size]
//! ```
//!
//! All values are little-endian 32-bit words. The digest is left zero when
//! writing and ignored when reading.

pub mod rts0;
pub mod signature;
pub mod sm4;

use std::fmt;

use thiserror::Error;

/// A four-character chunk or container tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub u32);

impl FourCC {
    pub const DXBC: FourCC = FourCC::new(b"DXBC");
    pub const RTS0: FourCC = FourCC::new(b"RTS0");
    pub const ISGN: FourCC = FourCC::new(b"ISGN");
    pub const OSGN: FourCC = FourCC::new(b"OSGN");
    pub const SHDR: FourCC = FourCC::new(b"SHDR");
    pub const SHEX: FourCC = FourCC::new(b"SHEX");

    pub const fn new(tag: &[u8; 4]) -> Self {
        FourCC(u32::from_le_bytes(*tag))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.to_le_bytes() {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DxbcError {
    #[error("read of {len} bytes at offset {offset:#x} exceeds {size:#x} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("bad container magic {0}")]
    BadMagic(FourCC),

    #[error("declared size {declared:#x} does not match blob size {actual:#x}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("no {0} chunk")]
    MissingChunk(FourCC),

    #[error("invalid {field} value {value:#x}")]
    InvalidValue { field: &'static str, value: u32 },

    #[error("unsupported root signature version {0:#x}")]
    UnsupportedRootSignatureVersion(u32),
}

pub type DxbcResult<T> = Result<T, DxbcError>;

const HEADER_SIZE: usize = 32;
const CONTAINER_VERSION: u32 = 1;

/// Bounds-checked little-endian word reads.
#[derive(Clone, Copy)]
pub(crate) struct WordReader<'a> {
    data: &'a [u8],
}

impl<'a> WordReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> DxbcResult<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(DxbcError::OutOfBounds {
                offset,
                len,
                size: self.data.len(),
            })
    }

    pub(crate) fn u32_at(&self, offset: usize) -> DxbcResult<u32> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn f32_at(&self, offset: usize) -> DxbcResult<f32> {
        self.u32_at(offset).map(f32::from_bits)
    }

    /// Null-terminated string starting at `offset`.
    pub(crate) fn cstr_at(&self, offset: usize) -> DxbcResult<&'a str> {
        let tail = self.bytes(offset, self.data.len().saturating_sub(offset))?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(DxbcError::OutOfBounds {
                offset,
                len: tail.len() + 1,
                size: self.data.len(),
            })?;
        std::str::from_utf8(&tail[..end]).map_err(|_| DxbcError::InvalidValue {
            field: "string",
            value: offset as u32,
        })
    }
}

/// A chunk inside a parsed container.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub tag: FourCC,
    pub data: &'a [u8],
}

/// A parsed container borrowing the blob it was read from.
#[derive(Debug, Clone)]
pub struct DxbcFile<'a> {
    pub digest: [u8; 16],
    pub chunks: Vec<Chunk<'a>>,
}

impl<'a> DxbcFile<'a> {
    pub fn parse(blob: &'a [u8]) -> DxbcResult<Self> {
        let reader = WordReader::new(blob);
        let magic = FourCC(reader.u32_at(0)?);
        if magic != FourCC::DXBC {
            return Err(DxbcError::BadMagic(magic));
        }

        let mut digest = [0u8; 16];
        digest.copy_from_slice(reader.bytes(4, 16)?);

        let version = reader.u32_at(20)?;
        if version != CONTAINER_VERSION {
            return Err(DxbcError::UnsupportedVersion(version));
        }

        let declared = reader.u32_at(24)? as usize;
        if declared != blob.len() {
            return Err(DxbcError::SizeMismatch {
                declared,
                actual: blob.len(),
            });
        }

        let count = reader.u32_at(28)? as usize;
        let mut chunks = Vec::with_capacity(count.min(64));
        for i in 0..count {
            let offset = reader.u32_at(HEADER_SIZE + i * 4)? as usize;
            let tag = FourCC(reader.u32_at(offset)?);
            let size = reader.u32_at(offset + 4)? as usize;
            let data = reader.bytes(offset + 8, size)?;
            chunks.push(Chunk { tag, data });
        }

        Ok(Self { digest, chunks })
    }

    pub fn chunk(&self, tag: FourCC) -> Option<&'a [u8]> {
        self.chunks.iter().find(|c| c.tag == tag).map(|c| c.data)
    }

    pub fn require_chunk(&self, tag: FourCC) -> DxbcResult<&'a [u8]> {
        self.chunk(tag).ok_or(DxbcError::MissingChunk(tag))
    }
}

/// Assembles a container from chunk payloads.
#[derive(Debug, Default)]
pub struct DxbcBuilder {
    chunks: Vec<(FourCC, Vec<u8>)>,
}

impl DxbcBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, tag: FourCC, data: Vec<u8>) -> Self {
        self.chunks.push((tag, data));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let table_end = HEADER_SIZE + 4 * self.chunks.len();
        let total = table_end
            + self
                .chunks
                .iter()
                .map(|(_, data)| 8 + data.len())
                .sum::<usize>();

        let mut out = WordWriter::with_capacity(total);
        out.put(FourCC::DXBC.0);
        out.put_bytes(&[0u8; 16]);
        out.put(CONTAINER_VERSION);
        out.put(total as u32);
        out.put(self.chunks.len() as u32);

        let mut offset = table_end;
        for (_, data) in &self.chunks {
            out.put(offset as u32);
            offset += 8 + data.len();
        }
        for (tag, data) in &self.chunks {
            out.put(tag.0);
            out.put(data.len() as u32);
            out.put_bytes(data);
        }
        out.into_bytes()
    }
}

/// Little-endian word sink with patchable slots.
#[derive(Debug, Default)]
pub(crate) struct WordWriter {
    buf: Vec<u8>,
}

impl WordWriter {
    pub(crate) fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn put(&mut self, word: u32) {
        self.buf.extend_from_slice(&word.to_le_bytes());
    }

    pub(crate) fn put_f32(&mut self, value: f32) {
        self.put(value.to_bits());
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite a word written earlier.
    pub(crate) fn patch(&mut self, offset: usize, word: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
    }

    pub(crate) fn align(&mut self, alignment: usize) {
        while self.buf.len() % alignment != 0 {
            self.buf.push(0);
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian words of a blob, for word-wise comparisons.
pub fn words(blob: &[u8]) -> impl Iterator<Item = u32> + '_ {
    blob.chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
}

/// Encode words as a little-endian blob.
pub fn from_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc() {
        assert_eq!(FourCC::DXBC.0, 0x4342_5844);
        assert_eq!(FourCC::RTS0.0, 0x3053_5452);
        assert_eq!(FourCC::RTS0.to_string(), "RTS0");
    }

    #[test]
    fn test_build_then_parse() {
        let blob = DxbcBuilder::new()
            .chunk(FourCC::ISGN, vec![1, 2, 3, 4])
            .chunk(FourCC::SHDR, vec![5, 6, 7, 8, 9, 10, 11, 12])
            .build();
        assert_eq!(blob.len(), 32 + 8 + 12 + 16);

        let file = DxbcFile::parse(&blob).unwrap();
        assert_eq!(file.digest, [0u8; 16]);
        assert_eq!(file.chunks.len(), 2);
        assert_eq!(file.chunk(FourCC::ISGN), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(file.chunk(FourCC::SHDR).map(|c| c.len()), Some(8));
        assert!(file.chunk(FourCC::RTS0).is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            DxbcFile::parse(b"DXB"),
            Err(DxbcError::OutOfBounds { .. })
        ));
        let mut blob = DxbcBuilder::new().chunk(FourCC::RTS0, vec![0; 4]).build();
        blob[0] = b'X';
        assert!(matches!(DxbcFile::parse(&blob), Err(DxbcError::BadMagic(_))));

        let mut blob = DxbcBuilder::new().chunk(FourCC::RTS0, vec![0; 4]).build();
        blob.push(0);
        assert!(matches!(
            DxbcFile::parse(&blob),
            Err(DxbcError::SizeMismatch { .. })
        ));

        // Chunk size pointing past the end.
        let mut blob = DxbcBuilder::new().chunk(FourCC::RTS0, vec![0; 4]).build();
        blob[40] = 0xff;
        assert!(matches!(
            DxbcFile::parse(&blob),
            Err(DxbcError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_word_helpers() {
        let blob = from_words(&[1, 0xdead_beef]);
        assert_eq!(words(&blob).collect::<Vec<_>>(), vec![1, 0xdead_beef]);
    }
}
