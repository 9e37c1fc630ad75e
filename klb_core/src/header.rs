use std::convert::TryInto;
use std::io::{Read, Write};

use anyhow::{bail, Context, Result};

use crate::status::MalformedError;

/// Our images at the most have 5 dimensions: x, y, z, channel, time.
pub const DIMS: usize = 5;

/// Number of bytes in the opaque metadata field.
pub const METADATA_SIZE: usize = 256;

/// Current header version emitted by this implementation's writer. Readers
/// accept this version; spec.md's version policy allows (but does not
/// require) accepting older versions defensively.
pub const HEADER_VERSION: u8 = 2;

/// Fixed portion size in bytes, field-by-field in on-disk order:
///   header_version(1) + xyzct(5*4) + pixel_size(5*4) + data_type(1)
///   + compression_type(1) + metadata(256) + block_size(5*4) = 319
///
/// See SPEC_FULL.md for why this is 319 and not the "299" figure that
/// appears elsewhere in the prose spec — 319 matches
/// `klb_image_header::getSizeInBytesFixPortion()` in the original C++
/// source this format was distilled from.
pub const FIXED_HEADER_SIZE: u64 = 319;

/// Size of one entry in the block offset index.
pub const BLOCK_OFFSET_ENTRY_SIZE: u64 = 8;

/// Target raw bytes per block, divided elementwise by bytes-per-element
/// (floored at 1) to derive the default block shape (spec.md §3).
pub const DEFAULT_BLOCK_TARGET: [u32; DIMS] = [192, 192, 16, 1, 1];

/// Element type, one of ten scalars (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    Uint8 = 0,
    Uint16 = 1,
    Uint32 = 2,
    Uint64 = 3,
    Int8 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    Float32 = 8,
    Float64 = 9,
}

impl DataType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => DataType::Uint8,
            1 => DataType::Uint16,
            2 => DataType::Uint32,
            3 => DataType::Uint64,
            4 => DataType::Int8,
            5 => DataType::Int16,
            6 => DataType::Int32,
            7 => DataType::Int64,
            8 => DataType::Float32,
            9 => DataType::Float64,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Byte width is derived from the code (spec.md §3).
    pub fn bytes_per_elem(self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }
}

/// Compression type; extended by appending codes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Bzip2 = 1,
    Zlib = 2,
}

impl CompressionType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => CompressionType::None,
            1 => CompressionType::Bzip2,
            2 => CompressionType::Zlib,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Default for CompressionType {
    /// §6 "Defaults when argument omitted": `compression ← BZIP2`.
    fn default() -> Self {
        CompressionType::Bzip2
    }
}

/// Decoded representation of a KLB header: fixed portion plus the
/// `Nb`-entry block offset index (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct Header {
    pub header_version: u8,
    pub xyzct: [u32; DIMS],
    pub pixel_size: [f32; DIMS],
    pub data_type: DataType,
    pub compression_type: CompressionType,
    pub metadata: [u8; METADATA_SIZE],
    pub block_size: [u32; DIMS],
    /// Cumulative end-of-block byte offsets into the payload region.
    /// `block_offsets[k] - block_offsets[k-1]` (with `block_offsets[-1] = 0`)
    /// is the compressed length of block `k`.
    pub block_offsets: Vec<u64>,
}

impl Header {
    /// Number of blocks per axis: `ceil(xyzct[i] / block_size[i])`.
    pub fn nb_per_axis(&self) -> [u64; DIMS] {
        let mut nb = [0u64; DIMS];
        for i in 0..DIMS {
            let x = self.xyzct[i] as u64;
            let b = self.block_size[i] as u64;
            nb[i] = (x + b - 1) / b;
        }
        nb
    }

    /// Total number of blocks: `prod_i nb[i]`.
    pub fn total_blocks(&self) -> u64 {
        self.nb_per_axis().iter().product()
    }

    pub fn bytes_per_elem(&self) -> usize {
        self.data_type.bytes_per_elem()
    }

    /// Total size of the header region (fixed portion + offset index).
    pub fn header_size(&self) -> u64 {
        FIXED_HEADER_SIZE + self.block_offsets.len() as u64 * BLOCK_OFFSET_ENTRY_SIZE
    }

    /// Compressed length of block `k`.
    pub fn compressed_len(&self, k: usize) -> u64 {
        let end = self.block_offsets[k];
        let start = if k == 0 { 0 } else { self.block_offsets[k - 1] };
        end - start
    }

    /// Absolute file offset of compressed block `k` (excludes the header).
    pub fn absolute_offset(&self, k: usize) -> u64 {
        let start = if k == 0 { 0 } else { self.block_offsets[k - 1] };
        self.header_size() + start
    }

    /// Total payload size in bytes (the last cumulative offset).
    pub fn payload_size(&self) -> u64 {
        self.block_offsets.last().copied().unwrap_or(0)
    }

    /// Serialize the fixed portion (not the offset index) to exactly
    /// `FIXED_HEADER_SIZE` bytes, little-endian.
    pub fn fixed_bytes(&self) -> [u8; FIXED_HEADER_SIZE as usize] {
        let mut buf = [0u8; FIXED_HEADER_SIZE as usize];
        let mut off = 0usize;

        buf[off] = self.header_version;
        off += 1;
        for v in self.xyzct {
            buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
            off += 4;
        }
        for v in self.pixel_size {
            buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
            off += 4;
        }
        buf[off] = self.data_type.code();
        off += 1;
        buf[off] = self.compression_type.code();
        off += 1;
        buf[off..off + METADATA_SIZE].copy_from_slice(&self.metadata);
        off += METADATA_SIZE;
        for v in self.block_size {
            buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
            off += 4;
        }
        debug_assert_eq!(off, FIXED_HEADER_SIZE as usize);
        buf
    }

    /// Write the fixed portion followed by a zero-filled offset vector of
    /// length `nb`, leaving the writer positioned at the payload region
    /// (spec.md §4.1 "Write").
    #[allow(clippy::too_many_arguments)]
    pub fn write_placeholder(
        writer: &mut impl Write,
        header_version: u8,
        xyzct: [u32; DIMS],
        pixel_size: [f32; DIMS],
        data_type: DataType,
        compression_type: CompressionType,
        metadata: [u8; METADATA_SIZE],
        block_size: [u32; DIMS],
        nb: u64,
    ) -> Result<Header> {
        let header = Header {
            header_version,
            xyzct,
            pixel_size,
            data_type,
            compression_type,
            metadata,
            block_size,
            block_offsets: vec![0u64; nb as usize],
        };
        writer.write_all(&header.fixed_bytes())?;
        writer.write_all(&vec![0u8; (nb * BLOCK_OFFSET_ENTRY_SIZE) as usize])?;
        Ok(header)
    }

    /// Parse a header (fixed portion + offset index) from a reader, given
    /// the total file size for the truncation check (spec.md §4.1 "Parse").
    pub fn parse(reader: &mut impl Read, file_size: u64) -> Result<Header> {
        let mut fixed = [0u8; FIXED_HEADER_SIZE as usize];
        reader
            .read_exact(&mut fixed)
            .context("reading fixed header portion")?;

        let mut off = 0usize;
        let header_version = fixed[off];
        off += 1;

        let mut xyzct = [0u32; DIMS];
        for v in xyzct.iter_mut() {
            *v = u32::from_le_bytes(fixed[off..off + 4].try_into().unwrap());
            off += 4;
        }
        let mut pixel_size = [0f32; DIMS];
        for v in pixel_size.iter_mut() {
            *v = f32::from_le_bytes(fixed[off..off + 4].try_into().unwrap());
            off += 4;
        }
        let data_type_code = fixed[off];
        off += 1;
        let compression_code = fixed[off];
        off += 1;
        let mut metadata = [0u8; METADATA_SIZE];
        metadata.copy_from_slice(&fixed[off..off + METADATA_SIZE]);
        off += METADATA_SIZE;
        let mut block_size = [0u32; DIMS];
        for v in block_size.iter_mut() {
            *v = u32::from_le_bytes(fixed[off..off + 4].try_into().unwrap());
            off += 4;
        }
        debug_assert_eq!(off, FIXED_HEADER_SIZE as usize);

        let data_type = DataType::from_code(data_type_code)
            .ok_or_else(|| MalformedError(format!("unknown data_type code {data_type_code}")))?;
        let compression_type = CompressionType::from_code(compression_code).ok_or_else(|| {
            MalformedError(format!("unknown compression_type code {compression_code}"))
        })?;

        for i in 0..DIMS {
            if xyzct[i] == 0 {
                bail!(MalformedError(format!("xyzct[{i}] is zero")));
            }
            if block_size[i] == 0 || block_size[i] > xyzct[i] {
                bail!(MalformedError(format!(
                    "block_size[{i}]={} is invalid for xyzct[{i}]={}",
                    block_size[i], xyzct[i]
                )));
            }
        }

        let mut header = Header {
            header_version,
            xyzct,
            pixel_size,
            data_type,
            compression_type,
            metadata,
            block_size,
            block_offsets: Vec::new(),
        };
        let nb = header.total_blocks();

        if nb * BLOCK_OFFSET_ENTRY_SIZE + FIXED_HEADER_SIZE > file_size {
            bail!(MalformedError(format!(
                "file of {file_size} bytes is too short to hold {nb} block offsets"
            )));
        }

        let mut offsets = Vec::with_capacity(nb as usize);
        let mut entry_buf = [0u8; BLOCK_OFFSET_ENTRY_SIZE as usize];
        let mut prev = 0u64;
        for k in 0..nb {
            reader
                .read_exact(&mut entry_buf)
                .with_context(|| format!("reading block_offsets[{k}]"))?;
            let v = u64::from_le_bytes(entry_buf);
            if v < prev {
                bail!(MalformedError(format!(
                    "block_offsets is not monotonic at index {k}: {v} < {prev}"
                )));
            }
            prev = v;
            offsets.push(v);
        }
        header.block_offsets = offsets;

        Ok(header)
    }
}

/// Default block shape: the target-bytes table divided elementwise by
/// bytes-per-element, floored at 1 (spec.md §3).
pub fn default_block_size(bytes_per_elem: usize) -> [u32; DIMS] {
    let mut out = [0u32; DIMS];
    for i in 0..DIMS {
        out[i] = (DEFAULT_BLOCK_TARGET[i] / bytes_per_elem as u32).max(1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_size_divides_and_floors() {
        for bpe in [1usize, 2, 4, 8] {
            let b = default_block_size(bpe);
            for i in 0..DIMS {
                assert!(b[i] >= 1);
            }
        }
        assert_eq!(default_block_size(1), [192, 192, 16, 1, 1]);
        assert_eq!(default_block_size(2), [96, 96, 8, 1, 1]);
        assert_eq!(default_block_size(4), [48, 48, 4, 1, 1]);
        assert_eq!(default_block_size(8), [24, 24, 2, 1, 1]);
    }

    #[test]
    fn fixed_header_round_trips() {
        let header = Header {
            header_version: HEADER_VERSION,
            xyzct: [4, 4, 4, 1, 1],
            pixel_size: [1.0; DIMS],
            data_type: DataType::Uint16,
            compression_type: CompressionType::Bzip2,
            metadata: [0u8; METADATA_SIZE],
            block_size: [4, 4, 4, 1, 1],
            block_offsets: vec![123],
        };
        let mut buf = Vec::new();
        buf.extend_from_slice(&header.fixed_bytes());
        buf.extend_from_slice(&123u64.to_le_bytes());

        let mut cursor = std::io::Cursor::new(buf.clone());
        let parsed = Header::parse(&mut cursor, buf.len() as u64).unwrap();
        assert_eq!(parsed.xyzct, header.xyzct);
        assert_eq!(parsed.data_type, header.data_type);
        assert_eq!(parsed.compression_type, header.compression_type);
        assert_eq!(parsed.block_size, header.block_size);
        assert_eq!(parsed.block_offsets, header.block_offsets);
    }

    #[test]
    fn rejects_zero_extent() {
        let header = Header {
            header_version: HEADER_VERSION,
            xyzct: [0, 4, 4, 1, 1],
            pixel_size: [1.0; DIMS],
            data_type: DataType::Uint8,
            compression_type: CompressionType::None,
            metadata: [0u8; METADATA_SIZE],
            block_size: [4, 4, 4, 1, 1],
            block_offsets: vec![],
        };
        let mut buf = Vec::new();
        buf.extend_from_slice(&header.fixed_bytes());
        let mut cursor = std::io::Cursor::new(buf.clone());
        assert!(Header::parse(&mut cursor, buf.len() as u64).is_err());
    }
}
