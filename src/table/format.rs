//! Block handles, the per-block trailer, and the fixed-size SST footer.

use crate::env::RandomAccessFile;
use crate::error::{Result, StrataError};
use crate::util::{
    crc32c_extend, crc32c_mask, crc32c_unmask, crc32c_value, decode_fixed32, decode_fixed64,
    encode_fixed32, encode_fixed64,
};

/// Identifies every byte of a physical block written after it: one type tag
/// (compression) and a masked CRC32C covering the block bytes plus the tag.
pub const BLOCK_TRAILER_SIZE: usize = 1 + 4;

pub(crate) const COMPRESSION_NONE: u8 = 0;
#[allow(dead_code)]
pub(crate) const COMPRESSION_SNAPPY: u8 = 1;

/// Appends `block` to `dst` followed by its trailer (compression tag +
/// masked CRC32C over block bytes and tag), returning the `BlockHandle`
/// describing where the un-trailered block bytes landed.
pub fn append_block_with_trailer(dst: &mut Vec<u8>, block: &[u8]) -> BlockHandle {
    let offset = dst.len() as u64;
    dst.extend_from_slice(block);
    let crc = crc32c_extend(crc32c_value(block), &[COMPRESSION_NONE]);
    dst.push(COMPRESSION_NONE);
    let mut crc_buf = [0u8; 4];
    encode_fixed32(&mut crc_buf, crc32c_mask(crc));
    dst.extend_from_slice(&crc_buf);
    BlockHandle::new(offset, block.len() as u64)
}

/// Points at a block within an SST file: `u64 offset ∥ u64 length`, 16 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub length: u64,
}

pub const BLOCK_HANDLE_ENCODED_LENGTH: usize = 16;

impl BlockHandle {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn encode(&self, dst: &mut Vec<u8>) {
        let mut buf = [0u8; 8];
        encode_fixed64(&mut buf, self.offset);
        dst.extend_from_slice(&buf);
        encode_fixed64(&mut buf, self.length);
        dst.extend_from_slice(&buf);
    }

    pub fn decode(input: &[u8]) -> Option<Self> {
        if input.len() < BLOCK_HANDLE_ENCODED_LENGTH {
            return None;
        }
        Some(Self {
            offset: decode_fixed64(&input[..8]),
            length: decode_fixed64(&input[8..16]),
        })
    }
}

/// 64-bit magic written as the last 8 bytes of every SST file. The ASCII
/// bytes spell "STRATAv1"; there's no particular significance to the value
/// beyond detecting that a file isn't one of ours.
pub const TABLE_MAGIC: u64 = u64::from_le_bytes(*b"STRATAv1");

/// `(filter_meta handle) ∥ (index handle) ∥ magic`, always exactly this many
/// bytes regardless of how small the table is.
pub const FOOTER_ENCODED_LENGTH: usize = 2 * BLOCK_HANDLE_ENCODED_LENGTH + 8;

#[derive(Clone, Copy, Debug, Default)]
pub struct Footer {
    pub meta_index_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn encode(&self, dst: &mut Vec<u8>) {
        self.meta_index_handle.encode(dst);
        self.index_handle.encode(dst);
        let mut buf = [0u8; 8];
        encode_fixed64(&mut buf, TABLE_MAGIC);
        dst.extend_from_slice(&buf);
    }

    pub fn decode(input: &[u8]) -> Result<Self> {
        if input.len() < FOOTER_ENCODED_LENGTH {
            return Err(StrataError::bad_block("truncated footer"));
        }
        let magic = decode_fixed64(&input[FOOTER_ENCODED_LENGTH - 8..FOOTER_ENCODED_LENGTH]);
        if magic != TABLE_MAGIC {
            return Err(StrataError::bad_block("bad magic number"));
        }
        let meta_index_handle = BlockHandle::decode(input)
            .ok_or_else(|| StrataError::bad_block("truncated meta-index handle"))?;
        let index_handle = BlockHandle::decode(&input[BLOCK_HANDLE_ENCODED_LENGTH..])
            .ok_or_else(|| StrataError::bad_block("truncated index handle"))?;
        Ok(Self {
            meta_index_handle,
            index_handle,
        })
    }
}

/// Reads the block at `handle`, verifying its trailer's CRC. Shared by every
/// block reader (data, filter, meta-index, index) so checksum handling lives
/// in exactly one place.
pub fn read_block(
    file: &dyn RandomAccessFile,
    handle: &BlockHandle,
    verify_checksum: bool,
) -> Result<Vec<u8>> {
    let n = handle.length as usize;
    let mut buf = vec![0u8; n + BLOCK_TRAILER_SIZE];
    file.read(handle.offset as usize, &mut buf)?;

    if verify_checksum {
        let crc = crc32c_extend(crc32c_value(&buf[..n]), &buf[n..n + 1]);
        let expected = crc32c_unmask(decode_fixed32(&buf[n + 1..n + 5]));
        if crc != expected {
            return Err(StrataError::bad_block("block checksum mismatch"));
        }
    }

    buf.truncate(n);
    Ok(buf)
}
