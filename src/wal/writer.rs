use super::{RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE};
use crate::{
    env::WritableFile,
    error::Result,
    util::{crc32c_extend, crc32c_mask, crc32c_value, encode_fixed32},
};

pub struct Writer {
    dest: Box<dyn WritableFile>,
    block_offset: usize,
    /// Precomputed crc32c of each record-type byte, so the common path only
    /// has to extend it over the payload instead of hashing the type byte
    /// every time.
    type_crc: [u32; MAX_RECORD_TYPE as usize + 1],
}

impl Writer {
    pub fn new(dest: Box<dyn WritableFile>) -> Self {
        Self::new_at(dest, 0)
    }

    pub fn new_at(dest: Box<dyn WritableFile>, dest_len: usize) -> Self {
        let mut result = Self {
            dest,
            block_offset: dest_len % BLOCK_SIZE,
            type_crc: [0; MAX_RECORD_TYPE as usize + 1],
        };
        for (index, slot) in result.type_crc.iter_mut().enumerate() {
            *slot = crc32c_value(&[index as u8]);
        }
        result
    }

    pub fn add_record(&mut self, slice: &[u8]) -> Result<()> {
        let mut slice_left = slice;
        let mut begin = true;
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    // Pad the rest of the block with zeroes; relies on HEADER_SIZE == 7.
                    self.dest.append(&[0; HEADER_SIZE][..leftover])?;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = slice_left.len().min(avail);
            let end = fragment_length == slice_left.len();
            let type_ = if begin && end {
                RecordType::Full
            } else if begin {
                RecordType::First
            } else if end {
                RecordType::Last
            } else {
                RecordType::Middle
            };
            self.emit_physical_record(type_, &slice_left[..fragment_length])?;
            slice_left = &slice_left[fragment_length..];
            if slice_left.is_empty() {
                return Ok(());
            }
            begin = false;
        }
    }

    fn emit_physical_record(&mut self, type_: RecordType, data: &[u8]) -> Result<()> {
        assert!(data.len() <= 0xffff);
        assert!(self.block_offset + HEADER_SIZE + data.len() <= BLOCK_SIZE);

        let mut buf = [0; HEADER_SIZE];
        let crc = crc32c_extend(self.type_crc[type_ as usize], data);
        encode_fixed32(&mut buf[0..4], crc32c_mask(crc));
        buf[4] = data.len() as u8;
        buf[5] = (data.len() >> 8) as u8;
        buf[6] = type_ as u8;

        self.dest.append(&buf)?;
        self.dest.append(data)?;
        self.dest.flush()?;
        self.block_offset += HEADER_SIZE + data.len();
        Ok(())
    }
}
