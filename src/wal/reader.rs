use std::{cell::RefCell, ops::Range, rc::Rc};

use super::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::{
    env::SequentialFile,
    error::StrataError,
    util::{crc32c_unmask, crc32c_value, decode_fixed32},
};

#[derive(Debug)]
enum PhysicalReadOutcome {
    Eof,
    BadRecord,
}

pub struct Reader {
    file: Rc<RefCell<dyn SequentialFile>>,
    reporter: Option<Rc<RefCell<dyn Reporter>>>,
    checksum: bool,
    backing_store: [u8; BLOCK_SIZE],
    scratch: Vec<u8>,
    buffer_range: Range<usize>,
    eof: bool,
    /// Offset of the last record returned by `read_record`.
    last_record_offset: usize,
    /// Offset of the first location past the end of `backing_store`'s
    /// currently-valid region.
    end_of_buffer_offset: usize,
    initial_offset: usize,
    /// True while resynchronizing after a seek (`initial_offset > 0`); a run
    /// of `Middle`/`Last` records is silently skipped in this mode since they
    /// belong to a logical record that started before `initial_offset`.
    resyncing: bool,
}

impl Reader {
    pub fn new(
        file: Rc<RefCell<dyn SequentialFile>>,
        initial_offset: usize,
        checksum: bool,
        reporter: Option<Rc<RefCell<dyn Reporter>>>,
    ) -> Self {
        Self {
            file,
            reporter,
            checksum,
            backing_store: [0; BLOCK_SIZE],
            scratch: vec![],
            buffer_range: 0..0,
            eof: false,
            last_record_offset: 0,
            end_of_buffer_offset: 0,
            initial_offset,
            resyncing: initial_offset > 0,
        }
    }

    pub fn read_record(&mut self) -> Option<Vec<u8>> {
        if self.last_record_offset < self.initial_offset && !self.skip_to_initial_block() {
            return None;
        }

        self.scratch.clear();
        let mut in_fragmented_record = false;
        let mut prospective_record_offset = 0;

        loop {
            let buffer_len_before = self.buffer_range.len();
            let (outcome, range) = self.read_physical_record();
            let fragment_len = range.len();
            let physical_record_offset = self.end_of_buffer_offset as isize
                - buffer_len_before as isize
                - HEADER_SIZE as isize
                - fragment_len as isize;

            if let Ok(record_type) = outcome {
                if self.resyncing {
                    match record_type {
                        RecordType::Middle => continue,
                        RecordType::Last => {
                            self.resyncing = false;
                            continue;
                        }
                        _ => self.resyncing = false,
                    }
                }
            }

            match outcome {
                Ok(RecordType::Full) => {
                    if in_fragmented_record && !self.scratch.is_empty() {
                        self.report_corruption(self.scratch.len(), "partial record without end(1)");
                    }
                    assert!(physical_record_offset >= 0);
                    self.last_record_offset = physical_record_offset as usize;
                    self.scratch.clear();
                    return Some(self.backing_store[range].to_vec());
                }
                Ok(RecordType::First) => {
                    if in_fragmented_record && !self.scratch.is_empty() {
                        self.report_corruption(self.scratch.len(), "partial record without end(2)");
                    }
                    assert!(physical_record_offset >= 0);
                    prospective_record_offset = physical_record_offset as usize;
                    self.scratch = self.backing_store[range].to_vec();
                    in_fragmented_record = true;
                }
                Ok(RecordType::Middle) => {
                    if !in_fragmented_record {
                        self.report_corruption(fragment_len, "missing start of fragmented record(1)");
                    } else {
                        self.scratch.extend_from_slice(&self.backing_store[range]);
                    }
                }
                Ok(RecordType::Last) => {
                    if !in_fragmented_record {
                        self.report_corruption(fragment_len, "missing start of fragmented record(2)");
                    } else {
                        self.scratch.extend_from_slice(&self.backing_store[range]);
                        self.last_record_offset = prospective_record_offset;
                        return Some(self.scratch.clone());
                    }
                }
                Err(PhysicalReadOutcome::Eof) => {
                    if in_fragmented_record {
                        // The writer likely died right after a physical record and
                        // before completing the next one; not a corruption, just
                        // drop the whole logical record.
                        self.scratch.clear();
                    }
                    return None;
                }
                Err(PhysicalReadOutcome::BadRecord) => {
                    if in_fragmented_record {
                        self.report_corruption(self.scratch.len(), "error in middle of record");
                        in_fragmented_record = false;
                        self.scratch.clear();
                    }
                }
                #[allow(unreachable_patterns)]
                Ok(record_type) => {
                    let drop_size = if in_fragmented_record {
                        self.scratch.len() + fragment_len
                    } else {
                        fragment_len
                    };
                    self.report_corruption(drop_size, &format!("unknown record type {record_type:?}"));
                    in_fragmented_record = false;
                    self.scratch.clear();
                }
            }
        }
    }

    pub fn last_record_offset(&self) -> usize {
        self.last_record_offset
    }

    /// Skips all blocks entirely before `initial_offset`.
    fn skip_to_initial_block(&mut self) -> bool {
        let offset_in_block = self.initial_offset % BLOCK_SIZE;
        let mut block_start_location = self.initial_offset - offset_in_block;
        if offset_in_block > BLOCK_SIZE - 6 {
            block_start_location += BLOCK_SIZE;
        }
        self.end_of_buffer_offset = block_start_location;
        if block_start_location > 0 {
            if let Err(error) = self.file.borrow_mut().skip(block_start_location) {
                self.report_drop(block_start_location, &error);
                return false;
            }
        }
        true
    }

    /// Reads one physical record. On success, returns the record's type and
    /// the range within `self.backing_store` holding its payload.
    fn read_physical_record(&mut self) -> (Result<RecordType, PhysicalReadOutcome>, Range<usize>) {
        loop {
            if self.buffer_range.len() < HEADER_SIZE {
                if !self.eof {
                    self.buffer_range = 0..0;
                    let result = self.file.borrow_mut().read(&mut self.backing_store);
                    let read_size = *result.as_ref().unwrap_or(&0);
                    self.buffer_range = 0..read_size;
                    self.end_of_buffer_offset += self.buffer_range.len();
                    if let Err(error) = result {
                        self.buffer_range = 0..0;
                        self.report_drop(BLOCK_SIZE, &error);
                        self.eof = true;
                        return (Err(PhysicalReadOutcome::Eof), 0..0);
                    } else if self.buffer_range.len() < BLOCK_SIZE {
                        self.eof = true;
                    }
                    continue;
                } else {
                    // A non-empty remaining buffer here means a truncated header at
                    // EOF, likely a writer crashing mid-header; report EOF, not an
                    // error.
                    self.buffer_range = 0..0;
                    return (Err(PhysicalReadOutcome::Eof), 0..0);
                }
            }

            let start = self.buffer_range.start;
            let buffer = &self.backing_store[self.buffer_range.clone()];
            let a = buffer[4] as u32;
            let b = buffer[5] as u32;
            let length = a | (b << 8);
            let type_: RecordType = buffer[6].into();

            if HEADER_SIZE + length as usize > buffer.len() {
                let drop_size = buffer.len();
                self.buffer_range = 0..0;
                if !self.eof {
                    self.report_corruption(drop_size, "bad record length");
                    return (Err(PhysicalReadOutcome::BadRecord), 0..0);
                }
                // Reached EOF without the full payload; the writer probably died
                // mid-record. Not a corruption.
                return (Err(PhysicalReadOutcome::Eof), 0..0);
            }

            if type_ == RecordType::Zero && length == 0 {
                // Zero-length records come from preallocated file regions; skip
                // silently, no drop to report.
                self.buffer_range = 0..0;
                return (Err(PhysicalReadOutcome::BadRecord), 0..0);
            }

            if self.checksum {
                let expected_crc = crc32c_unmask(decode_fixed32(buffer));
                let actual_crc = crc32c_value(&buffer[6..6 + 1 + length as usize]);
                if actual_crc != expected_crc {
                    // "length" itself may be corrupted; drop the rest of the
                    // buffer instead of trusting it.
                    let drop_size = buffer.len();
                    self.buffer_range = 0..0;
                    self.report_corruption(drop_size, "checksum mismatch");
                    return (Err(PhysicalReadOutcome::BadRecord), 0..0);
                }
            }

            self.buffer_range = start + HEADER_SIZE + length as usize..self.buffer_range.end;

            if self.end_of_buffer_offset - self.buffer_range.len() - HEADER_SIZE - length as usize
                < self.initial_offset
            {
                return (Err(PhysicalReadOutcome::BadRecord), 0..0);
            }

            return (
                Ok(type_),
                start + HEADER_SIZE..start + HEADER_SIZE + length as usize,
            );
        }
    }

    fn report_corruption(&mut self, bytes: usize, msg: &str) {
        self.report_drop(bytes, &StrataError::corruption(0, msg))
    }

    fn report_drop(&mut self, bytes: usize, reason: &StrataError) {
        if self.reporter.is_some()
            && self
                .end_of_buffer_offset
                .wrapping_sub(self.buffer_range.len() + bytes)
                >= self.initial_offset
        {
            self.reporter
                .as_mut()
                .unwrap()
                .borrow_mut()
                .corruption(bytes, reason)
        }
    }
}

pub trait Reporter {
    fn corruption(&mut self, bytes: usize, error: &StrataError);
}
