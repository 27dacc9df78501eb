//! Batched writes: a sequence of Put/Delete operations encoded into one
//! buffer so they can be appended to the WAL as a single record and applied
//! to a memtable atomically.

use std::mem;

use crate::{
    dbformat::ValueType,
    error::{Result, StrataError},
    memtable::MemTable,
    util::{
        decode_fixed32, decode_fixed64, decode_size_prefixed_slice, encode_fixed32,
        encode_fixed64, extend_size_prefixed_slice,
    },
};

/// WriteBatch header has an 8-byte sequence number followed by a 4-byte count.
const HEADER_SIZE: usize = 12;
const SEQ_SIZE: usize = mem::size_of::<u64>();

pub trait WriteBatchHandler {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

struct MemTableInserter<'a> {
    sequence: u64,
    mem: &'a mut MemTable,
}

impl<'a> MemTableInserter<'a> {
    fn new(sequence: u64, mem: &'a mut MemTable) -> Self {
        Self { sequence, mem }
    }
}

impl<'a> WriteBatchHandler for MemTableInserter<'a> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.mem.add(self.sequence, ValueType::Value, key, value);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.mem.add(self.sequence, ValueType::Deletion, key, &[]);
        self.sequence += 1;
    }
}

/// A sequence of Put/Delete operations that apply atomically.
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            rep: vec![0; HEADER_SIZE],
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        extend_size_prefixed_slice(&mut self.rep, key);
        extend_size_prefixed_slice(&mut self.rep, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        extend_size_prefixed_slice(&mut self.rep, key);
    }

    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
    }

    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    pub fn append(&mut self, source: &WriteBatch) {
        self.set_count(self.count() + source.count());
        self.rep.extend_from_slice(&source.rep[HEADER_SIZE..]);
    }

    pub fn iterate(&self, mut handler: Box<dyn WriteBatchHandler + '_>) -> Result<()> {
        if self.rep.len() < HEADER_SIZE {
            return Err(StrataError::corruption(
                self.rep.len(),
                "malformed WriteBatch (too small)",
            ));
        }

        let mut index = HEADER_SIZE;
        let mut found = 0;
        while index != self.rep.len() {
            found += 1;
            let tag = self.rep[index];
            index += 1;
            match tag.into() {
                ValueType::Value => {
                    let key = match decode_size_prefixed_slice(&self.rep[index..]) {
                        Some((key, offset)) => {
                            index += offset;
                            key
                        }
                        None => return Err(StrataError::corruption(index, "bad WriteBatch Put")),
                    };
                    let value = match decode_size_prefixed_slice(&self.rep[index..]) {
                        Some((value, offset)) => {
                            index += offset;
                            value
                        }
                        None => return Err(StrataError::corruption(index, "bad WriteBatch Put")),
                    };
                    handler.put(key, value);
                }
                ValueType::Deletion => {
                    let key = match decode_size_prefixed_slice(&self.rep[index..]) {
                        Some((key, offset)) => {
                            index += offset;
                            key
                        }
                        None => {
                            return Err(StrataError::corruption(index, "bad WriteBatch Delete"))
                        }
                    };
                    handler.delete(key);
                }
            }
        }

        if found != self.count() {
            Err(StrataError::corruption(
                self.rep.len(),
                "WriteBatch has wrong count",
            ))
        } else {
            Ok(())
        }
    }

    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[SEQ_SIZE..HEADER_SIZE])
    }

    pub fn set_count(&mut self, n: u32) {
        encode_fixed32(&mut self.rep[SEQ_SIZE..HEADER_SIZE], n)
    }

    pub fn sequence(&self) -> u64 {
        decode_fixed64(&self.rep[..SEQ_SIZE])
    }

    pub fn set_sequence(&mut self, seq: u64) {
        encode_fixed64(&mut self.rep[..SEQ_SIZE], seq)
    }

    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    pub fn byte_size(&self) -> usize {
        self.rep.len()
    }

    pub fn set_contents(&mut self, contents: &[u8]) {
        self.rep = contents.to_vec()
    }

    pub fn insert_into(&self, memtable: &mut MemTable) -> Result<()> {
        let inserter = Box::new(MemTableInserter::new(self.sequence(), memtable));
        self.iterate(inserter)
    }
}
