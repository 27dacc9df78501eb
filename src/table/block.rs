//! C7: the data block reader — a byte slice plus an iterator that
//! reconstructs keys from the restart/shared-prefix encoding on the fly.

use std::sync::Arc;

use crate::error::{Result, StrataError};
use crate::iterator::Iterator as StrataIterator;
use crate::util::{decode_fixed32, decode_varint32, Comparator};

/// A decoded data (or index, or meta-index) block. Cheap to clone — the
/// underlying bytes are reference-counted so a block can be shared by the
/// block cache across threads and iterators alike.
#[derive(Clone)]
pub struct Block {
    data: Arc<Vec<u8>>,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Parses `contents` (already stripped of its trailer) into a block.
    /// Fails if the restart count is inconsistent with the buffer length.
    pub fn new(contents: Vec<u8>) -> Result<Self> {
        if contents.len() < 4 {
            return Err(StrataError::bad_block("block too small for restart count"));
        }
        let num_restarts = decode_fixed32(&contents[contents.len() - 4..]);
        let max_restarts_allowed = (contents.len() - 4) / 4;
        if num_restarts as usize > max_restarts_allowed {
            return Err(StrataError::bad_block("restart count overflows block"));
        }
        let restart_offset = contents.len() - (1 + num_restarts as usize) * 4;
        Ok(Self {
            data: Arc::new(contents),
            restart_offset,
            num_restarts,
        })
    }

    pub fn iter(&self, comparator: Arc<dyn Comparator>) -> BlockIterator {
        BlockIterator::new(self.clone(), comparator)
    }
}

fn decode_entry(data: &[u8], limit: usize, offset: usize) -> Option<(u32, u32, u32, usize)> {
    let (shared, n1) = decode_varint32(&data[offset..limit])?;
    let (unshared, n2) = decode_varint32(&data[offset + n1..limit])?;
    let (value_len, n3) = decode_varint32(&data[offset + n1 + n2..limit])?;
    let header_len = n1 + n2 + n3;
    if offset + header_len + unshared as usize + value_len as usize > limit {
        return None;
    }
    Some((shared, unshared, value_len, offset + header_len))
}

/// An iterator over one block's records, reconstructing full keys from the
/// restart/shared-prefix encoding.
pub struct BlockIterator {
    block: Block,
    comparator: Arc<dyn Comparator>,
    /// Byte offset, within `block.data`, of the current record (its
    /// shared-len varint). `restart_offset` once invalid.
    current: usize,
    restart_index: u32,
    key: Vec<u8>,
    value_range: (usize, usize),
    error: Option<String>,
}

impl BlockIterator {
    fn new(block: Block, comparator: Arc<dyn Comparator>) -> Self {
        let current = block.restart_offset;
        let restart_index = block.num_restarts;
        Self {
            block,
            comparator,
            current,
            restart_index,
            key: Vec::new(),
            value_range: (0, 0),
            error: None,
        }
    }

    fn restart_point(&self, index: u32) -> usize {
        let start = self.block.restart_offset + index as usize * 4;
        decode_fixed32(&self.block.data[start..start + 4]) as usize
    }

    fn corrupt(&mut self) {
        self.current = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
        self.key.clear();
        self.error = Some("corrupt data block entry".to_string());
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        let offset = self.restart_point(index);
        self.current = offset;
        self.value_range = (offset, offset);
    }

    /// Decodes the record at `self.current`, advancing it to the next
    /// record's offset. Returns false (and marks the iterator invalid) at
    /// end-of-block or on corruption.
    fn parse_next_key(&mut self) -> bool {
        let start = self.current;
        if start >= self.block.restart_offset {
            self.current = self.block.restart_offset;
            self.restart_index = self.block.num_restarts;
            return false;
        }
        match decode_entry(&self.block.data, self.block.restart_offset, start) {
            None => {
                self.corrupt();
                false
            }
            Some((shared, unshared, value_len, body_offset)) => {
                if self.key.len() < shared as usize {
                    self.corrupt();
                    return false;
                }
                self.key.truncate(shared as usize);
                self.key
                    .extend_from_slice(&self.block.data[body_offset..body_offset + unshared as usize]);
                let value_start = body_offset + unshared as usize;
                self.value_range = (value_start, value_start + value_len as usize);
                self.current = value_start + value_len as usize;
                while self.restart_index + 1 < self.block.num_restarts
                    && self.restart_point(self.restart_index + 1) < start
                {
                    self.restart_index += 1;
                }
                true
            }
        }
    }
}

impl StrataIterator for BlockIterator {
    fn valid(&self) -> bool {
        self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.current = self.block.restart_offset;
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.current < self.block.restart_offset {}
    }

    fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.current = self.block.restart_offset;
            return;
        }
        let mut left = 0u32;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = left + (right - left + 1) / 2;
            let region_offset = self.restart_point(mid);
            match decode_entry(&self.block.data, self.block.restart_offset, region_offset) {
                Some((shared, unshared, _, body_offset)) if shared == 0 => {
                    let mid_key = &self.block.data[body_offset..body_offset + unshared as usize];
                    if self.comparator.compare(mid_key, target) == std::cmp::Ordering::Less {
                        left = mid;
                    } else {
                        right = mid - 1;
                    }
                }
                _ => {
                    self.corrupt();
                    return;
                }
            }
        }
        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.comparator.compare(&self.key, target) != std::cmp::Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        assert!(self.valid());
        self.parse_next_key();
    }

    fn prev(&mut self) {
        assert!(self.valid());
        let original = self.current;
        while self.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                self.current = self.block.restart_offset;
                self.restart_index = self.block.num_restarts;
                return;
            }
            self.restart_index -= 1;
        }
        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key() && self.current < original {}
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid());
        &self.key
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid());
        &self.block.data[self.value_range.0..self.value_range.1]
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(message) => Err(StrataError::bad_block(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::block_builder::BlockBuilder;
    use crate::util::BytewiseComparator;

    fn cmp() -> Arc<dyn Comparator> {
        Arc::new(BytewiseComparator::new())
    }

    fn build(keys: &[(&str, &str)], restart_interval: usize) -> Block {
        let mut builder = BlockBuilder::new(restart_interval);
        for (k, v) in keys {
            builder.add(k.as_bytes(), v.as_bytes());
        }
        Block::new(builder.finish()).unwrap()
    }

    #[test]
    fn iterates_all_records_in_order() {
        let block = build(&[("a", "1"), ("b", "2"), ("c", "3")], 16);
        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        let mut seen = vec![];
        while iter.valid() {
            seen.push((
                String::from_utf8(iter.key().to_vec()).unwrap(),
                String::from_utf8(iter.value().to_vec()).unwrap(),
            ));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
                ("c".into(), "3".into())
            ]
        );
    }

    #[test]
    fn seek_lands_on_first_key_at_or_after_target() {
        let block = build(&[("a", "1"), ("c", "2"), ("e", "3")], 1);
        let mut iter = block.iter(cmp());
        iter.seek(b"b");
        assert_eq!(iter.key(), b"c");
        iter.seek(b"e");
        assert_eq!(iter.key(), b"e");
        iter.seek(b"z");
        assert!(!iter.valid());
    }

    #[test]
    fn reverse_iteration_with_shared_prefixes() {
        let block = build(&[("aa", "1"), ("aaa", "2"), ("aaab", "3")], 16);
        let mut iter = block.iter(cmp());
        iter.seek_to_last();
        assert_eq!(iter.key(), b"aaab");
        iter.prev();
        assert_eq!(iter.key(), b"aaa");
        iter.prev();
        assert_eq!(iter.key(), b"aa");
        assert!(iter.valid());
    }

    #[test]
    fn rejects_a_block_with_an_impossible_restart_count() {
        let mut garbage = vec![0u8; 8];
        garbage[4..8].copy_from_slice(&999u32.to_le_bytes());
        assert!(Block::new(garbage).is_err());
    }
}
