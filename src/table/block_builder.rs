//! C7: the data block builder — prefix-compressed records plus a restart
//! array for binary search.

use crate::util::{encode_fixed32, extend_varint32};

/// Builds one data (or index, or meta-index) block: a run of
/// `varint(shared) ∥ varint(unshared) ∥ varint(value_len) ∥ unshared_key ∥
/// value` records, periodically interrupted by a full key ("restart point")
/// every `restart_interval` entries so a reader can binary-search without
/// reconstructing every key from scratch.
pub struct BlockBuilder {
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(restart_interval: usize) -> Self {
        Self {
            restart_interval,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add() called after finish()");
        // Ordering is the caller's contract (`TableBuilder` enforces it with
        // the real comparator); a raw byte-slice check here would reject
        // valid internal keys, since internal-key order breaks ties by
        // descending sequence number, not ascending bytes.

        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        let unshared = &key[shared..];
        extend_varint32(&mut self.buffer, shared as u32);
        extend_varint32(&mut self.buffer, unshared.len() as u32);
        extend_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(unshared);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    pub fn empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends the restart array and its count, and returns the finished
    /// block bytes. The builder is left empty and ready to build the next
    /// block.
    pub fn finish(&mut self) -> Vec<u8> {
        for &restart in &self.restarts {
            let mut buf = [0u8; 4];
            encode_fixed32(&mut buf, restart);
            self.buffer.extend_from_slice(&buf);
        }
        let mut buf = [0u8; 4];
        encode_fixed32(&mut buf, self.restarts.len() as u32);
        self.buffer.extend_from_slice(&buf);

        let finished = std::mem::take(&mut self.buffer);
        self.restarts = vec![0];
        self.counter = 0;
        self.last_key.clear();
        finished
    }
}
