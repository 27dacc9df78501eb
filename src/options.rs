//! C10.3: tunables for opening a database and for individual reads/writes.

use std::sync::Arc;

use crate::util::{BloomFilterPolicy, BytewiseComparator, Comparator, FilterPolicy};

/// Knobs that apply for the lifetime of an open database. Cloning an
/// `Options` is cheap — the comparator and filter policy are shared via
/// `Arc`.
#[derive(Clone)]
pub struct Options {
    /// Key ordering. Defaults to plain bytewise comparison.
    pub comparator: Arc<dyn Comparator>,

    /// Bloom (or other) filter consulted before a block read to skip SSTs
    /// that provably don't hold the key. `None` disables filtering.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Target uncompressed size of a data block (§3).
    pub block_size: usize,

    /// Number of keys between full-key restart points within a block (§3).
    pub block_restart_interval: usize,

    /// Bits of filter data per key, used when no explicit `filter_policy`
    /// is supplied but one is requested via `with_bloom_filter`.
    pub bits_per_key: usize,

    /// Memtable size, in bytes, at which the external flush path (§2) should
    /// roll it into an SST. Not consulted by the core memtable itself.
    pub write_buffer_size: usize,

    /// Per-shard capacity, in bytes, of the block cache (C10).
    pub block_cache_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator::new()),
            filter_policy: Some(Arc::new(BloomFilterPolicy::new(10))),
            block_size: 4096,
            block_restart_interval: 16,
            bits_per_key: 10,
            write_buffer_size: 4 * 1024 * 1024,
            block_cache_capacity: 8 * 1024 * 1024,
        }
    }
}

/// Per-call knobs for a read.
#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    /// Verify the CRC32C of every block touched by this read before
    /// returning its contents.
    pub verify_checksums: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
        }
    }
}

/// Per-call knobs for a write.
#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    /// Force an `fsync` of the WAL before the write is acknowledged.
    pub sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { sync: false }
    }
}
