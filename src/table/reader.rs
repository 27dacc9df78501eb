//! C9: the SST reader — opens a table written by [`super::builder::TableBuilder`]
//! and exposes it as an iterator of internal-key/value pairs, consulting the
//! filter block before ever touching a data block on disk.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::cache::Cache;
use crate::env::RandomAccessFile;
use crate::error::{Result, StrataError};
use crate::iterator::Iterator as StrataIterator;
use crate::options::{Options, ReadOptions};
use crate::table::block::{Block, BlockIterator};
use crate::table::filter_block::FilterBlockReader;
use crate::table::format::{read_block, BlockHandle, Footer};
use crate::util::Comparator;

/// Assigns each opened table a process-unique id, used as half of the block
/// cache key so blocks from different tables never collide.
static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

type BlockCache = Cache<(u64, u64), Block>;

struct TableInner {
    file: Box<dyn RandomAccessFile>,
    comparator: Arc<dyn Comparator>,
    index_block: Block,
    filter: Option<FilterBlockReader>,
    cache: Option<Arc<BlockCache>>,
    cache_id: u64,
}

/// A handle on an opened, immutable SST file.
pub struct Table {
    inner: Arc<TableInner>,
}

impl Table {
    /// Reads the footer, index block, and (if configured) filter block out
    /// of `file`. `file_size` must be the exact length of the underlying
    /// file so the footer can be located at its tail.
    pub fn open(
        file: Box<dyn RandomAccessFile>,
        file_size: u64,
        options: &Options,
        cache: Option<Arc<BlockCache>>,
    ) -> Result<Self> {
        use crate::table::format::FOOTER_ENCODED_LENGTH;

        if file_size < FOOTER_ENCODED_LENGTH as u64 {
            return Err(StrataError::bad_block("file too small to hold a footer"));
        }
        let mut footer_space = vec![0u8; FOOTER_ENCODED_LENGTH];
        file.read(
            (file_size - FOOTER_ENCODED_LENGTH as u64) as usize,
            &mut footer_space,
        )?;
        let footer = Footer::decode(&footer_space)?;

        let index_contents = read_block(file.as_ref(), &footer.index_handle, true)?;
        let index_block = Block::new(index_contents)?;

        let filter = match &options.filter_policy {
            Some(policy) => {
                let meta_index_contents =
                    read_block(file.as_ref(), &footer.meta_index_handle, true)?;
                let meta_index_block = Block::new(meta_index_contents)?;
                let mut meta_iter = meta_index_block.iter(options.comparator.clone());
                let wanted_key = format!("filter.{}", policy.name());
                meta_iter.seek(wanted_key.as_bytes());
                if meta_iter.valid() && meta_iter.key() == wanted_key.as_bytes() {
                    let handle = BlockHandle::decode(meta_iter.value())
                        .ok_or_else(|| StrataError::bad_block("truncated filter handle"))?;
                    let filter_data = read_block(file.as_ref(), &handle, true)?;
                    Some(FilterBlockReader::new(policy.clone(), filter_data))
                } else {
                    None
                }
            }
            None => None,
        };

        let cache_id = NEXT_CACHE_ID.fetch_add(1, AtomicOrdering::Relaxed);

        Ok(Self {
            inner: Arc::new(TableInner {
                file,
                comparator: options.comparator.clone(),
                index_block,
                filter,
                cache,
                cache_id,
            }),
        })
    }

    /// Returns `false` only when the filter block (if any) proves the key
    /// cannot be present in any data block of this table.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        match &self.inner.filter {
            Some(filter) => filter.key_may_match(key),
            None => true,
        }
    }

    /// A two-level iterator: the index block picks a data block, a data
    /// block iterator is created (or pulled from cache) on demand.
    pub fn new_iterator(&self, read_options: ReadOptions) -> Box<dyn StrataIterator> {
        Box::new(TwoLevelIterator::new(self.inner.clone(), read_options))
    }
}

impl TableInner {
    fn read_data_block(&self, handle: &BlockHandle, verify_checksums: bool) -> Result<Block> {
        if let Some(cache) = &self.cache {
            let cache_key = (self.cache_id, handle.offset);
            if let Some(cached) = cache.get(&cache_key) {
                let block = cached.value().clone();
                cache.release(cached);
                return Ok(block);
            }
            let contents = read_block(self.file.as_ref(), handle, verify_checksums)?;
            let block = Block::new(contents)?;
            cache.insert(cache_key, block.clone(), 0);
            Ok(block)
        } else {
            let contents = read_block(self.file.as_ref(), handle, verify_checksums)?;
            Block::new(contents)
        }
    }
}

/// Mirrors the original engine's two-level iterator, but trades its
/// `void* arg` + function-pointer block-reader callback for an owned
/// `Arc<TableInner>` the data iterator is rebuilt from on each index move.
struct TwoLevelIterator {
    table: Arc<TableInner>,
    read_options: ReadOptions,
    index_iter: BlockIterator,
    data_iter: Option<BlockIterator>,
    data_block_handle: Vec<u8>,
}

impl TwoLevelIterator {
    fn new(table: Arc<TableInner>, read_options: ReadOptions) -> Self {
        let index_iter = table.index_block.iter(table.comparator.clone());
        Self {
            table,
            read_options,
            index_iter,
            data_iter: None,
            data_block_handle: Vec::new(),
        }
    }

    fn set_data_iter(&mut self, iter: Option<BlockIterator>) {
        self.data_iter = iter;
    }

    /// Rebuilds `data_iter` for whatever entry `index_iter` now points at,
    /// reusing the existing one if the index hasn't actually moved to a new
    /// block since the last call.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.set_data_iter(None);
            return;
        }
        let value = self.index_iter.value().to_vec();
        if self.data_iter.is_some() && value == self.data_block_handle {
            return;
        }
        self.data_block_handle = value.clone();
        match BlockHandle::decode(&value) {
            Some(handle) => match self.table.read_data_block(&handle, self.read_options.verify_checksums) {
                Ok(block) => {
                    let iter = block.iter(self.table.comparator.clone());
                    self.set_data_iter(Some(iter));
                }
                Err(_) => self.set_data_iter(None),
            },
            None => self.set_data_iter(None),
        }
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while self.data_iter.as_ref().map_or(true, |it| !it.valid()) {
            if !self.index_iter.valid() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while self.data_iter.as_ref().map_or(true, |it| !it.valid()) {
            if !self.index_iter.valid() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_last();
            }
        }
    }
}

impl StrataIterator for TwoLevelIterator {
    fn valid(&self) -> bool {
        self.data_iter.as_ref().map_or(false, |it| it.valid())
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        assert!(self.valid());
        self.data_iter.as_mut().unwrap().next();
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        assert!(self.valid());
        self.data_iter.as_mut().unwrap().prev();
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        self.data_iter.as_ref().expect("key() called on an invalid iterator").key()
    }

    fn value(&self) -> &[u8] {
        self.data_iter.as_ref().expect("value() called on an invalid iterator").value()
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(iter) = &self.data_iter {
            iter.status()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::table::builder::TableBuilder;
    use crate::env::WritableFile;

    #[derive(Clone, Default)]
    struct InMemoryFile(Arc<Mutex<Vec<u8>>>);

    impl WritableFile for InMemoryFile {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn sync(&mut self) -> Result<()> {
            Ok(())
        }
    }

    impl RandomAccessFile for InMemoryFile {
        fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
            let bytes = self.0.lock().unwrap();
            dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
            Ok(())
        }
    }

    fn build_table(entries: &[(&str, &str)]) -> (InMemoryFile, u64) {
        let backing = InMemoryFile::default();
        let options = Options::default();
        let mut builder = TableBuilder::new(options, Box::new(backing.clone()));
        for (k, v) in entries {
            builder.add(k.as_bytes(), v.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
        let size = backing.0.lock().unwrap().len() as u64;
        (backing, size)
    }

    #[test]
    fn iterates_every_entry_in_order() {
        let (file, size) = build_table(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let options = Options::default();
        let table = Table::open(Box::new(file), size, &options, None).unwrap();
        let mut iter = table.new_iterator(ReadOptions::default());
        iter.seek_to_first();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn seek_finds_exact_key() {
        let (file, size) = build_table(&[("a", "1"), ("m", "2"), ("z", "3")]);
        let options = Options::default();
        let table = Table::open(Box::new(file), size, &options, None).unwrap();
        let mut iter = table.new_iterator(ReadOptions::default());
        iter.seek(b"m");
        assert!(iter.valid());
        assert_eq!(iter.value(), b"2");
    }

    #[test]
    fn filter_rejects_a_key_never_added() {
        let (file, size) = build_table(&[("a", "1"), ("b", "2")]);
        let options = Options::default();
        let table = Table::open(Box::new(file), size, &options, None).unwrap();
        assert!(table.may_contain(b"a"));
        assert!(!table.may_contain(b"definitely-not-present-xyz"));
    }

    #[test]
    fn reads_go_through_the_shared_block_cache() {
        let (file, size) = build_table(&[("a", "1"), ("b", "2")]);
        let options = Options::default();
        let cache = Arc::new(Cache::new(1024));
        let table = Table::open(Box::new(file), size, &options, Some(cache.clone())).unwrap();
        let mut iter = table.new_iterator(ReadOptions::default());
        iter.seek_to_first();
        assert!(iter.valid());
        // Second pass should hit the populated cache rather than re-reading.
        let mut iter2 = table.new_iterator(ReadOptions::default());
        iter2.seek_to_first();
        assert_eq!(iter2.key(), b"a");
    }
}
