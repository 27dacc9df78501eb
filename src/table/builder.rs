//! C9: the streaming SST writer. `add()` must be called with keys in
//! strictly ascending internal-key order; `finish()` closes out the index,
//! filter, meta-index, and footer.

use std::cmp::Ordering;

use crate::env::WritableFile;
use crate::error::Result;
use crate::options::Options;
use crate::table::block_builder::BlockBuilder;
use crate::table::filter_block::FilterBlockBuilder;
use crate::table::format::{
    BlockHandle, Footer, BLOCK_TRAILER_SIZE, COMPRESSION_NONE,
};
use crate::util::{crc32c_extend, crc32c_mask, crc32c_value, encode_fixed32};

/// Index block entries are never prefix-compressed against each other —
/// there are few enough of them that the savings aren't worth slower
/// seeks — so its restart interval is pinned to 1.
const INDEX_BLOCK_RESTART_INTERVAL: usize = 1;

pub struct TableBuilder {
    options: Options,
    file: Box<dyn WritableFile>,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: FilterBlockBuilder,
    offset: u64,
    num_entries: u64,
    pending_index_entry: bool,
    pending_handle: BlockHandle,
    last_key: Vec<u8>,
    finished: bool,
}

impl TableBuilder {
    pub fn new(options: Options, file: Box<dyn WritableFile>) -> Self {
        let filter_block = FilterBlockBuilder::new(options.filter_policy.clone());
        Self {
            data_block: BlockBuilder::new(options.block_restart_interval),
            index_block: BlockBuilder::new(INDEX_BLOCK_RESTART_INTERVAL),
            filter_block,
            options,
            file,
            offset: 0,
            num_entries: 0,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            last_key: Vec::new(),
            finished: false,
        }
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn file_size(&self) -> u64 {
        self.offset
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.finished, "add() called after finish()");
        if self.num_entries > 0 {
            assert_eq!(
                self.options.comparator.compare(key, &self.last_key),
                Ordering::Greater,
                "keys must be added in strictly ascending order"
            );
        }

        if self.pending_index_entry {
            assert!(
                self.data_block.empty(),
                "pending index entry implies a fresh data block"
            );
            let separator = self
                .options
                .comparator
                .find_shortest_separator(&self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode(&mut handle_encoding);
            self.index_block.add(&separator, &handle_encoding);
            self.pending_index_entry = false;
        }

        self.filter_block.add(key);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes out the current data block if it holds anything, marking that
    /// the next `add()` owes the index block a separator entry.
    fn flush(&mut self) -> Result<()> {
        if self.data_block.empty() {
            return Ok(());
        }
        assert!(!self.pending_index_entry);
        let block = self.data_block.finish();
        self.pending_handle = self.write_block(&block)?;
        self.pending_index_entry = true;
        self.file.flush()?;
        Ok(())
    }

    /// Appends `data` plus its trailer directly to the output file, the
    /// streaming equivalent of `format::append_block_with_trailer`.
    fn write_block(&mut self, data: &[u8]) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, data.len() as u64);
        self.file.append(data)?;

        let crc = crc32c_extend(crc32c_value(data), &[COMPRESSION_NONE]);
        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = COMPRESSION_NONE;
        encode_fixed32(&mut trailer[1..], crc32c_mask(crc));
        self.file.append(&trailer)?;

        self.offset += data.len() as u64 + BLOCK_TRAILER_SIZE as u64;
        Ok(handle)
    }

    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        assert!(!self.finished);
        self.finished = true;

        let filter_handle = if self.filter_block.available() {
            self.filter_block.finish().map(|data| self.write_block(&data)).transpose()?
        } else {
            None
        };

        let mut meta_index_block = BlockBuilder::new(INDEX_BLOCK_RESTART_INTERVAL);
        if let (Some(handle), Some(policy)) = (filter_handle, &self.options.filter_policy) {
            let key = format!("filter.{}", policy.name());
            let mut value = Vec::new();
            handle.encode(&mut value);
            meta_index_block.add(key.as_bytes(), &value);
        }
        let meta_index_handle = self.write_block(&meta_index_block.finish())?;

        if self.pending_index_entry {
            let successor = self.options.comparator.find_short_successor(&self.last_key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode(&mut handle_encoding);
            self.index_block.add(&successor, &handle_encoding);
            self.pending_index_entry = false;
        }
        let index_handle = self.write_block(&self.index_block.finish())?;

        let footer = Footer {
            meta_index_handle,
            index_handle,
        };
        let mut footer_bytes = Vec::new();
        footer.encode(&mut footer_bytes);
        self.file.append(&footer_bytes)?;
        self.offset += footer_bytes.len() as u64;
        self.file.flush()?;
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::env::WritableFile;
    use crate::table::format::FOOTER_ENCODED_LENGTH;

    #[derive(Clone, Default)]
    struct InMemoryWritableFile(Arc<Mutex<Vec<u8>>>);

    impl WritableFile for InMemoryWritableFile {
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

    #[test]
    fn builder_produces_a_footer_terminated_file() {
        let backing = InMemoryWritableFile::default();
        let options = Options::default();
        let mut builder = TableBuilder::new(options, Box::new(backing.clone()));
        builder.add(b"a", b"1").unwrap();
        builder.add(b"b", b"2").unwrap();
        builder.add(b"c", b"3").unwrap();
        builder.finish().unwrap();

        let bytes = backing.0.lock().unwrap();
        assert!(bytes.len() > FOOTER_ENCODED_LENGTH);
        assert_eq!(builder.num_entries(), 3);
    }

    #[test]
    #[should_panic(expected = "strictly ascending order")]
    fn out_of_order_keys_panic() {
        let backing = InMemoryWritableFile::default();
        let mut builder = TableBuilder::new(Options::default(), Box::new(backing));
        builder.add(b"b", b"1").unwrap();
        let _ = builder.add(b"a", b"2");
    }

    #[test]
    fn small_table_still_flushes_a_data_block_on_finish() {
        let backing = InMemoryWritableFile::default();
        let mut builder = TableBuilder::new(Options::default(), Box::new(backing.clone()));
        builder.add(b"only-key", b"value").unwrap();
        builder.finish().unwrap();
        assert!(backing.0.lock().unwrap().len() > FOOTER_ENCODED_LENGTH);
    }
}
