pub mod batch;
pub mod cache;
pub mod dbformat;
pub mod env;
pub mod error;
pub mod filename;
pub mod iterator;
pub mod options;
pub mod table;
pub mod util;

mod memtable;
pub mod wal;

pub use error::{Result, StrataError};
pub use memtable::{MemTable, MemTableIterator, MemTableKeyComparator};
pub use options::{Options, ReadOptions, WriteOptions};
