mod memtable;
mod skiplist;

pub use memtable::{MemTable, MemTableIterator, MemTableKeyComparator};
