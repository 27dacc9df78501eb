//! C7-C9: the sorted-string-table (SST) file format — block layer, filter
//! block, and the streaming builder/reader pair that ties them together.

pub mod block;
pub mod block_builder;
pub mod builder;
pub mod filter_block;
pub mod format;
pub mod reader;

pub use block::{Block, BlockIterator};
pub use block_builder::BlockBuilder;
pub use builder::TableBuilder;
pub use filter_block::{FilterBlockBuilder, FilterBlockReader};
pub use format::{BlockHandle, Footer, BLOCK_TRAILER_SIZE, TABLE_MAGIC};
pub use reader::Table;
