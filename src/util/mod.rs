mod arena;
mod coding;
mod comparator;
mod crc32c;
mod filter_policy;
mod hash;
mod random;

pub use arena::Arena;
pub use coding::*;
pub use comparator::{BytewiseComparator, Comparator};
pub use crc32c::{crc32c_extend, crc32c_mask, crc32c_unmask, crc32c_value};
pub use filter_policy::{BloomFilterPolicy, FilterPolicy};
pub use hash::hash;
pub use random::Random;
