//! C6: write-ahead log framing — fixed-size blocks of CRC32C-protected
//! physical records that fragment logical records across block boundaries.

mod reader;
mod writer;

pub use reader::{Reader, Reporter};
pub use writer::Writer;

use crate::error::StrataError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub(crate) enum RecordType {
    Zero = 0,
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
    Unknown = 5,
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Zero,
            1 => Self::Full,
            2 => Self::First,
            3 => Self::Middle,
            4 => Self::Last,
            _ => Self::Unknown,
        }
    }
}

const MAX_RECORD_TYPE: RecordType = RecordType::Last;

pub(crate) const BLOCK_SIZE: usize = 32768;

/// Header is checksum (4 bytes), length (2 bytes), type (1 byte).
pub(crate) const HEADER_SIZE: usize = 4 + 2 + 1;

/// A `Reporter` that simply forwards to `tracing::warn!`, used whenever the
/// caller doesn't supply one.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn corruption(&mut self, bytes: usize, error: &StrataError) {
        tracing::warn!(bytes, %error, "wal: dropping corrupt record fragment");
    }
}
