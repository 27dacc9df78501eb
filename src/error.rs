//! Crate-wide error type.

use thiserror::Error;

/// Errors produced anywhere in the storage engine.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("key not found")]
    NotFound,

    /// The key was written once and then tombstoned; distinct from
    /// `NotFound` so callers can tell "never written" from "deleted".
    #[error("key was deleted")]
    Deleted,

    #[error("corruption at byte {bytes}: {reason}")]
    Corruption { bytes: usize, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bad block: {0}")]
    BadBlock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StrataError {
    pub fn corruption(bytes: usize, reason: impl Into<String>) -> Self {
        StrataError::Corruption {
            bytes,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        StrataError::InvalidArgument(reason.into())
    }

    pub fn bad_block(reason: impl Into<String>) -> Self {
        StrataError::BadBlock(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StrataError::NotFound)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, StrataError::Deleted)
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, StrataError::Corruption { .. })
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
