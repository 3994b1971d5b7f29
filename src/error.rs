//! Error taxonomy for the dedup engine.
//!
//! Every error the core raises maps to exactly one POSIX errno at the FUSE
//! adapter boundary; see [`BbfsError::errno`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BbfsError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("fingerprint store exhausted")]
    IndexExhausted,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupted store: {0}")]
    CorruptedStore(String),
}

impl BbfsError {
    /// Negative POSIX errno, as returned to the FUSE adapter.
    pub fn errno(&self) -> i32 {
        match self {
            BbfsError::Io(_) => -libc::EIO,
            BbfsError::NotFound(_) => -libc::ENOENT,
            BbfsError::IndexExhausted => -libc::ENOSPC,
            BbfsError::InvalidArgument(_) => -libc::EINVAL,
            BbfsError::CorruptedStore(_) => -libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, BbfsError>;
