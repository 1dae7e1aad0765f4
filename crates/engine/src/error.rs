use std::collections::TryReserveError;
use std::io;

use config::ConfigError;
use page::PageError;
use thiserror::Error;
use wal::WalError;

/// Errors returned by [`Db`](crate::Db) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Open, mmap, read, write, flush or rename failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An allocation for caller data or a new db file failed.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// CRC mismatch, bad magic, truncated record, missing EOF marker or an
    /// invalid file name.
    #[error("corruption: {0}")]
    Corruption(String),

    /// An epoch holds a combination of files recovery cannot explain.
    #[error("repository is corrupted")]
    RepositoryCorrupted { epoch: u32 },

    /// The call is not allowed on this handle or with these arguments.
    #[error("misuse: {0}")]
    Misuse(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<WalError> for Error {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(io) => Error::Io(io),
            other => Error::Corruption(other.to_string()),
        }
    }
}

impl From<PageError> for Error {
    fn from(e: PageError) -> Self {
        match e {
            PageError::Io(io) => Error::Io(io),
            PageError::OutOfMemory(oom) => Error::OutOfMemory(oom),
            other => Error::Corruption(other.to_string()),
        }
    }
}

impl Error {
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption(_) | Error::RepositoryCorrupted { .. }
        )
    }
}
