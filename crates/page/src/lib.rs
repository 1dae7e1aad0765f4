//! # Page - immutable sorted pages and the catalog that routes to them
//!
//! A merge writes one db file per epoch. A db file is a plain sequence of
//! pages; each page holds up to `page_size` records sorted by the key
//! comparator, laid out at a fixed stride so a point lookup can binary-search
//! the mapped bytes without decoding the whole page.
//!
//! ```text
//! N.db
//! ┌──────────────┬──────────────────────────────┬──────────────┬────
//! │ PageHeader   │ slot 0 | slot 1 | ... | vals │ PageHeader   │ ...
//! │ id, count,   │ (stride bytes per slot)      │ (count = 0:  │
//! │ size, stride │                              │  tombstone)  │
//! └──────────────┴──────────────────────────────┴──────────────┴────
//! ```
//!
//! Page ids are global. A page rewritten by a later merge keeps its id, so
//! the youngest db file holding an id is authoritative and older copies are
//! garbage. A zero-record page records that an id no longer exists.
//!
//! [`PageCatalog`] maps each live page's minimum key to its location and
//! routes arbitrary keys to the page whose range may contain them.

mod catalog;
mod format;
mod reader;
mod writer;

pub use catalog::{PageCatalog, PageEntry};
pub use format::{encode_page, encode_tombstone, split_pages, stride_for, MAX_PAGE_BODY};
pub use reader::{Page, PageFile, PageScan, PageSlot, RecordRef};
pub use writer::{DbWriter, Growth};

use codec::CodecError;
use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while writing or reading db files.
#[derive(Debug, Error)]
pub enum PageError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A page header or record failed validation.
    #[error("corrupt db file {path:?} at offset {offset}: {source}")]
    Corrupt {
        path: PathBuf,
        offset: usize,
        source: CodecError,
    },

    /// A page body does not fit the 32-bit size fields.
    #[error("page of {0} bytes exceeds the page size limit")]
    Oversized(usize),

    /// The write buffer could not grow.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

#[cfg(test)]
mod tests;
