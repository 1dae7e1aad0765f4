//! # Engine - Sediment Storage Engine
//!
//! Ties the [`wal`], [`index`] and [`page`] crates together into a
//! log-structured key-value store organised in numbered epochs.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────────┐
//! │                         ENGINE                           │
//! │                                                          │
//! │ write.rs → live log append → active index generation     │
//! │              |                                           │
//! │              |  (every `merge_watermark` updates)        │
//! │              v                                           │
//! │ merge.rs  rotate: seal live log, swap generations        │
//! │           drain shadow generation → <epoch>.db           │
//! │           install pages in the catalog, delete the log   │
//! │                                                          │
//! │ read.rs   active → shadow → catalog → page               │
//! │ cursor.rs 3-way merge of active, shadow and pages        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                 |
//! |----------------|---------------------------------------------------------|
//! | [`lib.rs`]     | `Db` struct, `open`, `close`, `stat`, `Debug`, `Drop`   |
//! | [`repository`] | epoch files in the directory and their classification   |
//! | [`recovery`]   | youngest-first replay of db files and logs              |
//! | [`write`]      | `set()`, `delete()`, live log retirement                |
//! | [`read`]       | `get()`                                                 |
//! | [`cursor`]     | ordered, tombstone-filtering iteration                  |
//! | [`merge`]      | merge rounds, page rewrite policy, GC, merge thread     |
//!
//! ## Lock Order
//!
//! ```text
//! repo (RwLock) → log (Mutex) → index (Mutex) → catalog (RwLock)
//! ```
//!
//! A [`Cursor`] holds a read guard on the repository for its whole life,
//! which keeps merge rounds from rotating epochs underneath it.
//!
//! ## Crash Safety
//!
//! A write is appended and flushed to the live log before the index sees
//! it. A db file is written as `<epoch>.db.incomplete` and renamed when
//! complete; the log it replaces is only deleted after the rename. Recovery
//! explains every surviving combination of files or refuses to open.
mod cursor;
mod error;
mod merge;
mod read;
mod recovery;
mod repository;
mod write;

use std::fmt;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use codec::Comparator;
use config::Config;
use index::Generations;
use page::PageCatalog;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{error, info};
use wal::LogWriter;

pub use codec::Order;
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use repository::{classify, EpochKind, FileKind, RecoverFlags, Recovery};

use repository::{Epoch, Repository};

/// The log receiving writes and the epoch that owns it.
pub(crate) struct LiveLog {
    /// `None` on a read-only handle, or after a failed rotation.
    pub(crate) writer: Option<LogWriter>,
    pub(crate) epoch: u32,
    /// Writes since the epoch went live.
    pub(crate) updates: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Signal {
    pub(crate) wake: bool,
    pub(crate) stop: bool,
}

/// State shared by caller threads and the merge thread.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) repo: RwLock<Repository>,
    pub(crate) log: Mutex<LiveLog>,
    pub(crate) index: Mutex<Generations>,
    pub(crate) catalog: RwLock<PageCatalog>,
    /// Serializes merge rounds.
    pub(crate) merging: Mutex<()>,
    pub(crate) signal: Mutex<Signal>,
    pub(crate) wakeup: Condvar,
    /// Highest epoch id seen in an accepted record.
    pub(crate) psn: AtomicU32,
    pub(crate) next_page_id: AtomicU32,
}

impl Shared {
    pub(crate) fn comparator(&self) -> &Comparator {
        &self.config.comparator
    }
}

/// Counters describing the current state of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Highest epoch id, the live one on a writable handle.
    pub epoch: u32,
    pub psn: u32,
    pub repo_count: usize,
    pub db_epoch_count: usize,
    pub xfer_epoch_count: usize,
    pub catalog_page_count: usize,
    pub index_record_count: usize,
    pub index_page_count: usize,
}

/// An open database directory.
///
/// # Write Path
///
/// 1. Copy the key and value and precompute the record CRC, lock-free.
/// 2. Append to the live log and flush, under the log lock.
/// 3. Insert into the active index generation, under the index lock.
/// 4. Every `merge_watermark` writes, wake the merge thread.
///
/// # Read Path
///
/// The active generation shadows the other one, and both shadow the pages.
/// A DEL version anywhere in memory hides the key.
///
/// # Recovery
///
/// [`Db::open`] replays every epoch youngest first, then starts a new live
/// epoch with the next free id.
pub struct Db {
    pub(crate) shared: Arc<Shared>,
    merger: Option<JoinHandle<()>>,
    closed: bool,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stat = self.stat();
        f.debug_struct("Db")
            .field("dir", &self.shared.config.dir)
            .field("read_only", &self.shared.config.flags.read_only)
            .field("epoch", &stat.epoch)
            .field("psn", &stat.psn)
            .field("epochs", &stat.repo_count)
            .field("catalog_pages", &stat.catalog_page_count)
            .field("index_records", &stat.index_record_count)
            .field("merge_thread", &self.merger.is_some())
            .finish()
    }
}

impl Db {
    /// Opens the database in `config.dir`, recovering whatever a previous
    /// run left behind.
    ///
    /// # Steps
    ///
    /// 1. Validate the configuration.
    /// 2. Create the directory when missing and allowed to.
    /// 3. Classify and replay every epoch, youngest first.
    /// 4. Unless read-only, create `<max + 1>.log.incomplete` as the live
    ///    log and start the merge thread.
    ///
    /// # Errors
    ///
    /// Corruption anywhere aborts the open; nothing is left half-recovered.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let read_only = config.flags.read_only;

        if !config.dir.is_dir() {
            if config.flags.create && !read_only {
                fs::create_dir_all(&config.dir)?;
                info!(dir = %config.dir.display(), "created database directory");
            } else {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("database directory {} does not exist", config.dir.display()),
                )));
            }
        }

        let recovery::Recovered {
            mut repo,
            index,
            catalog,
            psn,
            next_page_id,
        } = recovery::recover(&config)?;

        let live = if read_only {
            LiveLog {
                writer: None,
                epoch: repo.max_id(),
                updates: 0,
            }
        } else {
            let id = repo
                .max_id()
                .checked_add(1)
                .ok_or_else(|| Error::Misuse("epoch ids exhausted".into()))?;
            let writer = LogWriter::create(repo.path(id, FileKind::LogIncomplete), config.log_sync)?;
            repo.insert(Epoch::new(id, EpochKind::Live));
            LiveLog {
                writer: Some(writer),
                epoch: id,
                updates: 0,
            }
        };

        info!(
            dir = %config.dir.display(),
            epoch = live.epoch,
            psn,
            epochs = repo.len(),
            pages = catalog.len(),
            records = index.len(),
            read_only,
            "database opened"
        );

        let start_merger = config.merge && !read_only;
        let shared = Arc::new(Shared {
            config,
            repo: RwLock::new(repo),
            log: Mutex::new(live),
            index: Mutex::new(index),
            catalog: RwLock::new(catalog),
            merging: Mutex::new(()),
            signal: Mutex::new(Signal::default()),
            wakeup: Condvar::new(),
            psn: AtomicU32::new(psn),
            next_page_id: AtomicU32::new(next_page_id),
        });

        let mut db = Db {
            shared,
            merger: None,
            closed: false,
        };
        if start_merger {
            let shared = Arc::clone(&db.shared);
            let handle = thread::Builder::new()
                .name("sediment-merge".into())
                .spawn(move || merge::run(shared))?;
            db.merger = Some(handle);
        }
        Ok(db)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn is_read_only(&self) -> bool {
        self.shared.config.flags.read_only
    }

    /// Current counters. Takes the same locks as a writer, briefly.
    pub fn stat(&self) -> Stat {
        let shared = &*self.shared;
        let repo = shared.repo.read_recursive();
        let records = shared.index.lock().len();
        let catalog_page_count = shared.catalog.read_recursive().len();
        let page_size = shared.config.page_size;
        Stat {
            epoch: repo.max_id(),
            psn: shared.psn.load(Ordering::Acquire),
            repo_count: repo.len(),
            db_epoch_count: repo.count_of(EpochKind::Db),
            xfer_epoch_count: repo.count_of(EpochKind::Xfer),
            catalog_page_count,
            index_record_count: records,
            index_page_count: (records + page_size - 1) / page_size,
        }
    }

    /// Stops the merge thread and retires the live log: an empty one is
    /// deleted, otherwise it is sealed as `<epoch>.log`.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(handle) = self.merger.take() {
            self.shared.signal.lock().stop = true;
            self.shared.wakeup.notify_all();
            if handle.join().is_err() {
                error!("merge thread panicked");
            }
        }

        let mut repo = self.shared.repo.write();
        let mut log = self.shared.log.lock();
        let epoch = log.epoch;
        if let Some(writer) = log.writer.take() {
            write::retire_log(&mut repo, writer, epoch)?;
        }
        info!(dir = %self.shared.config.dir.display(), "database closed");
        Ok(())
    }
}

/// Best-effort close on drop.
///
/// Errors are logged because Drop cannot return them. Whatever the live log
/// holds is recovered as an incomplete log on the next open.
impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests;
