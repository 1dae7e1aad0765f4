//! The database directory as an ordered set of numbered epochs.
//!
//! ```text
//!  dir/
//!   1.db                  epoch 1: DB
//!   2.db  2.log           epoch 2: DB (log is redundant)
//!   3.log                 epoch 3: XFER, waiting for a merge
//!   4.log.incomplete      epoch 4: LIVE, open for append
//! ```
//!
//! Scanning only collects the files present per epoch; deciding what they
//! mean is [`classify`], a pure function over the collected flags.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use page::PageFile;

use crate::error::{Error, Result};

/// Which files were found for an epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoverFlags(u8);

impl RecoverFlags {
    pub const LOG: Self = Self(1);
    pub const LOG_INCOMPLETE: Self = Self(2);
    pub const DB: Self = Self(4);
    pub const DB_INCOMPLETE: Self = Self(8);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for RecoverFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One kind of epoch file, named `<id><suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Log,
    LogIncomplete,
    Db,
    DbIncomplete,
}

impl FileKind {
    pub fn suffix(self) -> &'static str {
        match self {
            FileKind::Log => ".log",
            FileKind::LogIncomplete => ".log.incomplete",
            FileKind::Db => ".db",
            FileKind::DbIncomplete => ".db.incomplete",
        }
    }

    pub fn flag(self) -> RecoverFlags {
        match self {
            FileKind::Log => RecoverFlags::LOG,
            FileKind::LogIncomplete => RecoverFlags::LOG_INCOMPLETE,
            FileKind::Db => RecoverFlags::DB,
            FileKind::DbIncomplete => RecoverFlags::DB_INCOMPLETE,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "log" => Some(FileKind::Log),
            "log.incomplete" => Some(FileKind::LogIncomplete),
            "db" => Some(FileKind::Db),
            "db.incomplete" => Some(FileKind::DbIncomplete),
            _ => None,
        }
    }

    /// Parses a directory entry name.
    ///
    /// Hidden names and names without a known extension are not epoch files
    /// and yield `Ok(None)`. A known extension behind anything but a decimal
    /// epoch id is an error.
    pub fn parse(name: &str) -> Result<Option<(u32, FileKind)>> {
        if name.starts_with('.') {
            return Ok(None);
        }
        let Some((prefix, ext)) = name.split_once('.') else {
            return Ok(None);
        };
        let Some(kind) = FileKind::from_extension(ext) else {
            return Ok(None);
        };
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Corruption(format!("bad epoch file name {name:?}")));
        }
        let id = prefix
            .parse::<u32>()
            .map_err(|_| Error::Corruption(format!("epoch id out of range in {name:?}")))?;
        Ok(Some((id, kind)))
    }
}

/// What recovery does with one epoch, decided from its files alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Replay the db file.
    Db,
    /// Replay the db file, then delete the redundant log.
    DbWithLog,
    /// Replay a sealed log.
    Log,
    /// A crash while merging a sealed log: drop the partial db file, replay
    /// the log.
    LogWithDbIncomplete,
    /// A crash while merging a just-rotated log: drop the partial db file,
    /// replay the log as sealed and rename it.
    LogIncompleteWithDbIncomplete,
    /// A crash while the epoch was live: replay what survived and repair.
    LogIncomplete,
    /// Anything else.
    Corrupt,
}

pub fn classify(flags: RecoverFlags) -> Recovery {
    use RecoverFlags as F;
    if flags == F::DB {
        Recovery::Db
    } else if flags == F::DB | F::LOG {
        Recovery::DbWithLog
    } else if flags == F::LOG {
        Recovery::Log
    } else if flags == F::LOG | F::DB_INCOMPLETE {
        Recovery::LogWithDbIncomplete
    } else if flags == F::LOG_INCOMPLETE | F::DB_INCOMPLETE {
        Recovery::LogIncompleteWithDbIncomplete
    } else if flags == F::LOG_INCOMPLETE {
        Recovery::LogIncomplete
    } else {
        Recovery::Corrupt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochKind {
    /// Found on disk, not yet recovered.
    Undef,
    /// Receives writes.
    Live,
    /// Sealed log waiting to be merged into pages.
    Xfer,
    /// Owns a db file.
    Db,
}

#[derive(Debug)]
pub struct Epoch {
    pub id: u32,
    pub recover: RecoverFlags,
    pub kind: EpochKind,
    pub db: Option<Arc<PageFile>>,
    /// Non-tombstone pages stored in the db file.
    pub pages_written: usize,
    /// Pages of the db file superseded by a younger epoch at recovery.
    pub gc_count: usize,
}

impl Epoch {
    pub fn new(id: u32, kind: EpochKind) -> Self {
        Self {
            id,
            recover: RecoverFlags::default(),
            kind,
            db: None,
            pages_written: 0,
            gc_count: 0,
        }
    }
}

#[derive(Debug)]
pub struct Repository {
    dir: PathBuf,
    epochs: BTreeMap<u32, Epoch>,
}

impl Repository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            epochs: BTreeMap::new(),
        }
    }

    /// Collects every epoch file in `dir`.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut repo = Self::new(dir);
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((id, kind)) = FileKind::parse(name)? {
                repo.epochs
                    .entry(id)
                    .or_insert_with(|| Epoch::new(id, EpochKind::Undef))
                    .recover
                    .insert(kind.flag());
            }
        }
        Ok(repo)
    }

    pub fn path(&self, id: u32, kind: FileKind) -> PathBuf {
        self.dir.join(format!("{id}{}", kind.suffix()))
    }

    pub fn get(&self, id: u32) -> Option<&Epoch> {
        self.epochs.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Epoch> {
        self.epochs.get_mut(&id)
    }

    pub fn insert(&mut self, epoch: Epoch) {
        self.epochs.insert(epoch.id, epoch);
    }

    pub fn remove(&mut self, id: u32) -> Option<Epoch> {
        self.epochs.remove(&id)
    }

    /// Highest epoch id, or 0 for an empty directory.
    pub fn max_id(&self) -> u32 {
        self.epochs.keys().next_back().copied().unwrap_or(0)
    }

    /// Epoch ids, youngest first.
    pub fn ids_desc(&self) -> Vec<u32> {
        self.epochs.keys().rev().copied().collect()
    }

    /// Ids of the epochs of `kind`, ascending.
    pub fn ids_of(&self, kind: EpochKind) -> Vec<u32> {
        self.epochs
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| e.id)
            .collect()
    }

    pub fn live(&self) -> Option<u32> {
        self.ids_of(EpochKind::Live).first().copied()
    }

    pub fn count_of(&self, kind: EpochKind) -> usize {
        self.epochs.values().filter(|e| e.kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Epoch> {
        self.epochs.values()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }
}
