//! Cold start: rebuilds the index generations and the page catalog from the
//! files found in the database directory.
//!
//! Epochs are processed youngest first. A page id seen in a younger db file
//! is tracked, and every older copy of it is skipped as garbage. Log
//! records replayed from an older epoch never override a version a younger
//! epoch already replayed.
//!
//! A read-only open replays exactly the same way but leaves every file as
//! it found it.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use config::Config;
use index::{Generations, Replay};
use page::{PageCatalog, PageEntry, PageFile};
use tracing::{debug, info, warn};
use wal::ReplayMode;

use crate::error::{Error, Result};
use crate::repository::{classify, EpochKind, FileKind, RecoverFlags, Recovery, Repository};

pub(crate) struct Recovered {
    pub(crate) repo: Repository,
    pub(crate) index: Generations,
    pub(crate) catalog: PageCatalog,
    pub(crate) psn: u32,
    pub(crate) next_page_id: u32,
}

struct Recoverer {
    read_only: bool,
    track: HashSet<u32>,
    index: Generations,
    catalog: PageCatalog,
    psn: u32,
    next_page_id: u32,
}

pub(crate) fn recover(config: &Config) -> Result<Recovered> {
    let mut repo = Repository::scan(&config.dir)?;
    let mut r = Recoverer {
        read_only: config.flags.read_only,
        track: HashSet::new(),
        index: Generations::new(config.comparator.clone()),
        catalog: PageCatalog::new(config.comparator.clone()),
        psn: 0,
        next_page_id: 1,
    };

    for id in repo.ids_desc() {
        let flags = repo.get(id).map(|e| e.recover).unwrap_or_default();
        let action = classify(flags);
        debug!(epoch = id, ?flags, ?action, "recovering epoch");
        match action {
            Recovery::Db => r.replay_db(&mut repo, id)?,
            Recovery::DbWithLog => {
                r.replay_db(&mut repo, id)?;
                r.remove(&mut repo, id, FileKind::Log)?;
            }
            Recovery::Log => r.replay_log(&mut repo, id, FileKind::Log, ReplayMode::Complete)?,
            Recovery::LogWithDbIncomplete => {
                r.remove(&mut repo, id, FileKind::DbIncomplete)?;
                r.replay_log(&mut repo, id, FileKind::Log, ReplayMode::Complete)?;
            }
            Recovery::LogIncompleteWithDbIncomplete => {
                r.remove(&mut repo, id, FileKind::DbIncomplete)?;
                r.replay_log(&mut repo, id, FileKind::LogIncomplete, ReplayMode::Complete)?;
                if !r.read_only {
                    let from = repo.path(id, FileKind::LogIncomplete);
                    let to = repo.path(id, FileKind::Log);
                    fs::rename(&from, &to)?;
                    wal::sync_parent_dir(&to)?;
                    set_flags(&mut repo, id, RecoverFlags::LOG);
                }
            }
            Recovery::LogIncomplete => {
                r.replay_log(&mut repo, id, FileKind::LogIncomplete, ReplayMode::Incomplete)?
            }
            Recovery::Corrupt => {
                warn!(epoch = id, ?flags, "unexpected combination of epoch files");
                return Err(Error::RepositoryCorrupted { epoch: id });
            }
        }
    }

    info!(
        epochs = repo.len(),
        pages = r.catalog.len(),
        records = r.index.len(),
        psn = r.psn,
        "recovery complete"
    );
    Ok(Recovered {
        repo,
        index: r.index,
        catalog: r.catalog,
        psn: r.psn,
        next_page_id: r.next_page_id,
    })
}

fn set_flags(repo: &mut Repository, id: u32, flags: RecoverFlags) {
    if let Some(e) = repo.get_mut(id) {
        e.recover = flags;
    }
}

impl Recoverer {
    /// Walks every page header of `<id>.db`, verifying each one.
    fn replay_db(&mut self, repo: &mut Repository, id: u32) -> Result<()> {
        let path = repo.path(id, FileKind::Db);
        let file = Arc::new(PageFile::open(&path, id)?);

        let mut written = 0;
        let mut garbage = 0;
        let mut live = 0;
        for slot in file.scan() {
            let slot = slot?;
            let page_id = slot.header.id;
            if page_id == 0 {
                return Err(Error::Corruption(format!(
                    "{}: page id 0 at offset {}",
                    path.display(),
                    slot.offset
                )));
            }
            self.next_page_id = self.next_page_id.max(page_id.saturating_add(1));
            let tombstone = slot.header.is_tombstone();
            if !tombstone {
                written += 1;
            }
            if !self.track.insert(page_id) {
                garbage += 1;
                continue;
            }
            if tombstone {
                continue;
            }

            let entry = PageEntry::load(&file, slot)?;
            if self.catalog.find(page_id).is_some() {
                return Err(Error::Corruption(format!(
                    "{}: page {page_id} already in the catalog",
                    path.display()
                )));
            }
            if let Some(other) = self.catalog.route(&entry.min.key) {
                if other.min.key == entry.min.key {
                    return Err(Error::Corruption(format!(
                        "{}: page {page_id} starts at the same key as page {}",
                        path.display(),
                        other.id
                    )));
                }
            }
            self.catalog.insert(entry);
            self.psn = self.psn.max(id);
            live += 1;
        }

        debug!(epoch = id, pages = written, live, garbage, "db file replayed");
        if let Some(e) = repo.get_mut(id) {
            e.kind = EpochKind::Db;
            e.db = Some(file);
            e.pages_written = written;
            e.gc_count = garbage;
        }
        Ok(())
    }

    /// Replays `<id><kind>` into the active generation. An incomplete log is
    /// repaired and sealed afterwards.
    fn replay_log(
        &mut self,
        repo: &mut Repository,
        id: u32,
        kind: FileKind,
        mode: ReplayMode,
    ) -> Result<()> {
        let path = repo.path(id, kind);
        let mut accepted = 0u64;
        let active = self.index.active_mut();
        let replayed = wal::replay(&path, mode, |v| match active.replay(v.with_epoch(id)) {
            Replay::Inserted | Replay::Replaced => accepted += 1,
            Replay::Discarded => {}
        })?;
        if accepted > 0 {
            self.psn = self.psn.max(id);
        }
        debug!(
            epoch = id,
            records = replayed.records,
            accepted,
            has_eof = replayed.has_eof,
            torn_tail = replayed.torn_tail,
            "log replayed"
        );

        if mode == ReplayMode::Incomplete && !self.read_only {
            let sealed = repo.path(id, FileKind::Log);
            wal::repair(&path, &replayed, &sealed)?;
            info!(epoch = id, torn_tail = replayed.torn_tail, "incomplete log repaired");
            set_flags(repo, id, RecoverFlags::LOG);
        }
        if let Some(e) = repo.get_mut(id) {
            e.kind = EpochKind::Xfer;
        }
        Ok(())
    }

    /// Deletes `<id><kind>` unless the open is read-only.
    fn remove(&mut self, repo: &mut Repository, id: u32, kind: FileKind) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let path = repo.path(id, kind);
        remove_file(&path)?;
        info!(epoch = id, file = %path.display(), "removed stale file");
        if let Some(e) = repo.get_mut(id) {
            e.recover.remove(kind.flag());
        }
        Ok(())
    }
}

/// Removes `path`, treating an already missing file as removed.
pub(crate) fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    wal::sync_parent_dir(path)?;
    Ok(())
}
