//! Merge rounds: draining sealed epochs from memory into db files.
//!
//! ```text
//!  rotate   (repo W, log, index)   seal N.log.incomplete → N.log  [XFER]
//!                                  create N+1.log.incomplete      [LIVE]
//!                                  swap active/shadow generations
//!
//!  for each XFER epoch e, oldest first:
//!   plan    (repo R, catalog R)    route shadow versions of e to pages,
//!                                  rewrite touched pages, GC-copy sparse
//!                                  db files
//!   write   (no lock)              e.db.incomplete → fsync → e.db
//!   install (repo W, index, cat.)  catalog ← pages of e.db
//!                                  shadow -= versions of e, delete e.log
//!
//!  gc       (repo W, catalog R)    delete db files without live pages,
//!                                  oldest first
//! ```
//!
//! Writers only ever wait for the rotate step.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use codec::{Comparator, Version};
use page::{split_pages, DbWriter, Growth, PageCatalog, PageEntry, PageFile, MAX_PAGE_BODY};
use tracing::{debug, error, info, warn};
use wal::LogWriter;

use crate::error::{Error, Result};
use crate::recovery::remove_file;
use crate::repository::{Epoch, EpochKind, FileKind, RecoverFlags, Repository};
use crate::write::retire_log;
use crate::{Db, Shared};

impl Db {
    /// Runs one merge round now, whatever the watermark says.
    ///
    /// Blocks until every open [`Cursor`](crate::Cursor) is dropped.
    pub fn merge_force(&self) -> Result<()> {
        if self.shared.config.flags.read_only {
            return Err(Error::Misuse("database is opened read-only".into()));
        }
        self.shared.merge().map(|_| ())
    }
}

/// Body of the merge thread.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!("merge thread started");
    loop {
        {
            let mut signal = shared.signal.lock();
            if !signal.stop && !signal.wake {
                shared
                    .wakeup
                    .wait_for(&mut signal, shared.config.merge_interval);
            }
            if signal.stop {
                break;
            }
            signal.wake = false;
        }
        while shared.needs_merge() && !shared.signal.lock().stop {
            match shared.merge() {
                Ok(true) => {}
                Ok(false) => {
                    warn!("merge round made no progress, waiting for the next wakeup");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "background merge failed");
                    break;
                }
            }
        }
    }
    debug!("merge thread stopped");
}

/// Result of merging one epoch's versions into a page.
struct Rewrite {
    versions: Vec<Version>,
    changed: bool,
}

/// Applies `updates` to the records of a page, both sorted by `cmp`.
/// Newer versions win and DEL versions remove their key.
fn apply_updates(base: Vec<Version>, updates: Vec<Version>, cmp: &Comparator) -> Rewrite {
    let mut out = Vec::with_capacity(base.len() + updates.len());
    let mut changed = false;
    let mut base = base.into_iter().peekable();
    for u in updates {
        while let Some(b) = base.next_if(|b| cmp.compare(&b.key, &u.key) == Ordering::Less) {
            out.push(b);
        }
        let existed = base
            .next_if(|b| cmp.compare(&b.key, &u.key) == Ordering::Equal)
            .is_some();
        if u.is_deleted() {
            changed |= existed;
        } else {
            changed = true;
            out.push(u);
        }
    }
    out.extend(base);
    Rewrite {
        versions: out,
        changed,
    }
}

impl Shared {
    pub(crate) fn wake_merger(&self) {
        self.signal.lock().wake = true;
        self.wakeup.notify_one();
    }

    fn needs_merge(&self) -> bool {
        let index = self.index.lock();
        index.active().len() >= self.config.merge_watermark || !index.shadow().is_empty()
    }

    fn alloc_page_id(&self) -> u32 {
        self.next_page_id.fetch_add(1, AtomicOrdering::AcqRel)
    }

    fn growth(&self) -> Growth {
        Growth {
            initial: self.config.grow,
            factor: self.config.grow_factor,
        }
    }

    /// One full round. Rounds never overlap.
    ///
    /// Returns `false` when the round neither rotated nor merged an epoch.
    pub(crate) fn merge(&self) -> Result<bool> {
        let _round = self.merging.lock();
        let rotated = self.rotate()?;
        let xfer = self.repo.read_recursive().ids_of(EpochKind::Xfer);
        let merged = !xfer.is_empty();
        for id in xfer {
            self.merge_epoch(id)?;
        }
        if self.config.gc {
            self.collect_garbage()?;
        }
        Ok(rotated || merged)
    }

    /// Seals the live log, opens the next live epoch and swaps generations.
    ///
    /// Skipped while the shadow generation still holds versions of an
    /// earlier round that failed part way. Returns whether it rotated.
    fn rotate(&self) -> Result<bool> {
        let mut repo = self.repo.write();
        let mut log = self.log.lock();
        let mut index = self.index.lock();
        if !index.shadow().is_empty() {
            debug!("shadow generation not drained, rotation skipped");
            return Ok(false);
        }

        let old = log.epoch;
        let next = repo
            .max_id()
            .checked_add(1)
            .ok_or_else(|| Error::Misuse("epoch ids exhausted".into()))?;
        if let Some(writer) = log.writer.take() {
            retire_log(&mut repo, writer, old)?;
        }
        debug_assert_eq!(repo.live(), None, "two live epochs");
        let writer = LogWriter::create(repo.path(next, FileKind::LogIncomplete), self.config.log_sync)?;
        repo.insert(Epoch::new(next, EpochKind::Live));
        log.writer = Some(writer);
        log.epoch = next;
        log.updates = 0;
        index.swap();
        info!(sealed = old, live = next, "epoch rotated");
        Ok(true)
    }

    /// Merges the shadow versions of XFER epoch `id` into `<id>.db`, then
    /// installs the result and drops `<id>.log`.
    fn merge_epoch(&self, id: u32) -> Result<()> {
        let versions = self.index.lock().shadow().versions_of_epoch(id);
        let planned = {
            let repo = self.repo.read_recursive();
            let catalog = self.catalog.read_recursive();
            self.plan(&repo, &catalog, id, versions)?
        };

        let file = match planned {
            Some(writer) => {
                let pages = writer.page_count();
                let path = self.repo.read_recursive().path(id, FileKind::Db);
                writer.finish(&path)?;
                debug!(epoch = id, pages, "db file written");
                Some(Arc::new(PageFile::open(&path, id)?))
            }
            None => None,
        };
        self.install(id, file)
    }

    /// Builds the db file for epoch `id` in memory. `None` when the versions
    /// change no page.
    fn plan(
        &self,
        repo: &Repository,
        catalog: &PageCatalog,
        id: u32,
        versions: Vec<Version>,
    ) -> Result<Option<DbWriter>> {
        let page_size = self.config.page_size;
        let mut out = DbWriter::create(repo.path(id, FileKind::DbIncomplete), self.growth());
        let mut rewritten = HashSet::new();

        if catalog.is_empty() {
            let sets: Vec<Version> = versions.into_iter().filter(|v| !v.is_deleted()).collect();
            for chunk in split_pages(&sets, page_size, MAX_PAGE_BODY) {
                out.add_page(self.alloc_page_id(), chunk)?;
            }
        } else {
            // versions are sorted, so each page's share is contiguous
            let mut groups: Vec<(&PageEntry, Vec<Version>)> = Vec::new();
            for v in versions {
                let Some(entry) = catalog.route(&v.key) else {
                    continue;
                };
                match groups.last_mut() {
                    Some((e, vs)) if e.id == entry.id => vs.push(v),
                    _ => groups.push((entry, vec![v])),
                }
            }

            for (entry, updates) in groups {
                let base = entry.page()?.versions(entry.epoch())?;
                let rewrite = apply_updates(base, updates, catalog.comparator());
                if !rewrite.changed {
                    continue;
                }
                rewritten.insert(entry.id);
                if rewrite.versions.is_empty() {
                    out.add_tombstone(entry.id)?;
                    continue;
                }
                let chunks = split_pages(&rewrite.versions, page_size, MAX_PAGE_BODY);
                for (i, chunk) in chunks.into_iter().enumerate() {
                    let page_id = if i == 0 { entry.id } else { self.alloc_page_id() };
                    out.add_page(page_id, chunk)?;
                }
            }
        }

        if out.is_empty() {
            return Ok(None);
        }
        if self.config.gc {
            self.gc_copy(repo, catalog, id, &rewritten, &mut out)?;
        }
        Ok(Some(out))
    }

    /// Copies the live pages of sparse db files verbatim into `out`, so the
    /// old files can be deleted once nothing references them.
    fn gc_copy(
        &self,
        repo: &Repository,
        catalog: &PageCatalog,
        id: u32,
        rewritten: &HashSet<u32>,
        out: &mut DbWriter,
    ) -> Result<()> {
        for epoch in repo.iter() {
            if epoch.kind != EpochKind::Db || epoch.id == id || epoch.pages_written == 0 {
                continue;
            }
            let live: Vec<&PageEntry> = catalog
                .iter()
                .filter(|p| p.epoch() == epoch.id && !rewritten.contains(&p.id))
                .collect();
            if live.is_empty() {
                continue;
            }
            let ratio = live.len() as f64 / epoch.pages_written as f64;
            if ratio >= self.config.gc_factor {
                continue;
            }
            for p in &live {
                out.add_raw(p.page()?.raw_bytes())?;
            }
            debug!(
                from = epoch.id,
                into = id,
                pages = live.len(),
                ratio,
                "live pages copied out of sparse db file"
            );
        }
        Ok(())
    }

    /// Makes `<id>.db` visible and forgets what it replaces.
    fn install(&self, id: u32, file: Option<Arc<PageFile>>) -> Result<()> {
        let mut changes = Vec::new();
        let mut pages_written = 0;
        if let Some(file) = &file {
            for slot in file.scan() {
                let slot = slot?;
                if slot.header.is_tombstone() {
                    changes.push((slot.header.id, None));
                } else {
                    pages_written += 1;
                    changes.push((slot.header.id, Some(PageEntry::load(file, slot)?)));
                }
            }
        }

        let mut repo = self.repo.write();
        {
            let mut index = self.index.lock();
            let mut catalog = self.catalog.write();
            for (page_id, entry) in changes {
                catalog.remove(page_id);
                if let Some(entry) = entry {
                    catalog.insert(entry);
                }
            }
            index.shadow_mut().remove_epoch(id);
        }

        let written = file.is_some();
        match file {
            Some(file) => {
                if let Some(e) = repo.get_mut(id) {
                    e.kind = EpochKind::Db;
                    e.recover = RecoverFlags::DB;
                    e.db = Some(file);
                    e.pages_written = pages_written;
                }
            }
            None => {
                repo.remove(id);
            }
        }
        // a log whose seal failed is still named incomplete
        remove_file(&repo.path(id, FileKind::Log))?;
        remove_file(&repo.path(id, FileKind::LogIncomplete))?;
        info!(epoch = id, db = written, pages = pages_written, "epoch merged");
        Ok(())
    }

    /// Deletes db files that no longer hold a live page, oldest first,
    /// stopping at the first one that does. A younger file may carry
    /// tombstones for pages an older one still holds.
    fn collect_garbage(&self) -> Result<()> {
        let mut repo = self.repo.write();
        let catalog = self.catalog.read_recursive();
        for id in repo.ids_of(EpochKind::Db) {
            if catalog.live_pages_of(id) > 0 {
                break;
            }
            let path = repo.path(id, FileKind::Db);
            repo.remove(id);
            remove_file(&path)?;
            info!(epoch = id, "db file collected");
        }
        Ok(())
    }
}
