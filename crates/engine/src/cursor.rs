//! Ordered iteration over the whole database.
//!
//! ```text
//!   active generation  ──┐
//!   shadow generation  ──┼──► pick min/max ──► skip DEL ──► (key, value)
//!   page records       ──┘      ties: active > shadow > page
//! ```
//!
//! The index sources are re-sought strictly past the last key handed out,
//! so writes landing in the active generation while the cursor is open are
//! picked up if they sort after the cursor position. The page source is a
//! plain position that walks page to page in catalog order.

use std::cmp::Ordering;
use std::sync::Arc;

use codec::{Order, Version};
use page::{PageCatalog, PageEntry, PageFile};
use parking_lot::RwLockReadGuard;

use crate::error::Result;
use crate::repository::Repository;
use crate::{Db, Shared};

/// Position inside a page of the catalog.
#[derive(Debug, Clone)]
struct PagePos {
    file: Arc<PageFile>,
    offset: usize,
    /// Catalog key of the page, to find its neighbours.
    min: Vec<u8>,
    idx: usize,
}

impl PagePos {
    fn at(entry: &PageEntry, idx: usize) -> Self {
        Self {
            file: Arc::clone(&entry.file),
            offset: entry.offset,
            min: entry.min.key.clone(),
            idx,
        }
    }

    fn last_of(entry: &PageEntry) -> Self {
        Self::at(entry, (entry.count as usize).saturating_sub(1))
    }
}

/// One source's current record.
#[derive(Debug)]
struct Candidate {
    key: Vec<u8>,
    value: Vec<u8>,
    deleted: bool,
}

impl From<&Version> for Candidate {
    fn from(v: &Version) -> Self {
        Self {
            key: v.key.clone(),
            value: v.value.clone(),
            deleted: v.is_deleted(),
        }
    }
}

/// Iterator over live `(key, value)` pairs in cursor order.
///
/// Holds a read guard on the repository until dropped: merge rounds wait
/// for every open cursor before rotating the live epoch, so do not call
/// [`Db::merge_force`] from a thread that keeps a cursor open.
pub struct Cursor<'a> {
    shared: &'a Shared,
    _repo: RwLockReadGuard<'a, Repository>,
    order: Order,
    /// Seek key for the first step.
    start: Option<Vec<u8>>,
    /// Key of the last record produced, deleted or not.
    last: Option<Vec<u8>>,
    page: Option<PagePos>,
    done: bool,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("order", &self.order)
            .field("start", &self.start)
            .field("last", &self.last)
            .field("done", &self.done)
            .finish()
    }
}

impl Db {
    /// Opens a cursor. Without a key, `Gte`/`Gt` start at the first key and
    /// `Lte`/`Lt` at the last one.
    pub fn cursor(&self, order: Order, key: Option<&[u8]>) -> Result<Cursor<'_>> {
        let shared = &*self.shared;
        let repo = shared.repo.read_recursive();
        let page = {
            let catalog = shared.catalog.read_recursive();
            seek_page(&catalog, key, order)?
        };
        Ok(Cursor {
            shared,
            _repo: repo,
            order,
            start: key.map(<[u8]>::to_vec),
            last: None,
            page,
            done: false,
        })
    }
}

/// First page position satisfying `order` relative to `key`.
fn seek_page(catalog: &PageCatalog, key: Option<&[u8]>, order: Order) -> Result<Option<PagePos>> {
    let entry = match key {
        Some(k) => catalog.route(k),
        None if order.is_forward() => catalog.first(),
        None => catalog.last(),
    };
    let Some(entry) = entry else {
        return Ok(None);
    };
    if let Some(i) = entry.page()?.seek(key, order, catalog.comparator())? {
        return Ok(Some(PagePos::at(entry, i)));
    }
    // the answer lies in the neighbouring page
    Ok(if order.is_forward() {
        catalog.next_after(&entry.min.key).map(|e| PagePos::at(e, 0))
    } else {
        catalog.prev_before(&entry.min.key).map(PagePos::last_of)
    })
}

impl Cursor<'_> {
    pub fn order(&self) -> Order {
        self.order
    }

    fn page_candidate(&self) -> Result<Option<Candidate>> {
        let Some(pos) = &self.page else {
            return Ok(None);
        };
        let page = pos.file.page(pos.offset)?;
        let rec = page.verified_record(pos.idx)?;
        Ok(Some(Candidate {
            key: rec.key.to_vec(),
            value: rec.value.to_vec(),
            deleted: rec.is_deleted(),
        }))
    }

    fn advance_page(&mut self) -> Result<()> {
        let Some(pos) = self.page.as_mut() else {
            return Ok(());
        };
        let len = pos.file.page(pos.offset)?.len();
        if self.order.is_forward() {
            if pos.idx + 1 < len {
                pos.idx += 1;
                return Ok(());
            }
        } else if pos.idx > 0 {
            pos.idx -= 1;
            return Ok(());
        }

        let min = std::mem::take(&mut pos.min);
        let catalog = self.shared.catalog.read_recursive();
        self.page = if self.order.is_forward() {
            catalog.next_after(&min).map(|e| PagePos::at(e, 0))
        } else {
            catalog.prev_before(&min).map(PagePos::last_of)
        };
        Ok(())
    }

    /// `a` comes before `b` in cursor order.
    fn precedes(&self, a: &[u8], b: &[u8]) -> bool {
        let ord = self.shared.comparator().compare(a, b);
        if self.order.is_forward() {
            ord == Ordering::Less
        } else {
            ord == Ordering::Greater
        }
    }

    /// Produces the next record of the merged view, DEL versions included.
    fn advance(&mut self) -> Result<Option<Candidate>> {
        let (key, order) = match &self.last {
            Some(k) => (Some(k.as_slice()), self.order.strict()),
            None => (self.start.as_deref(), self.order),
        };
        let (active, shadow) = {
            let index = self.shared.index.lock();
            (
                index.active().seek(key, order).map(Candidate::from),
                index.shadow().seek(key, order).map(Candidate::from),
            )
        };

        let mut winner = active;
        if let Some(s) = shadow {
            if winner.as_ref().map_or(true, |w| self.precedes(&s.key, &w.key)) {
                winner = Some(s);
            }
        }

        if let Some(p) = self.page_candidate()? {
            let from_page = match &winner {
                None => true,
                Some(w) => self.precedes(&p.key, &w.key),
            };
            // a page record shadowed by memory is consumed with it
            let duplicate = !from_page
                && winner.as_ref().is_some_and(|w| {
                    self.shared.comparator().compare(&p.key, &w.key) == Ordering::Equal
                });
            if from_page || duplicate {
                self.advance_page()?;
            }
            if from_page {
                winner = Some(p);
            }
        }

        if let Some(w) = &winner {
            self.last = Some(w.key.clone());
        }
        Ok(winner)
    }

    fn step(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        while let Some(c) = self.advance()? {
            if !c.deleted {
                return Ok(Some((c.key, c.value)));
            }
        }
        Ok(None)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(kv)) => Some(Ok(kv)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
