use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use codec::{Comparator, OrderedKey, Version};

use crate::{Page, PageError, PageFile, PageSlot};

/// A live page: where it is stored and the key range it covers.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub id: u32,
    /// File offset of the page header.
    pub offset: usize,
    pub count: u32,
    pub file: Arc<PageFile>,
    /// First record, CRC verified.
    pub min: Version,
    /// Last record, CRC verified.
    pub max: Version,
}

impl PageEntry {
    /// Builds the entry for a non-tombstone page found by a scan of `file`,
    /// verifying its first and last records.
    pub fn load(file: &Arc<PageFile>, slot: PageSlot) -> Result<Self, PageError> {
        let page = file.page(slot.offset)?;
        let (min, max) = page.bounds(file.epoch())?;
        Ok(Self {
            id: slot.header.id,
            offset: slot.offset,
            count: slot.header.record_count,
            file: Arc::clone(file),
            min,
            max,
        })
    }

    /// Epoch that owns the db file holding this page.
    pub fn epoch(&self) -> u32 {
        self.file.epoch()
    }

    pub fn page(&self) -> Result<Page<'_>, PageError> {
        self.file.page(self.offset)
    }
}

/// Live pages ordered by their minimum key, with a secondary lookup by id.
///
/// Pages never overlap: page `p` holds keys from `p.min` up to (excluding)
/// the next page's minimum.
#[derive(Debug, Clone)]
pub struct PageCatalog {
    by_min: BTreeMap<OrderedKey, PageEntry>,
    ids: HashMap<u32, OrderedKey>,
    cmp: Comparator,
}

impl PageCatalog {
    pub fn new(cmp: Comparator) -> Self {
        Self {
            by_min: BTreeMap::new(),
            ids: HashMap::new(),
            cmp,
        }
    }

    fn key(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.cmp.clone())
    }

    pub fn find(&self, id: u32) -> Option<&PageEntry> {
        self.ids.get(&id).and_then(|k| self.by_min.get(k))
    }

    /// Inserts `entry`, replacing the entry with the same id. Returns the
    /// replaced entry.
    pub fn insert(&mut self, entry: PageEntry) -> Option<PageEntry> {
        let replaced = self.remove(entry.id);
        let k = self.key(&entry.min.key);
        self.ids.insert(entry.id, k.clone());
        if let Some(displaced) = self.by_min.insert(k, entry) {
            // same minimum key under another id: the newer page wins
            self.ids.remove(&displaced.id);
        }
        replaced
    }

    pub fn remove(&mut self, id: u32) -> Option<PageEntry> {
        let k = self.ids.remove(&id)?;
        self.by_min.remove(&k)
    }

    /// The page that may hold `key`: the one with the greatest minimum not
    /// above `key`, or the first page for keys below every minimum.
    pub fn route(&self, key: &[u8]) -> Option<&PageEntry> {
        self.by_min
            .range((Bound::Unbounded, Bound::Included(self.key(key))))
            .next_back()
            .map(|(_, e)| e)
            .or_else(|| self.first())
    }

    pub fn first(&self) -> Option<&PageEntry> {
        self.by_min.values().next()
    }

    pub fn last(&self) -> Option<&PageEntry> {
        self.by_min.values().next_back()
    }

    /// The page following the one whose minimum is `min`.
    pub fn next_after(&self, min: &[u8]) -> Option<&PageEntry> {
        self.by_min
            .range((Bound::Excluded(self.key(min)), Bound::Unbounded))
            .next()
            .map(|(_, e)| e)
    }

    /// The page preceding the one whose minimum is `min`.
    pub fn prev_before(&self, min: &[u8]) -> Option<&PageEntry> {
        self.by_min
            .range((Bound::Unbounded, Bound::Excluded(self.key(min))))
            .next_back()
            .map(|(_, e)| e)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PageEntry> {
        self.by_min.values()
    }

    pub fn len(&self) -> usize {
        self.by_min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_min.is_empty()
    }

    /// Live pages stored in the db file of `epoch`.
    pub fn live_pages_of(&self, epoch: u32) -> usize {
        self.by_min.values().filter(|e| e.epoch() == epoch).count()
    }

    pub fn comparator(&self) -> &Comparator {
        &self.cmp
    }
}
