//! # Index - in-memory sorted versions
//!
//! [`Index`] maps each key to its latest [`Version`] in comparator order.
//! Deletes are kept as DEL versions so they can shadow older data on disk.
//!
//! [`Generations`] holds two indexes. Writers always insert into the
//! *active* one; a merge round swaps the roles and drains the *shadow* one
//! into page files while writes continue.
//!
//! ```text
//!   write ──▶ active ──┐ swap (merge start)
//!            shadow ◀──┘ ──▶ pages ──▶ emptied (merge end)
//! ```

use std::collections::BTreeMap;
use std::ops::Bound;

use codec::{Comparator, Order, OrderedKey, Version};

/// What [`Index::replay`] did with a recovered version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// The key was new.
    Inserted,
    /// The key held a version from the same epoch, which was replaced.
    Replaced,
    /// The key held a version from another epoch, which was kept.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct Index {
    map: BTreeMap<OrderedKey, Version>,
    cmp: Comparator,
    approx_size: usize,
}

impl Index {
    pub fn new(cmp: Comparator) -> Self {
        Self {
            map: BTreeMap::new(),
            cmp,
            approx_size: 0,
        }
    }

    fn key(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.cmp.clone())
    }

    /// Inserts `v`, replacing whatever the key held. Returns the superseded
    /// version.
    pub fn set(&mut self, v: Version) -> Option<Version> {
        self.approx_size += v.key.len() + v.value.len();
        let k = self.key(&v.key);
        let old = self.map.insert(k, v);
        if let Some(ref o) = old {
            self.approx_size = self
                .approx_size
                .saturating_sub(o.key.len() + o.value.len());
        }
        old
    }

    /// Upserts a version read back from a log during recovery.
    ///
    /// Logs are replayed youngest epoch first, and records of one log in
    /// append order. A later record of the same epoch therefore replaces the
    /// held version, while a record of any other (older) epoch never does.
    pub fn replay(&mut self, v: Version) -> Replay {
        match self.get(&v.key).map(|held| held.epoch) {
            None => {
                self.set(v);
                Replay::Inserted
            }
            Some(epoch) if epoch == v.epoch => {
                self.set(v);
                Replay::Replaced
            }
            Some(_) => Replay::Discarded,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Version> {
        self.map.get(&self.key(key))
    }

    /// First version satisfying `order` relative to `key`. Without a key,
    /// forward orders start at the smallest key and backward orders at the
    /// largest.
    pub fn seek(&self, key: Option<&[u8]>, order: Order) -> Option<&Version> {
        let Some(key) = key else {
            return if order.is_forward() {
                self.map.values().next()
            } else {
                self.map.values().next_back()
            };
        };
        let k = self.key(key);
        let (lo, hi) = match order {
            Order::Gte => (Bound::Included(k), Bound::Unbounded),
            Order::Gt => (Bound::Excluded(k), Bound::Unbounded),
            Order::Lte => (Bound::Unbounded, Bound::Included(k)),
            Order::Lt => (Bound::Unbounded, Bound::Excluded(k)),
        };
        let mut range = self.map.range((lo, hi));
        if order.is_forward() {
            range.next().map(|(_, v)| v)
        } else {
            range.next_back().map(|(_, v)| v)
        }
    }

    /// Versions in ascending key order, DEL versions included.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.map.values()
    }

    /// Copies of the versions stamped with `epoch`, ascending.
    pub fn versions_of_epoch(&self, epoch: u32) -> Vec<Version> {
        self.map
            .values()
            .filter(|v| v.epoch == epoch)
            .cloned()
            .collect()
    }

    /// Drops every version stamped with `epoch`. Returns how many were
    /// removed.
    pub fn remove_epoch(&mut self, epoch: u32) -> usize {
        let before = self.map.len();
        let mut freed = 0;
        self.map.retain(|_, v| {
            let keep = v.epoch != epoch;
            if !keep {
                freed += v.key.len() + v.value.len();
            }
            keep
        });
        self.approx_size = self.approx_size.saturating_sub(freed);
        before - self.map.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Key plus value bytes currently held.
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }

    pub fn comparator(&self) -> &Comparator {
        &self.cmp
    }
}

/// Slot selector for [`Generations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    A,
    B,
}

impl Generation {
    fn slot(self) -> usize {
        match self {
            Generation::A => 0,
            Generation::B => 1,
        }
    }

    fn other(self) -> Generation {
        match self {
            Generation::A => Generation::B,
            Generation::B => Generation::A,
        }
    }
}

/// The two index generations and which of them is active.
#[derive(Debug, Clone)]
pub struct Generations {
    slots: [Index; 2],
    active: Generation,
}

impl Generations {
    pub fn new(cmp: Comparator) -> Self {
        Self {
            slots: [Index::new(cmp.clone()), Index::new(cmp)],
            active: Generation::A,
        }
    }

    pub fn active_generation(&self) -> Generation {
        self.active
    }

    pub fn active(&self) -> &Index {
        &self.slots[self.active.slot()]
    }

    pub fn active_mut(&mut self) -> &mut Index {
        &mut self.slots[self.active.slot()]
    }

    pub fn shadow(&self) -> &Index {
        &self.slots[self.active.other().slot()]
    }

    pub fn shadow_mut(&mut self) -> &mut Index {
        &mut self.slots[self.active.other().slot()]
    }

    /// Makes the shadow generation active. The shadow must have been drained.
    pub fn swap(&mut self) {
        debug_assert!(self.shadow().is_empty(), "swapping onto a non-empty generation");
        self.active = self.active.other();
    }

    /// Latest version of `key`: the active generation shadows the other one.
    pub fn get(&self, key: &[u8]) -> Option<&Version> {
        self.active().get(key).or_else(|| self.shadow().get(key))
    }

    /// Records held by both generations.
    pub fn len(&self) -> usize {
        self.slots[0].len() + self.slots[1].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests;
