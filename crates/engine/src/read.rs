//! Point lookups.
//!
//! The active index generation is checked first, then the shadow one, and
//! only a key absent from both is routed to its page. A DEL version in
//! memory hides whatever the pages hold.

use crate::error::Result;
use crate::Db;

impl Db {
    /// Returns a copy of the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`](crate::Error::Corruption) if the page
    /// record found for `key` fails its CRC check.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let shared = &*self.shared;
        let _repo = shared.repo.read_recursive();

        if let Some(v) = shared.index.lock().get(key) {
            return Ok((!v.is_deleted()).then(|| v.value.clone()));
        }

        let catalog = shared.catalog.read_recursive();
        let Some(entry) = catalog.route(key) else {
            return Ok(None);
        };
        let page = entry.page()?;
        match page.search(key, catalog.comparator())? {
            Ok(i) => {
                let rec = page.verified_record(i)?;
                Ok((!rec.is_deleted()).then(|| rec.value.to_vec()))
            }
            Err(_) => Ok(None),
        }
    }

    /// Whether `key` currently holds a value.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}
