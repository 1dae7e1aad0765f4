mod writer_tests;

use crate::*;
use codec::{Op, Version};
use std::path::Path;
use std::sync::Arc;

pub(crate) fn set(key: &[u8], value: &[u8]) -> Version {
    Version::new(key.to_vec(), value.to_vec(), Op::Set)
}

/// Writes `dir/<epoch>.db` holding one page per entry of `pages`
/// (an empty entry becomes a tombstone) and maps it.
pub(crate) fn write_db(dir: &Path, epoch: u32, pages: &[(u32, Vec<Version>)]) -> Arc<PageFile> {
    let mut w = DbWriter::create(dir.join(format!("{epoch}.db.incomplete")), Growth::default());
    for (id, versions) in pages {
        if versions.is_empty() {
            w.add_tombstone(*id).unwrap();
        } else {
            w.add_page(*id, versions).unwrap();
        }
    }
    let path = dir.join(format!("{epoch}.db"));
    w.finish(&path).unwrap();
    Arc::new(PageFile::open(&path, epoch).unwrap())
}

pub(crate) fn keys(range: std::ops::Range<u32>) -> Vec<Version> {
    range
        .map(|i| set(format!("key{i:04}").as_bytes(), format!("value{i}").as_bytes()))
        .collect()
}
