use std::fs;
use std::path::Path;

use codec::Comparator;
use config::{Config, ConfigBuilder};

use crate::{Cursor, Db, Result};

/// Orders 4-byte keys as little-endian `u32`, anything else bytewise.
pub fn u32_cmp() -> Comparator {
    fn as_u32(b: &[u8]) -> Option<u32> {
        b.try_into().ok().map(u32::from_le_bytes)
    }
    Comparator::new(|a, b| match (as_u32(a), as_u32(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    })
}

pub fn k(i: u32) -> [u8; 4] {
    i.to_le_bytes()
}

/// Builder with the merge thread off, so tests drive merges themselves.
pub fn builder(dir: &Path) -> ConfigBuilder {
    Config::builder(dir).merge(false)
}

pub fn open(dir: &Path) -> Result<Db> {
    Db::open(builder(dir).build())
}

/// u32-keyed database with GC switched on or off.
pub fn open_u32(dir: &Path, gc: bool) -> Result<Db> {
    Db::open(builder(dir).comparator(u32_cmp()).gc(gc).build())
}

pub fn open_read_only(dir: &Path) -> Result<Db> {
    Db::open(builder(dir).read_only(true).build())
}

pub fn exists(dir: &Path, epoch: u32, ext: &str) -> bool {
    dir.join(format!("{epoch}.{ext}")).exists()
}

/// Names of the entries in `dir`, sorted.
pub fn files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

pub fn collect(cursor: Cursor<'_>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    cursor.collect()
}

pub fn collect_keys(cursor: Cursor<'_>) -> Result<Vec<Vec<u8>>> {
    cursor.map(|kv| kv.map(|(k, _)| k)).collect()
}

/// Decodes u32 keys produced by [`k`].
pub fn u32_keys(keys: &[Vec<u8>]) -> Vec<u32> {
    keys.iter()
        .map(|b| u32::from_le_bytes(b.as_slice().try_into().unwrap()))
        .collect()
}
