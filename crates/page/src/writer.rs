use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use codec::Version;

use crate::format::{encode_page, encode_tombstone, stride_for};
use crate::PageError;

/// Buffer growth policy for new db files.
///
/// The first reservation is `initial` bytes; afterwards the buffer grows by
/// `factor` (or to the requested size, whichever is larger).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub initial: usize,
    pub factor: f64,
}

impl Default for Growth {
    fn default() -> Self {
        Self {
            initial: 128 * 1024,
            factor: 2.0,
        }
    }
}

/// Builds one db file.
///
/// Pages are encoded into memory; [`finish`](DbWriter::finish) writes them
/// to the `.incomplete` path, fsyncs, and renames the file to its final
/// name. If the process crashes before the rename, only the `.incomplete`
/// file is left behind and recovery discards it.
#[derive(Debug)]
pub struct DbWriter {
    incomplete: PathBuf,
    growth: Growth,
    buf: Vec<u8>,
    pages: u32,
}

impl DbWriter {
    pub fn create<P: AsRef<Path>>(incomplete: P, growth: Growth) -> Self {
        Self {
            incomplete: incomplete.as_ref().to_path_buf(),
            growth,
            buf: Vec::new(),
            pages: 0,
        }
    }

    /// Appends a page of sorted versions.
    pub fn add_page(&mut self, id: u32, versions: &[Version]) -> Result<(), PageError> {
        let need = codec::PAGE_HEADER_SIZE
            + stride_for(versions) * versions.len()
            + versions.iter().map(|v| v.value.len()).sum::<usize>();
        self.reserve(need)?;
        encode_page(id, versions, &mut self.buf)?;
        self.pages += 1;
        Ok(())
    }

    /// Appends a zero-record page deleting `id`.
    pub fn add_tombstone(&mut self, id: u32) -> Result<(), PageError> {
        self.reserve(codec::PAGE_HEADER_SIZE)?;
        encode_tombstone(id, &mut self.buf);
        self.pages += 1;
        Ok(())
    }

    /// Appends an already encoded page unchanged.
    pub fn add_raw(&mut self, page: &[u8]) -> Result<(), PageError> {
        self.reserve(page.len())?;
        self.buf.extend_from_slice(page);
        self.pages += 1;
        Ok(())
    }

    /// Pages added so far, tombstones included.
    pub fn page_count(&self) -> u32 {
        self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages == 0
    }

    /// Writes the file, syncs it and renames it to `complete`.
    pub fn finish<P: AsRef<Path>>(self, complete: P) -> Result<(), PageError> {
        let complete = complete.as_ref();
        if let Err(e) = self.write_file(complete) {
            let _ = fs::remove_file(&self.incomplete);
            return Err(e);
        }
        Ok(())
    }

    fn write_file(&self, complete: &Path) -> Result<(), PageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.incomplete)?;
        file.write_all(&self.buf)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.incomplete, complete)?;
        sync_parent_dir(complete)?;
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<(), PageError> {
        let free = self.buf.capacity() - self.buf.len();
        if additional <= free {
            return Ok(());
        }
        let grown = if self.buf.capacity() == 0 {
            self.growth.initial
        } else {
            (self.buf.capacity() as f64 * self.growth.factor) as usize
        };
        let target = grown.max(self.buf.len() + additional);
        self.buf.try_reserve_exact(target - self.buf.len())?;
        Ok(())
    }
}

/// Fsyncs the directory holding `path` so a rename inside it survives a crash.
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
