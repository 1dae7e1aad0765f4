//! # WAL - per-epoch write-ahead log
//!
//! Every mutation is appended to the log of the LIVE epoch **before** the
//! in-memory index is touched. On open, logs are memory-mapped and replayed
//! to rebuild the index.
//!
//! ## File Format
//!
//! ```text
//! [LogHeader: magic | major | minor]
//! [record]*          crc | key_size | value_offset=0 | value_size | flags | key | value
//! [EOF: "LEOF"]      written once when the log is sealed
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! create(N.log.incomplete) -> append* -> seal -> N.log
//!                                  \-> crash -> replay(Incomplete) -> repair -> N.log
//! ```
//!
//! A sealed log must end with the EOF marker. An incomplete log may end in a
//! torn record header (crash mid-append): replay stops before it and
//! [`repair`] cuts it off. A whole record header whose lengths run past the
//! end of the file is corruption in both modes.

use byteorder::{LittleEndian, WriteBytesExt};
use codec::{
    decode_log_record, encode_log_record, ByteReader, CodecError, LogHeader, Version, EOF_MAGIC,
    EOF_SIZE, LOG_HEADER_SIZE, RECORD_HEADER_SIZE,
};
use memmap2::Mmap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A header, record or EOF marker failed validation.
    #[error("corrupt log {path:?} at offset {offset}: {source}")]
    Corrupt {
        path: PathBuf,
        offset: usize,
        source: CodecError,
    },

    /// A log declared complete has no EOF marker.
    #[error("log {0:?} is missing its EOF marker")]
    MissingEof(PathBuf),
}

/// How a log is expected to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// `N.log`: must end with the EOF marker, any damage is corruption.
    Complete,
    /// `N.log.incomplete`: may lack the EOF marker and end in a torn record.
    Incomplete,
}

/// Outcome of a [`replay`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogReplay {
    /// Number of records handed to the callback.
    pub records: u64,
    /// Whether the EOF marker was found.
    pub has_eof: bool,
    /// Length of the header plus every whole record (EOF marker excluded).
    pub valid_len: u64,
    /// Fewer than a record header's bytes followed the last whole record.
    pub torn_tail: bool,
}

/// Append-only writer for one epoch's log.
///
/// Each record is encoded into a reusable buffer and written with a single
/// `write_all`, then flushed. When `sync` is `true` every append is also
/// followed by `sync_data()`. A failed append truncates the file back to its
/// previous length, so the log never keeps a half-written record.
#[derive(Debug)]
pub struct LogWriter {
    file: File,
    path: PathBuf,
    len: u64,
    sync: bool,
    records: u64,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl LogWriter {
    /// Creates a new log at `path` and writes its header. Fails if the file
    /// already exists.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let mut w = Self {
            file,
            path,
            len: 0,
            sync,
            records: 0,
            buf: Vec::with_capacity(256),
        };
        w.write_header()?;
        w.file.sync_all()?;
        sync_parent_dir(&w.path)?;
        Ok(w)
    }

    /// Opens an existing log for appending at its current end.
    pub fn open_append<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).read(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            len,
            sync,
            records: 0,
            buf: Vec::with_capacity(256),
        })
    }

    /// Appends `v` as one record.
    ///
    /// On failure the file is rolled back to its length before the call and
    /// the error is returned.
    pub fn append(&mut self, v: &Version) -> Result<(), WalError> {
        self.buf.clear();
        encode_log_record(v, &mut self.buf);
        self.write_buf()?;
        self.records += 1;
        Ok(())
    }

    /// Writes the EOF marker. The log accepts no further records afterwards.
    pub fn write_eof(&mut self) -> Result<(), WalError> {
        self.buf.clear();
        self.buf.write_u32::<LittleEndian>(EOF_MAGIC)?;
        self.write_buf()
    }

    /// Cuts the file down to `len` bytes.
    pub fn truncate(&mut self, len: u64) -> Result<(), WalError> {
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Forces written records to disk.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Writes the EOF marker, syncs, and renames the log to `sealed`.
    pub fn seal<P: AsRef<Path>>(mut self, sealed: P) -> Result<(), WalError> {
        self.write_eof()?;
        self.sync_to_disk()?;
        fs::rename(&self.path, sealed.as_ref())?;
        sync_parent_dir(sealed.as_ref())?;
        Ok(())
    }

    /// Records appended through this writer.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn write_header(&mut self) -> Result<(), WalError> {
        self.buf.clear();
        LogHeader::current().write_to(&mut self.buf);
        self.write_buf()
    }

    fn write_buf(&mut self) -> Result<(), WalError> {
        if let Err(e) = self.write_and_flush() {
            // Best effort: the append error is what the caller needs.
            let _ = self.file.set_len(self.len);
            return Err(e.into());
        }
        self.len += self.buf.len() as u64;
        Ok(())
    }

    fn write_and_flush(&mut self) -> io::Result<()> {
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

/// Replays the log at `path`, calling `apply` for every valid record in file
/// order. Records are handed over with `epoch = 0`.
///
/// # Termination
///
/// - **EOF marker** as the last 4 bytes -> stop, `has_eof = true`.
/// - **End of file without marker** -> `Complete`: [`WalError::MissingEof`];
///   `Incomplete`: `Ok`.
/// - **Partial record header** (fewer than [`RECORD_HEADER_SIZE`] bytes
///   left) -> `Complete`: corruption; `Incomplete`: `Ok` with
///   `torn_tail = true`.
/// - **Declared length past end of file, CRC mismatch, bad flags, nonzero
///   value offset, bad magic or version** -> corruption in both modes.
pub fn replay<F>(path: &Path, mode: ReplayMode, mut apply: F) -> Result<LogReplay, WalError>
where
    F: FnMut(Version),
{
    let file = File::open(path)?;
    let file_len = file.metadata()?.len() as usize;
    let corrupt = |offset: usize, source: CodecError| WalError::Corrupt {
        path: path.to_path_buf(),
        offset,
        source,
    };

    if file_len < LOG_HEADER_SIZE {
        return match mode {
            ReplayMode::Complete => Err(corrupt(
                0,
                CodecError::Truncated {
                    offset: 0,
                    needed: LOG_HEADER_SIZE,
                    available: file_len,
                },
            )),
            ReplayMode::Incomplete => Ok(LogReplay {
                records: 0,
                has_eof: false,
                valid_len: 0,
                torn_tail: file_len > 0,
            }),
        };
    }

    // SAFETY: the mapping is read-only and dropped before this function
    // returns. Logs are only appended to by the writer of the live epoch,
    // which is never replayed, and every offset is bounds-checked by
    // `ByteReader` before it is read.
    let map = unsafe { Mmap::map(&file)? };
    let mut r = ByteReader::new(&map);
    LogHeader::read(&mut r).map_err(|e| corrupt(0, e))?;

    let mut out = LogReplay {
        records: 0,
        has_eof: false,
        valid_len: LOG_HEADER_SIZE as u64,
        torn_tail: false,
    };

    loop {
        let pos = r.position();
        if r.is_empty() {
            break;
        }
        if r.remaining() == EOF_SIZE {
            let mut peek = r.clone();
            let magic = peek.u32().map_err(|e| corrupt(pos, e))?;
            if magic == EOF_MAGIC {
                out.has_eof = true;
                break;
            }
        }
        let left = r.remaining();
        match decode_log_record(&mut r) {
            Ok(v) => {
                apply(v);
                out.records += 1;
                out.valid_len = r.position() as u64;
            }
            Err(CodecError::Truncated { .. })
                if mode == ReplayMode::Incomplete && left < RECORD_HEADER_SIZE =>
            {
                out.torn_tail = true;
                break;
            }
            Err(e) => return Err(corrupt(pos, e)),
        }
    }

    if mode == ReplayMode::Complete && !out.has_eof {
        return Err(WalError::MissingEof(path.to_path_buf()));
    }
    Ok(out)
}

/// Turns a replayed incomplete log into a sealed one: cuts off a torn tail,
/// writes the EOF marker when it is missing, syncs, and renames the file to
/// `sealed`.
pub fn repair(path: &Path, replayed: &LogReplay, sealed: &Path) -> Result<(), WalError> {
    let mut w = LogWriter::open_append(path, false)?;
    if replayed.valid_len < LOG_HEADER_SIZE as u64 {
        w.truncate(0)?;
        w.write_header()?;
    } else if replayed.torn_tail {
        w.truncate(replayed.valid_len)?;
    }
    if !replayed.has_eof {
        w.write_eof()?;
    }
    w.sync_to_disk()?;
    drop(w);
    fs::rename(path, sealed)?;
    sync_parent_dir(sealed)?;
    Ok(())
}

/// Makes a create, rename or delete inside `path`'s directory durable.
#[cfg(unix)]
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
pub fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
