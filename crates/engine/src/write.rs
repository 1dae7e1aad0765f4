//! Write path: `set()`, `delete()`, and retiring a live log.
//!
//! Every mutation is appended and flushed to the live log before the active
//! index generation sees it. A failed append is rolled back by the log
//! writer and leaves the index untouched.

use std::io;
use std::sync::atomic::Ordering;

use codec::{Op, Version, MAX_KEY_SIZE, MAX_VALUE_SIZE, RECORD_HEADER_SIZE};
use page::MAX_PAGE_BODY;
use tracing::{debug, info, warn};
use wal::LogWriter;

use crate::error::{Error, Result};
use crate::recovery::remove_file;
use crate::repository::{EpochKind, FileKind, RecoverFlags, Repository};
use crate::Db;

impl Db {
    /// Inserts or replaces `key`.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(key, value, Op::Set)
    }

    /// Deletes `key` by writing a DEL version. Deleting a missing key is not
    /// an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(key, &[], Op::Del)
    }

    fn write(&self, key: &[u8], value: &[u8], op: Op) -> Result<()> {
        let shared = &*self.shared;
        if shared.config.flags.read_only {
            return Err(Error::Misuse("database is opened read-only".into()));
        }
        if key.is_empty() {
            return Err(Error::Misuse("key must not be empty".into()));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::Misuse(format!(
                "key too large: {} bytes (max {MAX_KEY_SIZE})",
                key.len()
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(Error::Misuse(format!(
                "value too large: {} bytes (max {MAX_VALUE_SIZE})",
                value.len()
            )));
        }
        // a record must fit a page of its own
        if RECORD_HEADER_SIZE + key.len() + value.len() > MAX_PAGE_BODY {
            return Err(Error::Misuse(format!(
                "record too large for a page: {} bytes",
                RECORD_HEADER_SIZE + key.len() + value.len()
            )));
        }

        // copy and checksum outside of any lock
        let version = Version::try_new(key, value, op)?;

        let mut log = shared.log.lock();
        let epoch = log.epoch;
        let writer = log.writer.as_mut().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "live log is unavailable after a failed rotation",
            ))
        })?;
        writer.append(&version)?;

        let superseded = shared
            .index
            .lock()
            .active_mut()
            .set(version.with_epoch(epoch));

        log.updates += 1;
        let wake = shared.config.merge
            && log.updates % shared.config.merge_watermark as u64 == 0;
        drop(log);
        drop(superseded);

        shared.psn.fetch_max(epoch, Ordering::AcqRel);
        if wake {
            debug!(epoch, "watermark reached, waking merge thread");
            shared.wake_merger();
        }
        Ok(())
    }
}

/// Takes a live log out of service: an empty log is deleted together with
/// its epoch, otherwise it is sealed as `<epoch>.log` and the epoch waits
/// for a merge.
///
/// The epoch turns XFER even when sealing fails, so the next round still
/// drains its versions. Its recover flags then name whichever log file
/// survived.
pub(crate) fn retire_log(repo: &mut Repository, writer: LogWriter, epoch: u32) -> Result<()> {
    if writer.records() == 0 {
        let path = writer.path().to_path_buf();
        drop(writer);
        remove_file(&path)?;
        repo.remove(epoch);
        debug!(epoch, "empty live log removed");
        return Ok(());
    }

    let records = writer.records();
    let sealed = repo.path(epoch, FileKind::Log);
    let result = writer.seal(&sealed);
    let recover = if sealed.is_file() {
        RecoverFlags::LOG
    } else {
        RecoverFlags::LOG_INCOMPLETE
    };
    if let Some(e) = repo.get_mut(epoch) {
        e.kind = EpochKind::Xfer;
        e.recover = recover;
    }
    if let Err(e) = result {
        warn!(epoch, error = %e, "sealing the live log failed");
        return Err(e.into());
    }
    info!(epoch, records, "live log sealed");
    Ok(())
}
