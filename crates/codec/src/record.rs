use std::collections::TryReserveError;

use crate::{ByteReader, CodecError, RecordHeader, RECORD_HEADER_SIZE};

/// Largest key the record header can describe (`key_size: u16`).
pub const MAX_KEY_SIZE: usize = u16::MAX as usize;
/// Largest value the record header can describe (`value_size: u32`).
pub const MAX_VALUE_SIZE: usize = u32::MAX as usize;

/// Record operation, stored in the `flags` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Set = 1,
    Del = 2,
}

impl Op {
    pub fn from_flags(flags: u8) -> Option<Op> {
        match flags {
            1 => Some(Op::Set),
            2 => Some(Op::Del),
            _ => None,
        }
    }

    #[inline]
    pub fn flags(self) -> u8 {
        self as u8
    }
}

/// One versioned key/value record, as written to a log and held by the
/// in-memory index.
///
/// `epoch` is not persisted in the record itself: it is stamped with the id
/// of the epoch that owns the log or page the record came from. `crc` is the
/// log-form checksum (`value_offset = 0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub op: Op,
    pub epoch: u32,
    pub crc: u32,
}

impl Version {
    /// Builds a version and precomputes its checksum.
    ///
    /// Callers must keep `key` within [`MAX_KEY_SIZE`] and `value` within
    /// [`MAX_VALUE_SIZE`].
    pub fn new(key: Vec<u8>, value: Vec<u8>, op: Op) -> Self {
        let crc = record_crc(&key, &value, 0, op.flags());
        Self {
            key,
            value,
            op,
            epoch: 0,
            crc,
        }
    }

    /// Like [`Version::new`], but copies caller-owned bytes with fallible
    /// allocation so that a huge value reports an error instead of aborting.
    pub fn try_new(key: &[u8], value: &[u8], op: Op) -> Result<Self, TryReserveError> {
        let mut k = Vec::new();
        k.try_reserve_exact(key.len())?;
        k.extend_from_slice(key);
        let mut v = Vec::new();
        v.try_reserve_exact(value.len())?;
        v.extend_from_slice(value);
        Ok(Self::new(k, v, op))
    }

    #[must_use]
    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.op == Op::Del
    }

    /// Bytes this version occupies as a log record.
    pub fn log_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.len()
    }
}

/// CRC32C over the key, then the value, then the header fields that follow
/// the CRC field.
pub fn record_crc(key: &[u8], value: &[u8], value_offset: u32, flags: u8) -> u32 {
    let header = RecordHeader {
        crc: 0,
        key_size: key.len() as u16,
        value_offset,
        value_size: value.len() as u32,
        flags,
    };
    let crc = crc32c::crc32c(key);
    let crc = crc32c::crc32c_append(crc, value);
    crc32c::crc32c_append(crc, &header.tail())
}

/// Appends `v` to `buf` as a log record: `[header][key][value]`.
pub fn encode_log_record(v: &Version, buf: &mut Vec<u8>) {
    let header = RecordHeader {
        crc: v.crc,
        key_size: v.key.len() as u16,
        value_offset: 0,
        value_size: v.value.len() as u32,
        flags: v.op.flags(),
    };
    header.write_to(buf);
    buf.extend_from_slice(&v.key);
    buf.extend_from_slice(&v.value);
}

/// Decodes the log record at the reader's position.
///
/// Checks, in order: enough bytes for header, key and value; the CRC; the
/// flags; the reserved `value_offset`. The returned version has `epoch = 0`.
pub fn decode_log_record(r: &mut ByteReader<'_>) -> Result<Version, CodecError> {
    let start = r.position();
    let header = RecordHeader::read(r)?;
    let key = r.bytes(header.key_size as usize)?;
    let value = r.bytes(header.value_size as usize)?;

    let computed = record_crc(key, value, header.value_offset, header.flags);
    if computed != header.crc {
        return Err(CodecError::Crc {
            offset: start,
            stored: header.crc,
            computed,
        });
    }
    let op = Op::from_flags(header.flags).ok_or(CodecError::Flags(header.flags))?;
    if header.value_offset != 0 {
        return Err(CodecError::ValueOffset(header.value_offset));
    }

    Ok(Version {
        key: key.to_vec(),
        value: value.to_vec(),
        op,
        epoch: 0,
        crc: header.crc,
    })
}
