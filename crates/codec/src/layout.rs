use crate::{ByteReader, CodecError};

/// Magic number opening every log file (ASCII "SDLG").
pub const LOG_MAGIC: u32 = 0x5344_4C47;

/// Magic number of the EOF marker that seals a log file (ASCII "LEOF").
pub const EOF_MAGIC: u32 = 0x4C45_4F46;

pub const LOG_VERSION_MAJOR: u8 = 1;
pub const LOG_VERSION_MINOR: u8 = 1;

/// `magic (4) + version_major (1) + version_minor (1)`
pub const LOG_HEADER_SIZE: usize = 4 + 1 + 1;

/// `magic (4)`
pub const EOF_SIZE: usize = 4;

/// `crc (4) + key_size (2) + value_offset (4) + value_size (4) + flags (1)`
pub const RECORD_HEADER_SIZE: usize = 4 + 2 + 4 + 4 + 1;

/// `id (4) + record_count (4) + byte_size (4) + stride (4) + crc (4)`
pub const PAGE_HEADER_SIZE: usize = 4 * 5;

/// Header at offset 0 of every log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub magic: u32,
    pub version_major: u8,
    pub version_minor: u8,
}

impl LogHeader {
    /// The header this build writes.
    pub fn current() -> Self {
        Self {
            magic: LOG_MAGIC,
            version_major: LOG_VERSION_MAJOR,
            version_minor: LOG_VERSION_MINOR,
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.push(self.version_major);
        buf.push(self.version_minor);
    }

    /// Reads and validates a header: the magic must match and both version
    /// components must equal the ones this build writes.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let magic = r.u32()?;
        if magic != LOG_MAGIC {
            return Err(CodecError::BadMagic {
                expected: LOG_MAGIC,
                found: magic,
            });
        }
        let version_major = r.u8()?;
        let version_minor = r.u8()?;
        if version_major != LOG_VERSION_MAJOR || version_minor != LOG_VERSION_MINOR {
            return Err(CodecError::Version {
                major: version_major,
                minor: version_minor,
            });
        }
        Ok(Self {
            magic,
            version_major,
            version_minor,
        })
    }
}

/// Fixed header in front of every log record and every page slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    pub key_size: u16,
    pub value_offset: u32,
    pub value_size: u32,
    pub flags: u8,
}

impl RecordHeader {
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.crc.to_le_bytes());
        buf.extend_from_slice(&self.tail());
    }

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            crc: r.u32()?,
            key_size: r.u16()?,
            value_offset: r.u32()?,
            value_size: r.u32()?,
            flags: r.u8()?,
        })
    }

    /// The header bytes after the CRC field, in on-disk order. These are the
    /// last input to the record CRC.
    pub fn tail(&self) -> [u8; RECORD_HEADER_SIZE - 4] {
        let mut out = [0u8; RECORD_HEADER_SIZE - 4];
        out[0..2].copy_from_slice(&self.key_size.to_le_bytes());
        out[2..6].copy_from_slice(&self.value_offset.to_le_bytes());
        out[6..10].copy_from_slice(&self.value_size.to_le_bytes());
        out[10] = self.flags;
        out
    }
}

/// Header in front of every page inside a db file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub id: u32,
    pub record_count: u32,
    pub byte_size: u32,
    pub stride: u32,
    pub crc: u32,
}

impl PageHeader {
    /// Builds a header and fills in its CRC.
    pub fn new(id: u32, record_count: u32, byte_size: u32, stride: u32) -> Self {
        let mut h = Self {
            id,
            record_count,
            byte_size,
            stride,
            crc: 0,
        };
        h.crc = h.compute_crc();
        h
    }

    /// CRC32C over every header field except the CRC itself.
    pub fn compute_crc(&self) -> u32 {
        let mut buf = Vec::with_capacity(PAGE_HEADER_SIZE - 4);
        self.write_fields(&mut buf);
        crc32c::crc32c(&buf)
    }

    /// Checks the stored CRC; `offset` is only used for error reporting.
    pub fn verify(&self, offset: usize) -> Result<(), CodecError> {
        let computed = self.compute_crc();
        if computed != self.crc {
            return Err(CodecError::Crc {
                offset,
                stored: self.crc,
                computed,
            });
        }
        Ok(())
    }

    /// A zero-record page marks its id as deleted.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.record_count == 0
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        self.write_fields(buf);
        buf.extend_from_slice(&self.crc.to_le_bytes());
    }

    fn write_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.record_count.to_le_bytes());
        buf.extend_from_slice(&self.byte_size.to_le_bytes());
        buf.extend_from_slice(&self.stride.to_le_bytes());
    }

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: r.u32()?,
            record_count: r.u32()?,
            byte_size: r.u32()?,
            stride: r.u32()?,
            crc: r.u32()?,
        })
    }
}
