use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use codec::{
    record_crc, ByteReader, CodecError, Comparator, Op, Order, PageHeader, RecordHeader, Version,
    PAGE_HEADER_SIZE, RECORD_HEADER_SIZE,
};
use memmap2::Mmap;

use crate::PageError;

/// A db file mapped read-only, owned by one epoch.
///
/// Every access goes through bounds-checked readers: a page header is CRC
/// verified and its body checked against the file length before any record
/// inside it is touched.
pub struct PageFile {
    path: PathBuf,
    epoch: u32,
    map: Mmap,
}

impl PageFile {
    /// Maps the db file at `path`.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(...) }` but is memory-safe because db files
    /// are written in full under a temporary name and never modified after
    /// the rename that makes them visible. They are only ever deleted, which
    /// leaves existing mappings intact.
    pub fn open<P: AsRef<Path>>(path: P, epoch: u32) -> Result<Self, PageError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        if file.metadata()?.len() == 0 {
            return Err(PageError::Corrupt {
                path,
                offset: 0,
                source: CodecError::Malformed {
                    what: "empty db file",
                    offset: 0,
                },
            });
        }
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { path, epoch, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Walks the page headers from offset 0 to the end of the file.
    pub fn scan(&self) -> PageScan<'_> {
        PageScan {
            file: self,
            pos: 0,
            failed: false,
        }
    }

    /// The page whose header starts at `offset`.
    pub fn page(&self, offset: usize) -> Result<Page<'_>, PageError> {
        let header = self.header_at(offset)?;
        let start = offset + PAGE_HEADER_SIZE;
        Ok(Page {
            file: self,
            offset,
            header,
            body: &self.map[start..start + header.byte_size as usize],
        })
    }

    fn header_at(&self, offset: usize) -> Result<PageHeader, PageError> {
        let mut r = ByteReader::at(&self.map, offset);
        let header = PageHeader::read(&mut r).map_err(|e| self.corrupt(offset, e))?;
        header.verify(offset).map_err(|e| self.corrupt(offset, e))?;

        let body = header.byte_size as usize;
        if r.remaining() < body {
            return Err(self.corrupt(
                offset,
                CodecError::Truncated {
                    offset: r.position(),
                    needed: body,
                    available: r.remaining(),
                },
            ));
        }
        if !header.is_tombstone() {
            let stride = header.stride as usize;
            let slots = (header.record_count as usize).checked_mul(stride);
            if stride < RECORD_HEADER_SIZE || slots.map_or(true, |s| s > body) {
                return Err(self.corrupt(
                    offset,
                    CodecError::Malformed {
                        what: "page stride",
                        offset,
                    },
                ));
            }
        }
        Ok(header)
    }

    fn corrupt(&self, offset: usize, source: CodecError) -> PageError {
        PageError::Corrupt {
            path: self.path.clone(),
            offset,
            source,
        }
    }
}

impl fmt::Debug for PageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFile")
            .field("path", &self.path)
            .field("epoch", &self.epoch)
            .field("len", &self.map.len())
            .finish()
    }
}

/// Location and verified header of one page found by [`PageFile::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    pub offset: usize,
    pub header: PageHeader,
}

/// Iterator over the pages of a db file. Stops after the first error.
pub struct PageScan<'a> {
    file: &'a PageFile,
    pos: usize,
    failed: bool,
}

impl Iterator for PageScan<'_> {
    type Item = Result<PageSlot, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.file.len() {
            return None;
        }
        match self.file.header_at(self.pos) {
            Ok(header) => {
                let slot = PageSlot {
                    offset: self.pos,
                    header,
                };
                self.pos += PAGE_HEADER_SIZE + header.byte_size as usize;
                Some(Ok(slot))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// One record of a page, borrowed from the mapping.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    pub header: RecordHeader,
    pub op: Op,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl RecordRef<'_> {
    pub fn is_deleted(&self) -> bool {
        self.op == Op::Del
    }

    /// Copies the record out as a version owned by `epoch`.
    pub fn to_version(&self, epoch: u32) -> Version {
        Version::new(self.key.to_vec(), self.value.to_vec(), self.op).with_epoch(epoch)
    }
}

/// A verified page inside a [`PageFile`].
#[derive(Clone, Copy)]
pub struct Page<'a> {
    file: &'a PageFile,
    offset: usize,
    header: PageHeader,
    body: &'a [u8],
}

impl<'a> Page<'a> {
    pub fn id(&self) -> u32 {
        self.header.id
    }

    /// File offset of the page header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.header.record_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Header and body bytes, for copying the page verbatim.
    pub fn raw_bytes(&self) -> &'a [u8] {
        &self.file.bytes()[self.offset..self.offset + PAGE_HEADER_SIZE + self.body.len()]
    }

    /// Record `i` without checking its CRC.
    pub fn record(&self, i: usize) -> Result<RecordRef<'a>, PageError> {
        debug_assert!(i < self.len());
        let stride = self.header.stride as usize;
        let slot = i * stride;
        let at = |rel: usize| self.offset + PAGE_HEADER_SIZE + rel;

        let mut r = ByteReader::at(self.body, slot);
        let header = RecordHeader::read(&mut r).map_err(|e| self.file.corrupt(at(slot), e))?;
        if header.key_size as usize > stride - RECORD_HEADER_SIZE {
            return Err(self.file.corrupt(
                at(slot),
                CodecError::Malformed {
                    what: "record key size",
                    offset: at(slot),
                },
            ));
        }
        let key = r
            .bytes(header.key_size as usize)
            .map_err(|e| self.file.corrupt(at(slot), e))?;

        let start = header.value_offset as usize;
        let value = start
            .checked_add(header.value_size as usize)
            .and_then(|end| self.body.get(start..end))
            .ok_or_else(|| {
                self.file.corrupt(
                    at(slot),
                    CodecError::Truncated {
                        offset: at(start),
                        needed: header.value_size as usize,
                        available: self.body.len().saturating_sub(start),
                    },
                )
            })?;
        let op = Op::from_flags(header.flags)
            .ok_or_else(|| self.file.corrupt(at(slot), CodecError::Flags(header.flags)))?;

        Ok(RecordRef {
            header,
            op,
            key,
            value,
        })
    }

    /// Record `i` after checking its CRC.
    pub fn verified_record(&self, i: usize) -> Result<RecordRef<'a>, PageError> {
        let rec = self.record(i)?;
        let h = rec.header;
        let computed = record_crc(rec.key, rec.value, h.value_offset, h.flags);
        if computed != h.crc {
            let offset = self.offset + PAGE_HEADER_SIZE + i * self.header.stride as usize;
            return Err(self.file.corrupt(
                offset,
                CodecError::Crc {
                    offset,
                    stored: h.crc,
                    computed,
                },
            ));
        }
        Ok(rec)
    }

    /// Verified first and last records as versions owned by `epoch`.
    pub fn bounds(&self, epoch: u32) -> Result<(Version, Version), PageError> {
        let first = self.verified_record(0)?.to_version(epoch);
        let last = self.verified_record(self.len() - 1)?.to_version(epoch);
        Ok((first, last))
    }

    /// Every record, verified, as versions owned by `epoch`.
    pub fn versions(&self, epoch: u32) -> Result<Vec<Version>, PageError> {
        (0..self.len())
            .map(|i| self.verified_record(i).map(|r| r.to_version(epoch)))
            .collect()
    }

    /// Binary search by key: `Ok(i)` on an exact match, otherwise `Err(i)`
    /// with the index of the first greater record.
    ///
    /// Slots live in mapped bytes and each key read is fallible, so this
    /// walks indexes instead of a typed slice.
    pub fn search(&self, key: &[u8], cmp: &Comparator) -> Result<Result<usize, usize>, PageError> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp.compare(self.record(mid)?.key, key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// Index of the first record satisfying `order` relative to `key`, or
    /// `None` when the answer lies outside this page.
    pub fn seek(
        &self,
        key: Option<&[u8]>,
        order: Order,
        cmp: &Comparator,
    ) -> Result<Option<usize>, PageError> {
        let n = self.len();
        if n == 0 {
            return Ok(None);
        }
        let Some(key) = key else {
            return Ok(Some(if order.is_forward() { 0 } else { n - 1 }));
        };
        let pos = match (self.search(key, cmp)?, order) {
            (Ok(i), Order::Gte | Order::Lte) => Some(i),
            (Ok(i), Order::Gt) => Some(i + 1),
            (Err(i), Order::Gte | Order::Gt) => Some(i),
            (Ok(i) | Err(i), Order::Lt) | (Err(i), Order::Lte) => i.checked_sub(1),
        };
        Ok(pos.filter(|&i| i < n))
    }
}

impl fmt::Debug for Page<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.header.id)
            .field("offset", &self.offset)
            .field("records", &self.header.record_count)
            .finish()
    }
}
