use codec::{record_crc, PageHeader, RecordHeader, Version, RECORD_HEADER_SIZE};

use crate::PageError;

/// Largest page body the 32-bit `byte_size` and `value_offset` fields can
/// describe.
pub const MAX_PAGE_BODY: usize = u32::MAX as usize;

/// Slot width for `versions`: the record header plus the longest key.
pub fn stride_for(versions: &[Version]) -> usize {
    RECORD_HEADER_SIZE + versions.iter().map(|v| v.key.len()).max().unwrap_or(0)
}

/// Splits sorted `versions` into page-sized runs of at most `max_records`
/// records whose encoded body stays within `max_bytes`.
///
/// A record that alone exceeds `max_bytes` still gets a page of its own;
/// [`encode_page`] then rejects it as oversized.
pub fn split_pages(versions: &[Version], max_records: usize, max_bytes: usize) -> Vec<&[Version]> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < versions.len() {
        let mut end = start;
        let mut key_max = 0usize;
        let mut values = 0usize;
        while end < versions.len() && end - start < max_records.max(1) {
            let v = &versions[end];
            let key = key_max.max(v.key.len());
            let vals = values.saturating_add(v.value.len());
            let body = (RECORD_HEADER_SIZE + key)
                .saturating_mul(end - start + 1)
                .saturating_add(vals);
            if end > start && body > max_bytes {
                break;
            }
            key_max = key;
            values = vals;
            end += 1;
        }
        out.push(&versions[start..end]);
        start = end;
    }
    out
}

/// Appends a page holding `versions` to `out`.
///
/// `versions` must be non-empty and sorted by the key comparator. Each slot
/// is `[record header][key][zero padding]`; values follow the slots in the
/// same order and `value_offset` is relative to the start of the body.
///
/// ```text
/// [PageHeader][slot 0]...[slot n-1][value 0]...[value n-1]
/// ```
pub fn encode_page(id: u32, versions: &[Version], out: &mut Vec<u8>) -> Result<(), PageError> {
    debug_assert!(!versions.is_empty(), "use encode_tombstone for empty pages");
    let stride = stride_for(versions);
    let slots = stride * versions.len();
    let body = slots + versions.iter().map(|v| v.value.len()).sum::<usize>();
    let byte_size = u32::try_from(body).map_err(|_| PageError::Oversized(body))?;
    let count = u32::try_from(versions.len()).map_err(|_| PageError::Oversized(body))?;

    PageHeader::new(id, count, byte_size, stride as u32).write_to(out);

    let mut value_offset = slots as u32;
    for v in versions {
        let start = out.len();
        let flags = v.op.flags();
        RecordHeader {
            crc: record_crc(&v.key, &v.value, value_offset, flags),
            key_size: v.key.len() as u16,
            value_offset,
            value_size: v.value.len() as u32,
            flags,
        }
        .write_to(out);
        out.extend_from_slice(&v.key);
        out.resize(start + stride, 0);
        value_offset += v.value.len() as u32;
    }
    for v in versions {
        out.extend_from_slice(&v.value);
    }
    Ok(())
}

/// Appends a zero-record page marking `id` as deleted.
pub fn encode_tombstone(id: u32, out: &mut Vec<u8>) {
    PageHeader::new(id, 0, 0, 0).write_to(out);
}
