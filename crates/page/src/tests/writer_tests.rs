use super::*;
use codec::{ByteReader, PageHeader, PAGE_HEADER_SIZE, RECORD_HEADER_SIZE};
use tempfile::tempdir;

#[test]
fn page_layout_uses_fixed_stride_slots() {
    let versions = vec![set(b"a", b"apple"), set(b"bbb", b"")];
    let mut buf = Vec::new();
    encode_page(7, &versions, &mut buf).unwrap();

    let h = PageHeader::read(&mut ByteReader::new(&buf)).unwrap();
    assert!(h.verify(0).is_ok());
    assert_eq!(h.id, 7);
    assert_eq!(h.record_count, 2);
    assert_eq!(h.stride as usize, RECORD_HEADER_SIZE + 3);
    assert_eq!(h.byte_size as usize, 2 * (RECORD_HEADER_SIZE + 3) + 5);
    assert_eq!(buf.len(), PAGE_HEADER_SIZE + h.byte_size as usize);

    // padding after the short key is zeroed
    let slot0 = PAGE_HEADER_SIZE;
    assert_eq!(&buf[slot0 + RECORD_HEADER_SIZE..slot0 + RECORD_HEADER_SIZE + 1], b"a");
    assert_eq!(&buf[slot0 + RECORD_HEADER_SIZE + 1..slot0 + RECORD_HEADER_SIZE + 3], &[0, 0]);
    assert_eq!(&buf[buf.len() - 5..], b"apple");
}

#[test]
fn split_pages_caps_records_and_body_bytes() {
    let versions = keys(0..10);
    // each record costs a 22-byte slot plus a 6-byte value
    let sizes = |runs: Vec<&[Version]>| runs.iter().map(|r| r.len()).collect::<Vec<_>>();

    assert_eq!(sizes(split_pages(&versions, 4, MAX_PAGE_BODY)), [4, 4, 2]);
    assert_eq!(sizes(split_pages(&versions, 10, 100)), [3, 3, 3, 1]);
    assert_eq!(sizes(split_pages(&versions, 2, 100)), [2, 2, 2, 2, 2]);

    for run in split_pages(&versions, 10, 100) {
        let mut buf = Vec::new();
        encode_page(1, run, &mut buf).unwrap();
        let h = PageHeader::read(&mut ByteReader::new(&buf)).unwrap();
        assert!(h.byte_size <= 100, "{} bytes", h.byte_size);
    }
}

#[test]
fn split_pages_never_drops_an_oversized_record() {
    let versions = vec![set(b"a", b"1"), set(b"b", &[7u8; 64]), set(b"c", b"3")];
    let runs = split_pages(&versions, 10, 40);
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[1], &versions[1..2]);
    assert!(split_pages(&[], 10, 40).is_empty());
}

#[test]
fn tombstone_is_header_only() {
    let mut buf = Vec::new();
    encode_tombstone(9, &mut buf);
    assert_eq!(buf.len(), PAGE_HEADER_SIZE);
    let h = PageHeader::read(&mut ByteReader::new(&buf)).unwrap();
    assert!(h.is_tombstone());
    assert_eq!(h.id, 9);
}

#[test]
fn finish_renames_incomplete_file() {
    let dir = tempdir().unwrap();
    let incomplete = dir.path().join("3.db.incomplete");
    let complete = dir.path().join("3.db");

    let mut w = DbWriter::create(&incomplete, Growth::default());
    w.add_page(1, &keys(0..4)).unwrap();
    w.add_tombstone(2).unwrap();
    assert_eq!(w.page_count(), 2);
    assert!(!incomplete.exists(), "nothing hits disk before finish");
    w.finish(&complete).unwrap();

    assert!(!incomplete.exists());
    assert!(complete.exists());
}

#[cfg(unix)]
#[test]
fn directory_sync_errors_are_returned() {
    let dir = tempdir().unwrap();
    assert!(crate::writer::sync_parent_dir(&dir.path().join("1.db")).is_ok());
    let missing = dir.path().join("gone").join("1.db");
    assert!(crate::writer::sync_parent_dir(&missing).is_err());
}

#[test]
fn raw_copy_is_byte_identical() {
    let dir = tempdir().unwrap();
    let src = write_db(dir.path(), 1, &[(5, keys(0..10))]);
    let page = src.page(0).unwrap();

    let mut w = DbWriter::create(dir.path().join("2.db.incomplete"), Growth::default());
    w.add_raw(page.raw_bytes()).unwrap();
    w.finish(dir.path().join("2.db")).unwrap();

    let copy = std::fs::read(dir.path().join("2.db")).unwrap();
    assert_eq!(copy, src.bytes());
}

#[test]
fn small_growth_still_fits_every_page() {
    let dir = tempdir().unwrap();
    let mut w = DbWriter::create(
        dir.path().join("1.db.incomplete"),
        Growth {
            initial: 16,
            factor: 1.0,
        },
    );
    for id in 1..=20 {
        w.add_page(id, &keys(id * 10..id * 10 + 10)).unwrap();
    }
    w.finish(dir.path().join("1.db")).unwrap();

    let file = PageFile::open(dir.path().join("1.db"), 1).unwrap();
    assert_eq!(file.scan().count(), 20);
}
