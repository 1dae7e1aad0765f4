use super::helpers::*;
use crate::*;
use anyhow::Result;
use codec::MAX_KEY_SIZE;
use config::Config;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

// --------------------- Basic set / get / delete ---------------------

#[test]
fn set_and_get() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    db.set(b"name", b"alice")?;
    assert_eq!(db.get(b"name")?, Some(b"alice".to_vec()));
    Ok(())
}

#[test]
fn get_missing_key() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    assert!(db.get(b"nope")?.is_none());
    Ok(())
}

#[test]
fn delete_removes_key() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    db.set(b"k", b"v")?;
    assert!(db.contains(b"k")?);
    db.delete(b"k")?;
    assert!(db.get(b"k")?.is_none());
    Ok(())
}

#[test]
fn overwrite_and_resurrect() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    db.set(b"k", b"v1")?;
    db.set(b"k", b"v2")?;
    assert_eq!(db.get(b"k")?, Some(b"v2".to_vec()));
    db.delete(b"k")?;
    db.set(b"k", b"v3")?;
    assert_eq!(db.get(b"k")?, Some(b"v3".to_vec()));
    Ok(())
}

#[test]
fn empty_value_is_a_value() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    db.set(b"k", b"")?;
    assert_eq!(db.get(b"k")?, Some(Vec::new()));
    Ok(())
}

#[test]
fn deleting_a_missing_key_is_fine() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    db.delete(b"ghost")?;
    assert!(db.get(b"ghost")?.is_none());
    Ok(())
}

// --------------------- Misuse ---------------------

#[test]
fn empty_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    assert!(matches!(db.set(b"", b"v"), Err(Error::Misuse(_))));
    assert!(matches!(db.delete(b""), Err(Error::Misuse(_))));
    Ok(())
}

#[test]
fn oversized_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    let big = vec![b'x'; MAX_KEY_SIZE + 1];
    assert!(matches!(db.set(&big, b"v"), Err(Error::Misuse(_))));

    let max = vec![b'x'; MAX_KEY_SIZE];
    db.set(&max, b"v")?;
    assert_eq!(db.get(&max)?, Some(b"v".to_vec()));
    Ok(())
}

#[test]
fn read_only_rejects_mutations_before_touching_files() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = open(dir.path())?;
        db.set(b"k", b"v")?;
        db.close()?;
    }
    let before = files(dir.path());

    let db = open_read_only(dir.path())?;
    assert!(db.is_read_only());
    assert!(matches!(db.set(b"a", b"1"), Err(Error::Misuse(_))));
    assert!(matches!(db.delete(b"k"), Err(Error::Misuse(_))));
    assert!(matches!(db.merge_force(), Err(Error::Misuse(_))));
    assert_eq!(db.get(b"k")?, Some(b"v".to_vec()));
    db.close()?;

    assert_eq!(files(dir.path()), before);
    Ok(())
}

#[test]
fn invalid_config_is_rejected_before_any_io() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("db");
    let err = Db::open(builder(&path).page_size(3).build()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!path.exists());
    Ok(())
}

// --------------------- Live log lifecycle ---------------------

#[test]
fn fresh_open_creates_first_live_log() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    assert!(exists(dir.path(), 1, "log.incomplete"));
    assert_eq!(db.stat().epoch, 1);
    Ok(())
}

#[test]
fn close_seals_a_written_log() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    db.set(b"k", b"v")?;
    db.close()?;
    assert!(exists(dir.path(), 1, "log"));
    assert!(!exists(dir.path(), 1, "log.incomplete"));
    Ok(())
}

#[test]
fn close_deletes_an_empty_log() -> Result<()> {
    let dir = tempdir()?;
    open(dir.path())?.close()?;
    assert!(files(dir.path()).is_empty());
    Ok(())
}

#[test]
fn drop_closes_like_close() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = open(dir.path())?;
        db.set(b"k", b"v")?;
    }
    assert_eq!(files(dir.path()), vec!["1.log".to_string()]);
    Ok(())
}

#[test]
fn reopen_goes_live_in_the_next_epoch() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = open(dir.path())?;
        db.set(b"k", b"v")?;
        db.close()?;
    }
    let db = open(dir.path())?;
    assert!(exists(dir.path(), 1, "log"));
    assert!(exists(dir.path(), 2, "log.incomplete"));
    let stat = db.stat();
    assert_eq!(stat.epoch, 2);
    assert_eq!(stat.xfer_epoch_count, 1);
    Ok(())
}

#[test]
fn missing_directory_without_create_fails_cleanly() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("absent");
    let err = Db::open(builder(&path).create(false).build()).unwrap_err();
    match err {
        Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(!path.exists());
    Ok(())
}

#[test]
fn missing_directory_is_created() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("db");
    let db = open(&path)?;
    db.set(b"k", b"v")?;
    assert!(exists(&path, 1, "log.incomplete"));
    Ok(())
}

// --------------------- psn / stat ---------------------

#[test]
fn psn_follows_the_live_epoch() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = open(dir.path())?;
        assert_eq!(db.stat().psn, 0);
        db.set(b"a", b"1")?;
        assert_eq!(db.stat().psn, 1);
        db.close()?;
    }
    let db = open(dir.path())?;
    assert_eq!(db.stat().psn, 1);
    db.set(b"b", b"2")?;
    assert_eq!(db.stat().psn, 2);
    Ok(())
}

#[test]
fn stat_counts_index_pages() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(builder(dir.path()).page_size(4).build())?;
    for i in 0..9u32 {
        db.set(format!("k{i}").as_bytes(), b"v")?;
    }
    let stat = db.stat();
    assert_eq!(stat.index_record_count, 9);
    assert_eq!(stat.index_page_count, 3);
    assert_eq!(stat.repo_count, 1);
    assert_eq!(stat.catalog_page_count, 0);
    Ok(())
}

// --------------------- Concurrency ---------------------

#[test]
fn concurrent_writers() -> Result<()> {
    let dir = tempdir()?;
    let db = open(dir.path())?;
    thread::scope(|s| {
        for t in 0..4u32 {
            let db = &db;
            s.spawn(move || {
                for i in 0..100u32 {
                    db.set(format!("t{t}-{i:03}").as_bytes(), &i.to_le_bytes())
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(db.stat().index_record_count, 400);
    assert_eq!(db.get(b"t3-099")?, Some(99u32.to_le_bytes().to_vec()));
    db.close()?;

    let db = open(dir.path())?;
    assert_eq!(db.stat().index_record_count, 400);
    Ok(())
}

#[test]
fn watermark_wakes_the_merge_thread() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(
        Config::builder(dir.path())
            .merge(true)
            .merge_watermark(4)
            .merge_interval(Duration::from_millis(20))
            .build(),
    )?;
    for i in 0..16u32 {
        db.set(format!("k{i:02}").as_bytes(), b"v")?;
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while db.stat().catalog_page_count == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(db.stat().catalog_page_count > 0, "merge thread never ran");
    for i in 0..16u32 {
        assert_eq!(db.get(format!("k{i:02}").as_bytes())?, Some(b"v".to_vec()));
    }
    db.close()?;
    Ok(())
}
