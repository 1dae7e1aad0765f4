use super::*;
use codec::Op;

// -------------------- Helpers --------------------

fn set(key: &[u8], value: &[u8], epoch: u32) -> Version {
    Version::new(key.to_vec(), value.to_vec(), Op::Set).with_epoch(epoch)
}

fn del(key: &[u8], epoch: u32) -> Version {
    Version::new(key.to_vec(), Vec::new(), Op::Del).with_epoch(epoch)
}

fn index() -> Index {
    Index::new(Comparator::bytewise())
}

fn keys<'a>(it: impl Iterator<Item = &'a Version>) -> Vec<Vec<u8>> {
    it.map(|v| v.key.clone()).collect()
}

// -------------------- Basic set / get --------------------

#[test]
fn set_and_get_single_key() {
    let mut m = index();
    assert!(m.set(set(b"k1", b"v1", 1)).is_none());
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(b"k1").unwrap().value, b"v1");
}

#[test]
fn set_returns_superseded_version() {
    let mut m = index();
    m.set(set(b"k", b"v1", 1));
    let old = m.set(set(b"k", b"v2", 2)).unwrap();
    assert_eq!(old.value, b"v1");
    assert_eq!(m.get(b"k").unwrap().value, b"v2");
    assert_eq!(m.len(), 1);
}

#[test]
fn get_missing_key_returns_none() {
    let m = index();
    assert!(m.get(b"nonexistent").is_none());
}

#[test]
fn delete_is_retained_as_version() {
    let mut m = index();
    m.set(set(b"k", b"v", 1));
    m.set(del(b"k", 1));
    assert!(m.get(b"k").unwrap().is_deleted());
    assert_eq!(m.len(), 1);
}

#[test]
fn approx_size_tracks_key_and_value_bytes() {
    let mut m = index();
    m.set(set(b"a", b"aaa", 1));
    assert_eq!(m.approx_size(), 4);
    m.set(set(b"a", b"bb", 1));
    assert_eq!(m.approx_size(), 3);
    m.set(del(b"a", 1));
    assert_eq!(m.approx_size(), 1);
    m.clear();
    assert_eq!(m.approx_size(), 0);
    assert!(m.is_empty());
}

#[test]
fn iter_yields_sorted_keys() {
    let mut m = index();
    for k in [b"c", b"a", b"b"] {
        m.set(set(k, b"v", 1));
    }
    assert_eq!(keys(m.iter()), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn custom_comparator_controls_order() {
    let mut m = Index::new(Comparator::new(|a, b| b.cmp(a)));
    for k in [b"a", b"c", b"b"] {
        m.set(set(k, b"v", 1));
    }
    assert_eq!(keys(m.iter()), vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    assert_eq!(m.seek(None, Order::Gte).unwrap().key, b"c");
}

#[test]
fn write_load_10k_unique_keys() {
    let mut m = index();
    for i in 0..10_000u32 {
        m.set(set(format!("key{i:05}").as_bytes(), &i.to_le_bytes(), 1));
    }
    assert_eq!(m.len(), 10_000);
    assert_eq!(m.get(b"key04242").unwrap().value, 4242u32.to_le_bytes());
}

// -------------------- Replay --------------------

#[test]
fn replay_same_epoch_replaces() {
    let mut m = index();
    assert_eq!(m.replay(set(b"k", b"v1", 3)), Replay::Inserted);
    assert_eq!(m.replay(set(b"k", b"v2", 3)), Replay::Replaced);
    assert_eq!(m.get(b"k").unwrap().value, b"v2");
}

#[test]
fn replay_older_epoch_is_discarded() {
    let mut m = index();
    m.replay(set(b"k", b"young", 3));
    assert_eq!(m.replay(set(b"k", b"old", 2)), Replay::Discarded);
    assert_eq!(m.get(b"k").unwrap().value, b"young");
}

#[test]
fn replayed_delete_shadows_older_set() {
    let mut m = index();
    m.replay(del(b"k", 5));
    assert_eq!(m.replay(set(b"k", b"v", 4)), Replay::Discarded);
    assert!(m.get(b"k").unwrap().is_deleted());
}

// -------------------- Seek --------------------

#[test]
fn seek_without_key_starts_at_the_ends() {
    let mut m = index();
    for k in [b"b", b"d", b"f"] {
        m.set(set(k, b"v", 1));
    }
    assert_eq!(m.seek(None, Order::Gte).unwrap().key, b"b");
    assert_eq!(m.seek(None, Order::Gt).unwrap().key, b"b");
    assert_eq!(m.seek(None, Order::Lte).unwrap().key, b"f");
    assert_eq!(m.seek(None, Order::Lt).unwrap().key, b"f");
}

#[test]
fn seek_honours_bound_on_exact_match() {
    let mut m = index();
    for k in [b"b", b"d", b"f"] {
        m.set(set(k, b"v", 1));
    }
    assert_eq!(m.seek(Some(b"d"), Order::Gte).unwrap().key, b"d");
    assert_eq!(m.seek(Some(b"d"), Order::Gt).unwrap().key, b"f");
    assert_eq!(m.seek(Some(b"d"), Order::Lte).unwrap().key, b"d");
    assert_eq!(m.seek(Some(b"d"), Order::Lt).unwrap().key, b"b");
}

#[test]
fn seek_between_and_past_keys() {
    let mut m = index();
    for k in [b"b", b"d"] {
        m.set(set(k, b"v", 1));
    }
    assert_eq!(m.seek(Some(b"c"), Order::Gte).unwrap().key, b"d");
    assert_eq!(m.seek(Some(b"c"), Order::Lt).unwrap().key, b"b");
    assert!(m.seek(Some(b"e"), Order::Gt).is_none());
    assert!(m.seek(Some(b"a"), Order::Lte).is_none());
    assert!(index().seek(None, Order::Gte).is_none());
}

// -------------------- Epoch bookkeeping --------------------

#[test]
fn versions_and_removal_by_epoch() {
    let mut m = index();
    m.set(set(b"a", b"1", 1));
    m.set(set(b"b", b"2", 2));
    m.set(del(b"c", 1));

    let one = m.versions_of_epoch(1);
    assert_eq!(keys(one.iter()), vec![b"a".to_vec(), b"c".to_vec()]);

    assert_eq!(m.remove_epoch(1), 2);
    assert_eq!(m.len(), 1);
    assert_eq!(m.approx_size(), 2);
    assert!(m.get(b"a").is_none());
    assert_eq!(m.remove_epoch(1), 0);
}

// -------------------- Generations --------------------

#[test]
fn generations_swap_roles() {
    let mut g = Generations::new(Comparator::bytewise());
    assert_eq!(g.active_generation(), Generation::A);
    g.active_mut().set(set(b"k", b"old", 1));
    g.swap();
    assert_eq!(g.active_generation(), Generation::B);
    assert!(g.active().is_empty());
    assert_eq!(g.shadow().len(), 1);
    assert_eq!(g.len(), 1);
}

#[test]
fn active_generation_shadows_the_other() {
    let mut g = Generations::new(Comparator::bytewise());
    g.active_mut().set(set(b"k", b"old", 1));
    g.active_mut().set(set(b"only-old", b"x", 1));
    g.swap();
    g.active_mut().set(del(b"k", 2));

    assert!(g.get(b"k").unwrap().is_deleted());
    assert_eq!(g.get(b"only-old").unwrap().value, b"x");
    assert!(g.get(b"missing").is_none());

    g.shadow_mut().remove_epoch(1);
    g.swap();
    assert_eq!(g.active_generation(), Generation::A);
    assert!(g.shadow().get(b"k").is_some());
}
