use config::Config;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Db, Order};
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn key(i: usize) -> Vec<u8> {
    format!("key{i:06}").into_bytes()
}

fn open(dir: &std::path::Path) -> Db {
    Db::open(Config::builder(dir).merge(false).build()).unwrap()
}

fn filled(dir: &std::path::Path, merged: bool) -> Db {
    let db = open(dir);
    let value = vec![b'x'; VALUE_SIZE];
    for i in 0..N_KEYS {
        db.set(&key(i), &value).unwrap();
    }
    if merged {
        db.merge_force().unwrap();
    }
    db
}

fn set_benchmark(c: &mut Criterion) {
    c.bench_function("db_set_10k", |b| {
        b.iter_batched(
            || tempdir().unwrap(),
            |dir| {
                let db = filled(dir.path(), false);
                db.close().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn merge_benchmark(c: &mut Criterion) {
    c.bench_function("db_merge_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let db = filled(dir.path(), false);
                (dir, db)
            },
            |(_dir, db)| db.merge_force().unwrap(),
            BatchSize::SmallInput,
        );
    });
}

fn get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let memory = filled(&dir.path().join("memory"), false);
    let pages = filled(&dir.path().join("pages"), true);

    c.bench_function("db_get_hit_memory_10k", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % N_KEYS;
            memory.get(&key(i)).unwrap()
        });
    });
    c.bench_function("db_get_hit_pages_10k", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % N_KEYS;
            pages.get(&key(i)).unwrap()
        });
    });
    c.bench_function("db_get_miss_pages", |b| {
        b.iter(|| pages.get(b"nope").unwrap());
    });
}

fn cursor_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = filled(dir.path(), true);
    for i in (0..N_KEYS).step_by(10) {
        db.set(&key(i), b"updated").unwrap();
    }

    c.bench_function("db_cursor_full_10k", |b| {
        b.iter(|| db.cursor(Order::Gte, None).unwrap().count());
    });
    c.bench_function("db_cursor_reverse_10k", |b| {
        b.iter(|| db.cursor(Order::Lte, None).unwrap().count());
    });
}

criterion_group!(
    benches,
    set_benchmark,
    merge_benchmark,
    get_benchmark,
    cursor_benchmark
);
criterion_main!(benches);
