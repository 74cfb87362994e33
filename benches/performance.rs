//! Performance benchmarks for stores and tables.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logtable::{MemStore, MemoryTransport, Message, Store, Table, TableConfig, Transport};
use std::sync::Arc;

fn set_update(store: &dyn Store, msg: &Message) {
    let _ = store.set(&msg.payload[..8], &msg.payload);
}

fn payload(i: u64) -> Vec<u8> {
    let mut p = i.to_be_bytes().to_vec();
    p.extend_from_slice(&[0u8; 56]);
    p
}

/// Benchmark point reads against stores of varying size
fn bench_store_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_get");

    for size in [100u64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("keys", size), &size, |b, &size| {
            let store = MemStore::new();
            for i in 0..size {
                store.set(&i.to_be_bytes(), &payload(i)).unwrap();
            }

            let mut i = 0u64;
            b.iter(|| {
                i = (i + 7919) % size;
                black_box(store.get(&i.to_be_bytes()).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_store_set(c: &mut Criterion) {
    c.bench_function("store_set", |b| {
        let store = MemStore::new();
        let value = payload(0);
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 1) % 10_000;
            store.set(&i.to_be_bytes(), black_box(&value)).unwrap();
        });
    });
}

/// Benchmark a full replay of a channel backlog into a fresh table
fn bench_table_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_replay");
    group.sample_size(20);

    for backlog in [100u64, 1_000, 10_000] {
        let transport = MemoryTransport::new();
        let channel = format!("replay-{backlog}");
        for i in 0..backlog {
            transport.publish(&channel, &payload(i)).unwrap();
        }

        group.bench_with_input(
            BenchmarkId::new("messages", backlog),
            &backlog,
            |b, &backlog| {
                b.iter(|| {
                    let table = Table::new(Arc::new(transport.clone()), TableConfig::new(&channel))
                        .with_update_fn(set_update);
                    table.open().unwrap();
                    while table.position().0 < backlog {
                        std::thread::yield_now();
                    }
                    table.close().unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_store_get,
    bench_store_set,
    bench_table_replay
);
criterion_main!(benches);
