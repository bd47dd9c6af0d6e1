use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relativistic_ht::{table, NodeHeader};
use std::mem::offset_of;
use std::ptr::NonNull;

struct Entry {
    value: u64,
    node: NodeHeader,
}

fn entry_of(node: &NodeHeader) -> &Entry {
    // SAFETY: every node in these benches is embedded in an `Entry`.
    unsafe {
        &*(node as *const NodeHeader)
            .byte_sub(offset_of!(Entry, node))
            .cast::<Entry>()
    }
}

fn hash_of(value: u64) -> u64 {
    value.wrapping_mul(0x9e3779b97f4a7c15)
}

fn find_hit_16k(c: &mut Criterion) {
    let entries: Vec<Entry> = (0..16384)
        .map(|value| Entry {
            value,
            node: NodeHeader::new(),
        })
        .collect();
    let (mut writer, reader) = table();
    for entry in &entries {
        // SAFETY: `entries` outlives the table handles and is never moved.
        let inserted = unsafe {
            writer.try_insert(NonNull::from(&entry.node), hash_of(entry.value), |n| {
                entry_of(n).value == entry.value
            })
        };
        assert!(inserted);
    }

    let mut i = 0u64;
    c.bench_function("find_hit_16k", |b| {
        b.iter(|| {
            i = (i + 1) & 16383;
            let guard = reader.read();
            black_box(
                guard
                    .find(hash_of(i), |n| entry_of(n).value == i)
                    .is_some(),
            )
        })
    });
}

fn detach_sync_reinsert(c: &mut Criterion) {
    let entries: Vec<Entry> = (0..1024)
        .map(|value| Entry {
            value,
            node: NodeHeader::new(),
        })
        .collect();
    let (mut writer, _reader) = table();
    for entry in &entries {
        // SAFETY: `entries` outlives the table handles and is never moved.
        unsafe { writer.insert_unchecked(NonNull::from(&entry.node), hash_of(entry.value)) };
    }

    let mut i = 0usize;
    c.bench_function("detach_sync_reinsert", |b| {
        b.iter(|| {
            i = (i + 1) & 1023;
            let entry = &entries[i];
            let node = writer
                .try_detach_and_synchronize(hash_of(entry.value), |n| {
                    entry_of(n).value == entry.value
                })
                .unwrap();
            // SAFETY: just detached, and the grace period has elapsed.
            unsafe { writer.insert_unchecked(node, hash_of(entry.value)) };
        })
    });
}

criterion_group!(benches, find_hit_16k, detach_sync_reinsert);
criterion_main!(benches);
