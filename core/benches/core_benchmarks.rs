use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tether_core::{ArrayPool, FixedByteBufferPool, PooledMap, PooledVec, StringPool};

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

fn bench_pooled_vec_churn(c: &mut Criterion) {
    let pool = Arc::new(ArrayPool::new());
    c.bench_function("pooled_vec_push_clear_64", |b| {
        let mut vec = PooledVec::new_in(pool.clone());
        b.iter(|| {
            for i in 0..64u64 {
                vec.push(black_box(i));
            }
            vec.clear();
        });
    });
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

fn bench_pooled_map_insert_remove(c: &mut Criterion) {
    c.bench_function("pooled_map_insert_remove_256", |b| {
        let mut map = PooledMap::new();
        b.iter(|| {
            for i in 0..256u64 {
                let _ = map.insert(black_box(i), i);
            }
            for i in 0..256u64 {
                black_box(map.remove(&i));
            }
        });
    });
}

fn bench_pooled_map_lookup(c: &mut Criterion) {
    let mut map = PooledMap::new();
    for i in 0..1024u64 {
        let _ = map.insert(i, i * 3);
    }
    c.bench_function("pooled_map_lookup_1024", |b| {
        b.iter(|| {
            for i in 0..1024u64 {
                black_box(map.get(&black_box(i)));
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Byte buffers and strings
// ---------------------------------------------------------------------------

fn bench_byte_buffer_rent_return(c: &mut Criterion) {
    let mut pool = FixedByteBufferPool::new(64 * 1024);
    let payload = vec![7u8; 4096];
    c.bench_function("fixed_byte_buffer_rent_copy_return_4k", |b| {
        b.iter(|| {
            if let Ok(buffer) = pool.rent_and_copy(black_box(&payload)) {
                let _ = pool.give_back(buffer);
            }
        });
    });
}

fn bench_string_pool_rename(c: &mut Criterion) {
    let mut pool = StringPool::new();
    c.bench_function("string_pool_rename", |b| {
        b.iter(|| {
            let name = pool.rent_and_copy(black_box("Material 0042"));
            let _ = pool.give_back(name);
        });
    });
}

criterion_group!(vectors, bench_pooled_vec_churn);
criterion_group!(maps, bench_pooled_map_insert_remove, bench_pooled_map_lookup);
criterion_group!(
    scratch,
    bench_byte_buffer_rent_return,
    bench_string_pool_rename
);
criterion_main!(vectors, maps, scratch);
