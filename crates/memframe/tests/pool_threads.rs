//! Concurrent pool exercise: many threads allocating, releasing, and
//! reallocating through their own caches must leave the global counters
//! consistent once everything quiesces.

use std::ptr::NonNull;

use memframe::{ObjectPool, PoolConfig};

#[derive(Debug)]
struct Record {
    id: u64,
    tag: &'static str,
}

fn churn(pool: &ObjectPool<Record>, thread_id: u64, items: usize) {
    let mut live: Vec<Option<NonNull<Record>>> = Vec::with_capacity(items);
    for i in 0..items {
        let record = pool
            .construct(Record {
                id: thread_id * 10_000 + i as u64,
                tag: "thread",
            })
            .expect("pool should grow on demand");
        live.push(Some(record));
    }

    // Free every other record, then fill the gaps back in.
    for slot in live.iter_mut().step_by(2) {
        let record = slot.take().expect("slot filled above");
        unsafe { pool.destroy(record) };
    }
    for (i, slot) in live.iter_mut().enumerate().step_by(2) {
        *slot = Some(
            pool.construct(Record {
                id: thread_id * 20_000 + i as u64,
                tag: "realloc",
            })
            .expect("freed slots should be reusable"),
        );
    }

    for slot in live.into_iter().flatten() {
        unsafe {
            let record = slot.as_ref();
            assert!(matches!(record.tag, "thread" | "realloc"));
            assert!(record.id % 10_000 < items as u64);
            pool.destroy(slot);
        }
    }
}

#[test]
fn multithreaded_churn_with_thread_caches() {
    const THREADS: u64 = 4;
    const ITEMS: usize = 1000;

    let pool: ObjectPool<Record> = ObjectPool::with_config(PoolConfig {
        chunk_blocks: ITEMS,
        ..PoolConfig::default()
    });
    pool.reserve(THREADS as usize + 1).expect("reserve within unbounded pool");

    std::thread::scope(|scope| {
        for thread_id in 0..THREADS {
            let pool = &pool;
            scope.spawn(move || churn(pool, thread_id, ITEMS));
        }
    });

    assert_eq!(pool.allocated_count(), 0);
    assert_eq!(pool.free_count(), pool.total_count());
    assert!(pool.total_count() >= THREADS as usize * ITEMS / 2);
}

#[test]
fn multithreaded_churn_on_the_global_list() {
    let pool: ObjectPool<Record> = ObjectPool::with_config(PoolConfig {
        chunk_blocks: 64,
        max_chunks: 0,
        thread_local: false,
    });

    std::thread::scope(|scope| {
        for thread_id in 0..4 {
            let pool = &pool;
            scope.spawn(move || churn(pool, thread_id, 200));
        }
    });

    assert_eq!(pool.allocated_count(), 0);
    assert_eq!(pool.free_count(), pool.total_count());
}

#[test]
fn shared_handles_move_between_threads() {
    let pool: ObjectPool<String> = ObjectPool::with_config(PoolConfig {
        chunk_blocks: 16,
        ..PoolConfig::default()
    });

    std::thread::scope(|scope| {
        for i in 0..8 {
            let handle = pool.share(format!("value-{i}")).expect("pool has room");
            scope.spawn(move || {
                assert_eq!(*handle, format!("value-{i}"));
            });
        }
    });

    assert_eq!(pool.allocated_count(), 0);
    assert_eq!(pool.free_count(), pool.total_count());
}
