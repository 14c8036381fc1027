//! Pins the `print_stats` text block, which downstream log tooling scrapes
//! by field name.

#![cfg(debug_assertions)]

use insta::assert_snapshot;

use crate::{ObjectPool, PoolConfig};

#[test]
fn stats_block_format() {
    let pool: ObjectPool<u64> = ObjectPool::with_config(PoolConfig {
        chunk_blocks: 10,
        max_chunks: 2,
        thread_local: false,
    });
    let slot = pool.construct(5).unwrap();

    let mut out = Vec::new();
    pool.print_stats(&mut out).unwrap();

    assert_snapshot!(String::from_utf8(out).unwrap(), @r"
    Memory Pool Stats:
      Total blocks: 10
      Free blocks: 9
      Allocated blocks: 1
      Block size: 8 bytes
      Alignment: 8 bytes
      Chunks allocated: 1 (max: 2)
      Memory usage: 0.078125 KB
      Thread local storage: Disabled
      Currently allocated objects: 1
    ");

    unsafe { pool.destroy(slot) };
}

#[test]
fn stats_block_format_unbounded() {
    let pool: ObjectPool<u64> = ObjectPool::with_config(PoolConfig {
        chunk_blocks: 10,
        max_chunks: 0,
        thread_local: true,
    });

    let mut out = Vec::new();
    pool.print_stats(&mut out).unwrap();

    assert_snapshot!(String::from_utf8(out).unwrap(), @r"
    Memory Pool Stats:
      Total blocks: 10
      Free blocks: 10
      Allocated blocks: 0
      Block size: 8 bytes
      Alignment: 8 bytes
      Chunks allocated: 1
      Memory usage: 0.078125 KB
      Thread local storage: Enabled
      Currently allocated objects: 0
    ");
}
