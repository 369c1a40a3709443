//! Integration tests for pipelined pools.
//!
//! These verify round-robin slot rotation, backing resolution (including
//! the device-to-host fallback) and the diagnostic dump.

use netmem::Error;
use netmem::context::{LoopbackConfig, LoopbackContext, NetworkContext};
use netmem::memory::{
    BufferKind, MemoryStrategy, NetworkBuffer, PipelinedPool, PoolConfig, RemoteBuffer,
};
use rustix::io::Errno;
use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn loopback_with(config: LoopbackConfig) -> (Arc<LoopbackContext>, Arc<dyn NetworkContext>) {
    init_tracing();
    let loopback = Arc::new(LoopbackContext::with_config(config));
    let ctx: Arc<dyn NetworkContext> = loopback.clone();
    (loopback, ctx)
}

fn loopback() -> (Arc<LoopbackContext>, Arc<dyn NetworkContext>) {
    loopback_with(LoopbackConfig::default())
}

// ============================================================================
// Slot Rotation
// ============================================================================

/// `depth` consecutive calls to `next` cover every slot exactly once, then
/// wrap back to the first.
#[test]
fn test_round_robin_covers_every_slot() {
    let (_loopback, ctx) = loopback();
    let pool = PipelinedPool::new(1024, 4, &ctx, MemoryStrategy::Host).unwrap();
    let base = pool.backing_buffer().addr();

    let addrs: Vec<u64> = (0..4).map(|_| pool.next().addr()).collect();
    assert_eq!(addrs, vec![base, base + 1024, base + 2048, base + 3072]);

    let wrapped = pool.next();
    assert_eq!(wrapped.addr(), base);
    assert_eq!(pool.cursor(), 5);
}

#[test]
fn test_slot_index_wraps() {
    let (_loopback, ctx) = loopback();
    let pool = PipelinedPool::new(256, 3, &ctx, MemoryStrategy::Host).unwrap();

    for i in 0..10 {
        assert_eq!(pool.slot(i), pool.slot(i + pool.depth()));
        assert_eq!(pool.slot(i).len(), 256);
        assert_eq!(pool.slot(i).key(), pool.backing_buffer().key());
    }
}

#[test]
fn test_concurrent_next_hands_out_every_slot() {
    let (_loopback, ctx) = loopback();
    let pool = PipelinedPool::new(64, 8, &ctx, MemoryStrategy::Host).unwrap();

    let offsets: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| pool.next().offset())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: HashSet<_> = offsets.into_iter().collect();
    assert_eq!(distinct.len(), 8);
    assert_eq!(pool.cursor(), 8);
}

// ============================================================================
// Backing Resolution
// ============================================================================

#[test]
fn test_device_pool_on_device_memory() {
    let (loopback, ctx) = loopback();
    let pool = PipelinedPool::new(4096, 4, &ctx, MemoryStrategy::Device).unwrap();

    assert_eq!(pool.requested(), MemoryStrategy::Device);
    assert_eq!(pool.backing(), MemoryStrategy::Device);
    assert!(!pool.fell_back());
    assert_eq!(pool.backing_buffer().kind(), BufferKind::Device);
    assert_eq!(pool.slot(2).addr(), 8192);
    assert_eq!(loopback.device_memory_used(), 16 * 1024);

    drop(pool);
    assert_eq!(loopback.live_device_allocations(), 0);
    assert_eq!(loopback.live_registrations(), 0);
}

/// Not enough device memory: no device allocation is attempted and the
/// pool lands in host memory.
#[test]
fn test_device_pool_falls_back_when_short() {
    let (loopback, ctx) = loopback_with(LoopbackConfig::default().with_device_memory(1024));
    let pool = PipelinedPool::new(1024, 4, &ctx, MemoryStrategy::Device).unwrap();

    assert!(pool.fell_back());
    assert_eq!(pool.backing(), MemoryStrategy::Host);
    assert_eq!(pool.backing_buffer().kind(), BufferKind::Host);
    assert_eq!(pool.total_len(), 4096);

    let counts = loopback.counts();
    assert_eq!(counts.device_allocs, 0);
    assert_eq!(counts.registers, 1);
}

#[test]
fn test_device_pool_falls_back_on_allocation_failure() {
    let (loopback, ctx) = loopback();
    loopback.fail_device_alloc(Errno::NOMEM);

    let pool = PipelinedPool::new(512, 2, &ctx, MemoryStrategy::Device).unwrap();
    assert!(pool.fell_back());
    assert_eq!(loopback.counts().device_allocs, 1);
    assert_eq!(loopback.live_device_allocations(), 0);
}

#[test]
fn test_host_pool_failure_propagates() {
    let (loopback, ctx) = loopback();
    loopback.fail_register(Errno::PERM);

    let err = PipelinedPool::new(512, 2, &ctx, MemoryStrategy::Host).unwrap_err();
    assert!(matches!(err, Error::RegistrationFailed(e) if e == Errno::PERM));
}

#[test]
fn test_existing_memory_strategies_need_constructors() {
    let (loopback, ctx) = loopback();
    for strategy in [MemoryStrategy::External, MemoryStrategy::Remote] {
        let err = PipelinedPool::new(64, 2, &ctx, strategy).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMemoryStrategy(_)));
    }
    assert_eq!(loopback.counts().total(), 0);
}

#[test]
fn test_strategy_from_config_string() {
    let (_loopback, ctx) = loopback();
    let strategy: MemoryStrategy = "memic".parse().unwrap();
    let config = PoolConfig::new(128, 2).with_strategy(strategy);

    let pool = PipelinedPool::from_config(&config, &ctx).unwrap();
    assert_eq!(pool.requested(), MemoryStrategy::Device);
    assert!(matches!(
        "gpu".parse::<MemoryStrategy>(),
        Err(Error::UnsupportedMemoryStrategy(_))
    ));
}

#[test]
fn test_external_pool() {
    let (loopback, ctx) = loopback();
    let mut memory = vec![0u8; 2048];
    let ptr = NonNull::new(memory.as_mut_ptr()).unwrap();

    {
        // SAFETY: `memory` outlives the pool and is not touched meanwhile.
        let pool = unsafe { PipelinedPool::from_external(ptr, 512, 4, &ctx) }.unwrap();
        assert_eq!(pool.backing(), MemoryStrategy::External);
        assert_eq!(pool.slot(1).addr(), ptr.as_ptr() as u64 + 512);
        assert_eq!(loopback.live_registrations(), 1);
    }

    assert_eq!(loopback.live_registrations(), 0);
    assert_eq!(memory.len(), 2048);
}

#[test]
fn test_remote_pool_makes_no_calls() {
    let (loopback, _ctx) = loopback();
    let peer = RemoteBuffer::new(0x7f00_0000, 1234);

    let pool = PipelinedPool::from_remote(&peer, 4096, 2).unwrap();
    assert_eq!(pool.backing(), MemoryStrategy::Remote);
    assert_eq!(pool.next().span().addr, 0x7f00_0000);
    assert_eq!(pool.next().span().addr, 0x7f00_1000);
    assert_eq!(pool.slot(0).key(), 1234);
    assert!(pool.slot(0).mr().is_none());
    assert_eq!(loopback.counts().total(), 0);
}

// ============================================================================
// Dump
// ============================================================================

#[test]
fn test_dump_prints_eight_values_per_line() {
    let (_loopback, ctx) = loopback();
    let mut memory: Vec<f32> = (0..16).map(|v| v as f32).collect();
    let ptr = NonNull::new(memory.as_mut_ptr().cast::<u8>()).unwrap();

    // SAFETY: `memory` holds 64 bytes and outlives the pool.
    let pool = unsafe { PipelinedPool::from_external(ptr, 32, 2, &ctx) }.unwrap();
    let mut out = Vec::new();
    pool.dump_f32(&mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Pipelined Memory:");
    assert_eq!(lines[1], "");
    assert_eq!(lines[2], "0.0\t1.0\t2.0\t3.0\t4.0\t5.0\t6.0\t7.0\t");
    assert_eq!(lines[3], "8.0\t9.0\t10.0\t11.0\t12.0\t13.0\t14.0\t15.0\t");
    assert_eq!(lines.len(), 4);
    assert_eq!(pool.cursor(), 0);
}

#[test]
fn test_dump_rejects_device_memory() {
    let (_loopback, ctx) = loopback();
    let pool = PipelinedPool::new(64, 2, &ctx, MemoryStrategy::Device).unwrap();

    let mut out = Vec::new();
    let err = pool.dump_f32(&mut out).unwrap_err();
    assert!(matches!(err, Error::NotCpuAccessible(MemoryStrategy::Device)));
    assert!(out.is_empty());
}
