//! Pipelined multi-slot pools.
//!
//! A pool owns one backing buffer of `slot_len × depth` bytes and hands out
//! per-slot [`ViewBuffer`]s, either by index or round-robin. Pipeline stages
//! typically call [`PipelinedPool::next`] once per step so consecutive steps
//! land in consecutive slots.
//!
//! # Backing resolution
//!
//! | Requested | Used |
//! |-----------|------|
//! | `Device` | device memory if it fits and allocation succeeds, else host memory |
//! | `Host` | host memory |
//! | `External` | caller memory, via [`PipelinedPool::from_external`] |
//! | `Remote` | a peer's memory, via [`PipelinedPool::from_remote`] |
//!
//! Device memory is best effort: running out of it downgrades the pool to
//! host memory instead of failing construction.

use super::defaults;
use super::{
    DeviceBuffer, ExternalBuffer, HostBuffer, MemoryStrategy, NetworkBuffer, RemoteBuffer,
    ViewBuffer,
};
use crate::context::NetworkContext;
use crate::error::{Error, Result};
use crate::observability;
use std::io::Write;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Geometry and strategy of a pipelined pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Bytes per slot.
    pub slot_len: usize,
    /// Number of slots.
    pub depth: usize,
    /// Requested memory strategy.
    pub strategy: MemoryStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            slot_len: defaults::DEFAULT_SLOT_LEN,
            depth: defaults::DEFAULT_PIPELINE_DEPTH,
            strategy: MemoryStrategy::Host,
        }
    }
}

impl PoolConfig {
    /// Host-backed configuration with the given geometry.
    pub fn new(slot_len: usize, depth: usize) -> Self {
        Self {
            slot_len,
            depth,
            strategy: MemoryStrategy::Host,
        }
    }

    /// Set the requested strategy.
    pub fn with_strategy(mut self, strategy: MemoryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Size of the backing buffer, or an error for empty or overflowing geometry.
    pub fn total_len(&self) -> Result<usize> {
        backing_len(self.slot_len, self.depth)
    }
}

fn backing_len(slot_len: usize, depth: usize) -> Result<usize> {
    match slot_len.checked_mul(depth) {
        Some(total) if total > 0 => Ok(total),
        _ => Err(Error::InvalidPoolGeometry { slot_len, depth }),
    }
}

/// One backing buffer sliced into `depth` equal slots.
///
/// # Example
///
/// ```rust
/// use netmem::context::{LoopbackContext, NetworkContext};
/// use netmem::memory::{MemoryStrategy, NetworkBuffer, PipelinedPool};
/// use std::sync::Arc;
///
/// let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
/// let pool = PipelinedPool::new(1024, 4, &ctx, MemoryStrategy::Host).unwrap();
///
/// let first = pool.next();
/// let second = pool.next();
/// assert_eq!(second.addr(), first.addr() + 1024);
/// assert_eq!(pool.slot(5), pool.slot(1));
/// ```
pub struct PipelinedPool {
    backing: Box<dyn NetworkBuffer>,
    requested: MemoryStrategy,
    resolved: MemoryStrategy,
    slot_len: usize,
    depth: usize,
    cur: AtomicUsize,
}

impl PipelinedPool {
    /// Allocate a pool using `strategy`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPoolGeometry`] if `slot_len` or `depth` is 0 or the
    ///   product overflows
    /// - [`Error::UnsupportedMemoryStrategy`] for `External` and `Remote`,
    ///   which need existing memory (see [`from_external`](Self::from_external)
    ///   and [`from_remote`](Self::from_remote))
    /// - host allocation or registration errors; device errors are absorbed
    ///   by the fallback
    pub fn new(
        slot_len: usize,
        depth: usize,
        ctx: &Arc<dyn NetworkContext>,
        strategy: MemoryStrategy,
    ) -> Result<Self> {
        let total = backing_len(slot_len, depth)?;
        let _span = observability::span_pool(slot_len, depth, strategy).entered();

        let (backing, resolved) = allocate_backing(total, ctx, strategy)?;
        Ok(Self::assemble(backing, strategy, resolved, slot_len, depth))
    }

    /// Allocate a pool from a [`PoolConfig`].
    pub fn from_config(config: &PoolConfig, ctx: &Arc<dyn NetworkContext>) -> Result<Self> {
        Self::new(config.slot_len, config.depth, ctx, config.strategy)
    }

    /// Build a pool over caller memory of `slot_len × depth` bytes.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `slot_len × depth` bytes
    /// and stay valid until the pool is dropped.
    pub unsafe fn from_external(
        ptr: NonNull<u8>,
        slot_len: usize,
        depth: usize,
        ctx: &Arc<dyn NetworkContext>,
    ) -> Result<Self> {
        let total = backing_len(slot_len, depth)?;
        let _span = observability::span_pool(slot_len, depth, MemoryStrategy::External).entered();

        // SAFETY: forwarded from the caller.
        let backing = unsafe { ExternalBuffer::from_raw_parts(ptr, total, ctx) }?;
        Ok(Self::assemble(
            Box::new(backing),
            MemoryStrategy::External,
            MemoryStrategy::External,
            slot_len,
            depth,
        ))
    }

    /// Build a pool describing a peer's pipelined memory.
    ///
    /// The slots address the peer's region starting at `remote`'s address;
    /// nothing is allocated or registered locally.
    pub fn from_remote(remote: &RemoteBuffer, slot_len: usize, depth: usize) -> Result<Self> {
        let total = backing_len(slot_len, depth)?;
        let backing = RemoteBuffer::with_len(remote.addr(), total, remote.rkey());
        Ok(Self::assemble(
            Box::new(backing),
            MemoryStrategy::Remote,
            MemoryStrategy::Remote,
            slot_len,
            depth,
        ))
    }

    fn assemble(
        backing: Box<dyn NetworkBuffer>,
        requested: MemoryStrategy,
        resolved: MemoryStrategy,
        slot_len: usize,
        depth: usize,
    ) -> Self {
        observability::record_pool_backing(resolved, backing.len() as f64);
        tracing::debug!(
            requested = %requested,
            resolved = %resolved,
            slot_len,
            depth,
            "pipelined pool ready"
        );
        Self {
            backing,
            requested,
            resolved,
            slot_len,
            depth,
            cur: AtomicUsize::new(0),
        }
    }

    /// View of slot `idx mod depth`. Does not move the cursor.
    #[inline]
    pub fn slot(&self, idx: usize) -> ViewBuffer<'_> {
        let offset = self.slot_len * (idx % self.depth);
        ViewBuffer::new_unchecked(self.backing.as_ref(), offset, self.slot_len)
    }

    /// View of the slot under the cursor, then advance the cursor.
    ///
    /// The cursor never resets; it is reduced modulo `depth` on use.
    #[inline]
    pub fn next(&self) -> ViewBuffer<'_> {
        let idx = self.cur.fetch_add(1, Ordering::Relaxed);
        self.slot(idx)
    }

    /// Number of slots handed out by [`next`](Self::next) so far.
    pub fn cursor(&self) -> usize {
        self.cur.load(Ordering::Relaxed)
    }

    /// Bytes per slot.
    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    /// Number of slots.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Size of the backing buffer.
    pub fn total_len(&self) -> usize {
        self.slot_len * self.depth
    }

    /// Strategy the caller asked for.
    pub fn requested(&self) -> MemoryStrategy {
        self.requested
    }

    /// Strategy actually backing the pool.
    pub fn backing(&self) -> MemoryStrategy {
        self.resolved
    }

    /// True if device memory was requested but host memory is in use.
    pub fn fell_back(&self) -> bool {
        self.requested != self.resolved
    }

    /// The backing buffer.
    pub fn backing_buffer(&self) -> &dyn NetworkBuffer {
        self.backing.as_ref()
    }

    /// Write the backing memory as `f32` values, eight per line.
    ///
    /// Diagnostic only; does not touch the cursor.
    ///
    /// # Errors
    ///
    /// - [`Error::NotCpuAccessible`] for device or remote backings
    /// - [`Error::Io`] if writing fails
    pub fn dump_f32<W: Write>(&self, out: &mut W) -> Result<()> {
        if !self.resolved.is_cpu_accessible() {
            return Err(Error::NotCpuAccessible(self.resolved));
        }
        let span = self.backing.span();
        // SAFETY: host and external backings are CPU-addressable for
        // span.len bytes, and the backing lives as long as self.
        let bytes =
            unsafe { std::slice::from_raw_parts(span.addr as usize as *const u8, span.len) };

        writeln!(out, "Pipelined Memory:")?;
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            if i % defaults::DUMP_VALUES_PER_LINE == 0 {
                writeln!(out)?;
            }
            let value = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            write!(out, "{value:.1}\t")?;
        }
        writeln!(out)?;
        Ok(())
    }
}

/// Resolve `strategy` to a backing buffer, applying the device fallback.
fn allocate_backing(
    total: usize,
    ctx: &Arc<dyn NetworkContext>,
    strategy: MemoryStrategy,
) -> Result<(Box<dyn NetworkBuffer>, MemoryStrategy)> {
    match strategy {
        MemoryStrategy::Device => {
            let available = ctx.device_memory_available();
            if available >= total {
                match DeviceBuffer::new(total, ctx) {
                    Ok(buf) => return Ok((Box::new(buf), MemoryStrategy::Device)),
                    Err(err) => tracing::warn!(
                        error = %err,
                        "device memory allocation failed, using host memory"
                    ),
                }
            } else {
                tracing::warn!(
                    requested = total,
                    available,
                    "not enough device memory, using host memory"
                );
            }
            observability::record_device_fallback();
            Ok((Box::new(HostBuffer::new(total, ctx)?), MemoryStrategy::Host))
        }
        MemoryStrategy::Host => Ok((Box::new(HostBuffer::new(total, ctx)?), MemoryStrategy::Host)),
        MemoryStrategy::External | MemoryStrategy::Remote => Err(
            Error::UnsupportedMemoryStrategy(format!("{strategy} pools need existing memory")),
        ),
    }
}

impl Drop for PipelinedPool {
    fn drop(&mut self) {
        observability::record_pool_backing(self.resolved, -(self.backing.len() as f64));
    }
}

impl std::fmt::Debug for PipelinedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinedPool")
            .field("requested", &self.requested)
            .field("resolved", &self.resolved)
            .field("slot_len", &self.slot_len)
            .field("depth", &self.depth)
            .field("cursor", &self.cursor())
            .field("backing", &self.backing.kind())
            .finish()
    }
}
