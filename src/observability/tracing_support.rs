//! Tracing integration for structured logging and spans.

use crate::memory::{BufferKind, MemoryStrategy};
use tracing::{Level, Span, span};

/// Create a span covering one buffer registration.
#[inline]
pub fn span_registration(kind: BufferKind, len: usize) -> Span {
    span!(Level::DEBUG, "register", kind = %kind, len = len)
}

/// Create a span covering one composite (indirect) registration.
#[inline]
pub fn span_composite(parts: usize) -> Span {
    span!(Level::DEBUG, "register_indirect", parts = parts)
}

/// Create a span covering pool construction.
#[inline]
pub fn span_pool(slot_len: usize, depth: usize, strategy: MemoryStrategy) -> Span {
    span!(
        Level::DEBUG,
        "pipelined_pool",
        slot_len = slot_len,
        depth = depth,
        strategy = %strategy
    )
}

/// Log a completed registration.
#[inline]
pub fn trace_registered(kind: BufferKind, addr: u64, len: usize, lkey: u32) {
    tracing::debug!(
        kind = %kind,
        addr = addr,
        len = len,
        lkey = lkey,
        "buffer registered"
    );
}

/// Log a release that the context refused. Drop cannot propagate it.
#[inline]
pub fn trace_release_failed(kind: BufferKind, what: &str, error: &dyn std::error::Error) {
    tracing::warn!(
        kind = %kind,
        resource = what,
        error = %error,
        "failed to release adapter resource"
    );
}
