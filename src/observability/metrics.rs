//! Metrics collection using metrics-rs.

use crate::memory::{BufferKind, MemoryStrategy};
use metrics::{Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const REGISTRATIONS: &str = "netmem_registrations";
const DEREGISTRATIONS: &str = "netmem_deregistrations";
const REGISTERED_BYTES: &str = "netmem_registered_bytes";
const REGISTRATION_FAILURES: &str = "netmem_registration_failures";
const DEVICE_FALLBACKS: &str = "netmem_device_fallbacks";
const COMPOSITE_POLL_SPINS: &str = "netmem_composite_poll_spins";
const POOL_BACKING_BYTES: &str = "netmem_pool_backing_bytes";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        REGISTRATIONS,
        Unit::Count,
        "Registration handles created, by buffer kind"
    );
    metrics::describe_counter!(
        DEREGISTRATIONS,
        Unit::Count,
        "Registration handles released, by buffer kind"
    );
    metrics::describe_counter!(
        REGISTERED_BYTES,
        Unit::Bytes,
        "Total bytes registered, by buffer kind"
    );
    metrics::describe_counter!(
        REGISTRATION_FAILURES,
        Unit::Count,
        "Buffer constructions that failed, by buffer kind"
    );
    metrics::describe_counter!(
        DEVICE_FALLBACKS,
        Unit::Count,
        "Pools that requested device memory and got host memory"
    );
    metrics::describe_histogram!(
        COMPOSITE_POLL_SPINS,
        Unit::Count,
        "Empty polls before the fill completion arrived"
    );
    metrics::describe_gauge!(
        POOL_BACKING_BYTES,
        Unit::Bytes,
        "Bytes held by pipelined pool backings, by resolved strategy"
    );
}

/// Record a new registration.
#[inline]
pub fn record_registration(kind: BufferKind, bytes: usize) {
    counter!(REGISTRATIONS, "kind" => kind.as_str()).increment(1);
    counter!(REGISTERED_BYTES, "kind" => kind.as_str()).increment(bytes as u64);
}

/// Record a released registration.
#[inline]
pub fn record_deregistration(kind: BufferKind) {
    counter!(DEREGISTRATIONS, "kind" => kind.as_str()).increment(1);
}

/// Record a failed buffer construction.
#[inline]
pub fn record_registration_failure(kind: BufferKind) {
    counter!(REGISTRATION_FAILURES, "kind" => kind.as_str()).increment(1);
}

/// Record a device-to-host fallback.
#[inline]
pub fn record_device_fallback() {
    counter!(DEVICE_FALLBACKS).increment(1);
}

/// Record how many empty polls a composite registration spun through.
#[inline]
pub fn record_poll_spins(spins: u64) {
    histogram!(COMPOSITE_POLL_SPINS).record(spins as f64);
}

/// Adjust the pool backing gauge (positive on creation, negative on drop).
#[inline]
pub fn record_pool_backing(strategy: MemoryStrategy, delta: f64) {
    gauge!(POOL_BACKING_BYTES, "strategy" => strategy.as_str()).increment(delta);
}
