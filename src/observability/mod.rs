//! Observability features: metrics and tracing.
//!
//! - **Metrics**: Counters, gauges, and histograms via `metrics-rs`
//! - **Tracing**: Structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `netmem_registrations` | Counter | Handles created, by kind |
//! | `netmem_deregistrations` | Counter | Handles released, by kind |
//! | `netmem_registered_bytes` | Counter | Bytes registered, by kind |
//! | `netmem_registration_failures` | Counter | Failed constructions, by kind |
//! | `netmem_device_fallbacks` | Counter | Device pools downgraded to host memory |
//! | `netmem_composite_poll_spins` | Histogram | Empty polls per composite registration |
//! | `netmem_pool_backing_bytes` | Gauge | Pool backing bytes, by resolved strategy |
//!
//! ## Tracing
//!
//! Spans are emitted for registrations, composite registrations and pool
//! construction. Failed releases in `Drop` are logged at `warn`.

mod metrics;
mod tracing_support;

pub use metrics::{
    init_metrics, record_deregistration, record_device_fallback, record_poll_spins,
    record_pool_backing, record_registration, record_registration_failure,
};
pub use tracing_support::{
    span_composite, span_pool, span_registration, trace_registered, trace_release_failed,
};
