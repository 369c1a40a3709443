//! Error types for netmem.

use crate::context::CompletionStatus;
use crate::memory::MemoryStrategy;
use rustix::io::Errno;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using netmem's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for buffer construction and registration.
///
/// Every constructor that returns one of these has already released whatever
/// it acquired before the failing step.
#[derive(Error, Debug)]
pub enum Error {
    /// A buffer was requested with zero length.
    #[error("buffer length must be greater than 0")]
    ZeroLength,

    /// Host memory allocation failed.
    #[error("host memory allocation of {len} bytes failed: {source}")]
    AllocationFailed {
        /// Requested size in bytes.
        len: usize,
        /// Underlying errno.
        #[source]
        source: Errno,
    },

    /// Registering host or caller memory with the adapter failed.
    #[error("memory registration failed: {0}")]
    RegistrationFailed(#[source] Errno),

    /// On-adapter memory allocation failed.
    #[error("device memory allocation of {len} bytes failed: {source}")]
    DeviceAllocationFailed {
        /// Requested size in bytes.
        len: usize,
        /// Underlying errno.
        #[source]
        source: Errno,
    },

    /// Registering on-adapter memory failed.
    #[error("device memory registration failed: {0}")]
    DeviceRegistrationFailed(#[source] Errno),

    /// A composite buffer was requested over no constituents.
    #[error("composite registration needs at least one buffer")]
    EmptyComposite,

    /// A composite buffer has more constituents than the adapter can index.
    #[error("composite of {requested} buffers exceeds indirect list capacity of {max}")]
    CapacityExceeded {
        /// Number of constituents requested.
        requested: usize,
        /// Adapter limit.
        max: usize,
    },

    /// A composite constituent carries no local registration (e.g. a remote buffer).
    #[error("composite constituent {index} has no local registration")]
    MissingRegistration {
        /// Position of the offending constituent.
        index: usize,
    },

    /// The out-of-line descriptor list could not be allocated.
    #[error("descriptor list allocation failed: {0}")]
    ContainerAllocationFailed(#[source] Errno),

    /// The indirect registration handle could not be created.
    #[error("indirect handle creation failed: {0}")]
    CreateHandleFailed(#[source] Errno),

    /// Posting the fill operation to the control queue failed.
    #[error("fill operation submission failed with status {status}")]
    ControlSubmitFailed {
        /// Raw status code returned by the submission call.
        status: i32,
    },

    /// Polling the control completion queue failed.
    #[error("control completion queue poll failed: {0}")]
    PollFailed(#[source] Errno),

    /// The fill operation completed with a non-success status.
    #[error("fill operation completed with status {status:?}")]
    CompletionError {
        /// Status reported by the completion.
        status: CompletionStatus,
    },

    /// No control completion arrived before the poll deadline.
    #[error("no control completion within {0:?}")]
    PollTimeout(Duration),

    /// The requested memory strategy cannot be used here.
    #[error("unsupported memory strategy: {0}")]
    UnsupportedMemoryStrategy(String),

    /// A sub-range does not fit inside its parent span.
    #[error("range {offset}+{len} exceeds span of {bound} bytes")]
    OutOfRange {
        /// Requested offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Length of the parent span.
        bound: usize,
    },

    /// Slot length or depth is zero, or their product overflows.
    #[error("invalid pool geometry: {slot_len} x {depth}")]
    InvalidPoolGeometry {
        /// Bytes per slot.
        slot_len: usize,
        /// Number of slots.
        depth: usize,
    },

    /// The memory cannot be read by the CPU.
    #[error("{0} memory is not CPU-accessible")]
    NotCpuAccessible(MemoryStrategy),

    /// I/O error while writing diagnostics.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
