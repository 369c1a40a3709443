//! The network context: the adapter-facing side of registration.
//!
//! Buffers in [`crate::memory`] never talk to hardware directly. Everything
//! they need from the adapter (registration, on-adapter memory, the control
//! queue used for indirect registration) goes through [`NetworkContext`].
//!
//! # Implementations
//!
//! - A verbs-backed context lives with the transport layer and is not part of
//!   this crate.
//! - [`LoopbackContext`]: a software context that emulates the adapter in
//!   process. Used by the tests and by hosts without an adapter.
//!
//! # Serialization
//!
//! The control queue and its completion queue are shared by every composite
//! registration made through one context. A registration discards every
//! completion that does not carry its own request id, so callers must not run
//! two composite registrations on the same context concurrently.

mod loopback;
mod types;

pub use loopback::{CallCounts, LoopbackConfig, LoopbackContext};
pub use types::{
    AccessFlags, CompletionStatus, DescriptorList, DeviceCaps, DeviceMemory, FillRequest,
    MrHandle, RegionDescriptor, SendFlags, WorkCompletion,
};

use rustix::io::Errno;

/// Result of a single adapter primitive.
pub type ContextResult<T> = std::result::Result<T, Errno>;

/// Adapter primitives consumed by the buffer types.
///
/// Methods take `&self`; implementations synchronize internally. All calls
/// are synchronous.
pub trait NetworkContext: Send + Sync {
    /// Capability limits of the adapter.
    fn caps(&self) -> DeviceCaps;

    /// Register a process-space region for network access.
    fn register(&self, addr: u64, len: usize, access: AccessFlags) -> ContextResult<MrHandle>;

    /// Release any registration handle.
    fn deregister(&self, mr: MrHandle) -> ContextResult<()>;

    /// Bytes currently available for on-adapter allocation.
    fn device_memory_available(&self) -> usize;

    /// Allocate on-adapter memory.
    fn alloc_device_memory(&self, len: usize) -> ContextResult<DeviceMemory>;

    /// Register on-adapter memory. The resulting region starts at device address 0.
    fn register_device_memory(
        &self,
        dm: &DeviceMemory,
        len: usize,
        access: AccessFlags,
    ) -> ContextResult<MrHandle>;

    /// Return on-adapter memory.
    fn free_device_memory(&self, dm: DeviceMemory) -> ContextResult<()>;

    /// Create an empty indirect handle able to map `capacity` descriptors.
    fn create_indirect(&self, capacity: usize, access: AccessFlags) -> ContextResult<MrHandle>;

    /// Allocate an out-of-line descriptor list container.
    fn alloc_descriptor_list(&self, capacity: usize) -> ContextResult<DescriptorList>;

    /// Release a descriptor list container.
    fn free_descriptor_list(&self, list: DescriptorList) -> ContextResult<()>;

    /// Post a fill operation on the control queue.
    fn post_fill(&self, request: &FillRequest<'_>) -> ContextResult<()>;

    /// Poll the control completion queue once.
    ///
    /// Writes up to `completions.len()` entries and returns how many were
    /// written. Never blocks.
    fn poll_control(&self, completions: &mut [WorkCompletion]) -> ContextResult<usize>;
}
