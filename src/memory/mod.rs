//! Registered network memory.
//!
//! Every buffer type here presents the same contract to the transfer layer:
//! a [`Span`] (address, length, key) and, when registered locally, the
//! [`MrHandle`](crate::context::MrHandle) behind it.
//!
//! # Architecture
//!
//! - [`NetworkBuffer`]: Trait shared by every buffer variant
//! - [`HostBuffer`]: Host memory, allocated and registered
//! - [`DeviceBuffer`]: On-adapter memory, allocated and registered
//! - [`ExternalBuffer`]: Caller memory, registered but never freed
//! - [`RemoteBuffer`]: A peer's memory, never registered locally
//! - [`ViewBuffer`]: Borrowed sub-range of another buffer
//! - [`CompositeBuffer`]: Several buffers behind one indirect key
//! - [`PipelinedPool`]: One backing buffer sliced into round-robin slots
//!
//! # Ownership
//!
//! Only the buffer that created a registration releases it. Views and
//! composites borrow their parents and constituents, so the borrow checker
//! keeps registrations alive for as long as anything refers to them.
//!
//! # Example
//!
//! ```rust
//! use netmem::context::{LoopbackContext, NetworkContext};
//! use netmem::memory::{MemoryStrategy, NetworkBuffer, PipelinedPool};
//! use std::sync::Arc;
//!
//! let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
//!
//! // Four 16KB slots, on the adapter if it has room
//! let pool = PipelinedPool::new(16 * 1024, 4, &ctx, MemoryStrategy::Device).unwrap();
//!
//! // Successive pipeline steps take successive slots
//! let step = pool.next();
//! assert_eq!(step.len(), 16 * 1024);
//! ```

mod composite;
pub mod defaults;
mod device;
mod external;
mod host;
mod pipelined;
mod remote;
mod span;
mod strategy;
mod view;

pub use composite::{CompositeBuffer, PollPolicy};
pub use device::DeviceBuffer;
pub use external::ExternalBuffer;
pub use host::HostBuffer;
pub use pipelined::{PipelinedPool, PoolConfig};
pub use remote::RemoteBuffer;
pub use span::{BufferKind, NetworkBuffer, Span};
pub use strategy::MemoryStrategy;
pub use view::ViewBuffer;
