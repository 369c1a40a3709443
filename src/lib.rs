//! # netmem
//!
//! Registered memory for zero-copy network transfer.
//!
//! A transfer layer posting RDMA-style work requests needs, for every
//! buffer it touches, a base address, a length and an access key. netmem
//! produces those from memory of any provenance behind one trait:
//!
//! - **Owned memory**: host allocations and on-adapter (device) memory
//! - **Borrowed memory**: caller buffers, views into other buffers
//! - **Peer memory**: remote address + key pairs
//! - **Composite memory**: several registrations behind one indirect key
//! - **Pipelined pools**: one registration sliced into round-robin slots,
//!   with device memory falling back to host memory when scarce
//!
//! The adapter itself is reached through [`context::NetworkContext`]; a
//! software [`context::LoopbackContext`] stands in for it in tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use netmem::prelude::*;
//! use std::sync::Arc;
//!
//! let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
//!
//! let a = HostBuffer::new(1024, &ctx)?;
//! let b = HostBuffer::new(1024, &ctx)?;
//! let composite = CompositeBuffer::new(&[&a, &b], &ctx)?;
//!
//! let span = composite.span();
//! assert_eq!(span.addr, a.addr());
//! # Ok::<(), netmem::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod context;
pub mod error;
pub mod memory;
pub mod observability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::context::{LoopbackContext, MrHandle, NetworkContext};
    pub use crate::error::{Error, Result};
    pub use crate::memory::{
        CompositeBuffer, DeviceBuffer, ExternalBuffer, HostBuffer, MemoryStrategy, NetworkBuffer,
        PipelinedPool, PoolConfig, RemoteBuffer, Span, ViewBuffer,
    };
}

pub use error::{Error, Result};
