//! Device memory buffer: memory resident on the adapter itself.
//!
//! On-adapter memory avoids a PCIe round trip for small, hot buffers, but it
//! is scarce (typically a few hundred KB per adapter). The span address is
//! device-space and starts at 0; the CPU cannot dereference it.

use super::{BufferKind, NetworkBuffer, Span};
use crate::context::{AccessFlags, DeviceMemory, MrHandle, NetworkContext};
use crate::error::{Error, Result};
use crate::observability;
use std::sync::Arc;

/// A registered buffer backed by on-adapter memory.
///
/// Dropping the buffer deregisters it, then returns the memory to the adapter.
pub struct DeviceBuffer {
    /// `None` only while dropping.
    dm: Option<DeviceMemory>,
    len: usize,
    mr: MrHandle,
    ctx: Arc<dyn NetworkContext>,
}

impl DeviceBuffer {
    /// Allocate `len` bytes of device memory and register them.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroLength`] if `len` is 0
    /// - [`Error::DeviceAllocationFailed`] if the adapter has no room
    /// - [`Error::DeviceRegistrationFailed`] if registration fails; the
    ///   device memory is returned first
    pub fn new(len: usize, ctx: &Arc<dyn NetworkContext>) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroLength);
        }
        let _span = observability::span_registration(BufferKind::Device, len).entered();

        let dm = ctx.alloc_device_memory(len).map_err(|source| {
            observability::record_registration_failure(BufferKind::Device);
            Error::DeviceAllocationFailed { len, source }
        })?;

        let mr = match ctx.register_device_memory(&dm, len, AccessFlags::DEFAULT) {
            Ok(mr) => mr,
            Err(errno) => {
                if let Err(free_err) = ctx.free_device_memory(dm) {
                    observability::trace_release_failed(
                        BufferKind::Device,
                        "device memory",
                        &free_err,
                    );
                }
                observability::record_registration_failure(BufferKind::Device);
                return Err(Error::DeviceRegistrationFailed(errno));
            }
        };

        observability::record_registration(BufferKind::Device, len);
        observability::trace_registered(BufferKind::Device, 0, len, mr.lkey());

        Ok(Self {
            dm: Some(dm),
            len,
            mr,
            ctx: Arc::clone(ctx),
        })
    }

    /// The underlying device allocation.
    pub fn device_memory(&self) -> Option<&DeviceMemory> {
        self.dm.as_ref()
    }
}

impl NetworkBuffer for DeviceBuffer {
    fn span(&self) -> Span {
        Span::new(0, self.len, self.mr.lkey())
    }

    fn mr(&self) -> Option<MrHandle> {
        Some(self.mr)
    }

    fn kind(&self) -> BufferKind {
        BufferKind::Device
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        match self.ctx.deregister(self.mr) {
            Ok(()) => observability::record_deregistration(BufferKind::Device),
            Err(errno) => {
                observability::trace_release_failed(BufferKind::Device, "registration", &errno)
            }
        }
        if let Some(dm) = self.dm.take() {
            if let Err(errno) = self.ctx.free_device_memory(dm) {
                observability::trace_release_failed(BufferKind::Device, "device memory", &errno);
            }
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len)
            .field("lkey", &self.mr.lkey())
            .field("dm", &self.dm)
            .finish()
    }
}
