//! Host memory buffer: allocated here, registered here.

use super::{BufferKind, NetworkBuffer, Span};
use crate::context::{AccessFlags, MrHandle, NetworkContext};
use crate::error::{Error, Result};
use crate::observability;
use rustix::io::Errno;
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;
use std::sync::Arc;

/// A registered buffer backed by an anonymous host mapping.
///
/// The memory is zero-initialized and page-aligned. Dropping the buffer
/// deregisters it, then unmaps the memory.
///
/// # Example
///
/// ```rust
/// use netmem::context::{LoopbackContext, NetworkContext};
/// use netmem::memory::{HostBuffer, NetworkBuffer};
/// use std::sync::Arc;
///
/// let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
/// let buf = HostBuffer::new(4096, &ctx).unwrap();
/// assert_eq!(buf.len(), 4096);
/// assert!(buf.mr().is_some());
/// ```
pub struct HostBuffer {
    ptr: NonNull<u8>,
    len: usize,
    mr: MrHandle,
    ctx: Arc<dyn NetworkContext>,
}

impl HostBuffer {
    /// Allocate `len` bytes and register them.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroLength`] if `len` is 0
    /// - [`Error::AllocationFailed`] if the mapping fails
    /// - [`Error::RegistrationFailed`] if registration fails; the mapping is
    ///   released first
    pub fn new(len: usize, ctx: &Arc<dyn NetworkContext>) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroLength);
        }
        let _span = observability::span_registration(BufferKind::Host, len).entered();

        let ptr = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::PRIVATE,
            )
        }
        .map_err(|source| {
            observability::record_registration_failure(BufferKind::Host);
            Error::AllocationFailed { len, source }
        })?;
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or(Error::AllocationFailed {
            len,
            source: Errno::NOMEM,
        })?;

        let mr = match ctx.register(ptr.as_ptr() as u64, len, AccessFlags::DEFAULT) {
            Ok(mr) => mr,
            Err(errno) => {
                // SAFETY: the mapping was created above and nothing else refers to it.
                unsafe { unmap(ptr, len) };
                observability::record_registration_failure(BufferKind::Host);
                return Err(Error::RegistrationFailed(errno));
            }
        };

        observability::record_registration(BufferKind::Host, len);
        observability::trace_registered(BufferKind::Host, ptr.as_ptr() as u64, len, mr.lkey());

        Ok(Self {
            ptr,
            len,
            mr,
            ctx: Arc::clone(ctx),
        })
    }

    /// Get a raw pointer to the start of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Get a mutable raw pointer to the start of the buffer.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Get the buffer as a byte slice.
    ///
    /// The adapter may write into registered memory at any time; reading
    /// while a transfer targets the buffer observes whatever has landed.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Get the buffer as a mutable byte slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes, and we have &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Unmap an anonymous mapping created by [`HostBuffer::new`].
///
/// # Safety
///
/// `ptr`/`len` must describe a live mapping with no remaining references.
unsafe fn unmap(ptr: NonNull<u8>, len: usize) {
    if let Err(errno) = unsafe { rustix::mm::munmap(ptr.as_ptr().cast(), len) } {
        observability::trace_release_failed(BufferKind::Host, "host mapping", &errno);
    }
}

impl NetworkBuffer for HostBuffer {
    fn span(&self) -> Span {
        Span::new(self.ptr.as_ptr() as u64, self.len, self.mr.lkey())
    }

    fn mr(&self) -> Option<MrHandle> {
        Some(self.mr)
    }

    fn kind(&self) -> BufferKind {
        BufferKind::Host
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        match self.ctx.deregister(self.mr) {
            Ok(()) => observability::record_deregistration(BufferKind::Host),
            Err(errno) => {
                observability::trace_release_failed(BufferKind::Host, "registration", &errno)
            }
        }
        // SAFETY: the mapping is owned by self and no views can outlive it.
        unsafe { unmap(self.ptr, self.len) };
    }
}

// SAFETY: the mapping is owned exclusively by this buffer; the raw pointer
// is only dereferenced through &self/&mut self accessors.
unsafe impl Send for HostBuffer {}

// SAFETY: shared access only hands out &[u8] and copies of the span.
unsafe impl Sync for HostBuffer {}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("addr", &self.ptr.as_ptr())
            .field("len", &self.len)
            .field("lkey", &self.mr.lkey())
            .finish()
    }
}
