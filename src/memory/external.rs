//! Registration of caller-owned memory.

use super::{BufferKind, NetworkBuffer, Span};
use crate::context::{AccessFlags, MrHandle, NetworkContext};
use crate::error::{Error, Result};
use crate::observability;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

/// A registration over memory the caller allocated.
///
/// The buffer never allocates or frees: dropping it only deregisters. The
/// lifetime ties the registration to the borrowed memory, so the memory
/// cannot be freed while the adapter may still access it.
///
/// # Example
///
/// ```rust
/// use netmem::context::{LoopbackContext, NetworkContext};
/// use netmem::memory::{ExternalBuffer, NetworkBuffer};
/// use std::sync::Arc;
///
/// let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
/// let mut data = vec![7u8; 4096];
/// let addr = data.as_ptr() as u64;
///
/// let buf = ExternalBuffer::new(&mut data, &ctx).unwrap();
/// assert_eq!(buf.span().addr, addr);
/// drop(buf);
///
/// // The caller still owns the memory.
/// assert_eq!(data[0], 7);
/// ```
pub struct ExternalBuffer<'a> {
    addr: u64,
    len: usize,
    mr: MrHandle,
    ctx: Arc<dyn NetworkContext>,
    _memory: PhantomData<&'a mut [u8]>,
}

impl<'a> ExternalBuffer<'a> {
    /// Register a borrowed byte slice.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroLength`] if the slice is empty
    /// - [`Error::RegistrationFailed`] if registration fails
    pub fn new(memory: &'a mut [u8], ctx: &Arc<dyn NetworkContext>) -> Result<Self> {
        let len = memory.len();
        let ptr = NonNull::new(memory.as_mut_ptr()).ok_or(Error::ZeroLength)?;
        // SAFETY: the slice is exclusively borrowed for 'a.
        unsafe { Self::register(ptr, len, ctx) }
    }

    /// Shared implementation of the constructors.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `len` bytes for `'a`.
    unsafe fn register(
        ptr: NonNull<u8>,
        len: usize,
        ctx: &Arc<dyn NetworkContext>,
    ) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroLength);
        }
        let _span = observability::span_registration(BufferKind::External, len).entered();

        let addr = ptr.as_ptr() as u64;
        let mr = ctx
            .register(addr, len, AccessFlags::DEFAULT)
            .map_err(|errno| {
                observability::record_registration_failure(BufferKind::External);
                Error::RegistrationFailed(errno)
            })?;

        observability::record_registration(BufferKind::External, len);
        observability::trace_registered(BufferKind::External, addr, len, mr.lkey());

        Ok(Self {
            addr,
            len,
            mr,
            ctx: Arc::clone(ctx),
            _memory: PhantomData,
        })
    }
}

impl ExternalBuffer<'static> {
    /// Register raw caller memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes, and must stay
    /// valid (not freed, not unmapped) until the returned buffer is dropped.
    pub unsafe fn from_raw_parts(
        ptr: NonNull<u8>,
        len: usize,
        ctx: &Arc<dyn NetworkContext>,
    ) -> Result<Self> {
        // SAFETY: forwarded from the caller.
        unsafe { Self::register(ptr, len, ctx) }
    }
}

impl NetworkBuffer for ExternalBuffer<'_> {
    fn span(&self) -> Span {
        Span::new(self.addr, self.len, self.mr.lkey())
    }

    fn mr(&self) -> Option<MrHandle> {
        Some(self.mr)
    }

    fn kind(&self) -> BufferKind {
        BufferKind::External
    }
}

impl Drop for ExternalBuffer<'_> {
    fn drop(&mut self) {
        match self.ctx.deregister(self.mr) {
            Ok(()) => observability::record_deregistration(BufferKind::External),
            Err(errno) => {
                observability::trace_release_failed(BufferKind::External, "registration", &errno)
            }
        }
    }
}

impl std::fmt::Debug for ExternalBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalBuffer")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .field("lkey", &self.mr.lkey())
            .finish()
    }
}
