//! Non-owning sub-range views.

use super::{BufferKind, NetworkBuffer, Span};
use crate::context::MrHandle;
use crate::error::{Error, Result};

/// A window into another buffer.
///
/// The view reuses the parent's registration handle verbatim and makes no
/// adapter calls, neither on creation nor on drop. The borrow guarantees the
/// parent (and therefore its registration) outlives the view.
///
/// # Example
///
/// ```rust
/// use netmem::context::{LoopbackContext, NetworkContext};
/// use netmem::memory::{HostBuffer, NetworkBuffer, ViewBuffer};
/// use std::sync::Arc;
///
/// let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
/// let parent = HostBuffer::new(4096, &ctx).unwrap();
///
/// let view = ViewBuffer::new(&parent, 1024, 512).unwrap();
/// assert_eq!(view.addr(), parent.addr() + 1024);
/// assert_eq!(view.mr(), parent.mr());
/// ```
#[derive(Clone, Copy)]
pub struct ViewBuffer<'a> {
    parent: &'a dyn NetworkBuffer,
    span: Span,
}

impl<'a> ViewBuffer<'a> {
    /// View `len` bytes of `parent` starting `offset` bytes in.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroLength`] if `len` is 0
    /// - [`Error::OutOfRange`] if the range does not fit in the parent's
    ///   current span
    pub fn new(parent: &'a dyn NetworkBuffer, offset: usize, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroLength);
        }
        let parent_span = parent.span();
        let span = parent_span
            .sub_span(offset, len)
            .ok_or(Error::OutOfRange {
                offset,
                len,
                bound: parent_span.len,
            })?;
        Ok(Self { parent, span })
    }

    /// View without bounds checking, for callers that validated the range.
    #[inline]
    pub(crate) fn new_unchecked(parent: &'a dyn NetworkBuffer, offset: usize, len: usize) -> Self {
        Self {
            parent,
            span: parent.span().shifted(offset, len),
        }
    }

    /// The buffer this view looks into.
    pub fn parent(&self) -> &'a dyn NetworkBuffer {
        self.parent
    }

    /// Kind of the parent buffer.
    pub fn parent_kind(&self) -> BufferKind {
        self.parent.kind()
    }

    /// Offset of the view from the parent's base address.
    pub fn offset(&self) -> usize {
        (self.span.addr - self.parent.addr()) as usize
    }
}

impl NetworkBuffer for ViewBuffer<'_> {
    fn span(&self) -> Span {
        self.span
    }

    fn mr(&self) -> Option<MrHandle> {
        self.parent.mr()
    }

    fn kind(&self) -> BufferKind {
        BufferKind::View
    }
}

impl PartialEq for ViewBuffer<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.span == other.span && self.mr() == other.mr()
    }
}

impl Eq for ViewBuffer<'_> {}

impl std::fmt::Debug for ViewBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewBuffer")
            .field("parent", &self.parent.kind())
            .field("span", &self.span)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RemoteBuffer;

    #[test]
    fn test_view_shifts_parent_span() {
        let parent = RemoteBuffer::with_len(0x10_000, 4096, 42);
        let view = ViewBuffer::new(&parent, 256, 128).unwrap();

        assert_eq!(view.span(), Span::new(0x10_100, 128, 42));
        assert_eq!(view.offset(), 256);
        assert_eq!(view.parent_kind(), BufferKind::Remote);
        assert!(parent.span().contains(&view.span()));
    }

    #[test]
    fn test_view_out_of_range() {
        let parent = RemoteBuffer::with_len(0, 100, 1);
        let err = ViewBuffer::new(&parent, 50, 51).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfRange {
                offset: 50,
                len: 51,
                bound: 100
            }
        ));
    }

    #[test]
    fn test_view_zero_length() {
        let parent = RemoteBuffer::with_len(0, 100, 1);
        assert!(matches!(
            ViewBuffer::new(&parent, 0, 0),
            Err(Error::ZeroLength)
        ));
    }

    #[test]
    fn test_view_of_view() {
        let parent = RemoteBuffer::with_len(0x1000, 1024, 3);
        let outer = ViewBuffer::new(&parent, 512, 512).unwrap();
        let inner = ViewBuffer::new(&outer, 128, 64).unwrap();

        assert_eq!(inner.addr(), 0x1000 + 512 + 128);
        assert_eq!(inner.key(), 3);
        assert_eq!(inner.parent_kind(), BufferKind::View);
    }
}
