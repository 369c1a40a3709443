//! Addressable spans and the buffer trait.

use crate::context::MrHandle;
use std::fmt;

/// A network-addressable region: base address, length and access key.
///
/// The address is process-space for host and external buffers and
/// device-space (starting at 0) for device buffers. For remote buffers the
/// key slot holds the peer's remote key instead of a local key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Base address.
    pub addr: u64,
    /// Length in bytes.
    pub len: usize,
    /// Access key.
    pub key: u32,
}

impl Span {
    /// Create a span.
    pub const fn new(addr: u64, len: usize, key: u32) -> Self {
        Self { addr, len, key }
    }

    /// One past the last address.
    #[inline]
    pub fn end(&self) -> u64 {
        self.addr + self.len as u64
    }

    /// Returns true if the span has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Span) -> bool {
        other.addr >= self.addr && other.end() <= self.end()
    }

    /// True if the two spans share at least one byte.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.addr < other.end() && other.addr < self.end()
    }

    /// Sub-range of `len` bytes starting `offset` bytes in, keeping the key.
    ///
    /// Returns `None` if the range does not fit.
    pub fn sub_span(&self, offset: usize, len: usize) -> Option<Span> {
        let end = offset.checked_add(len)?;
        (end <= self.len).then(|| self.shifted(offset, len))
    }

    /// Sub-range without bounds checking.
    #[inline]
    pub(crate) fn shifted(&self, offset: usize, len: usize) -> Span {
        Span {
            addr: self.addr + offset as u64,
            len,
            key: self.key,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}+{} key={:#x}", self.addr, self.len, self.key)
    }
}

/// Where a buffer's span comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Host memory allocated and registered by the buffer.
    Host,
    /// On-adapter memory allocated and registered by the buffer.
    Device,
    /// Caller memory registered by the buffer.
    External,
    /// A peer's memory; never registered locally.
    Remote,
    /// Sub-range of another buffer.
    View,
    /// Indirect registration over several buffers.
    Composite,
}

impl BufferKind {
    /// Short lowercase name, used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferKind::Host => "host",
            BufferKind::Device => "device",
            BufferKind::External => "external",
            BufferKind::Remote => "remote",
            BufferKind::View => "view",
            BufferKind::Composite => "composite",
        }
    }

    /// Does a buffer of this kind own (and therefore release) its handle?
    pub fn owns_registration(&self) -> bool {
        matches!(
            self,
            BufferKind::Host | BufferKind::Device | BufferKind::External | BufferKind::Composite
        )
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buffer the transfer layer can address.
///
/// All variants present the same contract: a current [`Span`] and, when the
/// memory is registered locally, the registration handle backing it. Only
/// the variant that created a handle releases it, in its `Drop`.
pub trait NetworkBuffer: Send + Sync {
    /// The span describing this buffer.
    fn span(&self) -> Span;

    /// Registration handle backing the span, if registered locally.
    fn mr(&self) -> Option<MrHandle>;

    /// Which variant this is.
    fn kind(&self) -> BufferKind;

    /// Base address of the span.
    fn addr(&self) -> u64 {
        self.span().addr
    }

    /// Length of the span in bytes.
    fn len(&self) -> usize {
        self.span().len
    }

    /// Returns true if the span has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Access key of the span.
    fn key(&self) -> u32 {
        self.span().key
    }
}

impl fmt::Debug for dyn NetworkBuffer + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkBuffer")
            .field("kind", &self.kind())
            .field("span", &self.span())
            .field("mr", &self.mr())
            .finish()
    }
}
