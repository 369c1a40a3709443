//! A peer's memory, described for the transfer layer.

use super::{BufferKind, NetworkBuffer, Span};
use crate::context::MrHandle;

/// Remote address and key advertised by a peer.
///
/// Never registered locally: [`mr`](NetworkBuffer::mr) is `None` and
/// dropping it has no effect. The span's key slot holds the remote key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteBuffer {
    addr: u64,
    len: usize,
    rkey: u32,
}

impl RemoteBuffer {
    /// Describe a peer region by address and remote key.
    ///
    /// A peer key carries no size, so the span has length 0. Such a buffer is
    /// an address/key descriptor only: any [`ViewBuffer`](super::ViewBuffer)
    /// over it fails with [`Error::OutOfRange`](crate::Error::OutOfRange), and
    /// it must not be handed to the transfer layer as a bounded region. Use
    /// [`with_len`](Self::with_len) when the peer advertised a length.
    pub const fn new(addr: u64, rkey: u32) -> Self {
        Self { addr, len: 0, rkey }
    }

    /// Describe a peer region of known length.
    pub const fn with_len(addr: u64, len: usize, rkey: u32) -> Self {
        Self { addr, len, rkey }
    }

    /// The peer's remote key.
    #[inline]
    pub fn rkey(&self) -> u32 {
        self.rkey
    }
}

impl NetworkBuffer for RemoteBuffer {
    fn span(&self) -> Span {
        Span::new(self.addr, self.len, self.rkey)
    }

    fn mr(&self) -> Option<MrHandle> {
        None
    }

    fn kind(&self) -> BufferKind {
        BufferKind::Remote
    }
}
