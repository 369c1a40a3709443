//! Handles and request types exchanged with a [`NetworkContext`](super::NetworkContext).

use std::ops::BitOr;

/// Registration handle issued by the adapter.
///
/// Carries the local key used in scatter/gather entries and the remote key a
/// peer needs to address the region. The handle itself is a plain token;
/// ownership (who deregisters it) is tracked by the buffer that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MrHandle {
    id: u64,
    lkey: u32,
    rkey: u32,
}

impl MrHandle {
    /// Build a handle from the values returned by the adapter.
    pub const fn new(id: u64, lkey: u32, rkey: u32) -> Self {
        Self { id, lkey, rkey }
    }

    /// Context-unique identifier of the registration.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Local access key.
    #[inline]
    pub fn lkey(&self) -> u32 {
        self.lkey
    }

    /// Remote access key.
    #[inline]
    pub fn rkey(&self) -> u32 {
        self.rkey
    }
}

/// Access rights requested at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessFlags(u32);

impl AccessFlags {
    /// Local writes by the adapter.
    pub const LOCAL_WRITE: Self = Self(1);
    /// Remote peers may write.
    pub const REMOTE_WRITE: Self = Self(1 << 1);
    /// Remote peers may read.
    pub const REMOTE_READ: Self = Self(1 << 2);
    /// Remote peers may issue atomics.
    pub const REMOTE_ATOMIC: Self = Self(1 << 3);

    /// Flags used for every registration made by this crate.
    pub const DEFAULT: Self =
        Self(Self::LOCAL_WRITE.0 | Self::REMOTE_WRITE.0 | Self::REMOTE_READ.0);

    /// No access rights.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Capability limits relevant to indirect registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Maximum number of descriptors one indirect handle can map.
    pub max_indirect_list: usize,
    /// Maximum number of descriptors that fit inline in a fill request.
    pub max_inline_descriptors: usize,
}

/// On-adapter memory allocation.
///
/// Not `Clone`: the allocation is returned to the context by value.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceMemory {
    id: u64,
    len: usize,
}

impl DeviceMemory {
    /// Build from the values returned by the adapter.
    pub const fn new(id: u64, len: usize) -> Self {
        Self { id, len }
    }

    /// Context-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the allocation is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Out-of-line container for a descriptor list too long to post inline.
#[derive(Debug, PartialEq, Eq)]
pub struct DescriptorList {
    id: u64,
    capacity: usize,
}

impl DescriptorList {
    /// Build from the values returned by the adapter.
    pub const fn new(id: u64, capacity: usize) -> Self {
        Self { id, capacity }
    }

    /// Context-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of descriptors the container can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One entry of an indirect mapping: a registered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    /// Start address of the region.
    pub addr: u64,
    /// Length in bytes.
    pub len: usize,
    /// Registration covering the region.
    pub mr: MrHandle,
}

/// Submission flags for a control operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendFlags {
    /// Generate a completion when the operation finishes.
    pub signaled: bool,
    /// Descriptor data travels inside the request itself.
    pub inline: bool,
}

/// The "fill" control operation that binds descriptors to an indirect handle.
#[derive(Debug, Clone, Copy)]
pub struct FillRequest<'a> {
    /// Identifier echoed back in the completion.
    pub wr_id: u64,
    /// Indirect handle being filled.
    pub target: MrHandle,
    /// Base address of the virtual span (first descriptor's address).
    pub base_addr: u64,
    /// Ordered descriptors.
    pub descriptors: &'a [RegionDescriptor],
    /// Out-of-line container, or `None` when posting inline.
    pub list: Option<&'a DescriptorList>,
    /// Submission flags.
    pub flags: SendFlags,
}

/// Status of a work completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The operation succeeded.
    #[default]
    Success,
    /// Local length error.
    LocalLength,
    /// Local protection error.
    LocalProtection,
    /// Memory window bind error.
    MemoryWindowBind,
    /// Operation flushed because the queue entered the error state.
    Flushed,
    /// Any other vendor-specific status.
    Other(u32),
}

/// One entry drained from a completion queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkCompletion {
    /// Identifier of the completed request.
    pub wr_id: u64,
    /// Completion status.
    pub status: CompletionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_flags_default() {
        let flags = AccessFlags::DEFAULT;
        assert!(flags.contains(AccessFlags::LOCAL_WRITE));
        assert!(flags.contains(AccessFlags::REMOTE_READ | AccessFlags::REMOTE_WRITE));
        assert!(!flags.contains(AccessFlags::REMOTE_ATOMIC));
        assert_eq!(AccessFlags::empty().bits(), 0);
    }

    #[test]
    fn test_completion_default_is_success() {
        assert_eq!(WorkCompletion::default().status, CompletionStatus::Success);
    }
}
