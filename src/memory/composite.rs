//! Composite buffers built by indirect registration.
//!
//! An indirect handle maps one key onto an ordered list of already
//! registered regions; the adapter resolves the indirection per descriptor.
//! Building one is a synchronous control-plane exchange:
//!
//! 1. allocate an out-of-line descriptor list if the count does not fit inline
//! 2. create an empty indirect handle sized for the count
//! 3. post one signaled fill operation on the control queue
//! 4. poll the control completion queue until the completion arrives
//! 5. release the descriptor list, keep the handle
//!
//! Step 4 blocks the calling thread; see [`PollPolicy`].

use super::{BufferKind, NetworkBuffer, Span};
use crate::context::{
    AccessFlags, CompletionStatus, DescriptorList, FillRequest, MrHandle, NetworkContext,
    RegionDescriptor, SendFlags, WorkCompletion,
};
use crate::error::{Error, Result};
use crate::observability;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long to wait for the fill completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPolicy {
    /// Spin until the completion arrives, however long that takes.
    #[default]
    Unbounded,
    /// Give up with [`Error::PollTimeout`] once the duration has elapsed.
    Timeout(Duration),
}

impl PollPolicy {
    fn deadline(&self, start: Instant) -> Option<Instant> {
        match self {
            PollPolicy::Unbounded => None,
            PollPolicy::Timeout(timeout) => Some(start + *timeout),
        }
    }
}

/// One virtual span over several registered buffers.
///
/// The visible span is the first constituent's address and length with the
/// indirect key; the indirection covers all constituents. Constituents are
/// borrowed, not owned, and must outlive the composite. Dropping the
/// composite deregisters only the indirect handle.
///
/// # Example
///
/// ```rust
/// use netmem::context::{LoopbackContext, NetworkContext};
/// use netmem::memory::{CompositeBuffer, HostBuffer, NetworkBuffer};
/// use std::sync::Arc;
///
/// let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
/// let a = HostBuffer::new(1024, &ctx).unwrap();
/// let b = HostBuffer::new(1024, &ctx).unwrap();
///
/// let composite = CompositeBuffer::new(&[&a, &b], &ctx).unwrap();
/// assert_eq!(composite.addr(), a.addr());
/// assert_ne!(composite.key(), a.key());
/// ```
pub struct CompositeBuffer<'a> {
    parts: Vec<&'a dyn NetworkBuffer>,
    span: Span,
    mr: MrHandle,
    ctx: Arc<dyn NetworkContext>,
}

impl<'a> CompositeBuffer<'a> {
    /// Register `parts` behind one indirect handle, waiting without a deadline.
    ///
    /// See [`with_policy`](Self::with_policy) for the errors.
    pub fn new(parts: &[&'a dyn NetworkBuffer], ctx: &Arc<dyn NetworkContext>) -> Result<Self> {
        Self::with_policy(parts, ctx, PollPolicy::default())
    }

    /// Register `parts` behind one indirect handle.
    ///
    /// Blocks until the adapter reports the registration complete (or the
    /// policy's deadline passes). Composite registrations sharing `ctx` must
    /// not run concurrently.
    ///
    /// # Errors
    ///
    /// Checked before any adapter call:
    /// - [`Error::EmptyComposite`] if `parts` is empty
    /// - [`Error::CapacityExceeded`] if `parts` exceeds the indirect list limit
    /// - [`Error::MissingRegistration`] if a part has no local handle
    ///
    /// From the protocol, after releasing everything acquired so far:
    /// [`Error::ContainerAllocationFailed`], [`Error::CreateHandleFailed`],
    /// [`Error::ControlSubmitFailed`], [`Error::PollFailed`],
    /// [`Error::CompletionError`], [`Error::PollTimeout`].
    pub fn with_policy(
        parts: &[&'a dyn NetworkBuffer],
        ctx: &Arc<dyn NetworkContext>,
        policy: PollPolicy,
    ) -> Result<Self> {
        let _span = observability::span_composite(parts.len()).entered();

        let mr = register_indirect(parts, ctx.as_ref(), policy).inspect_err(|_| {
            observability::record_registration_failure(BufferKind::Composite);
        })?;

        let first = parts[0].span();
        observability::record_registration(BufferKind::Composite, first.len);
        observability::trace_registered(BufferKind::Composite, first.addr, first.len, mr.lkey());

        Ok(Self {
            parts: parts.to_vec(),
            span: Span::new(first.addr, first.len, mr.lkey()),
            mr,
            ctx: Arc::clone(ctx),
        })
    }

    /// The constituents, in descriptor order.
    pub fn parts(&self) -> &[&'a dyn NetworkBuffer] {
        &self.parts
    }

    /// Total bytes covered by the indirection.
    pub fn total_len(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }
}

/// Run the indirect registration protocol and return the filled handle.
fn register_indirect(
    parts: &[&dyn NetworkBuffer],
    ctx: &dyn NetworkContext,
    policy: PollPolicy,
) -> Result<MrHandle> {
    let count = parts.len();
    if count == 0 {
        return Err(Error::EmptyComposite);
    }
    let caps = ctx.caps();
    if count > caps.max_indirect_list {
        return Err(Error::CapacityExceeded {
            requested: count,
            max: caps.max_indirect_list,
        });
    }

    let descriptors = parts
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let mr = part.mr().ok_or(Error::MissingRegistration { index })?;
            let span = part.span();
            Ok(RegionDescriptor {
                addr: span.addr,
                len: span.len,
                mr,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let list = if count > caps.max_inline_descriptors {
        Some(
            ctx.alloc_descriptor_list(count)
                .map_err(Error::ContainerAllocationFailed)?,
        )
    } else {
        None
    };

    let result = create_and_fill(ctx, &descriptors, list.as_ref(), policy);

    if let Some(list) = list {
        if let Err(errno) = ctx.free_descriptor_list(list) {
            observability::trace_release_failed(BufferKind::Composite, "descriptor list", &errno);
        }
    }
    result
}

/// Steps 2–4: the handle is deregistered again if filling it fails.
fn create_and_fill(
    ctx: &dyn NetworkContext,
    descriptors: &[RegionDescriptor],
    list: Option<&DescriptorList>,
    policy: PollPolicy,
) -> Result<MrHandle> {
    let mr = ctx
        .create_indirect(descriptors.len(), AccessFlags::DEFAULT)
        .map_err(Error::CreateHandleFailed)?;

    let request = FillRequest {
        wr_id: mr.id(),
        target: mr,
        base_addr: descriptors[0].addr,
        descriptors,
        list,
        flags: SendFlags {
            signaled: true,
            inline: list.is_none(),
        },
    };

    let filled = ctx
        .post_fill(&request)
        .map_err(|errno| Error::ControlSubmitFailed {
            status: errno.raw_os_error(),
        })
        .and_then(|()| wait_for_completion(ctx, request.wr_id, policy));

    if let Err(err) = filled {
        if let Err(errno) = ctx.deregister(mr) {
            observability::trace_release_failed(BufferKind::Composite, "indirect handle", &errno);
        }
        return Err(err);
    }
    Ok(mr)
}

/// Busy-poll the control completion queue, one entry at a time, until the
/// completion for `wr_id` arrives.
///
/// Completions for other requests (left behind by an earlier registration
/// that timed out) are discarded.
fn wait_for_completion(ctx: &dyn NetworkContext, wr_id: u64, policy: PollPolicy) -> Result<()> {
    let start = Instant::now();
    let deadline = policy.deadline(start);
    let mut wc = [WorkCompletion::default()];
    let mut spins: u64 = 0;

    loop {
        let polled = ctx.poll_control(&mut wc).map_err(Error::PollFailed)?;
        if polled == 1 && wc[0].wr_id != wr_id {
            tracing::trace!(
                expected = wr_id,
                wr_id = wc[0].wr_id,
                status = ?wc[0].status,
                "discarding stale fill completion"
            );
        } else if polled == 1 {
            observability::record_poll_spins(spins);
            tracing::trace!(spins, wr_id = wc[0].wr_id, "fill completion received");
            if wc[0].status != CompletionStatus::Success {
                return Err(Error::CompletionError {
                    status: wc[0].status,
                });
            }
            return Ok(());
        }

        spins += 1;
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                tracing::warn!(spins, "fill completion not received before deadline");
                return Err(Error::PollTimeout(deadline - start));
            }
        }
        std::hint::spin_loop();
    }
}

impl NetworkBuffer for CompositeBuffer<'_> {
    fn span(&self) -> Span {
        self.span
    }

    fn mr(&self) -> Option<MrHandle> {
        Some(self.mr)
    }

    fn kind(&self) -> BufferKind {
        BufferKind::Composite
    }
}

impl Drop for CompositeBuffer<'_> {
    fn drop(&mut self) {
        match self.ctx.deregister(self.mr) {
            Ok(()) => observability::record_deregistration(BufferKind::Composite),
            Err(errno) => observability::trace_release_failed(
                BufferKind::Composite,
                "indirect handle",
                &errno,
            ),
        }
    }
}

impl std::fmt::Debug for CompositeBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBuffer")
            .field("parts", &self.parts.len())
            .field("span", &self.span)
            .finish()
    }
}
