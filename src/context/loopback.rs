//! Software network context.
//!
//! Emulates the registration side of an adapter in process: keys are handed
//! out from a counter, device memory is an accounted budget, and the control
//! completion queue is a plain queue. Every primitive is counted and can be
//! made to fail, which makes each error path of the buffer types reachable
//! without hardware.
//!
//! # Example
//!
//! ```rust
//! use netmem::context::{LoopbackContext, NetworkContext};
//! use netmem::memory::HostBuffer;
//! use std::sync::Arc;
//!
//! let loopback = Arc::new(LoopbackContext::new());
//! let ctx: Arc<dyn NetworkContext> = loopback.clone();
//!
//! let buf = HostBuffer::new(4096, &ctx).unwrap();
//! assert_eq!(loopback.live_registrations(), 1);
//! drop(buf);
//! assert_eq!(loopback.live_registrations(), 0);
//! ```

use super::{
    AccessFlags, CompletionStatus, ContextResult, DescriptorList, DeviceCaps, DeviceMemory,
    FillRequest, MrHandle, NetworkContext, RegionDescriptor, WorkCompletion,
};
use crate::memory::defaults;
use rustix::io::Errno;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Configuration for a [`LoopbackContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackConfig {
    /// Reported capability limits.
    pub caps: DeviceCaps,
    /// Total on-adapter memory in bytes.
    pub device_memory: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            caps: DeviceCaps {
                max_indirect_list: defaults::LOOPBACK_MAX_INDIRECT_LIST,
                max_inline_descriptors: defaults::LOOPBACK_MAX_INLINE_DESCRIPTORS,
            },
            device_memory: defaults::LOOPBACK_DEVICE_MEMORY,
        }
    }
}

impl LoopbackConfig {
    /// Set the reported capability limits.
    pub fn with_caps(mut self, max_indirect_list: usize, max_inline_descriptors: usize) -> Self {
        self.caps = DeviceCaps {
            max_indirect_list,
            max_inline_descriptors,
        };
        self
    }

    /// Set the on-adapter memory budget.
    pub fn with_device_memory(mut self, bytes: usize) -> Self {
        self.device_memory = bytes;
        self
    }
}

/// Number of calls made to each primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `register` calls.
    pub registers: usize,
    /// `deregister` calls.
    pub deregisters: usize,
    /// `alloc_device_memory` calls.
    pub device_allocs: usize,
    /// `register_device_memory` calls.
    pub device_registers: usize,
    /// `free_device_memory` calls.
    pub device_frees: usize,
    /// `create_indirect` calls.
    pub indirect_creates: usize,
    /// `alloc_descriptor_list` calls.
    pub list_allocs: usize,
    /// `free_descriptor_list` calls.
    pub list_frees: usize,
    /// `post_fill` calls.
    pub posts: usize,
    /// `poll_control` calls.
    pub polls: usize,
}

impl CallCounts {
    /// Total number of adapter calls of any kind.
    pub fn total(&self) -> usize {
        self.registers
            + self.deregisters
            + self.device_allocs
            + self.device_registers
            + self.device_frees
            + self.indirect_creates
            + self.list_allocs
            + self.list_frees
            + self.posts
            + self.polls
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    register: Option<Errno>,
    device_alloc: Option<Errno>,
    device_register: Option<Errno>,
    create_indirect: Option<Errno>,
    list_alloc: Option<Errno>,
    post: Option<Errno>,
    poll: Option<Errno>,
    completion_status: CompletionStatus,
    completion_delay: usize,
}

#[derive(Debug)]
enum Registration {
    Host,
    Device,
    Indirect {
        capacity: usize,
        layout: Vec<RegionDescriptor>,
    },
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    registrations: HashMap<u64, Registration>,
    device_allocations: HashMap<u64, usize>,
    device_used: usize,
    lists: HashSet<u64>,
    completions: VecDeque<WorkCompletion>,
    pending_polls: usize,
    counts: CallCounts,
    faults: Faults,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_handle(&mut self, registration: Registration) -> MrHandle {
        let id = self.next_id();
        self.registrations.insert(id, registration);
        // Keys are derived from the id so they stay unique per context.
        let lkey = id as u32;
        MrHandle::new(id, lkey, lkey.rotate_left(16))
    }
}

/// In-process [`NetworkContext`] implementation.
#[derive(Debug)]
pub struct LoopbackContext {
    config: LoopbackConfig,
    state: Mutex<State>,
}

impl Default for LoopbackContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackContext {
    /// Create a context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LoopbackConfig::default())
    }

    /// Create a context with an explicit configuration.
    pub fn with_config(config: LoopbackConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration this context was built with.
    pub fn config(&self) -> LoopbackConfig {
        self.config
    }

    /// Snapshot of the per-primitive call counters.
    pub fn counts(&self) -> CallCounts {
        self.state().counts
    }

    /// Number of registration handles currently alive.
    pub fn live_registrations(&self) -> usize {
        self.state().registrations.len()
    }

    /// Number of device allocations currently alive.
    pub fn live_device_allocations(&self) -> usize {
        self.state().device_allocations.len()
    }

    /// Number of descriptor list containers currently alive.
    pub fn live_descriptor_lists(&self) -> usize {
        self.state().lists.len()
    }

    /// Bytes of device memory currently allocated.
    pub fn device_memory_used(&self) -> usize {
        self.state().device_used
    }

    /// True if `mr` is a live registration.
    pub fn is_registered(&self, mr: MrHandle) -> bool {
        self.state().registrations.contains_key(&mr.id())
    }

    /// Descriptors bound to an indirect handle by its last fill operation.
    ///
    /// Returns `None` if `mr` is not a live indirect handle.
    pub fn indirect_layout(&self, mr: MrHandle) -> Option<Vec<RegionDescriptor>> {
        match self.state().registrations.get(&mr.id()) {
            Some(Registration::Indirect { layout, .. }) => Some(layout.clone()),
            _ => None,
        }
    }

    /// Make every `register` call fail with `errno`.
    pub fn fail_register(&self, errno: Errno) {
        self.state().faults.register = Some(errno);
    }

    /// Make every `alloc_device_memory` call fail with `errno`.
    pub fn fail_device_alloc(&self, errno: Errno) {
        self.state().faults.device_alloc = Some(errno);
    }

    /// Make every `register_device_memory` call fail with `errno`.
    pub fn fail_device_register(&self, errno: Errno) {
        self.state().faults.device_register = Some(errno);
    }

    /// Make every `create_indirect` call fail with `errno`.
    pub fn fail_create_indirect(&self, errno: Errno) {
        self.state().faults.create_indirect = Some(errno);
    }

    /// Make every `alloc_descriptor_list` call fail with `errno`.
    pub fn fail_list_alloc(&self, errno: Errno) {
        self.state().faults.list_alloc = Some(errno);
    }

    /// Make every `post_fill` call fail with `errno`.
    pub fn fail_post(&self, errno: Errno) {
        self.state().faults.post = Some(errno);
    }

    /// Make every `poll_control` call fail with `errno`.
    pub fn fail_poll(&self, errno: Errno) {
        self.state().faults.poll = Some(errno);
    }

    /// Status reported by completions of subsequent fill operations.
    pub fn set_completion_status(&self, status: CompletionStatus) {
        self.state().faults.completion_status = status;
    }

    /// Number of empty polls before each subsequent completion becomes visible.
    pub fn set_completion_delay(&self, polls: usize) {
        self.state().faults.completion_delay = polls;
    }

    /// Remove all injected faults, statuses and delays.
    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }
}

impl NetworkContext for LoopbackContext {
    fn caps(&self) -> DeviceCaps {
        self.config.caps
    }

    fn register(&self, addr: u64, len: usize, _access: AccessFlags) -> ContextResult<MrHandle> {
        let mut state = self.state();
        state.counts.registers += 1;
        if let Some(errno) = state.faults.register {
            return Err(errno);
        }
        if addr == 0 || len == 0 {
            return Err(Errno::INVAL);
        }
        Ok(state.new_handle(Registration::Host))
    }

    fn deregister(&self, mr: MrHandle) -> ContextResult<()> {
        let mut state = self.state();
        state.counts.deregisters += 1;
        state
            .registrations
            .remove(&mr.id())
            .map(|_| ())
            .ok_or(Errno::INVAL)
    }

    fn device_memory_available(&self) -> usize {
        self.config
            .device_memory
            .saturating_sub(self.state().device_used)
    }

    fn alloc_device_memory(&self, len: usize) -> ContextResult<DeviceMemory> {
        let mut state = self.state();
        state.counts.device_allocs += 1;
        if let Some(errno) = state.faults.device_alloc {
            return Err(errno);
        }
        if len == 0 {
            return Err(Errno::INVAL);
        }
        if state.device_used + len > self.config.device_memory {
            return Err(Errno::NOMEM);
        }
        let id = state.next_id();
        state.device_allocations.insert(id, len);
        state.device_used += len;
        Ok(DeviceMemory::new(id, len))
    }

    fn register_device_memory(
        &self,
        dm: &DeviceMemory,
        len: usize,
        _access: AccessFlags,
    ) -> ContextResult<MrHandle> {
        let mut state = self.state();
        state.counts.device_registers += 1;
        if let Some(errno) = state.faults.device_register {
            return Err(errno);
        }
        match state.device_allocations.get(&dm.id()) {
            Some(&allocated) if len > 0 && len <= allocated => {
                Ok(state.new_handle(Registration::Device))
            }
            _ => Err(Errno::INVAL),
        }
    }

    fn free_device_memory(&self, dm: DeviceMemory) -> ContextResult<()> {
        let mut state = self.state();
        state.counts.device_frees += 1;
        let len = state
            .device_allocations
            .remove(&dm.id())
            .ok_or(Errno::INVAL)?;
        state.device_used -= len;
        Ok(())
    }

    fn create_indirect(&self, capacity: usize, _access: AccessFlags) -> ContextResult<MrHandle> {
        let mut state = self.state();
        state.counts.indirect_creates += 1;
        if let Some(errno) = state.faults.create_indirect {
            return Err(errno);
        }
        if capacity == 0 || capacity > self.config.caps.max_indirect_list {
            return Err(Errno::INVAL);
        }
        Ok(state.new_handle(Registration::Indirect {
            capacity,
            layout: Vec::new(),
        }))
    }

    fn alloc_descriptor_list(&self, capacity: usize) -> ContextResult<DescriptorList> {
        let mut state = self.state();
        state.counts.list_allocs += 1;
        if let Some(errno) = state.faults.list_alloc {
            return Err(errno);
        }
        if capacity == 0 {
            return Err(Errno::INVAL);
        }
        let id = state.next_id();
        state.lists.insert(id);
        Ok(DescriptorList::new(id, capacity))
    }

    fn free_descriptor_list(&self, list: DescriptorList) -> ContextResult<()> {
        let mut state = self.state();
        state.counts.list_frees += 1;
        if state.lists.remove(&list.id()) {
            Ok(())
        } else {
            Err(Errno::INVAL)
        }
    }

    fn post_fill(&self, request: &FillRequest<'_>) -> ContextResult<()> {
        let mut state = self.state();
        state.counts.posts += 1;
        if let Some(errno) = state.faults.post {
            return Err(errno);
        }

        let count = request.descriptors.len();
        if count == 0 {
            return Err(Errno::INVAL);
        }
        match request.list {
            Some(list) => {
                if !state.lists.contains(&list.id()) || list.capacity() < count {
                    return Err(Errno::INVAL);
                }
            }
            None => {
                if !request.flags.inline || count > self.config.caps.max_inline_descriptors {
                    return Err(Errno::INVAL);
                }
            }
        }
        if request
            .descriptors
            .iter()
            .any(|d| !state.registrations.contains_key(&d.mr.id()))
        {
            return Err(Errno::INVAL);
        }

        match state.registrations.get_mut(&request.target.id()) {
            Some(Registration::Indirect { capacity, layout }) if *capacity >= count => {
                layout.clear();
                layout.extend_from_slice(request.descriptors);
            }
            _ => return Err(Errno::INVAL),
        }

        if request.flags.signaled {
            let status = state.faults.completion_status;
            state.completions.push_back(WorkCompletion {
                wr_id: request.wr_id,
                status,
            });
            state.pending_polls = state.faults.completion_delay;
        }
        Ok(())
    }

    fn poll_control(&self, completions: &mut [WorkCompletion]) -> ContextResult<usize> {
        let mut state = self.state();
        state.counts.polls += 1;
        if let Some(errno) = state.faults.poll {
            return Err(errno);
        }
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(0);
        }
        let mut written = 0;
        for slot in completions.iter_mut() {
            match state.completions.pop_front() {
                Some(wc) => {
                    *slot = wc;
                    written += 1;
                }
                None => break,
            }
        }
        Ok(written)
    }
}
