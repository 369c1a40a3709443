//! Default sizes and limits.
//!
//! Slot sizes follow what pipelined collectives typically move per stage;
//! the loopback limits mirror common adapter capabilities.

// =============================================================================
// Pipelined pools
// =============================================================================

/// Default slot length for pipelined pools (64KB).
pub const DEFAULT_SLOT_LEN: usize = 64 * 1024;

/// Default number of slots in a pipelined pool.
pub const DEFAULT_PIPELINE_DEPTH: usize = 4;

/// Number of `f32` values per line in a pool dump.
pub const DUMP_VALUES_PER_LINE: usize = 8;

// =============================================================================
// Loopback context
// =============================================================================

/// Indirect list capacity reported by the loopback context.
pub const LOOPBACK_MAX_INDIRECT_LIST: usize = 64;

/// Inline descriptor capacity reported by the loopback context.
pub const LOOPBACK_MAX_INLINE_DESCRIPTORS: usize = 4;

/// On-adapter memory available in the loopback context (256KB).
pub const LOOPBACK_DEVICE_MEMORY: usize = 256 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_fits_loopback_device_memory() {
        assert!(DEFAULT_SLOT_LEN * DEFAULT_PIPELINE_DEPTH <= LOOPBACK_DEVICE_MEMORY);
    }

    #[test]
    fn test_inline_limit_below_indirect_limit() {
        assert!(LOOPBACK_MAX_INLINE_DESCRIPTORS < LOOPBACK_MAX_INDIRECT_LIST);
    }

    #[test]
    fn test_slot_len_holds_whole_floats() {
        assert_eq!(DEFAULT_SLOT_LEN % std::mem::size_of::<f32>(), 0);
    }
}
