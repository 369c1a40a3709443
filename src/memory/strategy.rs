//! Memory strategy selection for pipelined pools.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Where a pool's backing buffer lives.
///
/// Used both for the strategy a caller requests and for the backing a pool
/// actually ended up with (see [`PipelinedPool::backing`](super::PipelinedPool::backing)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryStrategy {
    /// General host memory.
    Host,
    /// On-adapter memory, falling back to host memory when unavailable.
    Device,
    /// Memory supplied by the caller.
    External,
    /// A peer's memory.
    Remote,
}

impl MemoryStrategy {
    /// Can the CPU read memory of this kind through the span address?
    #[inline]
    pub fn is_cpu_accessible(&self) -> bool {
        matches!(self, MemoryStrategy::Host | MemoryStrategy::External)
    }

    /// Does this strategy allocate its own memory?
    #[inline]
    pub fn allocates(&self) -> bool {
        matches!(self, MemoryStrategy::Host | MemoryStrategy::Device)
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStrategy::Host => "host",
            MemoryStrategy::Device => "device",
            MemoryStrategy::External => "external",
            MemoryStrategy::Remote => "remote",
        }
    }
}

impl fmt::Display for MemoryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryStrategy {
    type Err = Error;

    /// Parse a strategy name as given on a command line.
    ///
    /// Accepts `host`, `device` (alias `memic`), `external` (alias `user`)
    /// and `remote`, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(MemoryStrategy::Host),
            "device" | "memic" => Ok(MemoryStrategy::Device),
            "external" | "user" => Ok(MemoryStrategy::External),
            "remote" => Ok(MemoryStrategy::Remote),
            _ => Err(Error::UnsupportedMemoryStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("host".parse::<MemoryStrategy>().unwrap(), MemoryStrategy::Host);
        assert_eq!("Device".parse::<MemoryStrategy>().unwrap(), MemoryStrategy::Device);
        assert_eq!("memic".parse::<MemoryStrategy>().unwrap(), MemoryStrategy::Device);
        assert_eq!("user".parse::<MemoryStrategy>().unwrap(), MemoryStrategy::External);
        assert_eq!(" remote ".parse::<MemoryStrategy>().unwrap(), MemoryStrategy::Remote);
    }

    #[test]
    fn test_parse_unknown_fails() {
        let err = "gpu".parse::<MemoryStrategy>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMemoryStrategy(ref s) if s == "gpu"));
    }

    #[test]
    fn test_display_round_trips() {
        for strategy in [
            MemoryStrategy::Host,
            MemoryStrategy::Device,
            MemoryStrategy::External,
            MemoryStrategy::Remote,
        ] {
            assert_eq!(strategy.to_string().parse::<MemoryStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_cpu_accessibility() {
        assert!(MemoryStrategy::Host.is_cpu_accessible());
        assert!(MemoryStrategy::External.is_cpu_accessible());
        assert!(!MemoryStrategy::Device.is_cpu_accessible());
        assert!(!MemoryStrategy::Remote.is_cpu_accessible());
    }
}
