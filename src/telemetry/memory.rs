use super::probe::ProbeError;

/// One consistent view of the allocator's bookkeeping, taken after an epoch
/// advance.
pub(crate) struct AllocatorReading {
    /// Bytes handed out to the application.
    pub allocated: u64,
    /// Bytes in active pages backing those allocations.
    pub active: u64,
    /// Bytes mapped from the OS by the allocator.
    pub mapped: u64,
}

#[cfg(not(target_env = "msvc"))]
pub(crate) use jemalloc::AllocatorStats;

#[cfg(not(target_env = "msvc"))]
mod jemalloc {
    use tikv_jemalloc_ctl::{epoch, stats};

    use super::AllocatorReading;
    use crate::telemetry::probe::ProbeError;

    pub(crate) struct AllocatorStats {
        epoch: tikv_jemalloc_ctl::epoch_mib,
        allocated: stats::allocated_mib,
        active: stats::active_mib,
        mapped: stats::mapped_mib,
    }

    impl AllocatorStats {
        pub fn new() -> Result<Self, ProbeError> {
            Ok(AllocatorStats {
                epoch: epoch::mib().map_err(|e| ProbeError::Allocator(e.to_string()))?,
                allocated: stats::allocated::mib()
                    .map_err(|e| ProbeError::Allocator(e.to_string()))?,
                active: stats::active::mib().map_err(|e| ProbeError::Allocator(e.to_string()))?,
                mapped: stats::mapped::mib().map_err(|e| ProbeError::Allocator(e.to_string()))?,
            })
        }

        pub fn refresh(&self) -> Result<AllocatorReading, ProbeError> {
            // jemalloc caches its stats; advancing the epoch flushes them
            self.epoch
                .advance()
                .map_err(|e| ProbeError::Allocator(e.to_string()))?;
            Ok(AllocatorReading {
                allocated: self
                    .allocated
                    .read()
                    .map_err(|e| ProbeError::Allocator(e.to_string()))? as u64,
                active: self
                    .active
                    .read()
                    .map_err(|e| ProbeError::Allocator(e.to_string()))? as u64,
                mapped: self
                    .mapped
                    .read()
                    .map_err(|e| ProbeError::Allocator(e.to_string()))? as u64,
            })
        }
    }
}

#[cfg(target_env = "msvc")]
pub(crate) use fallback::AllocatorStats;

#[cfg(target_env = "msvc")]
mod fallback {
    use super::AllocatorReading;
    use crate::telemetry::probe::ProbeError;

    pub(crate) struct AllocatorStats;

    impl AllocatorStats {
        pub fn new() -> Result<Self, ProbeError> {
            Err(ProbeError::AllocatorUnavailable)
        }

        pub fn refresh(&self) -> Result<AllocatorReading, ProbeError> {
            Err(ProbeError::AllocatorUnavailable)
        }
    }
}
