use std::fmt;
use std::time::Instant;

use sysinfo::{Pid, System};

use super::heap::AllocationLedger;
use super::memory::AllocatorStats;
use super::types::{CpuCounters, HeapCounters, MemoryCounters};

#[derive(Debug)]
pub enum ProbeError {
    PidUnresolved(&'static str),
    ProcessGone(u32),
    Rusage(std::io::Error),
    Allocator(String),
    AllocatorUnavailable,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::PidUnresolved(reason) => {
                write!(f, "own pid could not be resolved: {}", reason)
            }
            ProbeError::ProcessGone(pid) => {
                write!(f, "process {} missing from the process table", pid)
            }
            ProbeError::Rusage(err) => write!(f, "getrusage failed: {}", err),
            ProbeError::Allocator(err) => write!(f, "allocator statistics failed: {}", err),
            ProbeError::AllocatorUnavailable => {
                write!(f, "allocator statistics unavailable on this target")
            }
        }
    }
}

impl std::error::Error for ProbeError {}

/// The seam through which the sampler reads host counters. Each read covers
/// one counter category; a failed category is substituted by the sampler,
/// never propagated to its caller.
pub trait ResourceProbe: Send {
    fn read_memory(&mut self) -> Result<MemoryCounters, ProbeError>;
    fn read_heap(&mut self) -> Result<HeapCounters, ProbeError>;
    fn read_cpu(&mut self) -> Result<CpuCounters, ProbeError>;
    fn now(&mut self) -> Instant;
}

/// Production probe: own-process lookup through `sysinfo`, allocator
/// statistics through the jemalloc control interface, live-object counts
/// from the shared allocation ledger.
pub struct HostProbe {
    system: System,
    pid: Pid,
    allocator: Option<AllocatorStats>,
    ledger: AllocationLedger,
}

impl HostProbe {
    pub fn new(ledger: AllocationLedger) -> Result<Self, ProbeError> {
        let pid = sysinfo::get_current_pid().map_err(ProbeError::PidUnresolved)?;
        let allocator = match AllocatorStats::new() {
            Ok(stats) => Some(stats),
            Err(err) => {
                log::warn!("allocator statistics disabled: {}", err);
                None
            }
        };
        Ok(HostProbe {
            system: System::new(),
            pid,
            allocator,
            ledger,
        })
    }

    fn allocator(&self) -> Result<&AllocatorStats, ProbeError> {
        self.allocator
            .as_ref()
            .ok_or(ProbeError::AllocatorUnavailable)
    }
}

impl ResourceProbe for HostProbe {
    fn read_memory(&mut self) -> Result<MemoryCounters, ProbeError> {
        let reading = self.allocator()?.refresh()?;
        if !self.system.refresh_process(self.pid) {
            return Err(ProbeError::ProcessGone(self.pid.as_u32()));
        }
        let resident = self
            .system
            .process(self.pid)
            .map(|process| process.memory())
            .ok_or(ProbeError::ProcessGone(self.pid.as_u32()))?;
        Ok(MemoryCounters {
            resident_bytes: resident,
            heap_total_bytes: reading.mapped,
            heap_used_bytes: reading.allocated,
            // resident memory not accounted to the allocator
            external_bytes: resident.saturating_sub(reading.mapped),
        })
    }

    fn read_heap(&mut self) -> Result<HeapCounters, ProbeError> {
        let reading = self.allocator()?.refresh()?;
        let ledger = self.ledger.snapshot();
        Ok(HeapCounters {
            object_count: ledger.live_total,
            size_bytes: reading.active,
            object_type_counts: ledger.categories,
        })
    }

    fn read_cpu(&mut self) -> Result<CpuCounters, ProbeError> {
        super::cpu::collect_cpu_counters()
    }

    fn now(&mut self) -> Instant {
        Instant::now()
    }
}
