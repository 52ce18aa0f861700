mod cpu;
mod heap;
mod memory;
mod probe;
mod sampler;
mod types;

pub use heap::{AllocationLedger, CategoryCounter, LedgerSnapshot, TrackedObject};
pub use probe::{HostProbe, ProbeError, ResourceProbe};
pub use sampler::ResourceSampler;
pub use types::{
    AllocationDelta, CpuCounters, CpuUsage, HeapCounters, MemoryCounters, Sample, Snapshot,
    TypeCount, TypeGrowth,
};
