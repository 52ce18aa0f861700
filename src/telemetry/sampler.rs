use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use log::warn;

use super::probe::ResourceProbe;
use super::types::{
    format_mib, format_millis, format_percent, AllocationDelta, CpuUsage, Sample, Snapshot,
    TypeCount, TypeGrowth,
};

const RANKING_LIMIT: usize = 5;

/// Stateful resource sampler: every [`sample`](ResourceSampler::sample)
/// reads the host counters, derives deltas and rankings against the stored
/// previous sample, then advances that baseline exactly once.
///
/// The read-compute-replace sequence is one critical section; concurrent
/// callers are serialized by the internal mutex. `sample` never fails and
/// never panics: failed counter reads are substituted with the last-known
/// values (zeros before any success) so the caller always receives a
/// complete snapshot.
pub struct ResourceSampler {
    state: Mutex<SamplerState>,
}

struct SamplerState {
    probe: Box<dyn ResourceProbe>,
    previous: Option<Sample>,
}

impl ResourceSampler {
    pub fn new(probe: impl ResourceProbe + 'static) -> Self {
        ResourceSampler {
            state: Mutex::new(SamplerState {
                probe: Box::new(probe),
                previous: None,
            }),
        }
    }

    pub fn sample(&self) -> Snapshot {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *state;

        // Read order: process memory, heap statistics, cumulative CPU,
        // monotonic clock. Skew across the four reads is accepted.
        let memory = match state.probe.read_memory() {
            Ok(counters) => counters,
            Err(err) => {
                warn!("memory counters unavailable, reusing previous: {}", err);
                state
                    .previous
                    .as_ref()
                    .map(|p| p.memory.clone())
                    .unwrap_or_default()
            }
        };
        let heap = match state.probe.read_heap() {
            Ok(counters) => counters,
            Err(err) => {
                warn!("heap counters unavailable, reusing previous: {}", err);
                state
                    .previous
                    .as_ref()
                    .map(|p| p.heap.clone())
                    .unwrap_or_default()
            }
        };
        let cpu = match state.probe.read_cpu() {
            Ok(counters) => counters,
            Err(err) => {
                warn!("cpu counters unavailable, reusing previous: {}", err);
                state
                    .previous
                    .as_ref()
                    .map(|p| p.cpu.clone())
                    .unwrap_or_default()
            }
        };
        let taken_at = state.probe.now();

        let current = Sample {
            taken_at,
            memory,
            heap,
            cpu,
        };
        let snapshot = build_snapshot(&current, state.previous.as_ref());
        state.previous = Some(current);
        snapshot
    }
}

fn build_snapshot(current: &Sample, previous: Option<&Sample>) -> Snapshot {
    let cpu_usage = match previous {
        Some(prev) => {
            let elapsed_ms = current
                .taken_at
                .saturating_duration_since(prev.taken_at)
                .as_secs_f64()
                * 1000.0;
            let user_ms =
                current.cpu.user_micros.saturating_sub(prev.cpu.user_micros) as f64 / 1000.0;
            let system_ms = current
                .cpu
                .system_micros
                .saturating_sub(prev.cpu.system_micros) as f64
                / 1000.0;
            // two samples in the same clock tick: report zero, never divide
            let percentage = if elapsed_ms > 0.0 {
                (user_ms + system_ms) / elapsed_ms * 100.0
            } else {
                0.0
            };
            CpuUsage {
                percentage: format_percent(percentage),
                user_ms: format_millis(user_ms),
                system_ms: format_millis(system_ms),
            }
        }
        None => CpuUsage::zero(),
    };

    let allocation_delta = match previous {
        Some(prev) => AllocationDelta {
            heap_size_bytes: current.heap.size_bytes as i64 - prev.heap.size_bytes as i64,
            object_count: current.heap.object_count as i64 - prev.heap.object_count as i64,
        },
        None => AllocationDelta::default(),
    };

    let top_growing_types = match previous {
        Some(prev) => rank_growth(&current.heap.object_type_counts, &prev.heap.object_type_counts),
        None => Vec::new(),
    };
    let top_types_by_count = rank_counts(&current.heap.object_type_counts);

    Snapshot {
        captured_at: Utc::now(),
        rss: format_mib(current.memory.resident_bytes),
        heap_total: format_mib(current.memory.heap_total_bytes),
        heap_used: format_mib(current.memory.heap_used_bytes),
        external: format_mib(current.memory.external_bytes),
        cpu_usage,
        allocation_delta,
        top_growing_types,
        top_types_by_count,
    }
}

/// Positive growth of categories present in both samples, descending,
/// truncated. Stable sort over the current sample's insertion order is the
/// tie-break. Categories without a previous reading have no baseline to
/// grow from and are not ranked; vanished categories are dropped silently.
fn rank_growth(current: &[(String, u64)], previous: &[(String, u64)]) -> Vec<TypeGrowth> {
    let baseline: HashMap<&str, u64> = previous
        .iter()
        .map(|(name, count)| (name.as_str(), *count))
        .collect();
    let mut ranked: Vec<TypeGrowth> = current
        .iter()
        .filter_map(|(name, count)| {
            let prev = *baseline.get(name.as_str())?;
            let growth = *count as i64 - prev as i64;
            (growth > 0).then(|| TypeGrowth {
                name: name.clone(),
                growth,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.growth.cmp(&a.growth));
    ranked.truncate(RANKING_LIMIT);
    ranked
}

/// Largest current live counts, descending, truncated, same tie-break.
fn rank_counts(current: &[(String, u64)]) -> Vec<TypeCount> {
    let mut ranked: Vec<TypeCount> = current
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, count)| TypeCount {
            name: name.clone(),
            count: *count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(RANKING_LIMIT);
    ranked
}
