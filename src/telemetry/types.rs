use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    pub resident_bytes: u64,
    pub heap_total_bytes: u64,
    pub heap_used_bytes: u64,
    pub external_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub user_micros: u64,
    pub system_micros: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapCounters {
    pub object_count: u64,
    pub size_bytes: u64,
    // (category, live count) in first-registration order; zero-count
    // categories are omitted, so keys come and go between samples
    pub object_type_counts: Vec<(String, u64)>,
}

#[derive(Clone, Debug)]
pub struct Sample {
    pub taken_at: Instant,
    pub memory: MemoryCounters,
    pub heap: HeapCounters,
    pub cpu: CpuCounters,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub rss: String,
    pub heap_total: String,
    pub heap_used: String,
    pub external: String,
    pub cpu_usage: CpuUsage,
    pub allocation_delta: AllocationDelta,
    pub top_growing_types: Vec<TypeGrowth>,
    pub top_types_by_count: Vec<TypeCount>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub percentage: String,
    pub user_ms: String,
    pub system_ms: String,
}

impl CpuUsage {
    pub fn zero() -> Self {
        CpuUsage {
            percentage: format_percent(0.0),
            user_ms: format_millis(0.0),
            system_ms: format_millis(0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationDelta {
    pub heap_size_bytes: i64,
    pub object_count: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TypeGrowth {
    #[serde(rename = "type")]
    pub name: String,
    pub growth: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub name: String,
    pub count: u64,
}

// Dashboard formatting: MiB with 2 decimals, rounded half up, unit suffix.
pub(crate) fn format_mib(bytes: u64) -> String {
    format!("{:.2} MB", round2(bytes as f64 / 1_048_576.0))
}

pub(crate) fn format_percent(value: f64) -> String {
    format!("{:.2}%", round2(value))
}

pub(crate) fn format_millis(value: f64) -> String {
    format!("{:.2}ms", round2(value))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
