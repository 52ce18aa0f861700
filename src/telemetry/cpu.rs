use std::mem::MaybeUninit;

use super::probe::ProbeError;
use super::types::CpuCounters;

/// Cumulative CPU time consumed by this process since start, split into
/// user and system microseconds. Monotonically non-decreasing.
pub fn collect_cpu_counters() -> Result<CpuCounters, ProbeError> {
    let mut usage = MaybeUninit::<libc::rusage>::uninit();
    let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if result != 0 {
        return Err(ProbeError::Rusage(std::io::Error::last_os_error()));
    }
    let usage = unsafe { usage.assume_init() };
    Ok(CpuCounters {
        user_micros: timeval_micros(&usage.ru_utime),
        system_micros: timeval_micros(&usage.ru_stime),
    })
}

fn timeval_micros(tv: &libc::timeval) -> u64 {
    let secs = tv.tv_sec.max(0) as u64;
    let micros = tv.tv_usec.max(0) as u64;
    secs * 1_000_000 + micros
}
