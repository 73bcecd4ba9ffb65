//! Real-time setup and cycle timing statistics.
//!
//! The cyclic thread runs under SCHED_FIFO on a pinned core with all
//! memory locked when the `rt` feature is enabled:
//!
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` locks all pages.
//! 2. The stack is prefaulted so the loop never page-faults.
//! 3. `sched_setaffinity` pins the thread to the configured core.
//! 4. `sched_setscheduler(SCHED_FIFO)` raises it to RT priority.
//!
//! Without the feature every call is a no-op and the loop paces itself
//! with `std::thread::sleep`, which is what tests and the simulated
//! demo use.

use crate::error::ControlError;

/// Stack bytes touched during prefaulting.
const PREFAULT_STACK_BYTES: usize = 1024 * 1024;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics, updated without allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of period overruns observed.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record one cycle duration.
    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
    }

    /// Average cycle time [ns], zero before the first cycle.
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), ControlError> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|err| ControlError::RtSetup(format!("mlockall failed: {err}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), ControlError> {
    Ok(())
}

/// Touch a large stack buffer so those pages are resident before the
/// loop starts.
fn prefault_stack() {
    let mut page = [0u8; PREFAULT_STACK_BYTES];
    for byte in page.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0) };
    }
    core::hint::black_box(&page);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), ControlError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|err| ControlError::RtSetup(format!("CpuSet::set({cpu}) failed: {err}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|err| ControlError::RtSetup(format!("sched_setaffinity failed: {err}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), ControlError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), ControlError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(ControlError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), ControlError> {
    Ok(())
}

/// Prepare the calling thread for cyclic execution.
///
/// Must run before the cycle loop. Without the `rt` feature only the
/// stack prefault happens.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), ControlError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec, normalizing the nanosecond field.
#[cfg(feature = "rt")]
pub(crate) fn timespec_add_ns(
    ts: nix::sys::time::TimeSpec,
    ns: i64,
) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
pub(crate) fn timespec_diff_ns(
    a: &nix::sys::time::TimeSpec,
    b: &nix::sys::time::TimeSpec,
) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
