use std::sync::LazyLock;
use std::time::Instant;

pub mod syscall;

static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Microseconds of real time elapsed since the first call in this process.
pub fn real_usec() -> i64 {
    EPOCH.elapsed().as_micros() as i64
}

/// Index of the CPU the calling thread currently runs on.
pub fn current_cpu() -> usize {
    let cpu = unsafe { libc::sched_getcpu() };
    // Only fails without vDSO/getcpu support, treat as a uniprocessor.
    if cpu < 0 {
        0
    } else {
        cpu as _
    }
}
