//! CPU and wall-clock accounting around a unit of work.

use std::time::Instant;

use nix::sys::resource::{Usage, UsageWho, getrusage};
use nix::sys::time::TimeValLike;

#[cfg(any(target_os = "linux", target_os = "android"))]
const WHO: UsageWho = UsageWho::RUSAGE_THREAD;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const WHO: UsageWho = UsageWho::RUSAGE_SELF;

/// Time spent in a unit of work, in microseconds.
///
/// `utime` and `stime` cover the calling thread only. For the `pipes`
/// backend the dot products run in worker processes that are reaped only
/// when their pool is freed, so those fields count dispatch and collection,
/// not the arithmetic; `wall` covers the whole call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub utime: i64,
    pub stime: i64,
    pub wall: i64,
}

impl Timing {
    /// Runs `f` on the current thread and measures it.
    pub fn measure<T>(f: impl FnOnce() -> T) -> (T, Timing) {
        let before = getrusage(WHO).ok();
        let start = Instant::now();
        let out = f();
        let wall = start.elapsed().as_micros() as i64;
        let after = getrusage(WHO).ok();

        let (utime, stime) = match (before, after) {
            (Some(before), Some(after)) => cpu_delta(&before, &after),
            _ => (0, 0),
        };
        (out, Timing { utime, stime, wall })
    }
}

fn cpu_delta(before: &Usage, after: &Usage) -> (i64, i64) {
    let utime = (after.user_time() - before.user_time()).num_microseconds();
    let stime = (after.system_time() - before.system_time()).num_microseconds();
    (utime.max(0), stime.max(0))
}
