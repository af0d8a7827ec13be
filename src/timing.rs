//! Monotonic timestamps and the busy-wait work simulator.
//!
//! Requests carry their service length as a (seconds, nanoseconds) pair and all
//! log fields are monotonic-clock readings rendered as `%.6f` seconds, so the
//! timestamp type mirrors a `timespec` rather than wrapping [`Instant`].

use std::time::{Duration, Instant};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Monotonic-clock reading as whole seconds plus nanoseconds.
///
/// Also doubles as the wire representation of a duration, since the protocol
/// encodes both absolute timestamps and request lengths the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: i64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { secs: 0, nanos: 0 };

    /// Current reading of the monotonic clock.
    pub fn now() -> Timestamp {
        #[cfg(unix)]
        {
            let mut ts = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            // CLOCK_MONOTONIC never fails with a valid timespec pointer.
            unsafe {
                libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            }
            Timestamp {
                secs: ts.tv_sec as i64,
                nanos: ts.tv_nsec as i64,
            }
        }
        #[cfg(not(unix))]
        {
            use std::time::SystemTime;
            let since_epoch = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or(Duration::ZERO);
            Timestamp {
                secs: since_epoch.as_secs() as i64,
                nanos: since_epoch.subsec_nanos() as i64,
            }
        }
    }

    /// Render as fractional seconds for the `%.6f` log fields.
    pub fn as_secs_f64(self) -> f64 {
        self.secs as f64 + self.nanos as f64 / NANOS_PER_SEC as f64
    }

    pub fn from_duration(length: Duration) -> Timestamp {
        Timestamp {
            secs: length.as_secs() as i64,
            nanos: length.subsec_nanos() as i64,
        }
    }

    /// Interpret as a duration. Negative or out-of-range wire values clamp to
    /// zero so a malformed request degrades to a no-op simulation.
    pub fn to_duration(self) -> Duration {
        if self.secs < 0 || self.nanos < 0 || self.nanos >= NANOS_PER_SEC {
            return Duration::ZERO;
        }
        Duration::new(self.secs as u64, self.nanos as u32)
    }
}

/// Cycle-counter reading used to report how much raw CPU a simulation burned.
fn cycle_count() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let ts = Timestamp::now();
        (ts.secs as u64).wrapping_mul(NANOS_PER_SEC as u64) + ts.nanos as u64
    }
}

/// Busy-wait for `length` without yielding the processor.
///
/// Returns the number of clock ticks consumed. The spin polls the monotonic
/// clock each iteration, so the wait returns promptly once `length` elapses.
pub fn busywait(length: Duration) -> u64 {
    busywait_with(length, Instant::now)
}

/// Spin loop generic over the time source, so tests can substitute a mock
/// clock and verify termination without real waiting.
pub(crate) fn busywait_with<C>(length: Duration, mut now: C) -> u64
where
    C: FnMut() -> Instant,
{
    let start_ticks = cycle_count();
    let begin = now();
    while now().duration_since(begin) < length {
        std::hint::spin_loop();
    }
    cycle_count().wrapping_sub(start_ticks)
}

/// Sleep for `length` instead of spinning. Same contract as [`busywait`] but
/// yields the processor; the client binary uses it to pace submissions.
pub fn sleepwait(length: Duration) -> u64 {
    let start_ticks = cycle_count();
    std::thread::sleep(length);
    cycle_count().wrapping_sub(start_ticks)
}
