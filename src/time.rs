//! Conversions between host `timespec` values and the ABI's 64-bit
//! nanosecond timestamps.

use crate::abi::ClockId;
use crate::abi::Timestamp;

/// Converts a host timespec to a nanosecond timestamp.
///
/// Times before the epoch clamp to zero and times too large for 64 bits
/// of nanoseconds saturate.
pub(crate) fn timestamp_from_timespec(ts: &libc::timespec) -> Timestamp {
    if ts.tv_sec < 0 {
        return 0;
    }
    let sec = ts.tv_sec as u64;
    if sec >= u64::MAX / 1_000_000_000 {
        return u64::MAX;
    }
    sec * 1_000_000_000 + ts.tv_nsec as u64
}

/// Converts a nanosecond timestamp to a host timespec.
///
/// Seconds beyond the host `time_t` range clamp to its maximum.
pub(crate) fn timespec_from_timestamp(t: Timestamp) -> libc::timespec {
    let nsec = (t % 1_000_000_000) as libc::c_long;
    let sec = t / 1_000_000_000;
    libc::timespec {
        tv_sec: if sec < libc::time_t::MAX as u64 {
            sec as libc::time_t
        } else {
            libc::time_t::MAX
        },
        tv_nsec: nsec,
    }
}

/// Maps an ABI clock to the host clock it is served by.
pub(crate) fn host_clockid(id: ClockId) -> libc::clockid_t {
    match id {
        ClockId::Monotonic => libc::CLOCK_MONOTONIC,
        ClockId::ProcessCputime => libc::CLOCK_PROCESS_CPUTIME_ID,
        ClockId::Realtime => libc::CLOCK_REALTIME,
        ClockId::ThreadCputime => libc::CLOCK_THREAD_CPUTIME_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_seconds_clamp_to_zero() {
        let ts = libc::timespec {
            tv_sec: -5,
            tv_nsec: 300,
        };
        assert_eq!(timestamp_from_timespec(&ts), 0);
    }

    #[test]
    fn large_seconds_saturate() {
        let ts = libc::timespec {
            tv_sec: libc::time_t::MAX,
            tv_nsec: 0,
        };
        assert_eq!(timestamp_from_timespec(&ts), u64::MAX);
    }

    #[test]
    fn roundtrip_within_range() {
        let t = 1_234_567_890_123_456_789u64;
        let ts = timespec_from_timestamp(t);
        assert_eq!(ts.tv_sec, 1_234_567_890);
        assert_eq!(ts.tv_nsec, 123_456_789);
        assert_eq!(timestamp_from_timespec(&ts), t);
    }

    #[test]
    fn timestamp_overflowing_time_t_clamps() {
        let ts = timespec_from_timestamp(u64::MAX);
        assert_eq!(ts.tv_sec, libc::time_t::MAX);
    }
}
