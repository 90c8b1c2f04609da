//! Wrap arithmetic for the free-running dimmer timer.
//!
//! The timer counts `0..timer_max_ticks` and restarts. A capture taken just
//! before the restart is really a crossing that arrived *early*, so raw
//! captures are folded into a signed offset around zero.

/// Fold a signed tick difference into `(-timer_max_ticks/2, timer_max_ticks/2]`.
///
/// Used both for raw captures and for the difference of two errors, since a
/// drift can carry the error across the wrap boundary between samples.
pub fn wrap_ticks(diff: i64, timer_max_ticks: u32) -> i64 {
    debug_assert!(timer_max_ticks > 0, "timer_max_ticks must be non-zero");
    let max = i64::from(timer_max_ticks.max(1));
    let half = max / 2;
    let r = diff.rem_euclid(max);
    if r > half {
        r - max
    } else {
        r
    }
}

/// Signed offset of a capture from the ideal crossing instant (tick 0).
pub fn compute_error(captured_ticks: u32, timer_max_ticks: u32) -> i64 {
    debug_assert!(
        captured_ticks < timer_max_ticks,
        "capture {} outside timer range {}",
        captured_ticks,
        timer_max_ticks
    );
    wrap_ticks(i64::from(captured_ticks), timer_max_ticks)
}
