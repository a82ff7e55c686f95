//! # Tick Counter
//!
//! Signed 32-bit tick counter and the wraparound-safe "is it time yet"
//! predicate built on top of it.
//!
//! The counter does not wrap into negative values: on overflow it restarts
//! at 0. [`is_due`] depends on that and reads a large backwards step as the
//! restart, so a periodic job runs at most once early after it instead of
//! stalling for a whole counter range. A small backwards step is a job
//! scheduled ahead of the counter and is not due yet.

/// Backwards distance beyond which `is_due` assumes the counter restarted.
const RESTART_GAP: i64 = (i32::MAX / 2) as i64;

/// Monotonic tick counter, advanced once per live tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickCounter {
    value: i32,
}

impl TickCounter {
    /// A counter starting at 0.
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// A counter resuming from `value`.
    #[cfg(test)]
    pub(crate) const fn starting_at(value: i32) -> Self {
        Self { value }
    }

    /// Advance by one tick. Past `i32::MAX` the counter resets to 0.
    #[inline]
    pub fn advance(&mut self) {
        self.value = self.value.checked_add(1).unwrap_or(0);
    }

    /// Current value, always `>= 0`.
    #[inline]
    pub const fn get(&self) -> i32 {
        self.value
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Return `true` if a job last run at `last_execute_tick` with period
/// `timeout_ticks` should run again at `loop_counter`.
///
/// A `loop_counter` more than half the counter range below
/// `last_execute_tick` means the counter overflowed and restarted at 0; the
/// job is reported due immediately. Otherwise the job is due once
/// `last_execute_tick + timeout_ticks < loop_counter`.
///
/// ```
/// use twotask::tick::is_due;
///
/// assert!(!is_due(5, 10, 3));
/// assert!(is_due(14, 10, 3));
/// assert!(is_due(2, i32::MAX - 2, 3));
/// ```
#[inline]
pub fn is_due(loop_counter: i32, last_execute_tick: i32, timeout_ticks: i32) -> bool {
    if loop_counter < last_execute_tick {
        return i64::from(last_execute_tick) - i64::from(loop_counter) > RESTART_GAP;
    }
    last_execute_tick.saturating_add(timeout_ticks) < loop_counter
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_zero() {
        let mut ticks = TickCounter::new();
        assert_eq!(ticks.get(), 0);
        for _ in 0..3 {
            ticks.advance();
        }
        assert_eq!(ticks.get(), 3);
    }

    #[test]
    fn test_counter_overflow_resets_to_zero() {
        let mut ticks = TickCounter::starting_at(i32::MAX - 1);
        ticks.advance();
        assert_eq!(ticks.get(), i32::MAX);
        ticks.advance();
        assert_eq!(ticks.get(), 0, "overflow must restart at 0, never go negative");
        ticks.advance();
        assert_eq!(ticks.get(), 1);
    }

    #[test]
    fn test_not_due_before_timeout() {
        assert!(!is_due(5, 10, 3));
        assert!(!is_due(10, 10, 3));
        assert!(!is_due(13, 10, 3));
    }

    #[test]
    fn test_due_after_timeout() {
        assert!(is_due(14, 10, 3));
        assert!(is_due(100, 0, 10));
    }

    #[test]
    fn test_due_after_counter_overflow() {
        assert!(is_due(2, 2_147_483_645, 3));
        assert!(is_due(0, i32::MAX - 500, 1_000));
        // Small backwards steps are not a restart.
        assert!(!is_due(0, 1, 1_000));
    }

    #[test]
    fn test_timeout_near_max_does_not_wrap() {
        // last + timeout saturates instead of wrapping negative, so the job
        // waits for the counter restart rather than firing immediately.
        assert!(!is_due(i32::MAX - 1, i32::MAX - 2, 10));
        assert!(is_due(0, i32::MAX - 2, 10));
    }
}
