//! # Handoff Queue
//!
//! Provider → Processor → Consumer exchange between the two contexts.
//!
//! A [`HandoffQueue`] carries one value of type `T` from a provider to a
//! processor, and one result of type `R` from the processor to a consumer.
//! Each stage holds at most one unread value and is guarded by sequence
//! counters:
//!
//! ```text
//!  Provider ──try_provide──► [ to ] ──try_process──► Processor
//!                                                       │
//!  Consumer ◄──try_consume── [ from ] ◄──try_complete───┘
//!
//!  to_sequence        bumped by try_provide
//!  from_sequence      set to to_sequence by try_complete
//!  consumed_sequence  set to from_sequence by try_consume
//! ```
//!
//! Every operation runs in one critical section and never blocks. A
//! `false` or `None` means "not yet": the caller retries on a later slice.
//! A rejected value is handed back to nobody and stored nowhere, so nothing
//! is lost behind the caller's back.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use crate::sync;

struct Slots<T, R> {
    to: Option<T>,
    from: Option<R>,
    to_sequence: u64,
    from_sequence: u64,
    consumed_sequence: u64,
    /// `to_sequence` of the value the processor last took.
    taken_sequence: u64,
}

/// Depth-one two-stage channel between the foreground and the background.
///
/// Declare one `static` per named channel:
///
/// ```
/// use twotask::handoff::HandoffQueue;
///
/// static SAMPLES: HandoffQueue<u16, u32> = HandoffQueue::new();
///
/// assert!(SAMPLES.try_provide(7));
/// assert_eq!(SAMPLES.try_process(), Some(7));
/// assert!(SAMPLES.try_complete(49));
/// assert_eq!(SAMPLES.try_consume(), Some(49));
/// ```
pub struct HandoffQueue<T, R = T> {
    slots: Mutex<RefCell<Slots<T, R>>>,
}

impl<T, R> HandoffQueue<T, R> {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new(Slots {
                to: None,
                from: None,
                to_sequence: 0,
                from_sequence: 0,
                consumed_sequence: 0,
                taken_sequence: 0,
            })),
        }
    }

    fn with<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&mut Slots<T, R>) -> O,
    {
        sync::critical_section(|cs| f(&mut self.slots.borrow_ref_mut(cs)))
    }

    /// Provider: hand `value` to the processor.
    ///
    /// Fails while the processor has not completed the previous value.
    pub fn try_provide(&self, value: T) -> bool {
        self.try_provide_with(|_, _| value)
    }

    /// Provider: like [`HandoffQueue::try_provide`], building the value from
    /// the previous provider value inside the same critical section. `make`
    /// gets the section token so it can read other guarded state atomically
    /// with the publish.
    pub(crate) fn try_provide_with<F>(&self, make: F) -> bool
    where
        F: FnOnce(CriticalSection<'_>, Option<&T>) -> T,
    {
        sync::critical_section(|cs| {
            let mut s = self.slots.borrow_ref_mut(cs);
            if s.to_sequence != s.from_sequence {
                return false;
            }
            let value = make(cs, s.to.as_ref());
            s.to = Some(value);
            s.to_sequence += 1;
            true
        })
    }

    /// Processor: publish the result for the pending provider value.
    ///
    /// Fails while the consumer has not taken the previous result, or when
    /// there is no provider value to answer.
    pub fn try_complete(&self, result: R) -> bool {
        self.with(|s| {
            if s.from_sequence != s.consumed_sequence || s.to_sequence == s.from_sequence {
                return false;
            }
            s.from = Some(result);
            s.from_sequence = s.to_sequence;
            true
        })
    }

    /// Consumer: take the latest result, once.
    pub fn try_consume(&self) -> Option<R> {
        self.with(|s| {
            if s.from_sequence == s.consumed_sequence {
                return None;
            }
            s.consumed_sequence = s.from_sequence;
            s.from.take()
        })
    }

    /// `true` when no value is in flight in either stage.
    pub fn is_idle(&self) -> bool {
        self.with(|s| s.to_sequence == s.from_sequence && s.from_sequence == s.consumed_sequence)
    }
}

impl<T: Clone, R> HandoffQueue<T, R> {
    /// Processor: take the pending provider value.
    ///
    /// Returns each provided value once. The value stays in its slot for
    /// [`HandoffQueue::last_provided`] until the next `try_provide`.
    pub fn try_process(&self) -> Option<T> {
        self.with(|s| {
            if s.to_sequence == s.from_sequence || s.taken_sequence == s.to_sequence {
                return None;
            }
            s.taken_sequence = s.to_sequence;
            s.to.clone()
        })
    }

    /// Most recent provider value, whether or not it was processed.
    pub fn last_provided(&self) -> Option<T> {
        self.with(|s| s.to.clone())
    }
}

impl<T, R> Default for HandoffQueue<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternating_schedule_always_succeeds() {
        let queue: HandoffQueue<u32, u64> = HandoffQueue::new();
        for n in 0..10u32 {
            assert!(queue.try_provide(n));
            assert_eq!(queue.try_process(), Some(n));
            assert!(queue.try_complete(u64::from(n) * 10));
            assert_eq!(queue.try_consume(), Some(u64::from(n) * 10));
            assert!(queue.is_idle());
        }
    }

    #[test]
    fn test_provide_blocked_until_processed() {
        let queue: HandoffQueue<u8> = HandoffQueue::new();
        assert!(queue.try_provide(1));
        assert!(!queue.try_provide(2), "previous value not yet processed");
        assert!(!queue.try_provide(3));
        assert_eq!(queue.last_provided(), Some(1), "rejected values leave no trace");

        assert_eq!(queue.try_process(), Some(1));
        assert!(!queue.try_provide(4), "taken is not completed");
        assert!(queue.try_complete(10));
        assert!(queue.try_provide(5));
    }

    #[test]
    fn test_complete_blocked_until_consumed() {
        let queue: HandoffQueue<u8> = HandoffQueue::new();
        assert!(queue.try_provide(1));
        assert_eq!(queue.try_process(), Some(1));
        assert!(queue.try_complete(11));

        // Provider stage is free again before the consumer reads.
        assert!(queue.try_provide(2));
        assert_eq!(queue.try_process(), Some(2));
        assert!(!queue.try_complete(22), "previous result not consumed");

        assert_eq!(queue.try_consume(), Some(11));
        assert!(queue.try_complete(22));
        assert_eq!(queue.try_consume(), Some(22));
        assert_eq!(queue.try_consume(), None);
    }

    #[test]
    fn test_take_never_returns_a_value_twice() {
        let queue: HandoffQueue<&'static str> = HandoffQueue::new();
        assert_eq!(queue.try_process(), None);

        assert!(queue.try_provide("fix"));
        assert_eq!(queue.try_process(), Some("fix"));
        assert_eq!(queue.try_process(), None);

        assert!(queue.try_complete("done"));
        assert_eq!(queue.try_consume(), Some("done"));
        assert_eq!(queue.try_consume(), None);
    }

    #[test]
    fn test_provide_with_builds_value_only_when_published() {
        use crate::sync::Guarded;

        let queue: HandoffQueue<u32> = HandoffQueue::new();
        let extra = Guarded::new(5u32);
        let calls = Guarded::new(0u32);

        let make = |cs: CriticalSection<'_>, previous: Option<&u32>| {
            calls.update(|n| n + 1);
            previous.copied().unwrap_or(0) + extra.get_in(cs)
        };
        assert!(queue.try_provide_with(make));
        extra.set(7);
        assert!(!queue.try_provide_with(make), "blocked provide must not build");
        assert_eq!(calls.get(), 1);

        assert_eq!(queue.try_process(), Some(5));
        assert!(queue.try_complete(0));
        assert!(queue.try_provide_with(make));
        assert_eq!(queue.try_process(), Some(12), "reads state current at publish");
    }

    #[test]
    fn test_complete_needs_a_provided_value() {
        let queue: HandoffQueue<u8> = HandoffQueue::new();
        assert!(!queue.try_complete(1));
        assert_eq!(queue.try_consume(), None);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_static_queue() {
        static CHANNEL: HandoffQueue<i32> = HandoffQueue::new();
        assert!(CHANNEL.try_provide(-4));
        assert_eq!(CHANNEL.try_process(), Some(-4));
        assert!(!CHANNEL.is_idle());
        assert!(CHANNEL.try_complete(16));
        assert_eq!(CHANNEL.try_consume(), Some(16));
    }
}
