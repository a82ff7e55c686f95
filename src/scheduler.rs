//! # Scheduler
//!
//! The per-tick switch decision for the two contexts. This module is pure
//! bookkeeping: the port saves the interrupted register set onto the
//! current stack, hands the resulting stack pointer to [`Scheduler::tick`],
//! and loads whatever stack pointer the returned [`Switch`] names.
//!
//! ## Tick Handling
//!
//! On every tick, live or synthetic:
//! 1. **Pre-arm guard**: ticks before the background is armed are ignored
//! 2. **Bootstrap**: the first tick after arming captures the background
//!    stack pointer and resumes the foreground inside `init` (once)
//! 3. **Accounting**: live ticks advance the tick counter, synthetic ticks
//!    (from `yield_now`) do not
//! 4. **Switch**: a stack pointer inside the background region means the
//!    background was interrupted → resume the foreground, and vice versa
//!
//! In timer-only mode steps 2 and 4 never happen.

use crate::context::{ArmState, ContextId, ExecutionContext, StackRegion};
use crate::tick::TickCounter;

// ---------------------------------------------------------------------------
// Switch outcome
// ---------------------------------------------------------------------------

/// What the port must do when the tick handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    /// Resume the interrupted context unchanged.
    Stay,

    /// First tick after arming: continue the foreground from the frame
    /// suspended inside `init`.
    Resume { sp: usize },

    /// Load `sp` and continue as `context`.
    To { context: ContextId, sp: usize },
}

/// Operating mode chosen by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `init` not called yet.
    Uninitialized,
    /// Tick counter only, no background context.
    TimerOnly,
    /// Foreground and background alternate on every tick.
    Background,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Switch-engine state: both contexts, the bootstrap state machine and the
/// tick counter. Lives behind a critical-section mutex in
/// [`crate::kernel::Kernel`].
pub struct Scheduler {
    foreground: ExecutionContext,
    background: ExecutionContext,
    mode: Mode,
    arm: ArmState,

    /// Suspended foreground frame inside `init`. Taken by the first tick.
    resume: Option<usize>,

    ticks: TickCounter,

    /// Set by `yield_now`; the next tick does not count as elapsed time.
    synthetic: bool,

    running: ContextId,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            foreground: ExecutionContext::new(ContextId::Foreground),
            background: ExecutionContext::new(ContextId::Background),
            mode: Mode::Uninitialized,
            arm: ArmState::Unarmed,
            resume: None,
            ticks: TickCounter::new(),
            synthetic: false,
            running: ContextId::Foreground,
        }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn arm_state(&self) -> ArmState {
        self.arm
    }

    /// Context that owns the CPU as far as the scheduler knows.
    #[inline]
    pub fn running(&self) -> ContextId {
        self.running
    }

    pub fn context(&self, id: ContextId) -> &ExecutionContext {
        match id {
            ContextId::Foreground => &self.foreground,
            ContextId::Background => &self.background,
        }
    }

    /// Run without a background context. Ticks only advance the counter.
    pub fn start_timer_only(&mut self) {
        self.mode = Mode::TimerOnly;
        self.arm = ArmState::Bootstrapped;
    }

    /// Enter background mode. Ticks are ignored until [`Scheduler::arm`].
    pub fn prepare_background(&mut self) {
        self.mode = Mode::Background;
        self.arm = ArmState::Unarmed;
    }

    /// Called on the background stack once it is ready to be preempted.
    ///
    /// `resume` is the foreground continuation that the first tick hands
    /// back to the port. Ignored unless the scheduler is prepared and not
    /// yet armed.
    pub fn arm(&mut self, region: StackRegion, resume: usize) {
        if self.mode != Mode::Background || self.arm != ArmState::Unarmed {
            return;
        }
        self.background.attach_stack(region);
        self.resume = Some(resume);
        self.running = ContextId::Background;
        self.arm = ArmState::Armed;
    }

    /// Mark the next tick as synthetic (raised by `yield_now`).
    #[inline]
    pub fn mark_synthetic(&mut self) {
        self.synthetic = true;
    }

    /// Prepare a yield. `tick_pending` tells whether a live tick is already
    /// waiting to be delivered.
    ///
    /// Returns `true` if the caller must raise a synthetic tick. A waiting
    /// live tick already hands over the CPU, and it must still be counted,
    /// so in that case nothing is marked.
    pub fn request_yield(&mut self, tick_pending: bool) -> bool {
        if tick_pending {
            return false;
        }
        self.mark_synthetic();
        true
    }

    /// Tick handler. `sp` is the stack pointer of the interrupted context
    /// after its registers were saved.
    pub fn tick(&mut self, sp: usize) -> Switch {
        match (self.mode, self.arm) {
            (Mode::Uninitialized, _) | (_, ArmState::Unarmed) => return Switch::Stay,
            (Mode::Background, ArmState::Armed) => return self.bootstrap(sp),
            _ => {}
        }

        if core::mem::take(&mut self.synthetic) {
            // Forced by yield: not elapsed time.
        } else {
            self.ticks.advance();
        }

        if self.mode == Mode::TimerOnly {
            return Switch::Stay;
        }
        self.switch_from(sp)
    }

    /// First tick after arming. Runs on the background stack.
    fn bootstrap(&mut self, sp: usize) -> Switch {
        self.background.saved_sp = sp;
        self.arm = ArmState::Bootstrapped;
        match self.resume.take() {
            Some(resume) => {
                self.running = ContextId::Foreground;
                Switch::Resume { sp: resume }
            }
            None => Switch::Stay,
        }
    }

    fn switch_from(&mut self, sp: usize) -> Switch {
        let next = if self.background.owns(sp) {
            self.background.suspend(sp);
            ContextId::Foreground
        } else {
            self.foreground.suspend(sp);
            ContextId::Background
        };
        self.running = next;
        Switch::To {
            context: next,
            sp: self.context(next).saved_sp,
        }
    }

    /// Ticks elapsed since `init`, excluding synthetic ticks.
    #[inline]
    pub fn current_tick(&self) -> i32 {
        self.ticks.get()
    }

    /// Deepest background stack usage seen so far, in bytes.
    #[inline]
    pub fn max_background_stack_usage(&self) -> usize {
        self.background.high_water_mark
    }
}

impl Default for Scheduler {
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

    const BG_TOP: usize = 0x2000_4000;
    const BG_SIZE: usize = 0x400;
    const FG_SP: usize = 0x2001_7F00;
    const RESUME_SP: usize = 0x2001_7E00;

    /// Scheduler taken through init and bootstrap, foreground running.
    fn bootstrapped() -> Scheduler {
        let mut sched = Scheduler::new();
        sched.prepare_background();
        sched.arm(StackRegion::new(BG_TOP, BG_SIZE), RESUME_SP);
        assert_eq!(sched.tick(BG_TOP - 0x40), Switch::Resume { sp: RESUME_SP });
        sched
    }

    #[test]
    fn test_ticks_before_init_are_ignored() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.tick(FG_SP), Switch::Stay);
        assert_eq!(sched.current_tick(), 0);
    }

    #[test]
    fn test_ticks_before_arming_are_ignored() {
        let mut sched = Scheduler::new();
        sched.prepare_background();
        for _ in 0..5 {
            assert_eq!(sched.tick(FG_SP), Switch::Stay);
        }
        assert_eq!(sched.arm_state(), ArmState::Unarmed);
        assert_eq!(sched.current_tick(), 0);
    }

    #[test]
    fn test_timer_only_counts_and_never_switches() {
        let mut sched = Scheduler::new();
        sched.start_timer_only();
        for _ in 0..4 {
            assert_eq!(sched.tick(FG_SP), Switch::Stay);
        }
        assert_eq!(sched.current_tick(), 4);

        sched.mark_synthetic();
        assert_eq!(sched.tick(FG_SP), Switch::Stay);
        assert_eq!(sched.current_tick(), 4, "synthetic tick must not count");

        assert_eq!(sched.tick(FG_SP), Switch::Stay);
        assert_eq!(sched.current_tick(), 5, "synthetic flag applies to one tick only");
        assert_eq!(sched.max_background_stack_usage(), 0);
    }

    #[test]
    fn test_bootstrap_happens_once_per_init() {
        for _ in 0..16 {
            let mut sched = Scheduler::new();
            sched.prepare_background();
            sched.arm(StackRegion::new(BG_TOP, BG_SIZE), RESUME_SP);
            assert_eq!(sched.arm_state(), ArmState::Armed);
            assert_eq!(sched.running(), ContextId::Background);

            let first = sched.tick(BG_TOP - 0x40);
            assert_eq!(first, Switch::Resume { sp: RESUME_SP });
            assert_eq!(sched.arm_state(), ArmState::Bootstrapped);
            assert_eq!(sched.running(), ContextId::Foreground);
            assert_eq!(sched.context(ContextId::Background).saved_sp, BG_TOP - 0x40);
            assert_eq!(sched.current_tick(), 0, "bootstrap tick is not elapsed time");

            // The next tick takes the switch path, never the bootstrap path.
            let second = sched.tick(FG_SP);
            assert_eq!(
                second,
                Switch::To { context: ContextId::Background, sp: BG_TOP - 0x40 }
            );
            assert_eq!(sched.current_tick(), 1);
        }
    }

    #[test]
    fn test_arm_is_ignored_outside_prepared_state() {
        let mut sched = Scheduler::new();
        sched.arm(StackRegion::new(BG_TOP, BG_SIZE), RESUME_SP);
        assert_eq!(sched.arm_state(), ArmState::Unarmed);

        let mut sched = bootstrapped();
        sched.arm(StackRegion::new(BG_TOP, BG_SIZE), 0xDEAD);
        assert_eq!(sched.arm_state(), ArmState::Bootstrapped);
        assert_ne!(sched.tick(FG_SP), Switch::Resume { sp: 0xDEAD });
    }

    #[test]
    fn test_contexts_alternate() {
        let mut sched = bootstrapped();

        assert_eq!(
            sched.tick(FG_SP),
            Switch::To { context: ContextId::Background, sp: BG_TOP - 0x40 }
        );
        assert_eq!(
            sched.tick(BG_TOP - 0x80),
            Switch::To { context: ContextId::Foreground, sp: FG_SP }
        );
        assert_eq!(
            sched.tick(FG_SP - 0x10),
            Switch::To { context: ContextId::Background, sp: BG_TOP - 0x80 }
        );
        assert_eq!(sched.running(), ContextId::Background);
        assert_eq!(sched.current_tick(), 3);
    }

    #[test]
    fn test_yield_switches_without_counting() {
        let mut sched = bootstrapped();
        sched.tick(FG_SP);
        sched.tick(BG_TOP - 0x40);
        assert_eq!(sched.current_tick(), 2);

        sched.mark_synthetic();
        assert_eq!(
            sched.tick(FG_SP),
            Switch::To { context: ContextId::Background, sp: BG_TOP - 0x40 }
        );
        assert_eq!(sched.current_tick(), 2);
    }

    #[test]
    fn test_yield_over_pending_live_tick_still_counts() {
        let mut sched = bootstrapped();
        sched.tick(FG_SP);
        sched.tick(BG_TOP - 0x40);
        assert_eq!(sched.current_tick(), 2);

        // The timer fired while the yield held the critical section.
        assert!(!sched.request_yield(true));
        assert_eq!(
            sched.tick(FG_SP),
            Switch::To { context: ContextId::Background, sp: BG_TOP - 0x40 }
        );
        assert_eq!(sched.current_tick(), 3, "live tick must be counted");

        sched.tick(BG_TOP - 0x40);
        assert!(sched.request_yield(false));
        sched.tick(FG_SP);
        assert_eq!(sched.current_tick(), 4, "only the forced tick is skipped");
    }

    #[test]
    fn test_high_water_mark_bounded_and_monotonic() {
        let mut sched = bootstrapped();
        let depths = [0x40, 0x120, 0x80, 0x3F0, 0x10, 0x200];
        let mut previous = 0;
        for depth in depths {
            sched.tick(FG_SP);
            sched.tick(BG_TOP - depth);
            let mark = sched.max_background_stack_usage();
            assert!(mark >= previous);
            assert!(mark <= BG_SIZE);
            previous = mark;
        }
        assert_eq!(previous, 0x3F0);
    }

    #[test]
    fn test_counter_overflow_through_ticks() {
        let mut sched = bootstrapped();
        sched.ticks = TickCounter::starting_at(i32::MAX - 1);

        sched.tick(FG_SP);
        assert_eq!(sched.current_tick(), i32::MAX);
        sched.tick(BG_TOP - 0x40);
        assert_eq!(sched.current_tick(), 0, "overflow restarts at 0");
        sched.tick(FG_SP);
        assert_eq!(sched.current_tick(), 1);
    }
}
