//! # Hosted Port
//!
//! Runs the two contexts on a desktop OS so the runtime can be exercised
//! without hardware. Each context is an OS thread; a baton ([`Core`])
//! guarantees that only one of them executes at a time, which is what the
//! single physical core guarantees on the target.
//!
//! ## Differences from Cortex-M
//!
//! A thread cannot be interrupted asynchronously, so ticks are delivered at
//! well-defined points instead:
//! - **Live ticks** are raised by the foreground through
//!   [`Machine::advance`], standing in for the timer firing while the
//!   foreground runs.
//! - **Background slices** are one call of the background entry. At the end
//!   of the slice the port raises a synthetic tick that hands the CPU back,
//!   so a live tick or a `yield_now` grants exactly one slice and returns.
//! - The first tick after arming is produced by the background itself
//!   after idling for one tick period, as a free-running timer would.
//!
//! The switch decision is taken inside a critical section, the hand-off of
//! the baton after it: the other thread needs the section to run at all.
//!
//! Stack pointers are approximated by the address of a local variable on
//! the calling thread. The background region starts at the first frame of
//! the background thread and spans the requested stack size.
//!
//! There is no cancellation: dropping a [`Machine`] leaves its background
//! thread parked on the baton for the rest of the process.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::config::{HOSTED_MIN_STACK, TICK_PERIOD_US};
use crate::context::{ContextId, StackRegion};
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::scheduler::Switch;
use crate::sync;

/// Extra thread stack on top of the requested size. Covers the thread's
/// TLS block and guard page, so the measured region stays inside the
/// thread's own mapping.
const STACK_SLACK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Baton
// ---------------------------------------------------------------------------

/// The simulated CPU: records which context may run.
struct Core {
    running: Mutex<ContextId>,
    turn: Condvar,
}

impl Core {
    fn new(first: ContextId) -> Self {
        Self {
            running: Mutex::new(first),
            turn: Condvar::new(),
        }
    }

    /// Park the calling thread until `me` owns the CPU.
    fn wait_for(&self, me: ContextId) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        while *running != me {
            running = self.turn.wait(running).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Give the CPU to the other context and park until it comes back.
    fn switch_from(&self, me: ContextId) {
        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            *running = me.other();
            self.turn.notify_all();
        }
        self.wait_for(me);
    }
}

/// Stack pointer of the calling thread, approximated by a local's address.
#[inline(never)]
fn stack_pointer() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

struct Shared {
    kernel: Kernel,
    core: Core,
    period: Duration,
}

impl Shared {
    /// Tick handler. Runs on the thread of whichever context is running.
    #[inline(never)]
    fn on_tick(&self) {
        match self.kernel.on_tick(stack_pointer()) {
            Switch::Stay => {}
            Switch::Resume { .. } => self.core.switch_from(ContextId::Background),
            Switch::To { context, .. } => self.core.switch_from(context.other()),
        }
    }

    /// Raise a synthetic tick from the running context.
    fn fire_synthetic(&self) {
        sync::critical_section(|cs| self.kernel.mark_synthetic(cs));
        self.on_tick();
    }
}

/// A hosted two-context runtime. The thread that creates it is the
/// foreground.
///
/// ```
/// use twotask::arch::hosted::Machine;
///
/// let machine = Machine::timer_only().unwrap();
/// machine.advance(3);
/// assert_eq!(machine.current_tick(), 3);
/// ```
pub struct Machine {
    shared: Arc<Shared>,
}

impl Machine {
    /// Runtime with only the tick counter.
    pub fn timer_only() -> Result<Self> {
        Self::start(None, 0)
    }

    /// Runtime with `entry` running in the background on a stack of
    /// `stack_size` bytes.
    pub fn with_background(entry: fn(), stack_size: usize) -> Result<Self> {
        Self::start(Some(entry), stack_size)
    }

    /// Bring the runtime up. With a background, returns after the first
    /// tick has bootstrapped it.
    ///
    /// # Errors
    /// - `StackTooSmall` if `stack_size` is below `HOSTED_MIN_STACK`.
    /// - `PeriodOutOfRange` if `TICK_PERIOD_US` is zero.
    /// - `Spawn` if the background thread cannot be created, including a
    ///   `stack_size` too large to allocate.
    pub fn start(background: Option<fn()>, stack_size: usize) -> Result<Self> {
        if TICK_PERIOD_US == 0 {
            return Err(Error::PeriodOutOfRange { period_us: TICK_PERIOD_US });
        }
        let shared = Arc::new(Shared {
            kernel: Kernel::new(),
            core: Core::new(ContextId::Foreground),
            period: Duration::from_micros(u64::from(TICK_PERIOD_US)),
        });

        let Some(entry) = background else {
            shared.kernel.init_timer_only()?;
            info!("hosted timer-only runtime");
            return Ok(Self { shared });
        };

        if stack_size < HOSTED_MIN_STACK {
            return Err(Error::StackTooSmall {
                size: stack_size,
                min: HOSTED_MIN_STACK,
            });
        }
        let thread_stack = stack_size.checked_add(STACK_SLACK).ok_or(Error::Spawn)?;
        shared.kernel.init_background()?;

        // Foreground continuation: this frame, parked until the first tick.
        let resume = stack_pointer();
        let background_shared = Arc::clone(&shared);
        {
            let mut running = shared.core.running.lock().unwrap_or_else(PoisonError::into_inner);
            *running = ContextId::Background;
        }
        thread::Builder::new()
            .name("background".into())
            .stack_size(thread_stack)
            .spawn(move || background_loop(background_shared, entry, stack_size, resume))
            .map_err(|_| Error::Spawn)?;

        shared.core.wait_for(ContextId::Foreground);
        info!("hosted background bootstrapped ({} byte stack)", stack_size);
        Ok(Self { shared })
    }

    /// Deliver `ticks` live ticks to the foreground. With a background,
    /// each tick runs one background slice before returning.
    pub fn advance(&self, ticks: u32) {
        for _ in 0..ticks {
            self.shared.on_tick();
        }
    }

    /// Hand the CPU to the background for one slice without counting a
    /// tick. Foreground only.
    pub fn yield_now(&self) {
        self.shared.fire_synthetic();
    }

    /// Ticks since start, excluding synthetic ticks.
    pub fn current_tick(&self) -> i32 {
        self.shared.kernel.current_tick()
    }

    /// Deepest background stack usage seen so far, in bytes.
    pub fn max_background_stack_usage(&self) -> usize {
        self.shared.kernel.max_background_stack_usage()
    }

    /// Runtime state behind this machine.
    pub fn kernel(&self) -> &Kernel {
        &self.shared.kernel
    }
}

/// Body of the background thread.
fn background_loop(shared: Arc<Shared>, entry: fn(), stack_size: usize, resume: usize) {
    let region = StackRegion::new(stack_pointer(), stack_size);
    debug!(
        "background stack {:#x}..{:#x}",
        region.bottom(),
        region.top()
    );
    shared.kernel.arm(region, resume);

    // Idle until the timer's first tick bootstraps us.
    while shared.kernel.is_armed() {
        thread::sleep(shared.period);
        shared.on_tick();
    }

    loop {
        entry();
        shared.fire_synthetic();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
