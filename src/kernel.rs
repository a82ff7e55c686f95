//! # Kernel
//!
//! Process-wide runtime state and the public API.
//!
//! [`Kernel`] wraps the [`Scheduler`] in a critical-section mutex; every
//! access from either context or from the tick handler goes through it.
//! On Cortex-M there is exactly one instance, [`KERNEL`], driven by the
//! SysTick handler in [`crate::arch::cortex_m4`]. The hosted port owns one
//! instance per machine.
//!
//! ## Startup Sequence (Cortex-M)
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         └─► kernel::init(syst, scb, Some(background))
//!               ├─► Scheduler → Background mode (Unarmed)
//!               ├─► Configure SysTick (ticks ignored while Unarmed)
//!               └─► arch::launch_background()
//!                     ├─► Suspend foreground frame on MSP
//!                     ├─► Move thread mode onto the background stack (PSP)
//!                     ├─► Arm, spin until the first tick
//!                     └─► first SysTick resumes the foreground frame
//!         ◄── init returns; background runs on every other tick
//! ```

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use crate::context::{ArmState, StackRegion};
use crate::error::{Error, Result};
use crate::scheduler::{Mode, Scheduler, Switch};
use crate::sync;

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

/// Runtime state shared by both contexts and the tick handler.
pub struct Kernel {
    scheduler: Mutex<RefCell<Scheduler>>,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            scheduler: Mutex::new(RefCell::new(Scheduler::new())),
        }
    }

    fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Scheduler) -> R,
    {
        sync::critical_section(|cs| f(&mut self.scheduler.borrow_ref_mut(cs)))
    }

    /// Start in timer-only mode.
    pub fn init_timer_only(&self) -> Result<()> {
        self.with(|sched| {
            if sched.mode() != Mode::Uninitialized {
                return Err(Error::AlreadyInitialized);
            }
            sched.start_timer_only();
            Ok(())
        })
    }

    /// Start in background mode; ticks are ignored until [`Kernel::arm`].
    pub fn init_background(&self) -> Result<()> {
        self.with(|sched| {
            if sched.mode() != Mode::Uninitialized {
                return Err(Error::AlreadyInitialized);
            }
            sched.prepare_background();
            Ok(())
        })
    }

    /// Arm the bootstrap. Called on the background stack.
    pub fn arm(&self, region: StackRegion, resume: usize) {
        self.with(|sched| sched.arm(region, resume));
    }

    /// `true` while the background waits for its first tick.
    pub fn is_armed(&self) -> bool {
        self.with(|sched| sched.arm_state() == ArmState::Armed)
    }

    /// Mark the next tick as synthetic, under the caller's critical section.
    pub fn mark_synthetic(&self, cs: CriticalSection<'_>) {
        self.scheduler.borrow_ref_mut(cs).mark_synthetic();
    }

    /// Prepare a yield under the caller's critical section. Returns `true`
    /// if the caller must raise the tick itself; see
    /// [`Scheduler::request_yield`].
    pub fn request_yield(&self, cs: CriticalSection<'_>, tick_pending: bool) -> bool {
        self.scheduler.borrow_ref_mut(cs).request_yield(tick_pending)
    }

    /// Tick handler entry: decide the switch for the interrupted stack
    /// pointer `sp`.
    pub fn on_tick(&self, sp: usize) -> Switch {
        self.with(|sched| sched.tick(sp))
    }

    /// Ticks since `init`, excluding synthetic ticks.
    pub fn current_tick(&self) -> i32 {
        self.with(|sched| sched.current_tick())
    }

    /// Deepest background stack usage seen so far, in bytes.
    pub fn max_background_stack_usage(&self) -> usize {
        self.with(|sched| sched.max_background_stack_usage())
    }

    pub fn mode(&self) -> Mode {
        self.with(|sched| sched.mode())
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Cortex-M API
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::firmware::{
    current_tick, init, max_background_stack_usage, yield_now, Background, KERNEL,
};
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) use self::firmware::LAUNCH;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use log::{debug, info};

    use super::Kernel;
    use crate::arch::cortex_m4;
    use crate::config::{MIN_BACKGROUND_STACK, TICK_PERIOD_US};
    use crate::context::StackRegion;
    use crate::error::{Error, Result};
    use crate::sync::{self, Guarded};

    /// Global runtime instance, driven by the SysTick handler.
    pub static KERNEL: Kernel = Kernel::new();

    /// What the background loop needs once it runs on its own stack.
    #[derive(Clone, Copy)]
    pub(crate) struct Launch {
        pub entry: fn(),
        pub region: StackRegion,
    }

    /// Written by `init` before the stack switch, read once by the
    /// background loop.
    pub(crate) static LAUNCH: Guarded<Option<Launch>> = Guarded::new(None);

    /// Background work: `entry` is called forever on `stack`.
    pub struct Background {
        pub entry: fn(),
        pub stack: &'static mut [u8],
    }

    /// Initialize the runtime and start the tick.
    ///
    /// With `None` only the tick counter runs. With a background, this
    /// call returns after the first tick, with the background context armed
    /// and preempting the foreground on every other tick from then on.
    ///
    /// # Errors
    /// - `AlreadyInitialized` on a second call.
    /// - `StackTooSmall` if the stack is below `MIN_BACKGROUND_STACK`.
    /// - `PeriodOutOfRange` if `TICK_PERIOD_US` does not fit SysTick.
    ///
    /// # Example
    /// ```ignore
    /// let stack = cortex_m::singleton!(: [u8; 1024] = [0; 1024]).unwrap();
    /// kernel::init(&mut cp.SYST, &mut cp.SCB, Some(Background { entry: worker, stack }))?;
    /// ```
    pub fn init(
        syst: &mut cortex_m::peripheral::SYST,
        scb: &mut cortex_m::peripheral::SCB,
        background: Option<Background>,
    ) -> Result<()> {
        cortex_m4::check_period(TICK_PERIOD_US)?;

        let Some(background) = background else {
            KERNEL.init_timer_only()?;
            cortex_m4::set_tick_priority(scb);
            cortex_m4::configure_systick(syst, TICK_PERIOD_US)?;
            info!("timer-only runtime, tick every {} us", TICK_PERIOD_US);
            return Ok(());
        };

        if background.stack.len() < MIN_BACKGROUND_STACK {
            return Err(Error::StackTooSmall {
                size: background.stack.len(),
                min: MIN_BACKGROUND_STACK,
            });
        }
        let region = StackRegion::from_buffer(background.stack);

        KERNEL.init_background()?;
        LAUNCH.set(Some(Launch {
            entry: background.entry,
            region,
        }));
        // Ticks are ignored until the background loop arms the scheduler.
        cortex_m4::set_tick_priority(scb);
        cortex_m4::configure_systick(syst, TICK_PERIOD_US)?;
        debug!(
            "background stack {:#010x}..{:#010x}",
            region.bottom(),
            region.top()
        );

        // SAFETY: `region` is a `'static` buffer owned by the runtime from
        // here on, and the scheduler is prepared but unarmed, so a tick that
        // lands during the launch is ignored.
        unsafe { cortex_m4::launch_background(region.top()) };

        info!("background bootstrapped, tick every {} us", TICK_PERIOD_US);
        Ok(())
    }

    /// Hand the CPU to the background for one slice, right now.
    ///
    /// Foreground only. Returns once the background is preempted by the
    /// next live tick. The forced tick is not counted by `current_tick`.
    /// If a live tick is already pending, that tick does the switch and is
    /// counted as usual.
    pub fn yield_now() {
        sync::critical_section(|cs| {
            if KERNEL.request_yield(cs, cortex_m4::tick_pending()) {
                cortex_m4::fire_now();
            }
        });
    }

    /// Ticks since `init`, excluding ticks forced by `yield_now`.
    pub fn current_tick() -> i32 {
        KERNEL.current_tick()
    }

    /// Deepest background stack usage seen so far, in bytes.
    pub fn max_background_stack_usage() -> usize {
        KERNEL.max_background_stack_usage()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;

    #[test]
    fn test_init_twice_fails() {
        let kernel = Kernel::new();
        assert_eq!(kernel.mode(), Mode::Uninitialized);
        kernel.init_timer_only().unwrap();
        assert_eq!(kernel.init_timer_only(), Err(Error::AlreadyInitialized));
        assert_eq!(kernel.init_background(), Err(Error::AlreadyInitialized));
        assert_eq!(kernel.mode(), Mode::TimerOnly);
    }

    #[test]
    fn test_synthetic_tick_through_kernel() {
        let kernel = Kernel::new();
        kernel.init_timer_only().unwrap();
        kernel.on_tick(0x100);
        sync::critical_section(|cs| kernel.mark_synthetic(cs));
        kernel.on_tick(0x100);
        assert_eq!(kernel.current_tick(), 1);
    }

    #[test]
    fn test_yield_with_pending_tick_through_kernel() {
        let kernel = Kernel::new();
        kernel.init_timer_only().unwrap();
        let raise = sync::critical_section(|cs| kernel.request_yield(cs, true));
        assert!(!raise);
        kernel.on_tick(0x100);
        assert_eq!(kernel.current_tick(), 1);

        let raise = sync::critical_section(|cs| kernel.request_yield(cs, false));
        assert!(raise);
        kernel.on_tick(0x100);
        assert_eq!(kernel.current_tick(), 1);
    }

    #[test]
    fn test_background_bootstrap_through_kernel() {
        let kernel = Kernel::new();
        kernel.init_background().unwrap();
        assert!(!kernel.is_armed());
        assert_eq!(kernel.on_tick(0x9000), Switch::Stay);

        kernel.arm(StackRegion::new(0x1000, 0x800), 0x9000);
        assert!(kernel.is_armed());
        assert_eq!(kernel.on_tick(0x0F00), Switch::Resume { sp: 0x9000 });
        assert!(!kernel.is_armed());
        assert_eq!(
            kernel.on_tick(0x8F00),
            Switch::To { context: ContextId::Background, sp: 0x0F00 }
        );
        assert_eq!(kernel.current_tick(), 1);
        assert_eq!(kernel.max_background_stack_usage(), 0);
    }
}
