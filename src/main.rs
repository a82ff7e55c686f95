//! # Twotask Demo
//!
//! A squaring pipeline across the two contexts:
//!
//! | Role | Context | Work |
//! |------|---------|------|
//! | Provider | foreground | offers the next counter value every `SAMPLE_PERIOD_TICKS` |
//! | Processor | background | squares the value and publishes the result |
//! | Consumer | foreground | adds each square to a running total |
//!
//! On Cortex-M this is the firmware image. On a host it runs the same
//! pipeline on the hosted port; set `RUST_LOG=debug` for the runtime's own
//! setup messages.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use twotask::{is_due, Guarded, HandoffQueue};

/// Counter values out, squares back.
static SQUARES: HandoffQueue<u32, u64> = HandoffQueue::new();

/// Square computed but not yet accepted by the consumer.
static PENDING: Guarded<Option<u64>> = Guarded::new(None);

/// Ticks between two provided values.
const SAMPLE_PERIOD_TICKS: i32 = 10;

/// Background entry. Called over and over; never waits.
fn square_worker() {
    if PENDING.get().is_none() {
        if let Some(n) = SQUARES.try_process() {
            PENDING.set(Some(u64::from(n) * u64::from(n)));
        }
    }
    if let Some(square) = PENDING.get() {
        if SQUARES.try_complete(square) {
            PENDING.set(None);
        }
    }
}

/// Foreground side of the pipeline.
struct Pipeline {
    next: u32,
    last_sample: i32,
    total: u64,
    results: u32,
}

impl Pipeline {
    const fn new() -> Self {
        Self {
            next: 1,
            last_sample: 0,
            total: 0,
            results: 0,
        }
    }

    fn step(&mut self, now: i32) {
        if is_due(now, self.last_sample, SAMPLE_PERIOD_TICKS) && SQUARES.try_provide(self.next) {
            self.last_sample = now;
            self.next = self.next.wrapping_add(1);
        }
        if let Some(square) = SQUARES.try_consume() {
            self.total = self.total.wrapping_add(square);
            self.results = self.results.wrapping_add(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    use twotask::config::DEFAULT_BACKGROUND_STACK_SIZE;
    use twotask::kernel::{self, Background};

    use super::{square_worker, Pipeline};

    /// Firmware entry point. Starts the runtime, then runs the foreground
    /// half of the pipeline forever.
    #[entry]
    fn main() -> ! {
        let Some(mut cp) = cortex_m::Peripherals::take() else {
            halt()
        };
        let Some(stack) = cortex_m::singleton!(
            : [u8; DEFAULT_BACKGROUND_STACK_SIZE] = [0; DEFAULT_BACKGROUND_STACK_SIZE]
        ) else {
            halt()
        };
        let stack: &'static mut [u8] = stack;

        let background = Background {
            entry: square_worker,
            stack,
        };
        if kernel::init(&mut cp.SYST, &mut cp.SCB, Some(background)).is_err() {
            halt();
        }

        let mut pipeline = Pipeline::new();
        loop {
            pipeline.step(kernel::current_tick());
            // Nothing else to do this round: let the worker catch up.
            kernel::yield_now();
        }
    }

    fn halt() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}

// ---------------------------------------------------------------------------
// Hosted demo
// ---------------------------------------------------------------------------

/// Live ticks the hosted demo runs for.
#[cfg(all(not(target_os = "none"), feature = "std"))]
const DEMO_TICKS: u32 = 100;

/// Background stack for the hosted demo.
#[cfg(all(not(target_os = "none"), feature = "std"))]
const DEMO_STACK_SIZE: usize = 64 * 1024;

#[cfg(all(not(target_os = "none"), feature = "std"))]
fn main() {
    use log::{error, info};
    use twotask::arch::hosted::Machine;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let machine = match Machine::with_background(square_worker, DEMO_STACK_SIZE) {
        Ok(machine) => machine,
        Err(err) => {
            error!("cannot start runtime: {err}");
            std::process::exit(1);
        }
    };

    let mut pipeline = Pipeline::new();
    for _ in 0..DEMO_TICKS {
        machine.advance(1);
        pipeline.step(machine.current_tick());
        machine.yield_now();
        pipeline.step(machine.current_tick());
    }

    info!(
        "{} ticks, {} squares consumed, total {}, background stack high-water {} bytes",
        machine.current_tick(),
        pipeline.results,
        pipeline.total,
        machine.max_background_stack_usage()
    );
}

#[cfg(all(not(target_os = "none"), not(feature = "std")))]
fn main() {}
