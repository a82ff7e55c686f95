//! # Twotask
//!
//! A two-context runtime for single-core microcontrollers: a foreground
//! (the code `main` runs) and one background entry, preempting each other
//! on every tick of a periodic timer, plus the handoff queues they use to
//! pass data without locks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │          Application: foreground + background          │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │  init() · yield_now() · current_tick() · stack usage   │
//! ├──────────────┬───────────────────┬─────────────────────┤
//! │  Scheduler   │  Tick Counter     │  Handoff Queues     │
//! │  scheduler.rs│  tick.rs          │  handoff.rs, geo.rs │
//! │  ─ tick()    │  ─ advance()      │  ─ try_provide()    │
//! │  ─ arm()     │  ─ is_due()       │  ─ try_process()    │
//! ├──────────────┴───────────────────┤  ─ try_complete()   │
//! │  Contexts (context.rs)           │  ─ try_consume()    │
//! │  StackRegion · high-water mark   │                     │
//! ├──────────────────────────────────┴─────────────────────┤
//! │         Sync (sync.rs): critical sections, Guarded     │
//! ├────────────────────────────────────────────────────────┤
//! │  Arch Port: cortex_m4.rs (SysTick, naked handlers)     │
//! │             hosted.rs (OS threads, baton)              │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! - **Tick**: SysTick fires every `TICK_PERIOD_US`. Each live tick advances
//!   the tick counter and hands the CPU to the other context.
//! - **Yield**: the foreground may force a tick with `yield_now()` to run a
//!   background slice early; that tick does not count as elapsed time.
//! - **Bootstrap**: `init` moves onto the background stack and returns only
//!   after the first tick, so the caller sees an ordinary call.
//!
//! ## Memory Model
//!
//! - **No heap**: the background stack is a `&'static mut [u8]`
//! - **No `alloc`** on the target: pure `core`
//! - **Critical sections** via the `critical-section` crate (PRIMASK on
//!   Cortex-M, a global lock on the host)
//!
//! ## Building
//!
//! The default `std` feature builds the hosted port and runs the tests on
//! the host. Firmware builds use
//! `cargo build --no-default-features --target thumbv7em-none-eabi`.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod arch;
pub mod config;
pub mod context;
pub mod error;
pub mod geo;
pub mod handoff;
pub mod kernel;
pub mod scheduler;
pub mod sync;
pub mod tick;

pub use error::{Error, Result};
pub use geo::{GeoChannel, GeoFix, GeoLeg, GeoPoint};
pub use handoff::HandoffQueue;
pub use sync::Guarded;
pub use tick::is_due;
