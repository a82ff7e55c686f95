//! # Architecture Abstraction Layer
//!
//! Ports that deliver ticks and swap stacks for the scheduler:
//! - `cortex_m4`: SysTick plus naked handlers, for bare-metal Thumb-2 builds.
//! - `hosted`: OS threads handing a baton, for running on a desktop.
//!
//! Both drive the same [`crate::kernel::Kernel`]; only how a stack pointer
//! is captured and restored differs.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(feature = "std")]
pub mod hosted;
