//! # Twotask Configuration
//!
//! Compile-time constants governing the tick source and the background
//! context. All limits are fixed at compile time; there is no dynamic
//! allocation.

/// Tick period in microseconds. Every live tick advances the tick counter
/// by one and, once the background context is running, alternates the CPU
/// between foreground and background.
pub const TICK_PERIOD_US: u32 = 10_000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
/// SysTick is clocked from the core clock.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// SysTick has a 24-bit reload register.
pub const SYSTICK_MAX_RELOAD: u32 = 0x00FF_FFFF;

/// Stack size handed to the background context when the application has
/// no better estimate. Use `max_background_stack_usage()` while testing to
/// size it properly.
pub const DEFAULT_BACKGROUND_STACK_SIZE: usize = 1024;

/// Smallest background stack accepted by `init`. Must hold the exception
/// frame stacked by hardware (32 bytes), the software-saved context
/// (32 bytes for R4–R11) and a few frames of the background loop.
pub const MIN_BACKGROUND_STACK: usize = 256;

/// Smallest background stack accepted by the hosted port. The region also
/// holds the port's own tick path, which runs on the background thread.
pub const HOSTED_MIN_STACK: usize = 16 * 1024;
