//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick as the tick source, the naked SysTick handler that swaps
//! stacks, and the one-way launch onto the background stack.
//!
//! ## Stack Model
//!
//! - **Foreground** runs in Thread mode on **MSP**, the stack `main` got
//!   from the reset handler.
//! - **Background** runs in Thread mode on **PSP**, pointing into the
//!   buffer given to `kernel::init`.
//! - The SysTick handler runs in Handler mode on MSP, below the
//!   foreground's saved frame.
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the interrupted context's stack. The handler pushes R4–R11 onto the same
//! stack, so a suspended context is fully described by one stack pointer.
//! Bit 2 of EXC_RETURN tells which stack was interrupted.
//!
//! ## Bootstrap
//!
//! `launch_background` builds a fake exception frame on MSP whose PC is its
//! own epilogue, then moves Thread mode onto PSP and enters the background
//! loop. The first SysTick "returns" into that frame, which unwinds
//! `launch_background` as if it had returned normally.
//!
//! Floating-point context is not saved: code in either context must not
//! use the FPU (build for `thumbv7em-none-eabi`).

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, SYSTICK_MAX_RELOAD};
use crate::context::ContextId;
use crate::error::{Error, Result};
use crate::kernel::{KERNEL, LAUNCH};
use crate::scheduler::Switch;

/// Return to Thread mode, restore from MSP (foreground).
const EXC_RETURN_THREAD_MSP: u32 = 0xFFFF_FFF9;

/// Return to Thread mode, restore from PSP (background).
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// xPSR with only the Thumb bit set.
const XPSR_THUMB: u32 = 0x0100_0000;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// SysTick reload value for `period_us`.
///
/// # Errors
/// `PeriodOutOfRange` if the reload value does not fit 24 bits.
pub fn check_period(period_us: u32) -> Result<u32> {
    let cycles = u64::from(SYSTEM_CLOCK_HZ / 1_000_000) * u64::from(period_us);
    if cycles == 0 || cycles - 1 > u64::from(SYSTICK_MAX_RELOAD) {
        return Err(Error::PeriodOutOfRange { period_us });
    }
    Ok((cycles - 1) as u32)
}

/// Configure SysTick to fire every `period_us` microseconds from the
/// processor clock.
///
/// # Errors
/// `PeriodOutOfRange` if the reload value does not fit 24 bits.
pub fn configure_systick(syst: &mut SYST, period_us: u32) -> Result<()> {
    let reload = check_period(period_us)?;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
    Ok(())
}

/// Put SysTick at the lowest priority so the stack swap never preempts an
/// application interrupt handler.
pub fn set_tick_priority(scb: &mut SCB) {
    // SAFETY: changing the priority of a system handler cannot break a
    // priority-based critical section; the runtime only masks via PRIMASK.
    unsafe { scb.set_priority(SystemHandler::SysTick, 0xFF) };
}

/// Raise the tick handler now.
///
/// Pends SysTick. Called inside a critical section, the handler runs the
/// instant the section ends, on the caller's behalf.
#[inline]
pub fn fire_now() {
    SCB::set_pendst();
}

/// Whether a SysTick is pending but not yet delivered.
#[inline]
pub fn tick_pending() -> bool {
    SCB::is_pendst_pending()
}

// ---------------------------------------------------------------------------
// SysTick handler (context switch)
// ---------------------------------------------------------------------------

/// SysTick exception handler: tick accounting and stack swap.
///
/// ## Sequence
/// 1. Push R4–R11 onto the interrupted stack (MSP or PSP per EXC_RETURN)
/// 2. Call `switch_context(sp, exc_return)`, which runs the scheduler
/// 3. Load the returned stack pointer into MSP or PSP
/// 4. Pop R4–R11 and return through the returned EXC_RETURN
///
/// # Safety
/// Naked function entered directly from the vector table. It must follow
/// the Cortex-M exception entry/exit convention exactly.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn SysTick() {
    naked_asm!(
        // --- Save interrupted context ---
        "tst lr, #4",
        "bne 1f",
        "push {{r4-r11}}",         // foreground: MSP is the current stack
        "mov r0, sp",
        "b 2f",
        "1:",
        "mrs r0, psp",             // background
        "stmdb r0!, {{r4-r11}}",
        "2:",

        // --- Decide: returns r0 = next sp, r1 = EXC_RETURN ---
        "mov r1, lr",
        "bl {switch_context}",
        "mov lr, r1",

        // --- Restore next context ---
        "tst lr, #4",
        "bne 3f",
        "mov sp, r0",
        "pop {{r4-r11}}",
        "bx lr",
        "3:",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "bx lr",

        switch_context = sym switch_context,
    );
}

/// Run the scheduler for the interrupted stack pointer `sp`.
///
/// Returns the next stack pointer in the low word (r0) and the EXC_RETURN
/// to leave the handler with in the high word (r1).
extern "C" fn switch_context(sp: usize, exc_return: u32) -> u64 {
    let (next_sp, next_return) = match KERNEL.on_tick(sp) {
        Switch::Stay => (sp, exc_return),
        Switch::Resume { sp } => (sp, EXC_RETURN_THREAD_MSP),
        Switch::To { context: ContextId::Foreground, sp } => (sp, EXC_RETURN_THREAD_MSP),
        Switch::To { context: ContextId::Background, sp } => (sp, EXC_RETURN_THREAD_PSP),
    };
    ((next_return as u64) << 32) | next_sp as u32 as u64
}

// ---------------------------------------------------------------------------
// Background launch
// ---------------------------------------------------------------------------

/// Move Thread mode onto the background stack and run the background loop.
///
/// Returns to the caller only after the first SysTick has resumed the
/// foreground frame suspended here.
///
/// ## MSP after the suspend
///
/// ```text
/// [ r4-r11, lr of caller ]    <- popped by the epilogue at label 2
/// [ hardware frame ]          <- PC = label 2, xPSR = Thumb
///   r0 r1 r2 r3 r12 lr pc xpsr
/// [ software frame ]          <- resume sp handed to the scheduler
///   r4 .. r11 (unused)
/// ```
///
/// # Safety
/// `stack_top` must be the 8-byte aligned top of a `'static` region that
/// no one else uses, and the kernel must be prepared but not armed.
#[unsafe(naked)]
pub unsafe extern "C" fn launch_background(stack_top: usize) {
    naked_asm!(
        "push {{r4-r11, lr}}",

        // Hardware frame returning to label 2 in Thread mode.
        "sub sp, #32",
        "adr.w r2, 2f",
        "str r2, [sp, #24]",
        "mov.w r3, #{xpsr}",
        "str r3, [sp, #28]",

        // Software frame (R4-R11) for the handler to pop.
        "sub sp, #32",
        "mov r1, sp",

        // Thread mode on PSP = background stack.
        "msr psp, r0",
        "movs r2, #2",
        "msr control, r2",
        "isb",

        "mov r0, r1",
        "bl {background_loop}",
        "udf #0",

        ".balign 4",
        "2:",
        "pop {{r4-r11, pc}}",

        xpsr = const XPSR_THUMB,
        background_loop = sym background_loop,
    );
}

/// Endless background loop. Entered on PSP, never returns.
///
/// Arms the bootstrap with the suspended foreground frame `resume_sp`,
/// spins until the first tick has handed the CPU back to the foreground,
/// then runs the background entry forever.
extern "C" fn background_loop(resume_sp: usize) -> ! {
    let Some(launch) = LAUNCH.get() else {
        loop {
            cortex_m::asm::wfi();
        }
    };

    KERNEL.arm(launch.region, resume_sp);
    while KERNEL.is_armed() {
        core::hint::spin_loop();
    }

    let entry = launch.entry;
    loop {
        entry();
    }
}

