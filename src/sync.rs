//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All state shared between
//! the foreground and background contexts is accessed within a critical
//! section, so the tick interrupt (the only place contexts change) can
//! never observe a half-written value.
//!
//! On Cortex-M the section is provided by `cortex-m`'s single-core
//! `critical-section` implementation (PRIMASK); on the hosted port by
//! `critical-section`'s `std` implementation.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex, RestoreState};

/// Execute a closure within a critical section (tick interrupt masked).
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep critical sections short: a tick that arrives while the section is
/// held is delivered when it ends, late but not lost.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// Guard for a critical section opened with [`enter`].
///
/// Dropping the guard exits the section and restores the interrupt state
/// that was active at `enter`.
#[must_use = "the critical section ends when the guard is dropped"]
pub struct Section {
    restore: RestoreState,
}

/// Enter a critical section. The section lasts until the guard is dropped.
///
/// Nesting restores correctly, but the runtime itself never nests sections.
#[inline]
pub fn enter() -> Section {
    // SAFETY: the matching release happens in `Section::drop`, and guards
    // can only be dropped in reverse order of creation within one context.
    let restore = unsafe { critical_section::acquire() };
    Section { restore }
}

impl Section {
    /// Token proving that the critical section is held.
    #[inline]
    pub fn token(&self) -> CriticalSection<'_> {
        // SAFETY: the section is held for as long as `self` is borrowed.
        unsafe { CriticalSection::new() }
    }
}

impl Drop for Section {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `restore` came from the `acquire` in `enter`.
        unsafe { critical_section::release(self.restore) }
    }
}

// ---------------------------------------------------------------------------
// Guarded scalar access
// ---------------------------------------------------------------------------

/// A scalar shared between contexts, read and written inside a critical
/// section.
///
/// Meant for single flags and counters that do not need the full
/// provider/processor/consumer exchange of [`crate::handoff::HandoffQueue`].
///
/// ```ignore
/// static PAUSED: Guarded<bool> = Guarded::new(false);
///
/// let was_paused = PAUSED.set(true);
/// ```
pub struct Guarded<T: Copy> {
    value: Mutex<Cell<T>>,
}

impl<T: Copy> Guarded<T> {
    /// Create a guarded value. Usable in `static` initializers.
    pub const fn new(value: T) -> Self {
        Self {
            value: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value.
    #[inline]
    pub fn get(&self) -> T {
        critical_section(|cs| self.value.borrow(cs).get())
    }

    /// Replace the value, returning the previous one.
    #[inline]
    pub fn set(&self, value: T) -> T {
        critical_section(|cs| self.value.borrow(cs).replace(value))
    }

    /// Apply `f` to the value in a single critical section and return the
    /// new value.
    #[inline]
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        critical_section(|cs| {
            let cell = self.value.borrow(cs);
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }

    /// Read the value under an already-held critical section.
    #[inline]
    pub fn get_in(&self, cs: CriticalSection<'_>) -> T {
        self.value.borrow(cs).get()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
