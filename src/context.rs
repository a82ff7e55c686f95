//! # Execution Contexts
//!
//! Data model for the two execution flows and the bootstrap state machine.
//!
//! - **Foreground**: the caller's own control flow, running on the ambient
//!   (main) stack.
//! - **Background**: an endless worker loop on a dedicated stack region.
//!
//! A context that is not running is fully described by its saved stack
//! pointer: the port pushes the register set onto the context's own stack
//! before handing the stack pointer to the scheduler.

// ---------------------------------------------------------------------------
// Context identity
// ---------------------------------------------------------------------------

/// One of the two schedulable execution flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextId {
    Foreground,
    Background,
}

impl ContextId {
    /// The context that is not `self`.
    #[inline]
    pub const fn other(self) -> Self {
        match self {
            ContextId::Foreground => ContextId::Background,
            ContextId::Background => ContextId::Foreground,
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap state
// ---------------------------------------------------------------------------

/// Progress of the one-time background bootstrap.
///
/// ```text
///   init(background) ──► Unarmed ──► Armed ──► Bootstrapped
///                      (stack ready) (first tick)
/// ```
///
/// Ticks in `Unarmed` are ignored. The first tick in `Armed` records the
/// background stack pointer and resumes the suspended foreground inside
/// `init`. Timer-only runtimes start directly in `Bootstrapped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ArmState {
    Unarmed = -1,
    Bootstrapped = 0,
    Armed = 1,
}

// ---------------------------------------------------------------------------
// Stack region
// ---------------------------------------------------------------------------

/// A downward-growing stack occupying `[top - size, top]`.
///
/// Addresses are kept as `usize` so the bookkeeping is plain data that can
/// be shared across contexts and tested on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    top: usize,
    size: usize,
}

impl StackRegion {
    /// Region ending at `top` (exclusive of anything above it).
    pub const fn new(top: usize, size: usize) -> Self {
        Self { top, size }
    }

    /// Describe a byte buffer as a stack. The top is aligned down to
    /// 8 bytes as required by the ARM AAPCS.
    pub fn from_buffer(buffer: &mut [u8]) -> Self {
        let start = buffer.as_mut_ptr() as usize;
        let top = (start + buffer.len()) & !0x07;
        Self {
            top,
            size: top.saturating_sub(start),
        }
    }

    /// Initial stack pointer: one past the highest usable byte.
    #[inline]
    pub const fn top(&self) -> usize {
        self.top
    }

    /// Lowest address of the region.
    #[inline]
    pub const fn bottom(&self) -> usize {
        self.top.saturating_sub(self.size)
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether `sp` points into this region.
    #[inline]
    pub const fn contains(&self, sp: usize) -> bool {
        sp >= self.bottom() && sp <= self.top
    }

    /// Bytes in use when the stack pointer is `sp`.
    #[inline]
    pub const fn depth(&self, sp: usize) -> usize {
        self.top.saturating_sub(sp)
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Bookkeeping for one execution flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Which flow this is.
    pub id: ContextId,

    /// Dedicated stack. `None` for the foreground, which uses the ambient
    /// stack.
    pub stack: Option<StackRegion>,

    /// Stack pointer recorded when the context was last switched out.
    pub saved_sp: usize,

    /// Deepest stack usage observed at a switch-out, in bytes. Never
    /// decreases.
    pub high_water_mark: usize,
}

impl ExecutionContext {
    pub const fn new(id: ContextId) -> Self {
        Self {
            id,
            stack: None,
            saved_sp: 0,
            high_water_mark: 0,
        }
    }

    /// Give the context its dedicated stack.
    pub fn attach_stack(&mut self, region: StackRegion) {
        self.stack = Some(region);
        self.saved_sp = region.top();
    }

    /// Whether `sp` lies on this context's dedicated stack.
    #[inline]
    pub fn owns(&self, sp: usize) -> bool {
        match self.stack {
            Some(region) => region.contains(sp),
            None => false,
        }
    }

    /// Record the stack pointer at switch-out and update the high-water
    /// mark.
    pub fn suspend(&mut self, sp: usize) {
        self.saved_sp = sp;
        if let Some(region) = self.stack {
            if region.contains(sp) {
                self.high_water_mark = self.high_water_mark.max(region.depth(sp));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
