//! Error kinds (spec.md §7). No `thiserror`: the teacher crate's own
//! `ArenaAllocError` is a plain enum with a manual `Display`, and this
//! crate's `#![no_std]` posture rules out anything pulling in `std::error`
//! unconditionally anyway (`core::error::Error` covers it).

use core::fmt;

use crate::header::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// Host allocator returned null after one full-GC retry (spec.md §5, §7).
    OutOfMemory,
    /// Fixed-arena build only: a `protect` would exceed capacity. Headroom
    /// of 4 slots is forced before this is raised so unwinding can still
    /// push temporaries (spec.md §7, mirroring `gc_arena_keep`).
    ArenaOverflow,
    /// Bad class/type pair at `alloc`, raised before any slot is consumed.
    TypeError {
        expected: TypeTag,
        found: TypeTag,
    },
    /// `generational_mode=` called while `disabled` or `iterating`.
    ModeChangeWhileDisabledOrIterating,
    /// Pre-allocated exception referenced when the host's own call stack
    /// overflows. The collector never raises this itself; its only
    /// responsibility is clearing the exception's ivars/message/backtrace
    /// at final-mark so stale references don't survive (spec.md §7).
    StackOverflow,
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::OutOfMemory => write!(f, "out of memory"),
            GcError::ArenaOverflow => write!(f, "arena overflow"),
            GcError::TypeError { expected, found } => {
                write!(f, "allocation failure: expected {expected:?}, found {found:?}")
            }
            GcError::ModeChangeWhileDisabledOrIterating => {
                write!(f, "generational mode changed while GC disabled or iterating")
            }
            GcError::StackOverflow => write!(f, "stack overflow"),
        }
    }
}

impl core::error::Error for GcError {}
