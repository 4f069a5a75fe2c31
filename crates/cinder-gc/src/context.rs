//! The shape of a VM execution context that the marker needs to walk.
//!
//! Full call-stack/fiber-scheduling *logic* is an out-of-scope external
//! collaborator (spec.md §1); this module only carries the fields the
//! marker's root and context scan (spec.md §4.5) must be able to read.

use rust_alloc::vec::Vec;

use crate::value::{ObjRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    Created,
    Running,
    Resumed,
    Suspended,
    Terminated,
}

/// One entry of the call stack: which `Proc` is executing, against which
/// class, and the on-stack `Env` (if any) this frame captured — the three
/// fields `mark_context` walks per call frame. `env` is also what a
/// terminating fiber's destructor walks to unshare any still-on-stack
/// environment before the context itself is freed (spec.md §4.9).
#[derive(Debug, Clone, Copy, Default)]
pub struct CallFrame {
    pub proc: Option<ObjRef>,
    pub target_class: Option<ObjRef>,
    pub env: Option<ObjRef>,
}

/// A single fiber's data stack + call stack. `prev` chains to the context
/// that resumed this one; the marker walks that chain iteratively so an
/// arbitrarily deep fiber chain never recurses the native stack (spec.md §9).
pub struct Context {
    pub status: FiberStatus,
    /// The live portion is `[0, live_len)`; everything past it is logically
    /// nil and must be cleared, not left stale, by the context mark.
    pub stack: Vec<Value>,
    pub live_len: usize,
    pub call_frames: Vec<CallFrame>,
    pub fiber: Option<ObjRef>,
    pub prev: Option<*mut Context>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            status: FiberStatus::Created,
            stack: Vec::new(),
            live_len: 0,
            call_frames: Vec::new(),
            fiber: None,
            prev: None,
        }
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.status == FiberStatus::Terminated
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
