//! C5: root scan, context walk, and gray-list drain.
//!
//! The gray list is the intrusive singly-linked chain threaded through each
//! live slot's own `gc_next` field (spec.md §9) rather than a separate
//! heap-allocated queue, exactly the trick the free-list reuses for Free
//! slots.

use core::ptr::NonNull;

use crate::arena::Arena;
use crate::builtin_classes::BuiltinClasses;
use crate::context::Context;
use crate::registry::Registry;
use crate::slot::Slot;
use crate::value::{ObjRef, Value};

/// A singly-linked chain of gray objects, threaded through `Slot::gc_next`.
#[derive(Default)]
pub struct GrayList {
    head: Option<NonNull<Slot>>,
}

impl GrayList {
    pub fn new() -> Self {
        Self { head: None }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Pushes `obj` onto the head of this list. Caller must have already
    /// painted `obj` gray.
    pub(crate) fn push(&mut self, obj: ObjRef) {
        // SAFETY: obj is a live slot; `gc_next` is free to reuse because the
        // slot is gray (spec.md §9).
        unsafe { obj.slot() }.gc_next.set(self.head);
        self.head = Some(obj.as_ptr());
    }

    /// Pops the head, returning it as an `ObjRef` the caller can blacken and
    /// enumerate children for.
    pub(crate) fn pop(&mut self) -> Option<ObjRef> {
        let head = self.head?;
        // SAFETY: head came from a slot pushed onto this list.
        let next = unsafe { head.as_ref() }.gc_next.get();
        self.head = next;
        Some(ObjRef::new(head))
    }

    /// Splices `other` onto the front of this list, draining it, as the
    /// end-of-mark step does with the atomic gray list (spec.md §4.7).
    pub(crate) fn splice_from(&mut self, other: &mut GrayList) {
        let Some(other_head) = other.head.take() else {
            return;
        };
        let mut tail = other_head;
        // SAFETY: every node on `other`'s chain is a live slot linked by a
        // prior push onto that list.
        while let Some(next) = unsafe { tail.as_ref() }.gc_next.get() {
            tail = next;
        }
        unsafe { tail.as_ref() }.gc_next.set(self.head);
        self.head = Some(other_head);
    }
}

/// The single entry point every `mark(child)` call in a `children()` adapter
/// goes through: adds `obj` to `gray_list` iff it is currently any white and
/// not red (spec.md §4.5). A no-op for objects already gray or black.
pub fn mark(obj: ObjRef, gray_list: &mut GrayList) {
    // SAFETY: a `mark` call only ever reaches a slot reachable from another
    // live slot or a root, both guaranteed live for the duration of a step.
    let header = unsafe { obj.slot() }.header();
    if header.is_white() {
        header.paint_gray();
        gray_list.push(obj);
    }
}

fn mark_value(v: &Value, gray_list: &mut GrayList) {
    if let Some(r) = v.as_ref() {
        mark(r, gray_list);
    }
}

/// Walks one context's live stack, call frames, and owning fiber, then
/// iterates into `prev` rather than recursing, so an arbitrarily deep fiber
/// resume chain never grows the native stack (spec.md §4.5, §9). Shared by
/// both the root scan (current/root context) and `ObjectData::children`'s
/// `Fiber` arm, per spec.md's "using the same context walk as roots".
///
/// Takes `&mut Context`: past `live_len`, `stack` is logically nil and must
/// be cleared, not left stale (spec.md §4.5, `Context::stack`'s own doc),
/// so this walk needs write access to the contexts it visits, not just read.
///
/// Takes the same `&mut dyn FnMut(ObjRef)` shape every other `children()`
/// adapter dispatches through, so a `Fiber`'s owned context can be walked
/// from inside `ObjectData::children` without depending on `GrayList`.
pub(crate) fn context_children(context: &mut Context, mark: &mut dyn FnMut(ObjRef)) -> usize {
    let mut count = 0;
    let mut current: *mut Context = context;
    loop {
        // SAFETY: `current` starts as a valid reference and is only ever
        // advanced to a `prev` pointer a live `Context` itself stored.
        let ctx = unsafe { &mut *current };
        if ctx.is_terminated() {
            break;
        }
        let live = ctx.live_len.min(ctx.stack.len());
        for v in &ctx.stack[..live] {
            if let Some(r) = v.as_ref() {
                mark(r);
                count += 1;
            }
        }
        for v in &mut ctx.stack[live..] {
            *v = Value::nil();
        }
        for frame in &ctx.call_frames {
            if let Some(p) = frame.proc {
                mark(p);
                count += 1;
            }
            if let Some(c) = frame.target_class {
                mark(c);
                count += 1;
            }
        }
        if let Some(f) = ctx.fiber {
            mark(f);
            count += 1;
        }
        match ctx.prev {
            Some(prev) => current = prev,
            None => break,
        }
    }
    count
}

/// The set of roots every cycle's `ROOT` phase marks (spec.md §4.5).
///
/// `current_context`/`root_context` are raw pointers rather than `&'a
/// Context` because the context walk now mutates (it clears each context's
/// stale stack tail, see `context_children`): `resolve_context` may return
/// the same context for both fields (current and root fiber are usually the
/// same outside fiber resumption), and two live `&mut Context` to the same
/// memory would be immediate aliasing UB even if only one is ever
/// dereferenced. Keeping them as raw pointers and only materializing a
/// `&mut Context` momentarily, one at a time, in `root_scan` sidesteps that.
pub struct Roots<'a> {
    pub arena: &'a Arena,
    pub registry: &'a Registry,
    pub builtins: &'a BuiltinClasses,
    pub top_self: Option<ObjRef>,
    pub pending_exception: Option<ObjRef>,
    pub current_context: Option<*mut Context>,
    pub root_context: Option<*mut Context>,
}

/// Marks every root spec.md §4.5 enumerates. Returns the number of direct
/// roots marked, used the same way child counts are: to bound step work.
/// Colors are absolute (gray/white/black), not relative to the current white
/// part, so this step doesn't need to know which white is current.
pub fn root_scan(roots: &Roots<'_>, gray_list: &mut GrayList) -> usize {
    let mut count = 0;

    for v in roots.arena.iter() {
        mark_value(v, gray_list);
        count += 1;
    }

    if let Some(table) = roots.registry.table() {
        mark(table, gray_list);
        count += 1;
    }

    for class_ref in roots.builtins.iter() {
        mark(class_ref, gray_list);
        count += 1;
    }

    if let Some(s) = roots.top_self {
        mark(s, gray_list);
        count += 1;
    }

    if let Some(e) = roots.pending_exception {
        mark(e, gray_list);
        count += 1;
    }

    if let Some(ctx_ptr) = roots.current_context {
        // SAFETY: a stored fiber's context is live for the duration of a
        // root scan; no other reference to it is held concurrently.
        let ctx = unsafe { &mut *ctx_ptr };
        count += context_children(ctx, &mut |r| mark(r, gray_list));
    }

    if let Some(root_ptr) = roots.root_context {
        // Avoid double-walking when current and root are the same context
        // (the common case outside of fiber resumption); also avoids ever
        // materializing two live `&mut Context` to the same memory.
        let same = roots.current_context.is_some_and(|cur| cur == root_ptr);
        if !same {
            // SAFETY: see above; `same` being false guarantees this is a
            // distinct context from whatever `&mut` was created above.
            let root_ctx = unsafe { &mut *root_ptr };
            count += context_children(root_ctx, &mut |r| mark(r, gray_list));
        }
    }

    count
}

/// Pops the head of `gray_list`, blackens it, and enumerates its children,
/// returning the number of children scheduled (spec.md §4.5). `None` once
/// the list is drained.
pub fn drain_one(gray_list: &mut GrayList) -> Option<usize> {
    let obj = gray_list.pop()?;
    // SAFETY: gray objects are always live.
    let slot = unsafe { obj.slot() };
    slot.header().paint_black();
    let mut local = GrayList::new();
    let n = slot.data().children(&mut |child| mark(child, &mut local));
    gray_list.splice_from(&mut local);
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{GcHeader, TypeTag};
    use crate::object::{InstanceData, ObjectData};
    use rustc_hash::FxHashMap;

    fn leak_slot(data: ObjectData, white: WhitePart) -> ObjRef {
        let boxed = rust_alloc::boxed::Box::new(Slot {
            header: GcHeader::new(TypeTag::Object, white),
            class: core::cell::Cell::new(None),
            gc_next: core::cell::Cell::new(None),
            data: Some(data),
        });
        ObjRef::new(NonNull::from(rust_alloc::boxed::Box::leak(boxed)))
    }

    #[test]
    fn mark_grays_a_white_object_exactly_once() {
        let obj = leak_slot(
            ObjectData::Object(InstanceData {
                ivars: FxHashMap::default(),
            }),
            WhitePart::A,
        );
        let mut gray_list = GrayList::new();
        mark(obj, &mut gray_list);
        assert!(!gray_list.is_empty());
        // SAFETY: test-owned leaked slot.
        assert!(unsafe { obj.slot() }.header().is_gray());
        // second mark is a no-op: already gray, not white.
        mark(obj, &mut gray_list);
        let popped = gray_list.pop().unwrap();
        assert_eq!(popped.as_ptr(), obj.as_ptr());
        assert!(gray_list.is_empty());
    }

    #[test]
    fn drain_one_blackens_and_reports_child_count() {
        let mut ivars = FxHashMap::default();
        let child = leak_slot(
            ObjectData::Object(InstanceData {
                ivars: FxHashMap::default(),
            }),
            WhitePart::A,
        );
        ivars.insert(1u32, Value::from_ref(child));
        let parent = leak_slot(ObjectData::Object(InstanceData { ivars }), WhitePart::A);

        let mut gray_list = GrayList::new();
        mark(parent, &mut gray_list);
        let n = drain_one(&mut gray_list).unwrap();
        assert_eq!(n, 1);
        // SAFETY: test-owned leaked slot.
        assert!(unsafe { parent.slot() }.header().is_black());
        assert!(!gray_list.is_empty());
    }
}
