//! Concrete object-kind payloads.
//!
//! spec.md treats "the object-type dispatch that knows how to mark and free
//! each kind of managed object" as an external collaborator and specifies
//! only its interface. This module supplies the default, minimal adapters
//! for the closed set of kinds spec.md §4.5/§4.9 enumerate, so the collector
//! is exercisable end to end; a real embedding is free to swap these for its
//! own method tables, string storage, etc. as long as it implements the same
//! `children()` / `finalize()` contract the marker and sweeper dispatch to.

use rust_alloc::boxed::Box;
use rust_alloc::string::String as RustString;
use rust_alloc::vec::Vec;
use hashbrown::HashMap;
use rustc_hash::FxHashMap;

use core::ptr::NonNull;

use crate::context::{Context, FiberStatus};
use crate::header::TypeTag;
use crate::slot::Slot;
use crate::value::{ObjRef, Symbol, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Module,
    SClass,
    /// An included module's shadow class; marks its method table only when
    /// it carries the "is origin" flag (spec.md §4.5).
    IClass { is_origin: bool },
}

pub struct ClassData {
    pub kind: ClassKind,
    /// hashbrown backs the method table directly: method lookup is the
    /// hottest map in a running VM, so it skips the extra indirection of a
    /// type alias and takes the default hasher's SIMD-accelerated probing.
    pub method_table: HashMap<Symbol, ObjRef>,
    pub super_class: Option<ObjRef>,
    pub ivars: FxHashMap<Symbol, Value>,
}

pub struct InstanceData {
    pub ivars: FxHashMap<Symbol, Value>,
}

pub struct ProcData {
    pub upper: Option<ObjRef>,
    pub env: Option<ObjRef>,
    /// Independent refcount on shared bytecode; cut (not decremented) at
    /// final teardown to break ordering-undefined cycles (spec.md §9).
    pub irep_refcount: *const core::cell::Cell<usize>,
}

pub struct EnvData {
    pub stack: Vec<Value>,
    /// Whether the backing storage still lives on a VM stack frame rather
    /// than its own heap allocation; destructor must not free VM-owned memory.
    pub on_vm_stack: bool,
}

pub struct FiberData {
    pub context: Box<Context>,
    /// The root context is never freed by the fiber's own destructor.
    pub is_root: bool,
}

pub struct ArrayData {
    pub elements: Vec<Value>,
    /// Shared backing buffer refcount, if this array aliases another's
    /// storage (spec.md §4.9 "respecting shared-buffer refcounts").
    pub shared: Option<*const core::cell::Cell<usize>>,
}

pub struct HashData {
    pub ivars: FxHashMap<Symbol, Value>,
    /// Hash-internal key/value storage; the hashing/probing strategy itself
    /// is the out-of-scope object-type dispatch, this crate only needs to
    /// enumerate the pairs for marking.
    pub entries: Vec<(Value, Value)>,
}

pub struct StringData {
    pub bytes: RustString,
    pub fshared: Option<ObjRef>,
}

pub struct RangeData {
    pub start: Value,
    pub end: Value,
    pub exclusive: bool,
}

pub struct BreakData {
    pub value: Value,
}

pub struct ExceptionData {
    pub ivars: FxHashMap<Symbol, Value>,
    pub message: Option<ObjRef>,
    pub backtrace: Option<ObjRef>,
}

pub struct BacktraceLocation {
    /// Opaque token for an irep managed outside this GC; the GC neither
    /// marks nor frees it, only decrements/cuts its refcount on teardown.
    pub irep: *const core::cell::Cell<usize>,
}

pub struct BacktraceData {
    pub locations: Vec<BacktraceLocation>,
}

/// Host escape hatch: C-data plus an optional finalizer and an optional
/// mark callback for any GC references the payload embeds. `Rational`,
/// `Complex`, and `Set` from spec.md §4.5 are represented this way, "delegated
/// to their adapters" rather than built in as first-class kinds.
pub struct CDataData {
    pub payload: *mut (),
    pub free_hook: Option<unsafe fn(*mut ())>,
    pub mark_hook: Option<unsafe fn(*mut (), &mut dyn FnMut(ObjRef))>,
    pub ivars: FxHashMap<Symbol, Value>,
}

/// Tagged union of every concrete kind's data. A Rust enum is the
/// memory-safe rendition of the spec's C union: the discriminant doubles as
/// the invariant-1 FREE marker and as `TypeTag`, so no code ever reads a
/// payload variant that doesn't match the slot's header tag.
pub enum ObjectData {
    Object(InstanceData),
    Class(ClassData),
    Proc(ProcData),
    Env(EnvData),
    Fiber(FiberData),
    Array(ArrayData),
    Hash(HashData),
    String(StringData),
    Range(RangeData),
    Break(BreakData),
    Exception(ExceptionData),
    Backtrace(BacktraceData),
    CData(CDataData),
}

impl ObjectData {
    /// Calls `mark` for every child reference this object directly holds,
    /// and returns the count of children scheduled (spec.md §4.5, used by
    /// the scheduler to bound a step).
    pub fn children(&self, mark: &mut dyn FnMut(ObjRef)) -> usize {
        match self {
            ObjectData::Object(o) => mark_ivars(&o.ivars, mark),
            ObjectData::Class(c) => {
                let mut n = 0;
                match c.kind {
                    ClassKind::IClass { is_origin } => {
                        if is_origin {
                            n += mark_method_table(&c.method_table, mark);
                        }
                        if let Some(s) = c.super_class {
                            mark(s);
                            n += 1;
                        }
                    }
                    ClassKind::Class | ClassKind::Module | ClassKind::SClass => {
                        n += mark_method_table(&c.method_table, mark);
                        if let Some(s) = c.super_class {
                            mark(s);
                            n += 1;
                        }
                        n += mark_ivars(&c.ivars, mark);
                    }
                }
                n
            }
            ObjectData::Proc(p) => {
                let mut n = 0;
                if let Some(u) = p.upper {
                    mark(u);
                    n += 1;
                }
                if let Some(e) = p.env {
                    mark(e);
                    n += 1;
                }
                n
            }
            ObjectData::Env(e) => {
                for v in &e.stack {
                    mark_value(v, mark);
                }
                e.stack.len()
            }
            ObjectData::Fiber(f) => {
                // SAFETY: a children() walk never runs concurrently with
                // another access to this fiber's own context; casting away
                // the shared borrow here is the same pattern `Gc::resolve_context`
                // uses to let the context walk clear stale stack entries
                // (spec.md §4.5).
                let ctx_ptr = f.context.as_ref() as *const Context as *mut Context;
                crate::marker::context_children(unsafe { &mut *ctx_ptr }, mark)
            }
            ObjectData::Array(a) => {
                for v in &a.elements {
                    mark_value(v, mark);
                }
                a.elements.len()
            }
            ObjectData::Hash(h) => {
                let mut n = mark_ivars(&h.ivars, mark);
                for (k, v) in &h.entries {
                    mark_value(k, mark);
                    mark_value(v, mark);
                    n += 2;
                }
                n
            }
            ObjectData::String(s) => {
                if let Some(shared) = s.fshared {
                    mark(shared);
                    1
                } else {
                    0
                }
            }
            ObjectData::Range(r) => {
                let mut n = 0;
                mark_value(&r.start, mark);
                n += 1;
                mark_value(&r.end, mark);
                n += 1;
                n
            }
            ObjectData::Break(b) => {
                mark_value(&b.value, mark);
                1
            }
            ObjectData::Exception(e) => {
                let mut n = mark_ivars(&e.ivars, mark);
                if let Some(m) = e.message {
                    mark(m);
                    n += 1;
                }
                if let Some(bt) = e.backtrace {
                    mark(bt);
                    n += 1;
                }
                n
            }
            // Each location independently references an irep managed
            // outside the GC; nothing here is a GC child.
            ObjectData::Backtrace(bt) => bt.locations.len(),
            ObjectData::CData(c) => {
                let mut n = mark_ivars(&c.ivars, mark);
                if let Some(hook) = c.mark_hook {
                    let mut count = 0;
                    let mut counting = |r: ObjRef| {
                        mark(r);
                        count += 1;
                    };
                    // SAFETY: `payload` was produced by the host alongside `mark_hook`
                    // and is valid for the lifetime of this CData object.
                    unsafe { hook(c.payload, &mut counting) };
                    n += count;
                }
                n
            }
        }
    }

    /// Releases whatever this object's destructor is responsible for.
    /// `end` is true during final `Gc` teardown, where cross-object cleanup
    /// (e.g. method-cache invalidation) must be skipped because other
    /// objects may already be gone (spec.md §4.9). `heap_contains` answers
    /// whether a raw slot pointer still falls inside a currently-allocated
    /// page, needed by the `Fiber` arm below to check an on-stack `Env`
    /// hasn't itself already been freed before touching it.
    pub fn finalize(&mut self, end: bool, heap_contains: &dyn Fn(NonNull<Slot>) -> bool) {
        match self {
            ObjectData::Env(e) => {
                if !e.on_vm_stack {
                    e.stack = Vec::new();
                }
            }
            ObjectData::Fiber(f) => {
                // Unsharing on-stack environments only makes sense for a
                // fiber context that is still going to be referenced after
                // this call returns; at final `Gc` teardown every object is
                // being torn down together, so there is nothing left to
                // unshare for (mirrors `gc.c`'s `!end && status !=
                // TERMINATED` guard, spec.md §4.9).
                if !f.is_root && !end && f.context.status != FiberStatus::Terminated {
                    for frame in &f.context.call_frames {
                        let Some(env_ref) = frame.env else { continue };
                        if !heap_contains(env_ref.as_ptr()) {
                            continue;
                        }
                        // SAFETY: `heap_contains` just confirmed this
                        // pointer falls within a live page; the tag check
                        // below guards against a slot that was reclaimed
                        // and reused for something else since the frame
                        // captured it.
                        let slot = unsafe { env_ref.slot() };
                        if slot.header().tag() != TypeTag::Env || slot.header().is_free() {
                            continue;
                        }
                        // SAFETY: same slot, now known live and of kind
                        // `Env`; finalization is single-threaded so no
                        // other access to it is live.
                        if let ObjectData::Env(e) = unsafe { &mut *env_ref.as_ptr().as_ptr() }.data_mut() {
                            e.on_vm_stack = false;
                        }
                    }
                }
                // The context's own storage (stack, call frames) drops
                // with the Box once this payload is dropped.
            }
            ObjectData::Array(a) => {
                if let Some(shared) = a.shared {
                    // SAFETY: shared refcounts are only ever touched through
                    // this saturating decrement, never concurrently.
                    unsafe {
                        let c = &*shared;
                        c.set(c.get().saturating_sub(1));
                    }
                } else {
                    a.elements = Vec::new();
                }
            }
            ObjectData::Proc(p) => {
                // SAFETY: irep_refcount is either null (cfunc/alias procs)
                // or a valid shared counter for the lifetime of the proc.
                if !p.irep_refcount.is_null() {
                    unsafe {
                        let c = &*p.irep_refcount;
                        if end {
                            // cut the reference rather than decrement: with
                            // circular references, decrement order is
                            // undefined at final teardown (spec.md §9).
                            c.set(0);
                        } else {
                            c.set(c.get().saturating_sub(1));
                        }
                    }
                }
            }
            ObjectData::Backtrace(bt) => {
                for loc in &bt.locations {
                    if !loc.irep.is_null() {
                        unsafe {
                            let c = &*loc.irep;
                            c.set(c.get().saturating_sub(1));
                        }
                    }
                }
                bt.locations = Vec::new();
            }
            ObjectData::CData(c) => {
                if let Some(hook) = c.free_hook {
                    // SAFETY: the host guarantees `free_hook` is safe to call
                    // exactly once on `payload`, which this call consumes.
                    unsafe { hook(c.payload) };
                    c.payload = core::ptr::null_mut();
                }
            }
            ObjectData::Class(c) => {
                c.method_table.clear();
                c.ivars.clear();
                // method-cache invalidation by class is the VM's
                // responsibility and is skipped entirely at `end` teardown.
            }
            ObjectData::Object(o) => o.ivars.clear(),
            ObjectData::Hash(h) => {
                h.ivars.clear();
                h.entries.clear();
            }
            ObjectData::Exception(e) => e.ivars.clear(),
            ObjectData::String(_) | ObjectData::Range(_) | ObjectData::Break(_) => {}
        }
    }
}

fn mark_value(v: &Value, mark: &mut dyn FnMut(ObjRef)) {
    if let Some(r) = v.as_ref() {
        mark(r);
    }
}

fn mark_ivars(ivars: &FxHashMap<Symbol, Value>, mark: &mut dyn FnMut(ObjRef)) -> usize {
    let mut n = 0;
    for v in ivars.values() {
        mark_value(v, mark);
        n += 1;
    }
    n
}

fn mark_method_table(table: &HashMap<Symbol, ObjRef>, mark: &mut dyn FnMut(ObjRef)) -> usize {
    for m in table.values() {
        mark(*m);
    }
    table.len()
}
