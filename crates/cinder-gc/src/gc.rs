//! The top-level collector: wires C1–C8 together behind the host-facing API
//! spec.md §6 enumerates.

use log::warn;

use crate::arena::Arena;
use crate::builtin_classes::BuiltinClasses;
use crate::config::GcConfig;
use crate::context::Context;
use crate::error::GcError;
use crate::header::TypeTag;
use crate::heap::Heap;
use crate::marker::Roots;
use crate::object::{ExceptionData, ObjectData};
use crate::registry::{self, Registry};
use crate::scheduler::{GcPhase, Scheduler};
use crate::slot::Slot;
use crate::value::{ObjRef, Value};
use crate::barrier;
use rustc_hash::FxHashMap;

/// Continuation token an `each_object` callback returns (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    Continue,
    Break,
}

/// Classes/tags allowed to coexist per spec.md §4.4's whitelist, beyond the
/// default "instance type must equal the allocation tag" rule. This crate's
/// concrete adapter set (SPEC_FULL.md §10.2) doesn't model a class's own
/// "instance type" as separate metadata from its `ClassKind`, so the check
/// here is the closed set of tags a class-like object is itself allowed to
/// back: singleton classes, included classes, and environments share a
/// class pointer with a differently-tagged instance by design.
fn class_pointer_is_well_formed(class_tag: TypeTag) -> bool {
    matches!(
        class_tag,
        TypeTag::Class | TypeTag::Module | TypeTag::SClass | TypeTag::IClass | TypeTag::Env
    )
}

/// RAII guard that clears `iterating` on every exit path, including an
/// early return or panic inside the callback (spec.md §6 `each_object`
/// contract, mirroring the teacher's `CollectingGuard` pattern).
struct IteratingGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> IteratingGuard<'a> {
    fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self { flag }
    }
}

impl Drop for IteratingGuard<'_> {
    fn drop(&mut self) {
        *self.flag = false;
    }
}

/// Builds a `Roots<'_>` borrowing `arena`/`registry`/`builtins` directly off
/// `$self`, rather than through a `&self` method, so the borrow checker sees
/// three disjoint field borrows instead of one borrow of the whole struct —
/// callers still need `&mut self.heap`/`&mut self.scheduler` alongside it.
macro_rules! build_roots {
    ($self:ident) => {
        Roots {
            arena: &$self.arena,
            registry: &$self.registry,
            builtins: &$self.builtins,
            top_self: $self.top_self,
            pending_exception: $self.pending_exception,
            current_context: Gc::resolve_context($self.current_fiber),
            root_context: Gc::resolve_context($self.root_fiber),
        }
    };
}

pub struct Gc {
    heap: Heap,
    arena: Arena,
    registry: Registry,
    builtins: BuiltinClasses,
    scheduler: Scheduler,
    top_self: Option<ObjRef>,
    pending_exception: Option<ObjRef>,
    current_fiber: Option<ObjRef>,
    root_fiber: Option<ObjRef>,
    out_of_memory_exception: ObjRef,
    arena_overflow_exception: ObjRef,
    stack_overflow_exception: ObjRef,
}

impl Gc {
    pub fn new(config: GcConfig) -> Self {
        let mut heap = Heap::new(config.page_size);
        let arena = Arena::new(config.arena_capacity, config.arena_mode);
        let registry = Registry::new();
        let mut scheduler = Scheduler::new(config.interval_ratio, config.step_ratio, config.generational);

        // Red exceptions never occupy arena slots (arena.protect() already
        // skips red objects), but they are still live, non-FREE slots.
        let out_of_memory_exception = Self::preallocate_immortal_exception(&mut heap);
        let arena_overflow_exception = Self::preallocate_immortal_exception(&mut heap);
        let stack_overflow_exception = Self::preallocate_immortal_exception(&mut heap);
        scheduler.live += 3;
        scheduler.set_preallocated_exceptions(out_of_memory_exception, stack_overflow_exception, arena_overflow_exception);

        Self {
            heap,
            arena,
            registry,
            builtins: BuiltinClasses::new(),
            scheduler,
            top_self: None,
            pending_exception: None,
            current_fiber: None,
            root_fiber: None,
            out_of_memory_exception,
            arena_overflow_exception,
            stack_overflow_exception,
        }
    }

    fn preallocate_immortal_exception(heap: &mut Heap) -> ObjRef {
        let ptr = heap
            .try_alloc_slot()
            .expect("preallocating an immortal exception must not fail");
        // SAFETY: `alloc_slot` always returns a fresh, exclusively-owned Free
        // slot from this heap.
        let slot: &mut Slot = unsafe { &mut *ptr.as_ptr() };
        slot.init(
            TypeTag::Exception,
            None,
            crate::header::WhitePart::A,
            ObjectData::Exception(ExceptionData {
                ivars: FxHashMap::default(),
                message: None,
                backtrace: None,
            }),
        );
        slot.header().paint_red();
        ObjRef::new(ptr)
    }

    pub fn builtins_mut(&mut self) -> &mut BuiltinClasses {
        &mut self.builtins
    }

    pub fn set_top_self(&mut self, obj: ObjRef) {
        self.top_self = Some(obj);
    }

    pub fn set_pending_exception(&mut self, obj: Option<ObjRef>) {
        self.pending_exception = obj;
    }

    pub fn set_current_fiber(&mut self, fiber: ObjRef) {
        self.current_fiber = Some(fiber);
    }

    pub fn set_root_fiber(&mut self, fiber: ObjRef) {
        self.root_fiber = Some(fiber);
    }

    fn resolve_context(fiber: Option<ObjRef>) -> Option<*mut Context> {
        let fiber = fiber?;
        // SAFETY: a stored fiber ref is always a live Fiber slot for as
        // long as its owner keeps it rooted. This only computes an
        // address; `root_scan` is responsible for dereferencing at most
        // one live `&mut Context` per distinct context at a time.
        let data = unsafe { fiber.slot() }.data();
        match data {
            ObjectData::Fiber(f) => Some(f.context.as_ref() as *const Context as *mut Context),
            _ => None,
        }
    }

    /// `alloc(type_tag, class) -> obj` (spec.md §4.4).
    pub fn alloc(&mut self, tag: TypeTag, class: Option<ObjRef>, data: ObjectData) -> Result<ObjRef, GcError> {
        if let Some(class_ref) = class {
            // SAFETY: caller-supplied class ref must be live.
            let class_tag = unsafe { class_ref.slot() }.header().tag();
            if !class_pointer_is_well_formed(class_tag) {
                return Err(GcError::TypeError {
                    expected: TypeTag::Class,
                    found: class_tag,
                });
            }
        }

        if self.scheduler.live > self.scheduler.threshold {
            let roots = build_roots!(self);
            self.scheduler.incremental_step(&mut self.heap, &roots);
        }

        if cfg!(feature = "stress") {
            self.full_gc();
        }

        if let Err(e) = self.arena.ensure_room() {
            warn!("gc: arena overflow during alloc");
            return Err(e);
        }

        let ptr = match self.heap.try_alloc_slot() {
            Some(ptr) => {
                self.scheduler.out_of_memory = false;
                ptr
            }
            None => {
                warn!("gc: host allocator exhausted, running a full GC and retrying once");
                self.full_gc();
                match self.heap.try_alloc_slot() {
                    Some(ptr) => {
                        self.scheduler.out_of_memory = false;
                        ptr
                    }
                    None => {
                        self.scheduler.out_of_memory = true;
                        return Err(GcError::OutOfMemory);
                    }
                }
            }
        };
        // SAFETY: freshly allocated, exclusively-owned slot.
        let slot: &mut Slot = unsafe { &mut *ptr.as_ptr() };
        slot.init(tag, class, self.scheduler.current_white, data);
        self.scheduler.live += 1;

        let obj = ObjRef::new(ptr);
        let _ = self.arena.protect(Value::from_ref(obj), value_is_red);
        Ok(obj)
    }

    /// Reads `obj`'s payload. spec.md's external-interface list assumes the
    /// host's own structures carry object payloads and only calls into the
    /// GC for liveness bookkeeping; this crate's default adapter set
    /// (SPEC_FULL.md §10.2) keeps payloads inside its own `Slot` instead, so
    /// a host built directly against it needs this bridge (see DESIGN.md).
    pub fn data(&self, obj: ObjRef) -> &ObjectData {
        // SAFETY: caller guarantees `obj` is live.
        unsafe { obj.slot() }.data()
    }

    /// Mutable access to `obj`'s payload. Callers that introduce a new
    /// black-to-white edge this way are responsible for following up with
    /// `field_write_barrier`/`write_barrier`, exactly as a host mutating its
    /// own structures would be (spec.md §4.8).
    pub fn data_mut(&mut self, obj: ObjRef) -> &mut ObjectData {
        // SAFETY: `&mut self` guarantees exclusive access to the heap `obj`
        // belongs to.
        unsafe { &mut *obj.as_ptr().as_ptr() }.data_mut()
    }

    /// `class_of(obj)`, the class-pointer half of spec.md §3's per-slot
    /// header.
    pub fn class_of(&self, obj: ObjRef) -> Option<ObjRef> {
        // SAFETY: caller guarantees `obj` is live.
        unsafe { obj.slot() }.class()
    }

    /// `protect(v)` (spec.md §6).
    pub fn protect(&mut self, value: Value) -> Result<(), GcError> {
        self.arena.protect(value, value_is_red)
    }

    #[inline]
    pub fn arena_save(&self) -> usize {
        self.arena.save()
    }

    #[inline]
    pub fn arena_restore(&mut self, checkpoint: usize) {
        self.arena.restore(checkpoint);
    }

    /// `register(v)` (spec.md §4.3): pins `value` in the hidden registry.
    pub fn register(&mut self, value: Value) -> Result<(), GcError> {
        if value.is_immediate() {
            return Ok(());
        }
        let checkpoint = self.arena.save();
        self.protect(value)?;
        let table = self.ensure_registry_array()?;
        // SAFETY: the registry table is always a live Array slot this crate
        // allocates itself, and access is single-threaded.
        let slot = unsafe { &mut *table.as_ptr().as_ptr() };
        if let ObjectData::Array(a) = slot.data_mut() {
            registry::push_entry(a, value);
        }
        self.arena.restore(checkpoint);
        Ok(())
    }

    fn ensure_registry_array(&mut self) -> Result<ObjRef, GcError> {
        if let Some(table) = self.registry.table() {
            return Ok(table);
        }
        let obj = self.alloc(
            TypeTag::Array,
            None,
            ObjectData::Array(crate::object::ArrayData {
                elements: rust_alloc::vec::Vec::new(),
                shared: None,
            }),
        )?;
        self.registry.set_table(obj);
        Ok(obj)
    }

    /// `unregister(v)` (spec.md §4.3).
    pub fn unregister(&mut self, obj: ObjRef) {
        let Some(table) = self.registry.table() else {
            return;
        };
        // SAFETY: see `register`.
        let slot = unsafe { &mut *table.as_ptr().as_ptr() };
        if let ObjectData::Array(a) = slot.data_mut() {
            registry::remove_first(a, obj);
        }
    }

    /// `field_write_barrier(obj, value)` (spec.md §4.8).
    pub fn field_write_barrier(&mut self, obj: ObjRef, value: ObjRef) {
        barrier::field_write_barrier(
            obj,
            value,
            self.scheduler.phase,
            self.scheduler.generational,
            self.scheduler.current_white,
            self.scheduler.gray_list_mut(),
        );
    }

    /// `write_barrier(obj)` (spec.md §4.8).
    pub fn write_barrier(&mut self, obj: ObjRef) {
        barrier::write_barrier(obj, self.scheduler.atomic_gray_list_mut());
    }

    /// `object_dead?(obj)` (spec.md §6): true for anything outside this
    /// heap, anything tagged FREE, or anything painted the other white.
    pub fn object_dead(&self, obj: ObjRef) -> bool {
        if !self.heap.contains(obj.as_ptr()) {
            return true;
        }
        // SAFETY: `contains` established this points inside a live page.
        unsafe { obj.slot() }.header().is_dead(self.scheduler.current_white)
    }

    /// `each_object(callback)` (spec.md §6): forces a full GC, walks every
    /// slot of every page including FREE ones, and always clears
    /// `iterating` on the way out.
    pub fn each_object(&mut self, mut callback: impl FnMut(&Slot) -> Continue) {
        self.full_gc();
        let _guard = IteratingGuard::new(&mut self.scheduler.iterating);
        for page in self.heap.pages() {
            for i in 0..page.len() {
                if callback(page.slot(i)) == Continue::Break {
                    return;
                }
            }
        }
    }

    /// `incremental_gc()` (spec.md §6): one bounded step.
    pub fn incremental_gc(&mut self) {
        let roots = build_roots!(self);
        self.scheduler.incremental_step(&mut self.heap, &roots);
    }

    /// `full_gc()` (spec.md §6).
    pub fn full_gc(&mut self) {
        let roots = build_roots!(self);
        self.scheduler.full_gc(&mut self.heap, &roots);
    }

    /// `start` (illustrative name, spec.md §6): an explicit full collection.
    pub fn start(&mut self) {
        self.full_gc();
    }

    /// Returns the previous `disabled` state, per spec.md §6.
    pub fn enable(&mut self) -> bool {
        let was_disabled = self.scheduler.disabled;
        self.scheduler.disabled = false;
        !was_disabled
    }

    /// Returns the previous `disabled` state, per spec.md §6.
    pub fn disable(&mut self) -> bool {
        let was_disabled = self.scheduler.disabled;
        self.scheduler.disabled = true;
        !was_disabled
    }

    #[inline]
    pub fn interval_ratio(&self) -> u32 {
        self.scheduler.interval_ratio
    }

    #[inline]
    pub fn set_interval_ratio(&mut self, ratio: u32) {
        self.scheduler.interval_ratio = ratio;
    }

    #[inline]
    pub fn step_ratio(&self) -> u32 {
        self.scheduler.step_ratio
    }

    #[inline]
    pub fn set_step_ratio(&mut self, ratio: u32) {
        self.scheduler.step_ratio = ratio;
    }

    #[inline]
    pub fn generational_mode(&self) -> bool {
        self.scheduler.generational
    }

    /// Raises `ModeChangeWhileDisabledOrIterating` if the collector is
    /// disabled or mid-`each_object` (spec.md §6).
    pub fn set_generational_mode(&mut self, enabled: bool) -> Result<(), GcError> {
        if self.scheduler.disabled || self.scheduler.iterating {
            return Err(GcError::ModeChangeWhileDisabledOrIterating);
        }
        self.scheduler.generational = enabled;
        Ok(())
    }

    #[inline]
    pub fn page_slot_size(&self) -> usize {
        self.heap.page_size()
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.scheduler.live
    }

    /// `live` as of the end of the most recently completed `MARK` phase
    /// (spec.md §4.7), used to size the next cycle's threshold and to bound
    /// how far `live` can grow before the next cycle catches up.
    #[inline]
    pub fn live_after_mark(&self) -> usize {
        self.scheduler.live_after_mark
    }

    #[inline]
    pub fn phase(&self) -> GcPhase {
        self.scheduler.phase
    }

    #[inline]
    pub fn out_of_memory_exception(&self) -> ObjRef {
        self.out_of_memory_exception
    }

    #[inline]
    pub fn arena_overflow_exception(&self) -> ObjRef {
        self.arena_overflow_exception
    }

    #[inline]
    pub fn stack_overflow_exception(&self) -> ObjRef {
        self.stack_overflow_exception
    }
}

/// `Arena::protect`'s is-red predicate: a red (immortal) object is never
/// walked by the marker and so never needs a temporary root (spec.md §4.2).
fn value_is_red(value: Value) -> bool {
    value.as_ref().is_some_and(|r| {
        // SAFETY: every `Value` pushed through `protect` either is immediate
        // (already filtered out before this call) or carries a live ref.
        unsafe { r.slot() }.header().is_red()
    })
}

/// `gc_destroy` (spec.md §9): finalizes every live slot across every page
/// with `end=true` before the pages themselves are freed, mirroring the
/// cited original's full teardown walk rather than leaking host-owned
/// payloads still referenced from a slot at process/VM exit.
impl Drop for Gc {
    fn drop(&mut self) {
        for page in self.heap.pages_mut() {
            for i in 0..page.len() {
                if page.slot(i).header().is_free() {
                    continue;
                }
                let mut data = page
                    .slot_mut(i)
                    .reclaim(None)
                    .expect("a non-free slot always carries data");
                data.finalize(true, &|_| false);
                drop(data);
            }
        }
    }
}
