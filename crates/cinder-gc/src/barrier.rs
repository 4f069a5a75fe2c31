//! C8: write barriers preserving the tri-color invariant ("no black object
//! directly references a white object") across mutation.

use crate::header::WhitePart;
use crate::marker::GrayList;
use crate::scheduler::GcPhase;
use crate::value::ObjRef;

/// `field_write_barrier(obj, value)`: called whenever a black `obj` gains a
/// direct reference to `value` (spec.md §4.8). A no-op unless `obj` is
/// black and `value` is a live non-red white object. In the mark phase (or
/// whenever generational mode is on), grays `value` directly onto the
/// incremental gray list; during sweep, instead repaints `obj` back to
/// `current_white` so the field is rescanned next cycle rather than grayed
/// mid-sweep, when the gray list must already be empty (spec.md §5
/// ordering: "a sweep must not begin until both gray lists are empty").
/// Never invoked during `ROOT` outside generational mode (assertable by
/// the caller; `obj` cannot yet be black that early in a cycle).
pub fn field_write_barrier(
    obj: ObjRef,
    value: ObjRef,
    phase: GcPhase,
    generational: bool,
    current_white: WhitePart,
    gray_list: &mut GrayList,
) {
    // SAFETY: barriers are only ever called with live references the
    // mutator currently holds.
    let obj_header = unsafe { obj.slot() }.header();
    if !obj_header.is_black() {
        return;
    }
    let value_header = unsafe { value.slot() }.header();
    if value_header.is_red() || !value_header.is_white() {
        return;
    }

    if phase == GcPhase::Mark || generational {
        value_header.paint_gray();
        gray_list.push(value);
    } else {
        obj_header.paint_white(current_white);
    }
}

/// `write_barrier(obj)`: called when a whole container is mutated in a way
/// that doesn't go through `field_write_barrier` (e.g. overwriting an array
/// slot wholesale). A no-op unless `obj` is black; otherwise grays `obj`
/// itself and pushes it onto the atomic gray list so it is retraversed
/// during final marking (spec.md §4.8).
pub fn write_barrier(obj: ObjRef, atomic_gray_list: &mut GrayList) {
    // SAFETY: see `field_write_barrier`.
    let header = unsafe { obj.slot() }.header();
    if !header.is_black() {
        return;
    }
    header.paint_gray();
    atomic_gray_list.push(obj);
}

/// Tri-color violation detector (spec.md §8 scenario F): returns the first
/// child of `obj` that breaks "no black object references a white object",
/// or `None` if `obj` upholds it. Debug-only tooling, not called from the
/// collector's own steady-state path — a correct barrier never lets this
/// state exist for longer than the mutation that creates it.
pub fn first_black_to_white_edge(obj: ObjRef) -> Option<ObjRef> {
    // SAFETY: caller-supplied live reference, same contract as the barriers.
    let slot = unsafe { obj.slot() };
    if !slot.header().is_black() {
        return None;
    }
    let mut violation = None;
    slot.data().children(&mut |child| {
        if violation.is_some() {
            return;
        }
        // SAFETY: children() only yields live references.
        let child_header = unsafe { child.slot() }.header();
        if !child_header.is_red() && child_header.is_white() {
            violation = Some(child);
        }
    });
    violation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{GcHeader, TypeTag};
    use crate::object::{InstanceData, ObjectData};
    use crate::slot::Slot;
    use core::cell::Cell;
    use core::ptr::NonNull;
    use rustc_hash::FxHashMap;

    fn leak_slot(data: ObjectData, white: WhitePart) -> ObjRef {
        let boxed = rust_alloc::boxed::Box::new(Slot {
            header: GcHeader::new(TypeTag::Object, white),
            class: Cell::new(None),
            gc_next: Cell::new(None),
            data: Some(data),
        });
        ObjRef::new(NonNull::from(rust_alloc::boxed::Box::leak(boxed)))
    }

    fn instance() -> ObjectData {
        ObjectData::Object(InstanceData {
            ivars: FxHashMap::default(),
        })
    }

    #[test]
    fn field_barrier_grays_a_white_value_under_a_black_container() {
        let container = leak_slot(instance(), WhitePart::A);
        // SAFETY: test-owned leaked slot.
        unsafe { container.slot() }.header().paint_black();
        let value = leak_slot(instance(), WhitePart::A);

        let mut gray_list = GrayList::new();
        field_write_barrier(
            container,
            value,
            GcPhase::Mark,
            false,
            WhitePart::A,
            &mut gray_list,
        );

        assert!(!gray_list.is_empty());
        // SAFETY: test-owned leaked slot.
        assert!(unsafe { value.slot() }.header().is_gray());
    }

    #[test]
    fn field_barrier_is_a_no_op_for_a_white_container() {
        let container = leak_slot(instance(), WhitePart::A);
        let value = leak_slot(instance(), WhitePart::A);

        let mut gray_list = GrayList::new();
        field_write_barrier(
            container,
            value,
            GcPhase::Mark,
            false,
            WhitePart::A,
            &mut gray_list,
        );

        assert!(gray_list.is_empty());
        // SAFETY: test-owned leaked slot.
        assert!(unsafe { value.slot() }.header().is_white());
    }

    #[test]
    fn field_barrier_in_sweep_phase_repaints_the_container_instead() {
        let container = leak_slot(instance(), WhitePart::A);
        // SAFETY: test-owned leaked slot.
        unsafe { container.slot() }.header().paint_black();
        let value = leak_slot(instance(), WhitePart::A);

        let mut gray_list = GrayList::new();
        field_write_barrier(
            container,
            value,
            GcPhase::Sweep,
            false,
            WhitePart::B,
            &mut gray_list,
        );

        assert!(gray_list.is_empty());
        // SAFETY: test-owned leaked slot.
        assert!(unsafe { container.slot() }.header().is_white());
    }

    #[test]
    fn object_barrier_grays_the_container_and_queues_it_atomically() {
        let container = leak_slot(instance(), WhitePart::A);
        // SAFETY: test-owned leaked slot.
        unsafe { container.slot() }.header().paint_black();

        let mut atomic = GrayList::new();
        write_barrier(container, &mut atomic);

        assert!(!atomic.is_empty());
        // SAFETY: test-owned leaked slot.
        assert!(unsafe { container.slot() }.header().is_gray());
    }

    #[test]
    fn detector_flags_an_unbarriered_black_to_white_store() {
        use crate::object::ArrayData;
        use crate::value::Value;

        let array = leak_slot(
            ObjectData::Array(ArrayData {
                elements: rust_alloc::vec::Vec::new(),
                shared: None,
            }),
            WhitePart::A,
        );
        // SAFETY: test-owned leaked slot.
        unsafe { array.slot() }.header().paint_black();
        let element = leak_slot(instance(), WhitePart::A);

        // Store directly, bypassing the barrier, as scenario F prescribes.
        // SAFETY: test-owned leaked slot, exclusively accessed here.
        let array_slot = unsafe { &mut *array.as_ptr().as_ptr() };
        if let ObjectData::Array(a) = array_slot.data_mut() {
            a.elements.push(Value::from_ref(element));
        }

        assert_eq!(first_black_to_white_edge(array), Some(element));

        let mut gray_list = GrayList::new();
        field_write_barrier(array, element, GcPhase::Mark, false, WhitePart::A, &mut gray_list);
        assert_eq!(first_black_to_white_edge(array), None);
    }
}
