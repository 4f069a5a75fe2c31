//! `HostMark`: lets a host-defined `CData` payload (spec.md §4.9) expose the
//! `ObjRef`s it embeds without hand-writing a `mark_hook`.
//!
//! `#[derive(HostMark)]` (behind the `derive` feature) walks a struct's
//! fields the way `cinder-gc-derive` mirrors the teacher's `Trace` derive:
//! each field recurses through `mark_fields`, bottoming out at the blanket
//! impls below for the shapes a payload actually stores references in.

use rust_alloc::vec::Vec;

use crate::value::{ObjRef, Value};

pub trait HostMark {
    fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef));
}

impl HostMark for ObjRef {
    fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef)) {
        mark(*self);
    }
}

impl HostMark for Value {
    fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef)) {
        if let Some(r) = self.as_ref() {
            mark(r);
        }
    }
}

impl<T: HostMark> HostMark for Option<T> {
    fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef)) {
        if let Some(inner) = self {
            inner.mark_fields(mark);
        }
    }
}

impl<T: HostMark> HostMark for Vec<T> {
    fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef)) {
        for item in self {
            item.mark_fields(mark);
        }
    }
}

impl<T: HostMark> HostMark for [T] {
    fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef)) {
        for item in self {
            item.mark_fields(mark);
        }
    }
}

/// Adapts any `HostMark` payload into the `unsafe fn(*mut (), &mut dyn
/// FnMut(ObjRef))` shape `CDataData::mark_hook` expects, for hosts that
/// derived `HostMark` instead of writing the hook by hand.
///
/// # Safety
/// `payload` must point to a live `T` for the duration of this call.
pub unsafe fn host_mark_hook<T: HostMark>(payload: *mut (), mark: &mut dyn FnMut(ObjRef)) {
    // SAFETY: forwarded from the caller's contract.
    let value = unsafe { &*(payload as *const T) };
    value.mark_fields(mark);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::ptr::NonNull;
    use rustc_hash::FxHashMap;

    use crate::header::{GcHeader, TypeTag, WhitePart};
    use crate::object::{InstanceData, ObjectData};
    use crate::slot::Slot;

    fn leak_slot() -> ObjRef {
        let boxed = rust_alloc::boxed::Box::new(Slot {
            header: GcHeader::new(TypeTag::Object, WhitePart::A),
            class: Cell::new(None),
            gc_next: Cell::new(None),
            data: Some(ObjectData::Object(InstanceData {
                ivars: FxHashMap::default(),
            })),
        });
        ObjRef::new(NonNull::from(rust_alloc::boxed::Box::leak(boxed)))
    }

    struct Payload {
        a: Option<ObjRef>,
        b: Vec<ObjRef>,
    }

    impl HostMark for Payload {
        fn mark_fields(&self, mark: &mut dyn FnMut(ObjRef)) {
            self.a.mark_fields(mark);
            self.b.mark_fields(mark);
        }
    }

    #[test]
    fn mark_fields_visits_every_embedded_ref() {
        let payload = Payload {
            a: Some(leak_slot()),
            b: rust_alloc::vec![leak_slot(), leak_slot()],
        };
        let mut seen = 0;
        payload.mark_fields(&mut |_| seen += 1);
        assert_eq!(seen, 3);
    }

    #[test]
    fn host_mark_hook_dispatches_through_a_raw_pointer() {
        let payload = Payload {
            a: Some(leak_slot()),
            b: Vec::new(),
        };
        let mut seen = 0;
        // SAFETY: `payload` is alive for the duration of this call.
        unsafe {
            host_mark_hook::<Payload>(&payload as *const Payload as *mut (), &mut |_| seen += 1);
        }
        assert_eq!(seen, 1);
    }
}
