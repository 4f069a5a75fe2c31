//! A single page slot: a header plus either live object data or a free-list
//! link. spec.md models this as a uniform union; the safe-Rust rendition is
//! an `Option<ObjectData>` guarded by the header's tag, which is the only
//! thing callers are allowed to trust before touching the payload.

use core::cell::Cell;
use core::ptr::NonNull;

use crate::header::{GcHeader, TypeTag, WhitePart};
use crate::object::ObjectData;
use crate::value::ObjRef;

pub struct Slot {
    pub(crate) header: GcHeader,
    /// Class back-pointer (spec.md §3); absent for Free slots and for a
    /// small set of classless kinds (the hidden root registry's array).
    pub(crate) class: Cell<Option<ObjRef>>,
    /// Reused as the page free-list chain when the slot is Free, and as the
    /// incremental gray-list chain while the slot is Gray (spec.md §9).
    pub(crate) gc_next: Cell<Option<NonNull<Slot>>>,
    pub(crate) data: Option<ObjectData>,
}

impl Slot {
    pub(crate) fn new_free(next: Option<NonNull<Slot>>) -> Self {
        Self {
            header: GcHeader::new_free(),
            class: Cell::new(None),
            gc_next: Cell::new(next),
            data: None,
        }
    }

    pub(crate) fn init(&mut self, tag: TypeTag, class: Option<ObjRef>, white: WhitePart, data: ObjectData) {
        debug_assert!(self.header.is_free(), "init on a non-free slot");
        self.header = GcHeader::new(tag, white);
        self.class.set(class);
        self.gc_next.set(None);
        self.data = Some(data);
    }

    #[inline]
    pub fn header(&self) -> &GcHeader {
        &self.header
    }

    #[inline]
    pub fn class(&self) -> Option<ObjRef> {
        self.class.get()
    }

    #[inline]
    pub fn set_class(&self, class: Option<ObjRef>) {
        self.class.set(class);
    }

    #[inline]
    pub fn data(&self) -> &ObjectData {
        self.data.as_ref().expect("live slot must carry object data")
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut ObjectData {
        self.data.as_mut().expect("live slot must carry object data")
    }

    /// Rewrites this slot back to Free and returns the payload so the
    /// caller can drop it after running the per-type destructor.
    pub(crate) fn reclaim(&mut self, next: Option<NonNull<Slot>>) -> Option<ObjectData> {
        self.header.set_tag(TypeTag::Free);
        self.class.set(None);
        self.gc_next.set(next);
        self.data.take()
    }
}
