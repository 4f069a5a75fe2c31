//! C1: a fixed-count slot page and its intra-page free-list.

use core::alloc::Layout;
use core::ptr::NonNull;

use rust_alloc::rc::Rc;

use crate::host_alloc::HostAlloc;
use crate::slot::Slot;

/// Default slot count per page (spec.md §6, `HEAP_PAGE_SIZE`).
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// A page's slot storage is allocated through the injected `HostAlloc`
/// rather than `Box<[Slot]>`, so a host allocator that returns null on
/// real exhaustion is actually observable as `None` instead of aborting
/// the process (spec.md §5, §7).
pub struct Page {
    data: NonNull<Slot>,
    len: usize,
    layout: Layout,
    host_alloc: Rc<dyn HostAlloc>,
    pub(crate) freelist: Option<NonNull<Slot>>,
    /// Set when a minor sweep finds no young object in this page, so future
    /// minor sweeps can skip scanning it entirely (spec.md §3, §4.6).
    pub(crate) old: bool,
}

impl Page {
    /// Allocates a new page through `host_alloc`, writes FREE into every
    /// slot, and threads the free-list last-to-first as spec.md §4.1
    /// prescribes (so the first pop returns slot 0, matching allocation
    /// order a reader would expect). `None` on host allocator exhaustion.
    pub fn try_new(page_size: usize, host_alloc: Rc<dyn HostAlloc>) -> Option<Self> {
        let size = core::mem::size_of::<Slot>().checked_mul(page_size)?;
        let layout = Layout::from_size_align(size, core::mem::align_of::<Slot>()).ok()?;
        // SAFETY: `layout` has `Slot`'s own alignment and `ptr` is `None`,
        // so this requests a fresh allocation of exactly `layout.size()`
        // bytes, matching `HostAlloc::realloc`'s malloc case.
        let raw = unsafe { host_alloc.realloc(None, layout, layout.size()) }?;
        let data = raw.cast::<Slot>();

        let mut prev: Option<NonNull<Slot>> = None;
        for i in (0..page_size).rev() {
            // SAFETY: `i` is in bounds of the `page_size` slots just
            // allocated, each uninitialized and properly aligned for `Slot`.
            unsafe {
                let slot_ptr = data.as_ptr().add(i);
                slot_ptr.write(Slot::new_free(prev));
                prev = NonNull::new(slot_ptr);
            }
        }

        Some(Self {
            data,
            len: page_size,
            layout,
            host_alloc,
            freelist: prev,
            old: false,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn has_free_slots(&self) -> bool {
        self.freelist.is_some()
    }

    /// Pops the head of this page's free-list. Caller must not call this
    /// unless `has_free_slots()` holds.
    pub(crate) fn pop_free(&mut self) -> NonNull<Slot> {
        let head = self.freelist.expect("pop_free on an empty page");
        // SAFETY: `head` points into this page's own storage, which
        // outlives this borrow.
        let next = unsafe { head.as_ref() }.gc_next.get();
        self.freelist = next;
        head
    }

    /// Threads `slot` back onto this page's free-list (spec.md §4.1).
    pub(crate) fn push_free(&mut self, slot: NonNull<Slot>) {
        // SAFETY: `slot` is one of this page's own objects, reclaimed by the
        // sweeper before this call.
        unsafe { slot.as_ref() }.gc_next.set(self.freelist);
        self.freelist = Some(slot);
    }

    /// True once every slot in the page is tagged Free.
    pub(crate) fn is_entirely_free(&self) -> bool {
        (0..self.len).all(|i| self.slot(i).header().is_free())
    }

    #[inline]
    pub(crate) fn start_ptr(&self) -> *const Slot {
        self.data.as_ptr()
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &Slot {
        assert!(index < self.len, "slot index out of bounds");
        // SAFETY: index checked above; `data` is valid for `len` elements
        // for the lifetime of this page.
        unsafe { &*self.data.as_ptr().add(index) }
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot {
        assert!(index < self.len, "slot index out of bounds");
        // SAFETY: see `slot`.
        unsafe { &mut *self.data.as_ptr().add(index) }
    }

    /// Marks this page as containing no young objects, so a future minor
    /// sweep can skip scanning it entirely (spec.md §4.6).
    #[inline]
    pub(crate) fn mark_old(&mut self) {
        self.old = true;
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // SAFETY: `data` was allocated for exactly `len` `Slot`s through
        // `host_alloc` with `layout`, and every index was initialized by
        // `try_new`; this runs at most once per page.
        unsafe {
            for i in 0..self.len {
                core::ptr::drop_in_place(self.data.as_ptr().add(i));
            }
            self.host_alloc.realloc(Some(self.data.cast()), self.layout, 0);
        }
    }
}
