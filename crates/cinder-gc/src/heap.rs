//! C1: the page allocator. Owns every page; tracks which ones currently
//! have free slots so allocation never has to scan.

use rust_alloc::boxed::Box;
use rust_alloc::rc::Rc;
use rust_alloc::vec::Vec;
use core::ptr::NonNull;

use crate::host_alloc::{GlobalHostAlloc, HostAlloc};
use crate::page::Page;
use crate::slot::Slot;

pub struct Heap {
    page_size: usize,
    host_alloc: Rc<dyn HostAlloc>,
    /// Owns every page; addresses are stable because each `Page` lives
    /// behind its own `Box`, so pushing/removing from this `Vec` never
    /// invalidates a `NonNull<Page>` derived from an entry already in it.
    heaps: Vec<Box<Page>>,
    /// Non-owning: pages from `heaps` that currently have free slots.
    free_heaps: Vec<NonNull<Page>>,
}

impl Heap {
    pub fn new(page_size: usize) -> Self {
        Self::with_host_alloc(page_size, Rc::new(GlobalHostAlloc))
    }

    /// Builds a heap that routes every page's backing storage through
    /// `host_alloc` instead of the global Rust allocator (spec.md §6's
    /// "host allocator" boundary).
    pub fn with_host_alloc(page_size: usize, host_alloc: Rc<dyn HostAlloc>) -> Self {
        let mut heap = Self {
            page_size,
            host_alloc,
            heaps: Vec::new(),
            free_heaps: Vec::new(),
        };
        heap.try_add_page().expect("initial page allocation must succeed");
        heap
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.heaps.len()
    }

    #[inline]
    pub(crate) fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.heaps.get_mut(index).map(|b| b.as_mut())
    }

    /// Allocates a new page. `None` if the host allocator is exhausted
    /// (spec.md §5, §7): the caller is responsible for the full-GC-then-
    /// retry policy, this layer never aborts the process.
    pub fn try_add_page(&mut self) -> Option<()> {
        let page = Page::try_new(self.page_size, self.host_alloc.clone())?;
        let mut boxed = Box::new(page);
        let ptr = NonNull::from(boxed.as_mut());
        self.heaps.push(boxed);
        self.free_heaps.push(ptr);
        Some(())
    }

    /// Pops a slot off the head of `free_heaps`, adding a page first if none
    /// has room (spec.md §4.1). `None` on host allocator exhaustion.
    pub fn try_alloc_slot(&mut self) -> Option<NonNull<Slot>> {
        if self.free_heaps.is_empty() {
            self.try_add_page()?;
        }
        let mut page_ptr = *self.free_heaps.last().expect("just ensured non-empty");
        // SAFETY: pages in `free_heaps` are always live entries of `heaps`.
        let page = unsafe { page_ptr.as_mut() };
        let slot = page.pop_free();
        if !page.has_free_slots() {
            self.free_heaps.pop();
        }
        Some(slot)
    }

    /// Returns whether `object` belongs to this heap at all (spec.md §6
    /// `object_dead?`: a pointer outside the heap is unconditionally dead).
    pub fn contains(&self, object: NonNull<Slot>) -> bool {
        self.heaps.iter().any(|page| {
            let start = page.start_ptr();
            // SAFETY: computing (but not dereferencing) an address within
            // this page's own allocation.
            let end = unsafe { start.add(page.len()) };
            let addr = object.as_ptr() as *const Slot;
            addr >= start && addr < end
        })
    }

    /// Snapshots every page's address range. Valid for the duration of a
    /// single sweep pass: pages are only ever deallocated in `finish_pass`,
    /// once a pass has fully completed, so this never goes stale mid-pass.
    pub(crate) fn slot_ranges(&self) -> Vec<(*const Slot, *const Slot)> {
        self.heaps
            .iter()
            .map(|page| {
                let start = page.start_ptr();
                // SAFETY: see `contains`.
                let end = unsafe { start.add(page.len()) };
                (start, end)
            })
            .collect()
    }

    /// Rebuilds `free_heaps` from scratch by scanning every page, as spec.md
    /// §4.1/§4.6 prescribe instead of patching the list per freed slot.
    pub fn rebuild_free_list(&mut self) {
        self.free_heaps.clear();
        for page in &mut self.heaps {
            if page.has_free_slots() {
                self.free_heaps.push(NonNull::from(page.as_mut()));
            }
        }
    }

    /// Iterates pages in order, letting the sweeper mutate each in place and
    /// decide whether to retire it. Returns once every page has been
    /// visited or `f` asks to stop (via its own bookkeeping).
    pub fn retain_pages(&mut self, mut f: impl FnMut(&mut Page) -> bool) {
        self.heaps.retain_mut(|page| f(page));
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.heaps.iter().map(|b| b.as_ref())
    }

    /// Mutable page walk used by `Gc`'s final teardown (spec.md §9
    /// `gc_destroy`) to finalize every live slot before the pages
    /// themselves are dropped.
    pub(crate) fn pages_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.heaps.iter_mut().map(|b| b.as_mut())
    }

    #[cfg(debug_assertions)]
    pub(crate) fn assert_free_list_consistency(&self) {
        for page in &self.heaps {
            let in_free_heaps = self
                .free_heaps
                .iter()
                .any(|p| core::ptr::eq(p.as_ptr(), page.as_ref() as *const Page));
            assert_eq!(
                page.has_free_slots(),
                in_free_heaps,
                "a page is on free_heaps iff its free-list is non-empty"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_drains_a_page_then_grows() {
        let mut heap = Heap::new(4);
        assert_eq!(heap.page_count(), 1);
        for _ in 0..4 {
            heap.try_alloc_slot().unwrap();
        }
        assert!(heap.free_heaps.is_empty());
        heap.try_alloc_slot().unwrap();
        assert_eq!(heap.page_count(), 2);
    }

    #[test]
    fn free_list_consistency_holds_after_alloc() {
        let mut heap = Heap::new(2);
        heap.try_alloc_slot().unwrap();
        #[cfg(debug_assertions)]
        heap.assert_free_list_consistency();
    }
}
