//! The host allocator primitive (spec.md §6): a single `realloc`-shaped
//! function every GC memory operation routes through. Out of scope per
//! spec.md §1 as an external collaborator; this module only specifies the
//! interface plus a default binding to the global Rust allocator so the
//! crate is usable standalone.

use core::alloc::Layout;
use core::ptr::NonNull;

/// Acts as malloc when `ptr` is `None`, as free when `new_size == 0`, and
/// otherwise resizes in place or relocates, exactly like C's `realloc`.
/// Implementations must return a pointer aligned for any managed object
/// (the page allocator never requests anything looser than `Slot`'s own
/// alignment).
pub trait HostAlloc {
    /// # Safety
    /// `ptr`, if present, must have been returned by a prior call to this
    /// same `realloc` with `old_layout`, and not yet freed.
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;
}

/// Default binding to the global Rust allocator (`rust_alloc::alloc`),
/// the obvious choice when no embedding supplies its own arena.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalHostAlloc;

impl HostAlloc for GlobalHostAlloc {
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        use rust_alloc::alloc::{alloc, dealloc, realloc};

        match (ptr, new_size) {
            (None, 0) => None,
            (None, _) => {
                let layout = Layout::from_size_align(new_size, old_layout.align()).ok()?;
                // SAFETY: layout has a non-zero size, checked above.
                NonNull::new(unsafe { alloc(layout) })
            }
            (Some(p), 0) => {
                // SAFETY: caller guarantees `p`/`old_layout` describe a live
                // allocation made by this same allocator.
                unsafe { dealloc(p.as_ptr(), old_layout) };
                None
            }
            (Some(p), _) => {
                // SAFETY: same contract as above; `realloc` additionally
                // requires the new size not overflow `isize`, which the
                // page allocator's bounded slot counts never approach.
                let raw = unsafe { realloc(p.as_ptr(), old_layout, new_size) };
                NonNull::new(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_then_free_round_trips() {
        let host = GlobalHostAlloc;
        let layout = Layout::from_size_align(64, 8).unwrap();
        // SAFETY: fresh allocation, matching layout used throughout.
        let ptr = unsafe { host.realloc(None, layout, 64) }.expect("alloc succeeds");
        // SAFETY: `ptr` came from the call above with the same layout.
        let freed = unsafe { host.realloc(Some(ptr), layout, 0) };
        assert!(freed.is_none());
    }
}
