//! C7: the state machine coordinating mark/sweep steps, interval and step
//! ratios, and generational major/minor selection.

use log::{debug, trace, warn};

use crate::config::{GC_STEP_SIZE, MAJOR_GC_INC_RATIO, MAJOR_GC_TOOMANY};
use crate::header::WhitePart;
use crate::heap::Heap;
use crate::marker::{self, GrayList, Roots};
use crate::object::ObjectData;
use crate::sweeper::{self, SweepCursor};
use crate::value::ObjRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Root,
    Mark,
    Sweep,
}

/// Every scalar field spec.md §3 lists under "GC state", plus the two gray
/// lists and the sweep cursor.
pub struct Scheduler {
    pub phase: GcPhase,
    pub current_white: WhitePart,
    pub live: usize,
    pub live_after_mark: usize,
    pub threshold: usize,
    pub interval_ratio: u32,
    pub step_ratio: u32,
    pub generational: bool,
    pub full: bool,
    pub oldgen_threshold: usize,
    pub disabled: bool,
    pub iterating: bool,
    pub out_of_memory: bool,
    nomem_exception: Option<ObjRef>,
    stack_overflow_exception: Option<ObjRef>,
    arena_overflow_exception: Option<ObjRef>,
    gray_list: GrayList,
    atomic_gray_list: GrayList,
    sweep_cursor: Option<SweepCursor>,
}

impl Scheduler {
    pub fn new(interval_ratio: u32, step_ratio: u32, generational: bool) -> Self {
        Self {
            phase: GcPhase::Root,
            current_white: WhitePart::A,
            live: 0,
            live_after_mark: 0,
            threshold: GC_STEP_SIZE,
            interval_ratio,
            step_ratio,
            generational,
            full: false,
            // No major cycle has run yet; this bootstraps the first
            // minor-to-major promotion check to a sane, generous value
            // rather than firing on the very first minor cycle (spec.md
            // doesn't pin an initial value; see DESIGN.md).
            oldgen_threshold: GC_STEP_SIZE * 2,
            disabled: false,
            iterating: false,
            out_of_memory: false,
            nomem_exception: None,
            stack_overflow_exception: None,
            arena_overflow_exception: None,
            gray_list: GrayList::new(),
            atomic_gray_list: GrayList::new(),
            sweep_cursor: None,
        }
    }

    /// Registers the three pre-allocated, permanently-red exceptions
    /// (spec.md §7) whose ivars/message/backtrace must be stripped at the
    /// end of every mark phase. Called once, right after `Gc::new`
    /// allocates them.
    pub fn set_preallocated_exceptions(&mut self, nomem: ObjRef, stack_overflow: ObjRef, arena_overflow: ObjRef) {
        self.nomem_exception = Some(nomem);
        self.stack_overflow_exception = Some(stack_overflow);
        self.arena_overflow_exception = Some(arena_overflow);
    }

    #[inline]
    pub fn gray_list_mut(&mut self) -> &mut GrayList {
        &mut self.gray_list
    }

    #[inline]
    pub fn atomic_gray_list_mut(&mut self) -> &mut GrayList {
        &mut self.atomic_gray_list
    }

    #[inline]
    fn step_budget(&self) -> usize {
        (GC_STEP_SIZE * self.step_ratio as usize / 100).max(1)
    }

    /// Runs one bounded incremental step: as much work as `step_budget`
    /// allows, or until the phase returns to `ROOT` (spec.md §4.7).
    pub fn incremental_step(&mut self, heap: &mut Heap, roots: &Roots<'_>) {
        if self.disabled {
            return;
        }
        let mut budget = self.step_budget();
        while budget > 0 {
            let spent = match self.phase {
                GcPhase::Root => self.do_root(roots),
                GcPhase::Mark => self.do_mark_step(budget),
                GcPhase::Sweep => self.do_sweep_step(heap, budget),
            };
            if self.phase == GcPhase::Root {
                // ROOT is re-entered at most once per call (a just-finished
                // SWEEP transitions to it); stop rather than starting a
                // second cycle within the same step.
                break;
            }
            budget = budget.saturating_sub(spent.max(1));
        }
    }

    fn do_root(&mut self, roots: &Roots<'_>) -> usize {
        trace!("gc: ROOT -> MARK");
        let n = marker::root_scan(roots, &mut self.gray_list);
        self.current_white = self.current_white.flip();
        self.phase = GcPhase::Mark;
        n
    }

    fn do_mark_step(&mut self, budget: usize) -> usize {
        if !self.gray_list.is_empty() {
            let mut spent = 0;
            while spent < budget {
                match marker::drain_one(&mut self.gray_list) {
                    Some(n) => spent += n.max(1),
                    None => break,
                }
            }
            return spent;
        }

        trace!("gc: MARK finalization -> SWEEP");
        // Final marking: drain whatever root rescan/atomic work remains,
        // then splice the atomic gray list in and drain once more
        // (spec.md §4.7).
        while marker::drain_one(&mut self.gray_list).is_some() {}
        self.gray_list.splice_from(&mut self.atomic_gray_list);
        while marker::drain_one(&mut self.gray_list).is_some() {}
        debug_assert!(self.gray_list.is_empty());
        debug_assert!(self.atomic_gray_list.is_empty());

        // The nomem/stack/arena exceptions are permanently red and so never
        // walked by the marker itself; strip whatever a host left on them
        // so stale references don't outlive their targets (spec.md §4.7).
        for obj in [self.nomem_exception, self.stack_overflow_exception, self.arena_overflow_exception]
            .into_iter()
            .flatten()
        {
            clear_exception_payload(obj);
        }

        self.live_after_mark = self.live;
        self.phase = GcPhase::Sweep;
        self.sweep_cursor = None;
        0
    }

    fn do_sweep_step(&mut self, heap: &mut Heap, budget: usize) -> usize {
        let result = sweeper::step(
            heap,
            &mut self.sweep_cursor,
            self.current_white,
            self.generational,
            budget,
        );
        self.live = self.live.saturating_sub(result.freed);
        if result.pass_complete {
            debug!("gc: SWEEP complete, freed this pass, -> ROOT");
            self.phase = GcPhase::Root;
            self.threshold = recompute_threshold(self.live_after_mark, self.interval_ratio);
            self.apply_generational_transition(heap);
        }
        budget
    }

    /// Runs generational minor/major promotion bookkeeping once a cycle
    /// ends back in `ROOT` (spec.md §4.7).
    fn apply_generational_transition(&mut self, heap: &mut Heap) {
        if !self.generational {
            return;
        }
        if !self.full {
            if self.live > self.oldgen_threshold {
                debug!("gc: promoting minor -> major (live {} > oldgen_threshold {})", self.live, self.oldgen_threshold);
                self.clear_all_old(heap);
                self.full = true;
            }
        } else {
            self.oldgen_threshold = self.live_after_mark * MAJOR_GC_INC_RATIO as usize / 100;
            self.full = false;
            if self.oldgen_threshold > MAJOR_GC_TOOMANY {
                warn!("gc: oldgen_threshold {} exceeds MAJOR_GC_TOOMANY, forcing full GC", self.oldgen_threshold);
                self.force_full_next_cycle();
            }
        }
    }

    /// `clear_all_old` (spec.md §10.7, `examples/original_source/src/gc.c`
    /// lines 1171-1184): demotes every survivor back to a plain sweep
    /// candidate ahead of a major cycle. Runs at a ROOT boundary with both
    /// gray lists already empty, so every non-free slot currently on the
    /// heap is live; a generational sweep just finished and left its
    /// survivors black (`sweep_one` only repaints to `current_white` when
    /// `generational` is false), so black is flipped back to white here by
    /// running one full sweep pass with `generational` forced off, then
    /// restoring it, exactly mirroring the cited original's
    /// `gc->generational = FALSE; ...; gc->generational = TRUE;` bracket.
    fn clear_all_old(&mut self, heap: &mut Heap) {
        let was_generational = self.generational;
        self.generational = false;
        let mut cursor = None;
        let result = sweeper::step(heap, &mut cursor, self.current_white, false, usize::MAX);
        debug_assert!(result.pass_complete, "an unbounded sweep step always completes the pass");
        self.live = self.live.saturating_sub(result.freed);
        self.generational = was_generational;
        self.sweep_cursor = None;
    }

    fn force_full_next_cycle(&mut self) {
        self.full = true;
    }

    /// `full_gc()`: finishes any in-flight cycle, then runs a complete
    /// mark+sweep cycle to `ROOT` (spec.md §4.7). If generational, the next
    /// cycle is entered as major.
    pub fn full_gc(&mut self, heap: &mut Heap, roots: &Roots<'_>) {
        trace!("gc: full_gc requested");
        self.finish_in_flight_cycle(heap, roots);
        self.run_to_root(heap, roots);
        if self.generational {
            self.full = true;
        }
    }

    fn finish_in_flight_cycle(&mut self, heap: &mut Heap, roots: &Roots<'_>) {
        while self.phase != GcPhase::Root {
            self.run_one_phase_to_completion(heap, roots);
        }
    }

    fn run_to_root(&mut self, heap: &mut Heap, roots: &Roots<'_>) {
        // already in ROOT from finish_in_flight_cycle; run exactly one more
        // full cycle.
        self.run_one_phase_to_completion(heap, roots); // ROOT -> MARK
        while self.phase != GcPhase::Root {
            self.run_one_phase_to_completion(heap, roots);
        }
    }

    fn run_one_phase_to_completion(&mut self, heap: &mut Heap, roots: &Roots<'_>) {
        match self.phase {
            GcPhase::Root => {
                self.do_root(roots);
            }
            GcPhase::Mark => {
                while self.phase == GcPhase::Mark {
                    self.do_mark_step(usize::MAX);
                }
            }
            GcPhase::Sweep => {
                while self.phase == GcPhase::Sweep {
                    self.do_sweep_step(heap, usize::MAX);
                }
            }
        }
    }
}

fn recompute_threshold(live_after_mark: usize, interval_ratio: u32) -> usize {
    (live_after_mark * interval_ratio as usize / 100).max(GC_STEP_SIZE)
}

/// Clears a pre-allocated exception's ivars/message/backtrace.
fn clear_exception_payload(obj: ObjRef) {
    // SAFETY: every pre-allocated exception is a live slot this crate
    // itself allocates once at `Gc::new` and never frees before `Gc`
    // teardown; scheduling runs single-threaded.
    if let ObjectData::Exception(e) = unsafe { &mut *obj.as_ptr().as_ptr() }.data_mut() {
        e.ivars.clear();
        e.message = None;
        e.backtrace = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_monotone_in_gc_step_size_and_live_after_mark() {
        assert_eq!(recompute_threshold(0, 200), GC_STEP_SIZE);
        assert_eq!(recompute_threshold(10_000, 200), 20_000);
    }

    #[test]
    fn new_scheduler_starts_in_root_with_white_a() {
        let sched = Scheduler::new(200, 200, false);
        assert_eq!(sched.phase, GcPhase::Root);
        assert_eq!(sched.current_white, WhitePart::A);
        assert_eq!(sched.threshold, GC_STEP_SIZE);
    }
}
