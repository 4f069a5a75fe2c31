//! Tunables (spec.md §6), exposed as a builder the way the teacher crate
//! exposes `with_heap_threshold` / `with_arena_size` on its allocator.

use crate::page::DEFAULT_PAGE_SIZE;

pub const DEFAULT_INTERVAL_RATIO: u32 = 200;
pub const DEFAULT_STEP_RATIO: u32 = 200;
pub const DEFAULT_ARENA_SIZE: usize = 100;
pub const MAJOR_GC_INC_RATIO: u32 = 120;
pub const MAJOR_GC_TOOMANY: usize = 10_000;
pub const GC_STEP_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaMode {
    /// Hard-fails with `GcError::ArenaOverflow` on overflow.
    Fixed,
    /// Grows the backing buffer by 3/2 on overflow.
    Growable,
}

#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    pub(crate) interval_ratio: u32,
    pub(crate) step_ratio: u32,
    pub(crate) generational: bool,
    pub(crate) arena_capacity: usize,
    pub(crate) arena_mode: ArenaMode,
    pub(crate) page_size: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_ratio: DEFAULT_INTERVAL_RATIO,
            step_ratio: DEFAULT_STEP_RATIO,
            generational: cfg!(feature = "generational"),
            arena_capacity: DEFAULT_ARENA_SIZE,
            arena_mode: if cfg!(feature = "fixed_arena") {
                ArenaMode::Fixed
            } else {
                ArenaMode::Growable
            },
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl GcConfig {
    pub fn with_interval_ratio(mut self, ratio: u32) -> Self {
        self.interval_ratio = ratio;
        self
    }

    pub fn with_step_ratio(mut self, ratio: u32) -> Self {
        self.step_ratio = ratio;
        self
    }

    pub fn with_generational(mut self, enabled: bool) -> Self {
        self.generational = enabled;
        self
    }

    pub fn with_arena_capacity(mut self, capacity: usize) -> Self {
        self.arena_capacity = capacity;
        self
    }

    pub fn with_arena_mode(mut self, mode: ArenaMode) -> Self {
        self.arena_mode = mode;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }
}
