//! C2: the bounded temporary root stack.
//!
//! Every native call into the runtime protects its freshly produced objects
//! here so they survive until the call returns, without needing a full root
//! handle type. `save`/`restore` bracket a call the way a stack frame would.

use rust_alloc::vec::Vec;

use crate::config::ArenaMode;
use crate::error::GcError;
use crate::value::Value;

/// Headroom forced before raising `ArenaOverflow` in fixed mode, so the
/// unwind that follows can still push its own temporaries (spec.md §7).
const OVERFLOW_HEADROOM: usize = 4;

pub struct Arena {
    mode: ArenaMode,
    capacity: usize,
    entries: Vec<Value>,
}

impl Arena {
    pub fn new(capacity: usize, mode: ArenaMode) -> Self {
        Self {
            mode,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `value` to the top of the arena. A no-op for immediates and
    /// red objects (spec.md §4.2); everything else must go through here
    /// before it can be assumed safe across a re-entry into the host.
    pub fn protect(&mut self, value: Value, is_red: impl FnOnce(Value) -> bool) -> Result<(), GcError> {
        if value.is_immediate() || is_red(value) {
            return Ok(());
        }
        self.ensure_room()?;
        self.entries.push(value);
        Ok(())
    }

    pub(crate) fn ensure_room(&mut self) -> Result<(), GcError> {
        if self.entries.len() < self.capacity {
            return Ok(());
        }
        match self.mode {
            ArenaMode::Fixed => {
                // force headroom before raising, mirroring `gc_arena_keep`'s
                // `arena_idx = ARENA_SIZE - 4` so the unwind can still push.
                self.entries.truncate(self.capacity.saturating_sub(OVERFLOW_HEADROOM));
                Err(GcError::ArenaOverflow)
            }
            ArenaMode::Growable => {
                self.capacity = self.capacity * 3 / 2;
                self.entries.reserve(self.capacity - self.entries.len());
                Ok(())
            }
        }
    }

    /// Returns a checkpoint that `restore` can later rewind to.
    #[inline]
    pub fn save(&self) -> usize {
        self.entries.len()
    }

    /// Truncates the arena back to a previous checkpoint. Any object pushed
    /// after `checkpoint` and not otherwise rooted becomes collectable
    /// (spec.md §8, property 4).
    pub fn restore(&mut self, checkpoint: usize) {
        self.entries.truncate(checkpoint);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_restore_round_trips() {
        let mut arena = Arena::new(8, ArenaMode::Growable);
        let before = arena.save();
        arena.protect(Value::Immediate(crate::value::Immediate::Int(1)), |_| false).unwrap();
        assert_eq!(arena.len(), before);
        let checkpoint = arena.save();
        // immediates never occupy a slot, so push a marker length via a
        // non-immediate stand-in is exercised in the integration tests,
        // which have access to real ObjRefs.
        arena.restore(checkpoint);
        assert_eq!(arena.len(), checkpoint);
    }

    #[test]
    fn fixed_mode_overflows_with_headroom() {
        let mut arena = Arena::new(2, ArenaMode::Fixed);
        // immediates never occupy a slot, so overflow can't be observed
        // without real heap refs; capacity bookkeeping is still exercised.
        assert_eq!(arena.capacity, 2);
    }
}
