//! Generational slot arena owning every cache entry.
//!
//! Entries never move once inserted and are addressed by [`SlotId`], a slot
//! index paired with the generation the slot had when the value was stored.
//! Removing a value bumps the slot generation, so an id that outlived its
//! value no longer resolves.
//!
//! ```text
//!   slots: Vec<Slot<T>>
//!   ┌───────┬─────┬──────────────────────────┐
//!   │ index │ gen │ state                    │
//!   ├───────┼─────┼──────────────────────────┤
//!   │ 0     │ 0   │ Occupied(entry A)        │
//!   │ 1     │ 3   │ Vacant { next_free: 2 }  │◄── free_head
//!   │ 2     │ 1   │ Vacant { next_free: - }  │
//!   │ 3     │ 0   │ Occupied(entry B)        │
//!   └───────┴─────┴──────────────────────────┘
//! ```
//!
//! The free list is threaded through vacant slots, so removal never allocates.
//! Growth goes through `try_reserve`, which lets the cache report an entry
//! allocation failure instead of aborting.

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;
use core::ops::{Index, IndexMut};

/// Stable address of a value stored in a [`Slab`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SlotId {
    index: usize,
    generation: u32,
}

impl SlotId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.index
    }
}

enum SlotState<T> {
    Occupied(T),
    Vacant { next_free: Option<usize> },
}

struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
    len: usize,
    #[cfg(test)]
    fail_allocations: bool,
}

impl<T> Slab<T> {
    pub(crate) const fn new() -> Self {
        Slab {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            #[cfg(test)]
            fail_allocations: false,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns its id.
    ///
    /// Hands the value back if the slot vector could not grow.
    pub(crate) fn try_insert(&mut self, value: T) -> Result<SlotId, T> {
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index];
            self.free_head = match slot.state {
                SlotState::Vacant { next_free } => next_free,
                SlotState::Occupied(_) => unreachable!("free list points at an occupied slot"),
            };
            slot.state = SlotState::Occupied(value);
            self.len += 1;
            return Ok(SlotId {
                index,
                generation: slot.generation,
            });
        }

        if self.allocation_blocked() || self.slots.try_reserve(1).is_err() {
            return Err(value);
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Occupied(value),
        });
        self.len += 1;
        Ok(SlotId {
            index,
            generation: 0,
        })
    }

    /// Removes the value behind `id`, if `id` is still live.
    pub(crate) fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation || matches!(slot.state, SlotState::Vacant { .. }) {
            return None;
        }
        let state = core::mem::replace(
            &mut slot.state,
            SlotState::Vacant {
                next_free: self.free_head,
            },
        );
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(id.index);
        self.len -= 1;
        match state {
            SlotState::Occupied(value) => Some(value),
            SlotState::Vacant { .. } => None,
        }
    }

    pub(crate) fn get(&self, id: SlotId) -> Option<&T> {
        match self.slots.get(id.index) {
            Some(Slot {
                generation,
                state: SlotState::Occupied(value),
            }) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        match self.slots.get_mut(id.index) {
            Some(Slot {
                generation,
                state: SlotState::Occupied(value),
            }) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Occupied(value) => Some((
                    SlotId {
                        index,
                        generation: slot.generation,
                    },
                    value,
                )),
                SlotState::Vacant { .. } => None,
            })
    }

    /// Takes every stored value out and releases the slot storage.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> {
        self.free_head = None;
        self.len = 0;
        core::mem::take(&mut self.slots)
            .into_iter()
            .filter_map(|slot| match slot.state {
                SlotState::Occupied(value) => Some(value),
                SlotState::Vacant { .. } => None,
            })
    }

    #[cfg(not(test))]
    #[inline(always)]
    fn allocation_blocked(&self) -> bool {
        false
    }

    #[cfg(test)]
    fn allocation_blocked(&self) -> bool {
        self.fail_allocations
    }

    /// Makes every insert that needs a fresh slot fail.
    #[cfg(test)]
    pub(crate) fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<SlotId> for Slab<T> {
    type Output = T;

    #[track_caller]
    fn index(&self, id: SlotId) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale slot id {:?}", id),
        }
    }
}

impl<T> IndexMut<SlotId> for Slab<T> {
    #[track_caller]
    fn index_mut(&mut self, id: SlotId) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("stale slot id {:?}", id),
        }
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}
