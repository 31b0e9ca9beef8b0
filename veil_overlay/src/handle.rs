//! Generation-checked handles and slot storage for overlay values.
//!
//! Every overlay value lives in the context's `SlotArena`. Handles carry a
//! generation so that use-after-erase is a detectable error rather than a
//! silent read of recycled storage.
//!
//! A slot moves through three states:
//! - **Live**: holds a value payload
//! - **Detached**: payload temporarily removed (held by an erase snapshot
//!   while a tracking session is open); the generation is unchanged so the
//!   original handle becomes valid again if the payload is restored
//! - **Free**: finalized; the generation is bumped and every outstanding
//!   handle to the slot is stale from then on

// =============================================================================
// ValueId
// =============================================================================

/// Handle to an overlay value: slot index plus generation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId {
    index: u32,
    generation: u32,
}

impl ValueId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        ValueId { index, generation }
    }

    /// Get the raw slot index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Invalid/null handle.
    pub const INVALID: Self = ValueId {
        index: u32::MAX,
        generation: 0,
    };

    /// Check if this handle is valid (it may still be stale).
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl std::fmt::Debug for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "v{}.{}", self.index, self.generation)
        } else {
            write!(f, "vINVALID")
        }
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.index)
    }
}

impl Default for ValueId {
    fn default() -> Self {
        Self::INVALID
    }
}

// =============================================================================
// SlotArena
// =============================================================================

enum SlotState<T> {
    Live(T),
    Detached,
    Free,
}

struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

/// Slot storage with generation-checked access.
pub(crate) struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    live: usize,
}

impl<T> SlotArena<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        SlotArena {
            slots: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Allocate a new slot at generation 0.
    pub(crate) fn alloc(&mut self, item: T) -> ValueId {
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Live(item),
        });
        self.live += 1;
        ValueId::new(index, 0)
    }

    fn slot(&self, id: ValueId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
    }

    /// Get the payload, or `None` if the handle is stale or the slot is
    /// detached/free.
    #[inline]
    pub(crate) fn get(&self, id: ValueId) -> Option<&T> {
        match self.slot(id)?.state {
            SlotState::Live(ref item) => Some(item),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ValueId) -> Option<&mut T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        match slot.state {
            SlotState::Live(ref mut item) => Some(item),
            _ => None,
        }
    }

    /// Remove the payload without bumping the generation. The handle stays
    /// valid for a later `restore`.
    pub(crate) fn detach(&mut self, id: ValueId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        match std::mem::replace(&mut slot.state, SlotState::Detached) {
            SlotState::Live(item) => {
                self.live -= 1;
                Some(item)
            }
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Re-install a payload removed with `detach`. Panics unless the slot is
    /// detached at the handle's generation.
    pub(crate) fn restore(&mut self, id: ValueId, item: T) {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .expect("restoring into a stale slot");
        assert!(
            matches!(slot.state, SlotState::Detached),
            "restoring into a slot that is not detached"
        );
        slot.state = SlotState::Live(item);
        self.live += 1;
    }

    /// Finalize a slot: drop any payload and bump the generation, making
    /// every outstanding handle stale.
    pub(crate) fn free(&mut self, id: ValueId) {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .expect("freeing a stale slot");
        if matches!(slot.state, SlotState::Live(_)) {
            self.live -= 1;
        }
        slot.state = SlotState::Free;
        slot.generation += 1;
    }

    /// Number of live values.
    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Iterate over live values with their handles.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (ValueId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            if let SlotState::Live(ref item) = slot.state {
                Some((ValueId::new(i as u32, slot.generation), item))
            } else {
                None
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_get() {
        let mut arena: SlotArena<i32> = SlotArena::with_capacity(4);
        let a = arena.alloc(10);
        let b = arena.alloc(20);
        assert_eq!(arena.get(a), Some(&10));
        assert_eq!(arena.get(b), Some(&20));
        *arena.get_mut(a).unwrap() = 11;
        assert_eq!(arena.get(a), Some(&11));
        assert_eq!(arena.live(), 2);
    }

    #[test]
    fn test_detach_restore_keeps_handle() {
        let mut arena: SlotArena<i32> = SlotArena::with_capacity(4);
        let a = arena.alloc(10);

        let payload = arena.detach(a).unwrap();
        assert_eq!(payload, 10);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.live(), 0);

        arena.restore(a, payload);
        assert_eq!(arena.get(a), Some(&10));
    }

    #[test]
    fn test_free_makes_handle_stale() {
        let mut arena: SlotArena<i32> = SlotArena::with_capacity(4);
        let a = arena.alloc(10);
        arena.free(a);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.live(), 0);
    }

    #[test]
    #[should_panic(expected = "stale slot")]
    fn test_double_free_panics() {
        let mut arena: SlotArena<i32> = SlotArena::with_capacity(4);
        let a = arena.alloc(10);
        arena.free(a);
        arena.free(a);
    }

    #[test]
    fn test_free_from_detached() {
        let mut arena: SlotArena<i32> = SlotArena::with_capacity(4);
        let a = arena.alloc(10);
        arena.detach(a).unwrap();
        arena.free(a);
        assert_eq!(arena.get(a), None);
    }
}
