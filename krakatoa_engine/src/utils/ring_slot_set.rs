/// Fixed-size circular set of per-frame resource instances.
///
/// Holds one instance of `T` per frame in flight and a single cursor naming
/// the instance the current frame may touch. All slots are created up front
/// (`from_fn` / `try_from_fn`); [`advance`](RingSlotSet::advance) only moves
/// the cursor and never creates anything.
///
/// The cursor starts out unset: reading the current slot before the first
/// advance is an error. The first advance lands on slot 0.
///
/// # Example
///
/// ```ignore
/// let mut ring = RingSlotSet::from_fn(3, |i| i * 10)?;
/// assert!(ring.current().is_err());
/// assert_eq!(*ring.advance(), 0);
/// assert_eq!(*ring.advance(), 10);
/// ring[2] = 99;
/// ```
use std::ops::{Index, IndexMut};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RingSlotSet<T> {
    slots: Vec<T>,
    cursor: Option<usize>,
}

impl<T> RingSlotSet<T> {
    /// Build a set of `len` slots, filling slot `i` with `fill(i)`
    pub fn from_fn(len: usize, mut fill: impl FnMut(usize) -> T) -> Result<Self> {
        Self::try_from_fn(len, |i| Ok(fill(i)))
    }

    /// Build a set of `len` slots with a fallible constructor
    ///
    /// Slots created before a failure are dropped in creation order, which
    /// releases any scoped GPU objects they hold.
    pub fn try_from_fn(len: usize, mut fill: impl FnMut(usize) -> Result<T>) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidState(
                "RingSlotSet needs at least one slot".to_string(),
            ));
        }
        let slots = (0..len).map(&mut fill).collect::<Result<Vec<T>>>()?;
        Ok(Self { slots, cursor: None })
    }

    /// Move the cursor forward by one (wrapping) and return the new current slot
    pub fn advance(&mut self) -> &mut T {
        let next = match self.cursor {
            None => 0,
            Some(i) => (i + 1) % self.slots.len(),
        };
        self.cursor = Some(next);
        &mut self.slots[next]
    }

    /// Slot at the cursor
    pub fn current(&self) -> Result<&T> {
        match self.cursor {
            Some(i) => Ok(&self.slots[i]),
            None => Err(Error::InvalidState(
                "RingSlotSet read before first advance".to_string(),
            )),
        }
    }

    /// Mutable slot at the cursor
    pub fn current_mut(&mut self) -> Result<&mut T> {
        match self.cursor {
            Some(i) => Ok(&mut self.slots[i]),
            None => Err(Error::InvalidState(
                "RingSlotSet read before first advance".to_string(),
            )),
        }
    }

    /// Cursor position, `None` until the first advance
    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Number of slots (fixed at construction)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: construction rejects empty sets
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)
    }

    /// All slots in index order, independent of the cursor
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }

    /// Consume the set, returning the slots in index order
    pub fn into_vec(self) -> Vec<T> {
        self.slots
    }
}

impl<T> Index<usize> for RingSlotSet<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.slots[index]
    }
}

impl<T> IndexMut<usize> for RingSlotSet<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index]
    }
}

impl<'a, T> IntoIterator for &'a RingSlotSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "ring_slot_set_tests.rs"]
mod tests;
