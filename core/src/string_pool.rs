//! Pooled string arena.
//!
//! Strings are stored in slots whose capacity is a power of two. Giving a
//! string back keeps the slot's allocation on a free list for its capacity
//! class, so renaming things to strings of similar length keeps reusing the
//! same few allocations.

use crate::error::CollectionError;

/// Smallest capacity class, 2^3 = 8 bytes.
const MIN_CLASS: usize = 3;

/// Token for a string stored in a [`StringPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PooledString {
    slot: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    text: String,
    generation: u32,
    live: bool,
}

/// Arena of reusable string slots.
#[derive(Debug, Default)]
pub struct StringPool {
    slots: Vec<Slot>,
    free_by_class: Vec<Vec<u32>>,
    live: usize,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `text` into a slot of the matching capacity class.
    pub fn rent_and_copy(&mut self, text: &str) -> PooledString {
        let class = rent_class(text.len());
        self.live += 1;

        if let Some(slot_index) = self.free_by_class.get_mut(class).and_then(Vec::pop) {
            let slot = &mut self.slots[slot_index as usize];
            slot.text.push_str(text);
            slot.live = true;
            return PooledString {
                slot: slot_index,
                generation: slot.generation,
            };
        }

        let mut owned = String::with_capacity(1 << class);
        owned.push_str(text);
        self.slots.push(Slot {
            text: owned,
            generation: 0,
            live: true,
        });
        PooledString {
            slot: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn slot(&self, string: PooledString) -> Result<&Slot, CollectionError> {
        self.slots
            .get(string.slot as usize)
            .filter(|slot| slot.live && slot.generation == string.generation)
            .ok_or(CollectionError::InvalidRental)
    }

    pub fn get(&self, string: PooledString) -> Result<&str, CollectionError> {
        Ok(self.slot(string)?.text.as_str())
    }

    /// Release `string`. Its token becomes invalid.
    pub fn give_back(&mut self, string: PooledString) -> Result<(), CollectionError> {
        self.slot(string)?;
        let slot = &mut self.slots[string.slot as usize];
        slot.text.clear();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);

        let class = keep_class(slot.text.capacity());
        if self.free_by_class.len() <= class {
            self.free_by_class.resize_with(class + 1, Vec::new);
        }
        self.free_by_class[class].push(string.slot);
        self.live -= 1;
        Ok(())
    }

    /// Number of live strings.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

fn rent_class(len: usize) -> usize {
    let rounded = len.max(1 << MIN_CLASS).next_power_of_two();
    rounded.trailing_zeros() as usize
}

fn keep_class(capacity: usize) -> usize {
    let capacity = capacity.max(1 << MIN_CLASS);
    (usize::BITS - 1 - capacity.leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_and_get() {
        let mut pool = StringPool::new();
        let name = pool.rent_and_copy("Cube Mesh");
        assert_eq!(pool.get(name).unwrap(), "Cube Mesh");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn same_class_reuses_slot() {
        let mut pool = StringPool::new();
        let first = pool.rent_and_copy("abcdef");
        pool.give_back(first).unwrap();

        let second = pool.rent_and_copy("ghij");
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(pool.get(second).unwrap(), "ghij");
        assert_eq!(pool.get(first), Err(CollectionError::InvalidRental));
    }

    #[test]
    fn different_class_allocates_new_slot() {
        let mut pool = StringPool::new();
        let short = pool.rent_and_copy("ab");
        pool.give_back(short).unwrap();
        let long = pool.rent_and_copy("a string longer than sixteen bytes");
        assert_eq!(pool.slot_count(), 2);
        assert_eq!(pool.get(long).unwrap(), "a string longer than sixteen bytes");
    }

    #[test]
    fn give_back_twice_fails() {
        let mut pool = StringPool::new();
        let name = pool.rent_and_copy("x");
        pool.give_back(name).unwrap();
        assert_eq!(pool.give_back(name), Err(CollectionError::InvalidRental));
        assert!(pool.is_empty());
    }

    #[test]
    fn empty_string_is_stored() {
        let mut pool = StringPool::new();
        let empty = pool.rent_and_copy("");
        assert_eq!(pool.get(empty).unwrap(), "");
    }
}
