//! A growable vector whose backing buffers come from an [`ArrayPool`].

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use crate::error::CollectionError;
use crate::pool::{ArrayPool, Poolable};
use crate::version::{Snapshot, Versioned};

/// Capacity rented on the first push into an empty vector.
pub const DEFAULT_CAPACITY: usize = 4;

/// A vector that rents its storage from a shared [`ArrayPool`].
///
/// When full, the vector rents a buffer twice as large, moves its elements
/// over and gives the old buffer back. Clearing or dropping the vector also
/// returns its buffer. Structural mutations (push, insert, remove, truncate,
/// clear) bump [`version`](Self::version); replacing a value with
/// [`set`](Self::set) does not.
pub struct PooledVec<T> {
    items: Vec<T>,
    pool: Arc<ArrayPool<T>>,
    version: u64,
}

impl<T> PooledVec<T> {
    /// Create an empty vector with its own private pool.
    pub fn new() -> Self {
        Self::new_in(Arc::new(ArrayPool::new()))
    }

    /// Create an empty vector that rents from `pool`. Nothing is rented yet.
    pub fn new_in(pool: Arc<ArrayPool<T>>) -> Self {
        Self {
            items: Vec::new(),
            pool,
            version: 0,
        }
    }

    /// Create a vector that rents at least `capacity` slots up front.
    pub fn with_capacity_in(capacity: usize, pool: Arc<ArrayPool<T>>) -> Self {
        Self {
            items: pool.rent(capacity),
            pool,
            version: 0,
        }
    }

    /// The pool this vector rents from.
    pub fn pool(&self) -> &Arc<ArrayPool<T>> {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Structural version, see the type docs.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn reserve_one(&mut self) {
        if self.items.len() < self.items.capacity() {
            return;
        }
        let new_capacity = (self.items.capacity() * 2).max(DEFAULT_CAPACITY);
        let mut grown = self.pool.rent(new_capacity);
        grown.append(&mut self.items);
        let old = std::mem::replace(&mut self.items, grown);
        self.pool.give_back(old);
    }

    pub fn push(&mut self, value: T) {
        self.reserve_one();
        self.items.push(value);
        self.touch();
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.items.pop()?;
        self.touch();
        Some(value)
    }

    /// Insert `value` at `index`, shifting later elements right.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), CollectionError> {
        if index > self.items.len() {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        self.reserve_one();
        self.items.insert(index, value);
        self.touch();
        Ok(())
    }

    /// Remove the element at `index`, preserving the order of the rest.
    pub fn remove(&mut self, index: usize) -> Result<T, CollectionError> {
        self.check_bounds(index)?;
        let value = self.items.remove(index);
        self.touch();
        Ok(value)
    }

    /// Remove the element at `index` by moving the last element into its place.
    pub fn swap_remove(&mut self, index: usize) -> Result<T, CollectionError> {
        self.check_bounds(index)?;
        let value = self.items.swap_remove(index);
        self.touch();
        Ok(value)
    }

    /// Replace the element at `index`, returning the previous value.
    pub fn set(&mut self, index: usize, value: T) -> Result<T, CollectionError> {
        self.check_bounds(index)?;
        Ok(std::mem::replace(&mut self.items[index], value))
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.items.len() {
            self.items.truncate(len);
            self.touch();
        }
    }

    /// Remove every element and give the backing buffer back to the pool.
    pub fn clear(&mut self) {
        if self.items.capacity() == 0 {
            return;
        }
        let was_empty = self.items.is_empty();
        let buffer = std::mem::take(&mut self.items);
        self.pool.give_back(buffer);
        if !was_empty {
            self.touch();
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Index of the first element matching `predicate`.
    pub fn position(&self, predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items.iter().position(predicate)
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.items.contains(value)
    }

    /// Copy every element into the front of `dest`, returning the count.
    pub fn copy_to_slice(&self, dest: &mut [T]) -> Result<usize, CollectionError>
    where
        T: Copy,
    {
        let len = self.items.len();
        if dest.len() < len {
            return Err(CollectionError::DestinationTooSmall {
                required: len,
                provided: dest.len(),
            });
        }
        dest[..len].copy_from_slice(&self.items);
        Ok(len)
    }

    /// Capture the current shape for later [`checked_get`](Self::checked_get) calls.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of(self)
    }

    /// Positional read that fails if the vector changed shape since `snapshot`.
    pub fn checked_get(&self, snapshot: &Snapshot, index: usize) -> Result<&T, CollectionError> {
        snapshot.check_index(self, index)?;
        Ok(&self.items[index])
    }

    fn check_bounds(&self, index: usize) -> Result<(), CollectionError> {
        if index >= self.items.len() {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}

impl<T> Drop for PooledVec<T> {
    fn drop(&mut self) {
        if self.items.capacity() > 0 {
            let buffer = std::mem::take(&mut self.items);
            self.pool.give_back(buffer);
        }
    }
}

impl<T> Default for PooledVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Versioned for PooledVec<T> {
    fn version(&self) -> u64 {
        self.version
    }

    fn element_count(&self) -> usize {
        self.items.len()
    }
}

impl<T> Poolable for PooledVec<T> {
    fn new_empty() -> Self {
        Self::new()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Index<usize> for PooledVec<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for PooledVec<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}

impl<T> Extend<T> for PooledVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<'a, T> IntoIterator for &'a PooledVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
