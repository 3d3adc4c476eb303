//! Reusable storage for the pooled collections.
//!
//! Two pools live here:
//!
//! - [`ObjectPool<T>`] keeps whole values (for example empty [`PooledVec`]s)
//!   that were reset instead of dropped, so the next rental skips construction.
//! - [`ArrayPool<T>`] keeps `Vec<T>` backing buffers grouped by capacity class.
//!   Containers rent a buffer when they grow and give the old one back, so a
//!   warm pool serves steady-state churn without touching the allocator.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_core::pool::ArrayPool;
//!
//! let pool = Arc::new(ArrayPool::<u32>::new());
//! let mut buffer = pool.rent(10);
//! assert!(buffer.capacity() >= 10);
//! buffer.extend_from_slice(&[1, 2, 3]);
//!
//! pool.give_back(buffer);
//! assert_eq!(pool.retained(), 1);
//!
//! // The same allocation comes back, already cleared.
//! let again = pool.rent(16);
//! assert!(again.is_empty());
//! assert_eq!(pool.retained(), 0);
//! ```
//!
//! [`PooledVec`]: crate::vector::PooledVec

use std::fmt;

use parking_lot::Mutex;

/// Values that can be parked in an [`ObjectPool`] and handed out again.
///
/// `reset` must leave the value logically empty. Whether it keeps its
/// allocations is up to the implementor.
pub trait Poolable {
    /// Build a fresh, empty value.
    fn new_empty() -> Self;

    /// Return the value to its empty state.
    fn reset(&mut self);
}

/// A free-list of reset values.
///
/// Not synchronized: the owner is expected to guard it together with the
/// data it serves.
pub struct ObjectPool<T> {
    free: Vec<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Poolable + 'static> ObjectPool<T> {
    /// Create a pool that builds new values with [`Poolable::new_empty`].
    pub fn new() -> Self {
        Self::with_factory(T::new_empty)
    }

    /// Create a pool that builds new values with `factory`.
    ///
    /// Useful when new values must share something, such as an [`ArrayPool`].
    pub fn with_factory(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Vec::new(),
            factory: Box::new(factory),
        }
    }

    /// Take a value from the pool, building one if the pool is empty.
    pub fn rent(&mut self) -> T {
        self.free.pop().unwrap_or_else(|| (self.factory)())
    }

    /// Reset `value` and park it for the next [`rent`](Self::rent).
    pub fn give_back(&mut self, mut value: T) {
        value.reset();
        self.free.push(value);
    }

    /// Number of parked values.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<T: Poolable + 'static> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("available", &self.free.len())
            .finish()
    }
}

/// Buffers kept per capacity class. Extra returns are dropped.
const MAX_RETAINED_PER_CLASS: usize = 16;

const CLASS_COUNT: usize = usize::BITS as usize;

/// A thread-safe pool of `Vec<T>` buffers bucketed by power-of-two capacity.
///
/// Share it between containers with `Arc<ArrayPool<T>>`.
pub struct ArrayPool<T> {
    classes: Mutex<Vec<Vec<Vec<T>>>>,
}

impl<T> ArrayPool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            classes: Mutex::new((0..CLASS_COUNT).map(|_| Vec::new()).collect()),
        }
    }

    /// Rent an empty buffer with capacity of at least `min_capacity`.
    ///
    /// A zero request returns an unallocated `Vec`.
    pub fn rent(&self, min_capacity: usize) -> Vec<T> {
        if min_capacity == 0 {
            return Vec::new();
        }
        let class = ceil_class(min_capacity);
        if let Some(buffer) = self.classes.lock()[class].pop() {
            return buffer;
        }
        let capacity = min_capacity.checked_next_power_of_two().unwrap_or(min_capacity);
        log::trace!("ArrayPool: allocating buffer with capacity {}", capacity);
        Vec::with_capacity(capacity)
    }

    /// Clear `buffer` and keep its allocation for a later rental.
    pub fn give_back(&self, mut buffer: Vec<T>) {
        buffer.clear();
        let capacity = buffer.capacity();
        if capacity == 0 {
            return;
        }
        let mut classes = self.classes.lock();
        let retained = &mut classes[floor_class(capacity)];
        if retained.len() < MAX_RETAINED_PER_CLASS {
            retained.push(buffer);
        }
    }

    /// Total number of buffers currently parked in the pool.
    pub fn retained(&self) -> usize {
        self.classes.lock().iter().map(Vec::len).sum()
    }
}

impl<T> Default for ArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayPool")
            .field("retained", &self.retained())
            .finish()
    }
}

/// Smallest class whose guaranteed capacity covers `n` (`n > 0`).
fn ceil_class(n: usize) -> usize {
    match n.checked_next_power_of_two() {
        Some(p) => p.trailing_zeros() as usize,
        None => CLASS_COUNT - 1,
    }
}

/// Largest class whose guaranteed capacity `capacity` satisfies (`capacity > 0`).
fn floor_class(capacity: usize) -> usize {
    (usize::BITS - 1 - capacity.leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Scratch {
        words: Vec<u32>,
    }

    impl Poolable for Scratch {
        fn new_empty() -> Self {
            Self::default()
        }
        fn reset(&mut self) {
            self.words.clear();
        }
    }

    #[test]
    fn object_pool_builds_when_empty() {
        let mut pool = ObjectPool::<Scratch>::new();
        assert_eq!(pool.available(), 0);
        let value = pool.rent();
        assert!(value.words.is_empty());
    }

    #[test]
    fn object_pool_resets_on_give_back() {
        let mut pool = ObjectPool::<Scratch>::new();
        let mut value = pool.rent();
        value.words.extend_from_slice(&[1, 2, 3, 4, 5]);
        pool.give_back(value);
        assert_eq!(pool.available(), 1);

        let value = pool.rent();
        assert!(value.words.is_empty());
        assert!(value.words.capacity() >= 5);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn object_pool_custom_factory() {
        let mut pool = ObjectPool::with_factory(|| Scratch {
            words: Vec::with_capacity(32),
        });
        assert!(pool.rent().words.capacity() >= 32);
    }

    #[test]
    fn array_pool_zero_request_does_not_allocate() {
        let pool = ArrayPool::<u8>::new();
        assert_eq!(pool.rent(0).capacity(), 0);
    }

    #[test]
    fn array_pool_rounds_up_to_power_of_two() {
        let pool = ArrayPool::<u64>::new();
        let buffer = pool.rent(5);
        assert!(buffer.capacity() >= 8);
    }

    #[test]
    fn array_pool_reuses_returned_buffer() {
        let pool = ArrayPool::<u64>::new();
        let mut buffer = pool.rent(8);
        buffer.push(7);
        let ptr = buffer.as_ptr();
        pool.give_back(buffer);

        let again = pool.rent(8);
        assert!(again.is_empty());
        assert_eq!(again.as_ptr(), ptr);
    }

    #[test]
    fn array_pool_smaller_class_does_not_serve_larger_request() {
        let pool = ArrayPool::<u64>::new();
        pool.give_back(Vec::with_capacity(4));
        let buffer = pool.rent(16);
        assert!(buffer.capacity() >= 16);
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn array_pool_caps_retained_buffers() {
        let pool = ArrayPool::<u8>::new();
        for _ in 0..(MAX_RETAINED_PER_CLASS + 4) {
            pool.give_back(Vec::with_capacity(64));
        }
        assert_eq!(pool.retained(), MAX_RETAINED_PER_CLASS);
    }

    #[test]
    fn class_math() {
        assert_eq!(ceil_class(1), 0);
        assert_eq!(ceil_class(4), 2);
        assert_eq!(ceil_class(5), 3);
        assert_eq!(floor_class(4), 2);
        assert_eq!(floor_class(7), 2);
        assert_eq!(floor_class(8), 3);
    }

    #[test]
    fn object_pool_default_uses_new_empty() {
        let mut pool = ObjectPool::<Scratch>::default();
        assert_eq!(pool.rent(), Scratch::new_empty());
    }

    static_assertions::assert_impl_all!(ArrayPool<u32>: Send, Sync);
    static_assertions::assert_impl_all!(ObjectPool<Scratch>: Send, Sync, Default);
}
