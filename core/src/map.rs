//! A hash map built from pooled bucket vectors.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::error::CollectionError;
use crate::pool::ArrayPool;
use crate::vector::PooledVec;
use crate::version::{Snapshot, Versioned};

/// Number of hash buckets per map.
pub const BUCKET_COUNT: usize = 64;

/// A map with a fixed number of buckets, each a [`PooledVec`] of entries.
///
/// Buckets rent storage only once they receive their first entry, and all
/// buckets of one map share a single [`ArrayPool`]. Lookups hash the key with
/// `FxHasher` and scan the (short) bucket linearly.
///
/// Positional access ([`entry_at`](Self::entry_at)) walks buckets in order;
/// positions are only stable between structural mutations, which is what
/// [`checked_entry_at`](Self::checked_entry_at) enforces.
pub struct PooledMap<K, V> {
    buckets: Vec<PooledVec<(K, V)>>,
    len: usize,
    version: u64,
}

impl<K: Hash + Eq, V> PooledMap<K, V> {
    /// Create an empty map with its own pool.
    pub fn new() -> Self {
        Self::new_in(Arc::new(ArrayPool::new()))
    }

    /// Create an empty map whose buckets rent from `pool`.
    pub fn new_in(pool: Arc<ArrayPool<(K, V)>>) -> Self {
        Self {
            buckets: (0..BUCKET_COUNT)
                .map(|_| PooledVec::new_in(pool.clone()))
                .collect(),
            len: 0,
            version: 0,
        }
    }

    fn bucket_of(key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % BUCKET_COUNT as u64) as usize
    }

    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Insert a new entry. Fails if `key` is already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), CollectionError> {
        let bucket = &mut self.buckets[Self::bucket_of(&key)];
        if bucket.iter().any(|(k, _)| *k == key) {
            return Err(CollectionError::DuplicateKey);
        }
        bucket.push((key, value));
        self.len += 1;
        self.touch();
        Ok(())
    }

    /// Insert or overwrite, returning the previous value if there was one.
    ///
    /// Overwriting is not a structural mutation.
    pub fn insert_or_replace(&mut self, key: K, value: V) -> Option<V> {
        let bucket = &mut self.buckets[Self::bucket_of(&key)];
        if let Some(entry) = bucket.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut entry.1, value));
        }
        bucket.push((key, value));
        self.len += 1;
        self.touch();
        None
    }

    /// Get the value for `key`, inserting `make()` first if absent.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let bucket = &mut self.buckets[Self::bucket_of(&key)];
        let index = match bucket.position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                bucket.push((key, make()));
                self.len += 1;
                self.version = self.version.wrapping_add(1);
                bucket.len() - 1
            }
        };
        &mut bucket[index].1
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.buckets[Self::bucket_of(key)]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.buckets[Self::bucket_of(key)]
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let bucket = &mut self.buckets[Self::bucket_of(key)];
        let index = bucket.position(|(k, _)| k == key)?;
        let (_, value) = bucket.swap_remove(index).ok()?;
        self.len -= 1;
        self.touch();
        Some(value)
    }

    /// Remove `key`, failing with [`CollectionError::KeyNotFound`] if absent.
    pub fn take(&mut self, key: &K) -> Result<V, CollectionError> {
        self.remove(key).ok_or(CollectionError::KeyNotFound)
    }

    /// Remove every entry, returning bucket storage to the pool.
    pub fn clear(&mut self) {
        if self.len == 0 {
            return;
        }
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
        self.touch();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|(k, v)| (k, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.buckets
            .iter_mut()
            .flat_map(|bucket| bucket.iter_mut().map(|(k, v)| (&*k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// The entry at position `index` in iteration order.
    pub fn entry_at(&self, index: usize) -> Result<(&K, &V), CollectionError> {
        let mut remaining = index;
        for bucket in &self.buckets {
            if remaining < bucket.len() {
                let (k, v) = &bucket[remaining];
                return Ok((k, v));
            }
            remaining -= bucket.len();
        }
        Err(CollectionError::IndexOutOfRange {
            index,
            len: self.len,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of(self)
    }

    /// [`entry_at`](Self::entry_at) that fails if the map changed shape since `snapshot`.
    pub fn checked_entry_at(
        &self,
        snapshot: &Snapshot,
        index: usize,
    ) -> Result<(&K, &V), CollectionError> {
        snapshot.check_index(self, index)?;
        self.entry_at(index)
    }

    /// Copy every key into the front of `dest`, returning the count.
    pub fn copy_keys_to(&self, dest: &mut [K]) -> Result<usize, CollectionError>
    where
        K: Copy,
    {
        self.check_destination(dest.len())?;
        for (slot, key) in dest.iter_mut().zip(self.keys()) {
            *slot = *key;
        }
        Ok(self.len)
    }

    /// Copy every value into the front of `dest`, returning the count.
    pub fn copy_values_to(&self, dest: &mut [V]) -> Result<usize, CollectionError>
    where
        V: Copy,
    {
        self.check_destination(dest.len())?;
        for (slot, value) in dest.iter_mut().zip(self.values()) {
            *slot = *value;
        }
        Ok(self.len)
    }

    fn check_destination(&self, provided: usize) -> Result<(), CollectionError> {
        if provided < self.len {
            return Err(CollectionError::DestinationTooSmall {
                required: self.len,
                provided,
            });
        }
        Ok(())
    }
}

impl<K: Hash + Eq, V> Default for PooledMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Versioned for PooledMap<K, V> {
    fn version(&self) -> u64 {
        self.version
    }

    fn element_count(&self) -> usize {
        self.len
    }
}

impl<K: Hash + Eq + fmt::Debug, V: fmt::Debug> fmt::Debug for PooledMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
