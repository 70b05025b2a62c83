//! Concurrent key/value registry.
//!
//! [`Registry`] is the storage behind both the plugin registry and the job
//! context registry. Readers proceed concurrently; a writer holds the lock
//! for a single-key mutation only. Every critical section is an O(1) map
//! operation, so a whole-map `RwLock` does not serialize unrelated keys in
//! any meaningful way.
//!
//! The registry also remembers insertion order, which backs the
//! "first registered wins" lookup used when no plugin id is given.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::RwLock;

struct Slot<V> {
    seq: u64,
    value: V,
}

struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    next_seq: u64,
}

/// A thread-safe map with single-key atomic operations.
pub struct Registry<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Inserts or replaces a value, returning the previous one.
    ///
    /// Replacing keeps the original registration order of the key.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.entries.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(key, Slot { seq, value });
        None
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().entries.get(key).map(|slot| slot.value.clone())
    }

    /// Returns `true` if `key` is present.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().entries.contains_key(key)
    }

    /// Removes `key`, returning its value.
    ///
    /// Removing an absent key is a no-op.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().entries.remove(key).map(|slot| slot.value)
    }

    /// Returns the earliest registered entry that is still present.
    pub fn first(&self) -> Option<(K, V)> {
        self.inner
            .read()
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.seq)
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
    }

    /// Returns all keys in registration order.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.read();
        let mut keys: Vec<(u64, K)> = inner
            .entries
            .iter()
            .map(|(key, slot)| (slot.seq, key.clone()))
            .collect();
        keys.sort_unstable_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Registry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.inner.read().entries.len())
            .finish()
    }
}
