//! Keyed object storage. Every persistent design object lives in a
//! [`Store`] and is addressed by a typed integer key handed out on
//! insertion. Keys are never reused; removal leaves a tombstone so stale
//! handles resolve to `None` instead of aliasing a new object.

use std::collections::HashMap;
use std::marker::PhantomData;

/// Implemented by the typed key newtypes, see [`define_key!`].
pub trait StoreKey: Copy + Eq + std::hash::Hash {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

/// Declare a `#[repr(transparent)]` key type for a store.
#[macro_export]
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $crate::store::StoreKey for $name {
            fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

/// Slot-vector store with a case-sensitive name index.
#[derive(Debug)]
pub struct Store<K: StoreKey, T> {
    slots: Vec<Option<T>>,
    names: HashMap<String, K>,
    live: usize,
    _key: PhantomData<K>,
}

impl<K: StoreKey, T> Default for Store<K, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            names: HashMap::new(),
            live: 0,
            _key: PhantomData,
        }
    }
}

impl<K: StoreKey, T> Store<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object under `name` and return its key. Names must be
    /// unique within a store; a duplicate returns `None` and leaves the
    /// store untouched.
    pub fn insert(&mut self, name: &str, value: T) -> Option<K> {
        if self.names.contains_key(name) {
            return None;
        }
        let key = K::from_index(self.slots.len());
        self.slots.push(Some(value));
        self.names.insert(name.to_owned(), key);
        self.live += 1;
        Some(key)
    }

    /// Insert an anonymous object (no name-index entry).
    pub fn insert_unnamed(&mut self, value: T) -> K {
        let key = K::from_index(self.slots.len());
        self.slots.push(Some(value));
        self.live += 1;
        key
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots.get(key.index()).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots.get_mut(key.index()).and_then(|s| s.as_mut())
    }

    /// Resolve a name to a key. Case sensitive.
    pub fn lookup(&self, name: &str) -> Option<K> {
        self.names.get(name).copied()
    }

    /// Remove an object, leaving a tombstone so the key is never reused.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let taken = self.slots.get_mut(key.index()).and_then(|s| s.take());
        if taken.is_some() {
            self.live -= 1;
            self.names.retain(|_, k| *k != key);
        }
        taken
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of keys ever allocated, including tombstones.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.names.clear();
        self.live = 0;
    }

    /// Iterate live objects in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (K::from_index(i), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (K::from_index(i), v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| K::from_index(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_key!(TestKey);

    #[test]
    fn insert_lookup_roundtrip() {
        let mut store: Store<TestKey, u32> = Store::new();
        let a = store.insert("a", 1).unwrap();
        let b = store.insert("b", 2).unwrap();

        assert_eq!(store.lookup("a"), Some(a));
        assert_eq!(store.lookup("b"), Some(b));
        assert_eq!(store.get(a), Some(&1));
        assert_eq!(store.get(b), Some(&2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut store: Store<TestKey, u32> = Store::new();
        assert!(store.insert("a", 1).is_some());
        assert!(store.insert("a", 2).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn keys_are_not_reused() {
        let mut store: Store<TestKey, u32> = Store::new();
        let a = store.insert("a", 1).unwrap();
        store.remove(a);

        let b = store.insert("b", 2).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(a), None);
        assert_eq!(store.lookup("a"), None);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut store: Store<TestKey, u32> = Store::new();
        store.insert("x", 10);
        let y = store.insert("y", 20).unwrap();
        store.insert("z", 30);
        store.remove(y);

        let values: Vec<u32> = store.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10, 30]);
    }
}
